//! FMPXMLRESULT response parser.
//!
//! Reads `<ERRORCODE>` first and stops there on any non-zero code. On success
//! it decodes `<PRODUCT>`, `<DATABASE>`, `<METADATA>` and `<RESULTSET>` into a
//! [`ResultSet`]. Any missing required element or attribute is a
//! [`FmError::Parse`].

use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{FmError, Result};
use crate::result::{DatabaseInfo, FieldDescriptor, FieldType, FieldValue, Product, Record, ResultSet};
use crate::xml::{parse_tree, Element};

const ROOT: &str = "FMPXMLRESULT";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser {
    escape_text: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escape `TEXT` field values for direct inclusion in XHTML.
    pub fn escape_text(mut self, enabled: bool) -> Self {
        self.escape_text = enabled;
        self
    }

    pub fn parse(&self, xml: &str) -> Result<ResultSet> {
        let root = parse_tree(xml)?;
        if root.name != ROOT {
            return Err(FmError::Parse(format!(
                "root element is <{}>, expected <{ROOT}>",
                root.name
            )));
        }

        let code = error_code(&root)?;
        if code != 0 {
            let err = FmError::server(code);
            warn!(code, "FileMaker reported an error: {err}");
            return Err(err);
        }

        let product = product(required(&root, "PRODUCT")?);
        let database = database(required(&root, "DATABASE")?)?;
        let fields = required(&root, "METADATA")?
            .children_named("FIELD")
            .map(field_descriptor)
            .collect::<Result<Vec<_>>>()?;

        let resultset = required(&root, "RESULTSET")?;
        let found: u64 = number_attr(resultset, "FOUND")?;
        let records = resultset
            .children_named("ROW")
            .map(|row| self.record(row, &fields))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            database = %database.name,
            layout = %database.layout,
            found,
            returned = records.len(),
            "parsed FMPXMLRESULT"
        );

        Ok(ResultSet {
            url: String::new(),
            headers: Vec::new(),
            product,
            database,
            fields,
            found,
            records,
        })
    }

    fn record(&self, row: &Element, fields: &[FieldDescriptor]) -> Result<Record> {
        let record_id: u64 = number_attr(row, "RECORDID")?;
        let mod_id: u64 = number_attr(row, "MODID")?;

        let cols: Vec<&Element> = row.children_named("COL").collect();
        if cols.len() != fields.len() {
            return Err(FmError::Parse(format!(
                "row {record_id} has {} columns, metadata declares {}",
                cols.len(),
                fields.len()
            )));
        }

        let values = fields
            .iter()
            .zip(cols)
            .map(|(field, col)| (field.name.clone(), self.value(field, col)))
            .collect();

        Ok(Record {
            record_id,
            mod_id,
            fields: values,
        })
    }

    fn value(&self, field: &FieldDescriptor, col: &Element) -> FieldValue {
        let escape = self.escape_text && field.field_type == FieldType::Text;
        let convert = |text: &str| {
            if escape {
                escape_xhtml(text)
            } else {
                text.to_string()
            }
        };

        let mut data = col.children_named("DATA").map(|d| d.text.as_str());
        if field.is_repeating() {
            // repetitions end at the first empty one
            FieldValue::Repeated(
                data.take_while(|t| !t.is_empty())
                    .map(convert)
                    .collect(),
            )
        } else {
            FieldValue::Scalar(data.next().filter(|t| !t.is_empty()).map(convert))
        }
    }
}

/// Parse with default options.
pub fn parse(xml: &str) -> Result<ResultSet> {
    ResponseParser::new().parse(xml)
}

fn required<'a>(parent: &'a Element, name: &str) -> Result<&'a Element> {
    parent
        .child(name)
        .ok_or_else(|| FmError::Parse(format!("missing <{name}> in <{}>", parent.name)))
}

fn required_attr<'a>(element: &'a Element, name: &str) -> Result<&'a str> {
    element
        .attr(name)
        .ok_or_else(|| FmError::Parse(format!("<{}> lacks attribute {name}", element.name)))
}

fn number_attr<T: FromStr>(element: &Element, name: &str) -> Result<T> {
    let raw = required_attr(element, name)?;
    raw.trim().parse().map_err(|_| {
        FmError::Parse(format!(
            "<{}> attribute {name}={raw:?} is not a number",
            element.name
        ))
    })
}

fn error_code(root: &Element) -> Result<i32> {
    let raw = required(root, "ERRORCODE")?.text.trim();
    raw.parse()
        .map_err(|_| FmError::Parse(format!("ERRORCODE {raw:?} is not an integer")))
}

fn product(element: &Element) -> Product {
    let attr = |name: &str| element.attr(name).unwrap_or_default().to_string();
    Product {
        name: attr("NAME"),
        version: attr("VERSION"),
        build: attr("BUILD"),
    }
}

fn database(element: &Element) -> Result<DatabaseInfo> {
    let attr = |name: &str| element.attr(name).unwrap_or_default().to_string();
    Ok(DatabaseInfo {
        name: required_attr(element, "NAME")?.to_string(),
        layout: attr("LAYOUT"),
        records: number_attr(element, "RECORDS")?,
        date_format: attr("DATEFORMAT"),
        time_format: attr("TIMEFORMAT"),
    })
}

fn field_descriptor(element: &Element) -> Result<FieldDescriptor> {
    Ok(FieldDescriptor {
        name: required_attr(element, "NAME")?.to_string(),
        field_type: FieldType::from_token(required_attr(element, "TYPE")?),
        max_repeat: number_attr(element, "MAXREPEAT")?,
        empty_ok: element.attr("EMPTYOK") == Some("YES"),
    })
}

/// Trim, HTML-escape, and turn every non-ASCII character into a decimal
/// character reference.
pub fn escape_xhtml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c if c.is_ascii() => out.push(c),
            c => out.push_str(&format!("&#{};", c as u32)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<FMPXMLRESULT xmlns="http://www.filemaker.com/fmpxmlresult">"#;

    fn doc(code: i32, body: &str) -> String {
        format!("{HEADER}<ERRORCODE>{code}</ERRORCODE>{body}</FMPXMLRESULT>")
    }

    const META: &str = r#"<PRODUCT BUILD="06/14/2006" NAME="FileMaker Web Publishing Engine" VERSION="8.0.4.128"/>
<DATABASE DATEFORMAT="MM/dd/yyyy" LAYOUT="layout" NAME="database" RECORDS="68" TIMEFORMAT="HH:mm:ss"/>
<METADATA>
  <FIELD EMPTYOK="YES" MAXREPEAT="1" NAME="NAME" TYPE="TEXT"/>
  <FIELD EMPTYOK="NO" MAXREPEAT="3" NAME="TAGS" TYPE="TEXT"/>
</METADATA>"#;

    #[test]
    fn parses_rows_in_document_order() {
        let xml = doc(
            0,
            &format!(
                r#"{META}<RESULTSET FOUND="2">
<ROW MODID="1" RECORDID="10"><COL><DATA>Alpha</DATA></COL><COL><DATA>a</DATA><DATA>b</DATA><DATA/></COL></ROW>
<ROW MODID="4" RECORDID="11"><COL><DATA/></COL><COL><DATA>c</DATA><DATA/><DATA/></COL></ROW>
</RESULTSET>"#
            ),
        );
        let set = parse(&xml).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.found_count(), 2);
        assert_eq!(set.total_count(), 68);
        assert_eq!(set.database().layout, "layout");
        assert_eq!(set.product().version, "8.0.4.128");
        assert_eq!(set[0].record_id(), 10);
        assert_eq!(set[0].text("NAME").unwrap(), Some("Alpha"));
        assert_eq!(
            set[0].get("TAGS").unwrap(),
            &FieldValue::Repeated(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(set[1].mod_id(), 4);
        assert_eq!(set[1].text("NAME").unwrap(), None);
        // single populated repetition still comes back as a sequence
        assert_eq!(set[1].get("TAGS").unwrap().values(), vec!["c"]);
    }

    #[test]
    fn field_descriptors() {
        let xml = doc(0, &format!(r#"{META}<RESULTSET FOUND="0"></RESULTSET>"#));
        let set = parse(&xml).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.fields().len(), 2);
        let tags = set.field("TAGS").unwrap();
        assert_eq!(tags.max_repeat, 3);
        assert!(!tags.empty_ok);
        assert_eq!(tags.field_type, FieldType::Text);
    }

    #[test]
    fn nonzero_code_is_server_error() {
        let xml = doc(
            401,
            r#"<PRODUCT/><DATABASE NAME="" RECORDS="0"/><METADATA/><RESULTSET FOUND="0"/>"#,
        );
        let err = parse(&xml).unwrap_err();
        assert_eq!(err.server_code(), Some(401));
        assert_eq!(
            err.to_string(),
            "FileMaker Error 401: No records match the request"
        );
    }

    #[test]
    fn error_code_is_checked_before_schema() {
        let err = parse(&doc(802, "")).unwrap_err();
        assert_eq!(err.server_code(), Some(802));
    }

    #[test]
    fn missing_resultset_is_parse_error() {
        let err = parse(&doc(0, META)).unwrap_err();
        assert!(matches!(err, FmError::Parse(msg) if msg.contains("RESULTSET")));
    }

    #[test]
    fn column_count_mismatch_is_parse_error() {
        let xml = doc(
            0,
            &format!(
                r#"{META}<RESULTSET FOUND="1"><ROW MODID="1" RECORDID="1"><COL><DATA>x</DATA></COL></ROW></RESULTSET>"#
            ),
        );
        assert!(matches!(parse(&xml), Err(FmError::Parse(_))));
    }

    #[test]
    fn bad_error_code_and_wrong_root() {
        assert!(matches!(parse(&doc(0, "").replace(">0<", ">x<")), Err(FmError::Parse(_))));
        assert!(matches!(
            parse("<FMPDSORESULT><ERRORCODE>0</ERRORCODE></FMPDSORESULT>"),
            Err(FmError::Parse(_))
        ));
        assert!(matches!(parse("<FMPXMLRESULT>"), Err(FmError::Parse(_))));
    }

    #[test]
    fn escaping_applies_to_text_fields_only() {
        let xml = doc(
            0,
            r#"<PRODUCT/><DATABASE NAME="d" RECORDS="1"/>
<METADATA><FIELD MAXREPEAT="1" NAME="T" TYPE="TEXT"/><FIELD MAXREPEAT="1" NAME="N" TYPE="NUMBER"/></METADATA>
<RESULTSET FOUND="1"><ROW MODID="0" RECORDID="1"><COL><DATA> Zoë &lt;b&gt; </DATA></COL><COL><DATA>&lt;1</DATA></COL></ROW></RESULTSET>"#,
        );
        let set = ResponseParser::new().escape_text(true).parse(&xml).unwrap();
        assert_eq!(set[0].text("T").unwrap(), Some("Zo&#235; &lt;b&gt;"));
        assert_eq!(set[0].text("N").unwrap(), Some("<1"));
    }

    #[test]
    fn escape_xhtml_quotes() {
        assert_eq!(escape_xhtml(r#"a"b'c&"#), "a&quot;b&#39;c&amp;");
    }
}
