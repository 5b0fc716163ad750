//! FMPXMLRESULT document rendering.

use quick_xml::escape::escape;

use crate::table::{Row, DATABASE, FIELDS, LAYOUT};

const PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<!DOCTYPE FMPXMLRESULT PUBLIC "-//FMI//DTD FMPXMLRESULT//EN" "/fmi/xml/FMPXMLRESULT.dtd">
"#;
const PRODUCT: &str =
    r#"<PRODUCT BUILD="06/14/2006" NAME="FileMaker Web Publishing Engine" VERSION="8.0.4.128"/>"#;

/// Reply carrying only a non-zero error code, shaped like the real engine's.
pub fn error(code: i32) -> String {
    format!(
        r#"{PROLOG}<FMPXMLRESULT xmlns="http://www.filemaker.com/fmpxmlresult"><ERRORCODE>{code}</ERRORCODE>{PRODUCT}<DATABASE DATEFORMAT="" LAYOUT="" NAME="" RECORDS="" TIMEFORMAT=""/><METADATA></METADATA><RESULTSET FOUND="0"></RESULTSET></FMPXMLRESULT>"#
    )
}

/// Successful reply listing `rows` out of a found set of `found`.
pub fn result(total: usize, found: usize, rows: &[(u64, &Row)]) -> String {
    let mut out = String::from(PROLOG);
    out.push_str(r#"<FMPXMLRESULT xmlns="http://www.filemaker.com/fmpxmlresult"><ERRORCODE>0</ERRORCODE>"#);
    out.push_str(PRODUCT);
    out.push_str(&format!(
        r#"<DATABASE DATEFORMAT="MM/dd/yyyy" LAYOUT="{LAYOUT}" NAME="{DATABASE}" RECORDS="{total}" TIMEFORMAT="HH:mm:ss"/>"#
    ));

    out.push_str("<METADATA>");
    for (name, kind, reps) in FIELDS {
        out.push_str(&format!(
            r#"<FIELD EMPTYOK="YES" MAXREPEAT="{reps}" NAME="{name}" TYPE="{kind}"/>"#
        ));
    }
    out.push_str("</METADATA>");

    out.push_str(&format!(r#"<RESULTSET FOUND="{found}">"#));
    for (id, row) in rows {
        out.push_str(&format!(r#"<ROW MODID="{}" RECORDID="{id}">"#, row.mod_id));
        for reps in &row.values {
            out.push_str("<COL>");
            for value in reps {
                out.push_str("<DATA>");
                out.push_str(&escape(value.as_str()));
                out.push_str("</DATA>");
            }
            out.push_str("</COL>");
        }
        out.push_str("</ROW>");
    }
    out.push_str("</RESULTSET></FMPXMLRESULT>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_document_carries_code() {
        let xml = error(401);
        assert!(xml.contains("<ERRORCODE>401</ERRORCODE>"));
        assert!(xml.contains(r#"<RESULTSET FOUND="0">"#));
    }

    #[test]
    fn rows_are_escaped() {
        let row = Row {
            mod_id: 3,
            values: vec![
                vec!["A&B".to_string()],
                vec!["<x>".to_string()],
                vec!["1".to_string(), String::new(), String::new()],
                vec![String::new()],
            ],
        };
        let xml = result(1, 1, &[(7, &row)]);
        assert!(xml.contains(r#"<ROW MODID="3" RECORDID="7">"#));
        assert!(xml.contains("<DATA>A&amp;B</DATA>"));
        assert!(xml.contains("<DATA>&lt;x&gt;</DATA>"));
        assert!(xml.contains("<COL><DATA></DATA></COL>"));
        assert!(xml.contains(r#"<FIELD EMPTYOK="YES" MAXREPEAT="3" NAME="PHONE" TYPE="TEXT"/>"#));
    }
}
