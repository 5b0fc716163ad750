//! Decoded FMPXMLRESULT content: field descriptors, records and the
//! surrounding database metadata.

use std::ops::Index;

use serde::Serialize;

use crate::error::{FmError, Result};

/// Declared type of a FileMaker field, from the `TYPE` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Text,
    Number,
    Date,
    Time,
    Timestamp,
    Container,
    Calculation,
    Summary,
    Other(String),
}

impl FieldType {
    pub fn from_token(token: &str) -> Self {
        match token {
            "TEXT" => FieldType::Text,
            "NUMBER" => FieldType::Number,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "TIMESTAMP" => FieldType::Timestamp,
            "CONTAINER" => FieldType::Container,
            "CALCULATION" => FieldType::Calculation,
            "SUMMARY" => FieldType::Summary,
            other => FieldType::Other(other.to_string()),
        }
    }
}

/// One `<FIELD>` of the `<METADATA>` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub max_repeat: u32,
    pub empty_ok: bool,
}

impl FieldDescriptor {
    pub fn is_repeating(&self) -> bool {
        self.max_repeat > 1
    }
}

/// Value of one field in one record.
///
/// The shape follows the descriptor: fields declared with `MAXREPEAT="1"`
/// are `Scalar`, every other field is `Repeated` even when only one
/// repetition holds data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Option<String>),
    Repeated(Vec<String>),
}

impl FieldValue {
    /// Text of a scalar value; `None` for empty or repeating values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(v) => v.as_deref(),
            FieldValue::Repeated(_) => None,
        }
    }

    /// Repetitions of a repeating value; a scalar is viewed as zero or one
    /// repetitions.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Scalar(v) => v.as_deref().into_iter().collect(),
            FieldValue::Repeated(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// One `<ROW>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub(crate) record_id: u64,
    pub(crate) mod_id: u64,
    pub(crate) fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub fn mod_id(&self) -> u64 {
        self.mod_id
    }

    /// Look up a field by exact name.
    pub fn get(&self, name: &str) -> Result<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| FmError::FieldNotFound(name.to_string()))
    }

    /// Scalar text of a field; `Ok(None)` when the field is empty or repeating.
    pub fn text(&self, name: &str) -> Result<Option<&str>> {
        self.get(name).map(FieldValue::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Fields in descriptor order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Product {
    pub name: String,
    pub version: String,
    pub build: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub layout: String,
    /// Total records in the table, not the found set.
    pub records: u64,
    pub date_format: String,
    pub time_format: String,
}

/// Immutable result of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) product: Product,
    pub(crate) database: DatabaseInfo,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) found: u64,
    pub(crate) records: Vec<Record>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn database(&self) -> &DatabaseInfo {
        &self.database
    }

    /// Records in the table.
    pub fn total_count(&self) -> u64 {
        self.database.records
    }

    /// Records in the found set, which may exceed `len()` when `-max` or
    /// `-skip` trimmed the reply.
    pub fn found_count(&self) -> u64 {
        self.found
    }

    /// The request URL. Never contains credentials.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// HTTP headers of the reply, as the transport received them.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive lookup of one reply header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

impl Index<usize> for ResultSet {
    type Output = Record;

    fn index(&self, index: usize) -> &Record {
        &self.records[index]
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
