//! Pending query parameters and their query-string encoding.
//!
//! `QueryParams` is the accumulator behind `FmClient`: field criteria, field
//! values and request modifiers are kept as ordered `(key, value)` pairs so
//! repeated keys survive; sort criteria are kept apart and emitted by
//! precedence.

use std::fmt;
use std::str::FromStr;

use crate::error::FmError;

/// Records returned when the caller does not say otherwise.
pub const DEFAULT_MAX_RECORDS: u32 = 50;

/// Field-level comparison operator for find requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operator {
    #[default]
    Eq,
    Cn,
    Bw,
    Ew,
    Gt,
    Gte,
    Lt,
    Lte,
    Neq,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Cn => "cn",
            Operator::Bw => "bw",
            Operator::Ew => "ew",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Neq => "neq",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = FmError;

    fn from_str(s: &str) -> Result<Self, FmError> {
        Ok(match s {
            "eq" => Operator::Eq,
            "cn" => Operator::Cn,
            "bw" => Operator::Bw,
            "ew" => Operator::Ew,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "neq" => Operator::Neq,
            other => return Err(FmError::Config(format!("unknown operator {other:?}"))),
        })
    }
}

/// Direction of a sort criterion. `Custom` names a value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOrder {
    Ascend,
    Descend,
    Custom(String),
}

impl SortOrder {
    pub fn as_str(&self) -> &str {
        match self {
            SortOrder::Ascend => "ascend",
            SortOrder::Descend => "descend",
            SortOrder::Custom(list) => list,
        }
    }
}

/// Request command appended to the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    New,
    Find,
    FindAny,
    FindAll,
    Edit,
    Delete,
    Duplicate,
    View,
}

impl Action {
    /// The query-string token, e.g. `-findall`.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::New => "-new",
            Action::Find => "-find",
            Action::FindAny => "-findany",
            Action::FindAll => "-findall",
            Action::Edit => "-edit",
            Action::Delete => "-delete",
            Action::Duplicate => "-dup",
            Action::View => "-view",
        }
    }

    /// Edit, delete and duplicate address a single record by `-recid`.
    pub fn needs_record_id(self) -> bool {
        matches!(self, Action::Edit | Action::Delete | Action::Duplicate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a script runs relative to the find and sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptTiming {
    #[default]
    AfterSort,
    PreFind,
    PreSort,
}

impl ScriptTiming {
    fn key(self) -> &'static str {
        match self {
            ScriptTiming::AfterSort => "-script",
            ScriptTiming::PreFind => "-script.prefind",
            ScriptTiming::PreSort => "-script.presort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SortCriterion {
    field: String,
    order: SortOrder,
    precedence: u32,
}

/// Ordered accumulator of pending request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
    sorts: Vec<SortCriterion>,
    max_records: Option<u32>,
    skip_records: u32,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            sorts: Vec::new(),
            max_records: Some(DEFAULT_MAX_RECORDS),
            skip_records: 0,
        }
    }
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Add `field=value` followed by `field.op=<op>`; `None` sends `eq`.
    pub fn add_find_criterion(&mut self, field: &str, value: &str, op: Option<Operator>) {
        self.push(field, value);
        self.push(format!("{field}.op"), op.unwrap_or_default().as_str());
    }

    /// Add a plain `field=value` pair for new/edit requests.
    pub fn add_field_value(&mut self, field: &str, value: &str) {
        self.push(field, value);
    }

    /// Add a sort criterion. `precedence` is 1-based; lower sorts first.
    /// The value is sent as given; `0` becomes `-sortfield.0`.
    pub fn add_sort(&mut self, field: &str, order: SortOrder, precedence: u32) {
        self.sorts.push(SortCriterion {
            field: field.to_string(),
            order,
            precedence,
        });
    }

    pub fn set_record_id(&mut self, record_id: u64) {
        self.push("-recid", record_id.to_string());
    }

    pub fn set_modifier_id(&mut self, mod_id: u64) {
        self.push("-modid", mod_id.to_string());
    }

    pub fn set_logical_or(&mut self) {
        self.push("-lop", "or");
    }

    pub fn set_script(&mut self, name: &str, timing: ScriptTiming) {
        self.push(timing.key(), name);
    }

    /// `None` asks for every record (`-max=all`).
    pub fn set_max_records(&mut self, max: Option<u32>) {
        self.max_records = max;
    }

    pub fn set_skip_records(&mut self, skip: u32) {
        self.skip_records = skip;
    }

    pub fn max_records(&self) -> Option<u32> {
        self.max_records
    }

    pub fn skip_records(&self) -> u32 {
        self.skip_records
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.sorts.is_empty()
    }

    /// True if a `-recid` pair is pending.
    pub fn has_record_id(&self) -> bool {
        self.pairs.iter().any(|(k, _)| k == "-recid")
    }

    /// Drop pending pairs, sorts and the skip offset. The `-max` bound is a
    /// setting and survives.
    pub fn clear(&mut self) {
        *self = Self {
            max_records: self.max_records,
            ..Self::default()
        };
    }

    /// Every pending pair in wire order, excluding the database block and
    /// the action token.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut sorts: Vec<&SortCriterion> = self.sorts.iter().collect();
        // stable: equal precedence keeps insertion order
        sorts.sort_by_key(|s| s.precedence);

        let mut out = self.pairs.clone();
        for sort in sorts {
            out.push((format!("-sortfield.{}", sort.precedence), sort.field.clone()));
            out.push((
                format!("-sortorder.{}", sort.precedence),
                sort.order.as_str().to_string(),
            ));
        }
        let max = match self.max_records {
            Some(n) => n.to_string(),
            None => "all".to_string(),
        };
        out.push(("-max".to_string(), max));
        if self.skip_records > 0 {
            out.push(("-skip".to_string(), self.skip_records.to_string()));
        }
        out
    }
}

/// Percent-encode `pairs` and append the bare action token.
pub fn encode_query(pairs: &[(String, String)], action: Action) -> String {
    let mut parts: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    parts.push(action.as_str().to_string());
    parts.join("&")
}
