//! In-memory table behind the mock publishing engine.

use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const DATABASE: &str = "database";
pub const LAYOUT: &str = "layout";

/// `(name, type, max repetitions)` for every field on the layout.
pub const FIELDS: &[(&str, &str, usize)] = &[
    ("FIRST", "TEXT", 1),
    ("LAST", "TEXT", 1),
    ("PHONE", "TEXT", 3),
    ("AGE", "NUMBER", 1),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub mod_id: u64,
    /// One vector of repetitions per field in `FIELDS` order.
    pub values: Vec<Vec<String>>,
}

impl Row {
    fn blank() -> Self {
        Self {
            mod_id: 0,
            values: FIELDS.iter().map(|(_, _, reps)| vec![String::new(); *reps]).collect(),
        }
    }

    pub fn first(&self, field: usize) -> &str {
        self.values[field].first().map(String::as_str).unwrap_or("")
    }

    /// Set the first repetition of `field`.
    fn set(&mut self, field: usize, value: &str) {
        self.values[field][0] = value.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
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

impl Op {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => Op::Eq,
            "cn" => Op::Cn,
            "bw" => Op::Bw,
            "ew" => Op::Ew,
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "neq" => Op::Neq,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub field: usize,
    pub value: String,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: usize,
    pub descending: bool,
}

/// Compare two cell values, numerically for NUMBER fields.
fn compare(field: usize, a: &str, b: &str) -> Ordering {
    if FIELDS[field].1 == "NUMBER" {
        if let (Ok(x), Ok(y)) = (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl Criterion {
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.first(self.field);
        let lower = cell.to_lowercase();
        let wanted = self.value.to_lowercase();
        match self.op {
            Op::Eq => compare(self.field, cell, &self.value) == Ordering::Equal,
            Op::Neq => compare(self.field, cell, &self.value) != Ordering::Equal,
            Op::Cn => lower.contains(&wanted),
            Op::Bw => lower.starts_with(&wanted),
            Op::Ew => lower.ends_with(&wanted),
            Op::Gt => compare(self.field, cell, &self.value) == Ordering::Greater,
            Op::Gte => compare(self.field, cell, &self.value) != Ordering::Less,
            Op::Lt => compare(self.field, cell, &self.value) == Ordering::Less,
            Op::Lte => compare(self.field, cell, &self.value) != Ordering::Greater,
        }
    }
}

#[derive(Debug, Default)]
pub struct Table {
    rows: BTreeMap<u64, Row>,
    next_id: u64,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn insert(&mut self, values: &[(usize, String)]) -> u64 {
        let mut row = Row::blank();
        for (field, value) in values {
            row.set(*field, value);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.rows.insert(id, row);
        id
    }

    /// Apply `values` and bump the modification id. `None` if `id` is unknown.
    pub fn update(&mut self, id: u64, values: &[(usize, String)]) -> Option<&Row> {
        let row = self.rows.get_mut(&id)?;
        for (field, value) in values {
            row.set(*field, value);
        }
        row.mod_id += 1;
        Some(row)
    }

    pub fn remove(&mut self, id: u64) -> Option<Row> {
        self.rows.remove(&id)
    }

    pub fn duplicate(&mut self, id: u64) -> Option<u64> {
        let mut copy = self.rows.get(&id)?.clone();
        copy.mod_id = 0;
        self.next_id += 1;
        let new_id = self.next_id;
        self.rows.insert(new_id, copy);
        Some(new_id)
    }

    /// Ids of rows matching all (or, with `any`, at least one) criteria,
    /// ordered by `sort` and then by id.
    pub fn select(&self, criteria: &[Criterion], any: bool, sort: &[SortKey]) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .rows
            .iter()
            .filter(|(_, row)| {
                criteria.is_empty()
                    || if any {
                        criteria.iter().any(|c| c.matches(row))
                    } else {
                        criteria.iter().all(|c| c.matches(row))
                    }
            })
            .map(|(id, _)| *id)
            .collect();

        ids.sort_by(|a, b| {
            let (ra, rb) = (&self.rows[a], &self.rows[b]);
            for key in sort {
                let ord = compare(key.field, ra.first(key.field), rb.first(key.field));
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.cmp(b)
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: usize = 0;
    const LAST: usize = 1;
    const AGE: usize = 3;

    fn table() -> Table {
        let mut t = Table::default();
        for (first, last, age) in [("John", "Doe", "40"), ("Jane", "Doe", "9"), ("Ann", "Smith", "31")] {
            t.insert(&[
                (FIRST, first.to_string()),
                (LAST, last.to_string()),
                (AGE, age.to_string()),
            ]);
        }
        t
    }

    fn crit(field: usize, value: &str, op: Op) -> Criterion {
        Criterion {
            field,
            value: value.to_string(),
            op,
        }
    }

    #[test]
    fn begins_with_is_case_insensitive() {
        let t = table();
        assert_eq!(t.select(&[crit(LAST, "do", Op::Bw)], false, &[]), vec![1, 2]);
    }

    #[test]
    fn numbers_compare_numerically() {
        let t = table();
        assert_eq!(t.select(&[crit(AGE, "10", Op::Gt)], false, &[]), vec![1, 3]);
    }

    #[test]
    fn logical_or() {
        let t = table();
        let criteria = [crit(FIRST, "Ann", Op::Eq), crit(FIRST, "John", Op::Eq)];
        assert!(t.select(&criteria, false, &[]).is_empty());
        assert_eq!(t.select(&criteria, true, &[]), vec![1, 3]);
    }

    #[test]
    fn sort_with_precedence() {
        let t = table();
        let sort = [
            SortKey { field: LAST, descending: false },
            SortKey { field: FIRST, descending: false },
        ];
        assert_eq!(t.select(&[], false, &sort), vec![2, 1, 3]);
        let desc = [SortKey { field: AGE, descending: true }];
        assert_eq!(t.select(&[], false, &desc), vec![1, 3, 2]);
    }

    #[test]
    fn update_bumps_mod_id() {
        let mut t = table();
        let row = t.update(1, &[(FIRST, "Johnny".to_string())]).unwrap();
        assert_eq!(row.mod_id, 1);
        assert_eq!(row.first(FIRST), "Johnny");
        assert!(t.update(99, &[]).is_none());
    }

    #[test]
    fn duplicate_and_remove() {
        let mut t = table();
        let id = t.duplicate(2).unwrap();
        assert_eq!(id, 4);
        assert_eq!(t.get(4).unwrap().first(FIRST), "Jane");
        assert!(t.remove(4).is_some());
        assert_eq!(t.len(), 3);
    }
}
