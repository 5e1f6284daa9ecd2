//! Row predicates shared by both engines.

use crate::relation::Record;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _) | Condition::In(c, _) => c,
        }
    }
}

/// Conjunction of conditions. Empty matches every row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(pub Vec<Condition>);

impl Filter {
    pub fn all() -> Self {
        Filter(Vec::new())
    }

    pub fn from_record(record: &Record) -> Self {
        Filter(
            record
                .iter()
                .map(|(k, v)| Condition::Eq(k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn by_key(column: &str, value: &Value) -> Self {
        Filter(vec![Condition::Eq(column.to_string(), value.clone())])
    }

    pub fn and_eq(mut self, column: &str, value: &Value) -> Self {
        self.0.push(Condition::Eq(column.to_string(), value.clone()));
        self
    }

    pub fn and_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.0.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, row: &Record) -> bool {
        self.0.iter().all(|c| match c {
            Condition::Eq(col, v) => loose_eq(row.get(col).unwrap_or(&Value::Null), v),
            Condition::In(col, vs) => {
                let cell = row.get(col).unwrap_or(&Value::Null);
                vs.iter().any(|v| loose_eq(cell, v))
            }
        })
    }
}

/// Ids arrive as strings from paths and as numbers from bodies; compare them by value.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => a == b,
    }
}
