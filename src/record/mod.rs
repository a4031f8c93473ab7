mod parse;

use serde_json::{Map, Value};

pub use parse::{load_records, parse_records};

/// One bibliographic record, as handed over by whatever acquired it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

/// A single `{id, label}` value extracted from a record field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueEntry {
    pub id: String,
    pub label: String,
}

impl ValueEntry {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    pub fn bare(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            id: value,
        }
    }
}

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Collects every value reachable through a dotted path, flattening arrays
    /// met on the way (`authorships.institutions` yields each institution).
    pub fn values_at(&self, path: &str) -> Vec<&Value> {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Vec::new();
        };

        let mut current = match self.fields.get(first) {
            Some(value) => vec![value],
            None => return Vec::new(),
        };

        for segment in segments {
            let mut next = Vec::with_capacity(current.len());
            for value in current {
                descend(value, segment, &mut next);
            }
            current = next;
        }

        let mut flat = Vec::with_capacity(current.len());
        for value in current {
            flatten_into(value, &mut flat);
        }
        flat
    }

    /// First scalar found at `path`, rendered as a string.
    pub fn scalar_at(&self, path: &str) -> Option<String> {
        self.values_at(path).into_iter().find_map(scalar_string)
    }

    /// First value at `path` that reads as a number (numeric strings included).
    pub fn number_at(&self, path: &str) -> Option<f64> {
        self.values_at(path).into_iter().find_map(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

fn descend<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(object) => {
            if let Some(child) = object.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                descend(item, segment, out);
            }
        }
        _ => {}
    }
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Value::Null => {}
        other => out.push(other),
    }
}

pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::new(map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn dotted_paths_flatten_through_arrays() {
        let record = record(json!({
            "authorships": [
                { "institutions": [{ "id": "I1" }, { "id": "I2" }] },
                { "institutions": [{ "id": "I3" }] },
                { "institutions": [] }
            ]
        }));

        let ids = record
            .values_at("authorships.institutions.id")
            .into_iter()
            .filter_map(scalar_string)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["I1", "I2", "I3"]);
    }

    #[test]
    fn numbers_are_read_from_strings_and_numbers() {
        let record = record(json!({ "PY": "2020", "year": 2021, "title": "x" }));
        assert_eq!(record.number_at("PY"), Some(2020.0));
        assert_eq!(record.number_at("year"), Some(2021.0));
        assert_eq!(record.number_at("title"), None);
        assert_eq!(record.number_at("missing"), None);
    }

    #[test]
    fn null_values_are_skipped() {
        let record = record(json!({ "refs": null }));
        assert!(record.values_at("refs").is_empty());
    }
}
