use serde_json::Value;
use tracing::debug;

use crate::error::ExtractError;
use crate::record::{Record, ValueEntry, scalar_string};

use super::FieldExtractor;

/// Scalar values, optionally packed into one string with a separator.
#[derive(Clone, Debug)]
pub struct SeparatedValues {
    paths: Vec<String>,
    separator: Option<String>,
}

impl SeparatedValues {
    pub fn new(path: impl Into<String>, separator: Option<&str>) -> Self {
        Self {
            paths: vec![path.into()],
            separator: separator.filter(|sep| !sep.is_empty()).map(str::to_string),
        }
    }

    /// Also read values found at `path`, after the ones already configured.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    fn push_text(&self, text: &str, out: &mut Vec<ValueEntry>) {
        match &self.separator {
            Some(separator) => {
                for part in text.split(separator.as_str()) {
                    push_trimmed(part, out);
                }
            }
            None => push_trimmed(text, out),
        }
    }
}

impl FieldExtractor for SeparatedValues {
    fn extract(&self, record: &Record) -> Result<Vec<ValueEntry>, ExtractError> {
        let mut entries = Vec::new();
        for path in &self.paths {
            for value in record.values_at(path) {
                match value {
                    Value::String(text) => self.push_text(text, &mut entries),
                    Value::Number(_) | Value::Bool(_) => {
                        if let Some(text) = scalar_string(value) {
                            entries.push(ValueEntry::bare(text));
                        }
                    }
                    Value::Object(_) => {
                        return Err(ExtractError::UnsupportedValue {
                            path: path.clone(),
                            found: "object",
                        });
                    }
                    Value::Array(_) | Value::Null => {}
                }
            }
        }
        Ok(entries)
    }
}

fn push_trimmed(part: &str, out: &mut Vec<ValueEntry>) {
    let part = part.trim();
    if !part.is_empty() {
        out.push(ValueEntry::bare(part));
    }
}

/// Objects carrying an identifier and an optional display label. Objects
/// without an identifier are skipped.
#[derive(Clone, Debug)]
pub struct EntityList {
    paths: Vec<String>,
    id: String,
    label: Option<String>,
}

impl EntityList {
    pub fn new(path: impl Into<String>, id: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            paths: vec![path.into()],
            id: id.into(),
            label: label.map(str::to_string),
        }
    }

    /// Also read entities found at `path`, after the ones already configured.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }
}

impl FieldExtractor for EntityList {
    fn extract(&self, record: &Record) -> Result<Vec<ValueEntry>, ExtractError> {
        let mut entries = Vec::new();
        for path in &self.paths {
            for value in record.values_at(path) {
                match value {
                    Value::Object(object) => {
                        let Some(id) = object
                            .get(&self.id)
                            .and_then(scalar_string)
                            .map(|id| id.trim().to_string())
                            .filter(|id| !id.is_empty())
                        else {
                            debug!(%path, key = %self.id, "skipping entity without identifier");
                            continue;
                        };
                        let label = self
                            .label
                            .as_ref()
                            .and_then(|key| object.get(key))
                            .and_then(scalar_string)
                            .unwrap_or_else(|| id.clone());
                        entries.push(ValueEntry::new(id, label));
                    }
                    Value::String(_) | Value::Number(_) => {
                        if let Some(text) = scalar_string(value) {
                            push_trimmed(&text, &mut entries);
                        }
                    }
                    Value::Bool(_) => {
                        return Err(ExtractError::UnsupportedValue {
                            path: path.clone(),
                            found: "boolean",
                        });
                    }
                    Value::Array(_) | Value::Null => {}
                }
            }
        }
        Ok(entries)
    }
}
