use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::Record;

pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read records from {}", path.display()))?;
    parse_records(&raw).with_context(|| format!("failed to parse records in {}", path.display()))
}

/// Accepts a JSON array of objects, an envelope with a `results` array, or
/// JSON Lines with one object per line.
pub fn parse_records(raw: &str) -> Result<Vec<Record>> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => collect_objects(items),
        Ok(Value::Object(mut object)) => {
            if let Some(results) = object.remove("results") {
                let items = match results {
                    Value::Array(items) => items,
                    _ => return Err(anyhow!("`results` must be an array of records")),
                };
                return collect_objects(items);
            }
            Ok(vec![Record::new(object)])
        }
        Ok(_) => Err(anyhow!("unexpected JSON type for a record collection")),
        Err(_) => parse_json_lines(trimmed),
    }
}

fn collect_objects(items: Vec<Value>) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(object) => records.push(Record::new(object)),
            Value::Null => continue,
            _ => return Err(anyhow!("record #{position} is not a JSON object")),
        }
    }
    Ok(records)
}

fn parse_json_lines(raw: &str) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (line_number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("invalid JSON on line {}", line_number + 1))?;
        match value {
            Value::Object(object) => records.push(Record::new(object)),
            _ => return Err(anyhow!("line {} is not a JSON object", line_number + 1)),
        }
    }
    Ok(records)
}
