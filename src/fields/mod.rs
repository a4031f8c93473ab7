mod extract;
mod format;

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, PipelineError, Result};
use crate::record::{Record, ValueEntry};

pub use extract::{EntityList, SeparatedValues};
pub use format::{ExtractorSpec, FieldSpec, FormatSpec, RangeSpec, RecordLayerSpec};

pub const DEFAULT_METADATA_COLORS: [&str; 8] = [
    "#ffe915", "#a7d30d", "#e22521", "#df60bf", "#ff8f2e", "#9dabf5", "#47c4b8", "#b58a5e",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reference,
    Metadata,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strategy turning one record into the values it carries for one field.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, record: &Record) -> Result<Vec<ValueEntry>, ExtractError>;
}

/// How the default threshold of a field is picked from its aggregation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThresholdPolicy {
    /// Preferred upper bound on the number of values kept.
    pub max_visible: Option<usize>,
    /// Lowest threshold the default is allowed to land on.
    pub min_records: Option<u32>,
}

pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    pub color: String,
    pub hidden: bool,
    pub is_reference: bool,
    pub policy: ThresholdPolicy,
    extractor: Box<dyn FieldExtractor>,
}

impl FieldDescriptor {
    pub fn new(id: impl Into<String>, extractor: impl FieldExtractor + 'static) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            color: DEFAULT_METADATA_COLORS[0].to_string(),
            hidden: false,
            is_reference: false,
            policy: ThresholdPolicy::default(),
            extractor: Box::new(extractor),
        }
    }

    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn category(&self) -> Category {
        if self.is_reference {
            Category::Reference
        } else {
            Category::Metadata
        }
    }

    /// Extracted values with intra-record repeats collapsed, first label wins.
    pub fn extract(&self, record: &Record) -> Result<Vec<ValueEntry>, ExtractError> {
        let entries = self.extractor.extract(record)?;
        Ok(dedup_entries(entries))
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("color", &self.color)
            .field("hidden", &self.hidden)
            .field("is_reference", &self.is_reference)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn dedup_entries(entries: Vec<ValueEntry>) -> Vec<ValueEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| !entry.id.is_empty() && seen.insert(entry.id.clone()))
        .collect()
}

/// Layer giving each record a node of its own, weighted by a numeric value
/// of the record (its citation count) and gated on that same value.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordLayer {
    pub id: String,
    pub label: String,
    pub color: String,
    pub id_path: String,
    pub label_path: Option<String>,
    pub weight_path: String,
    pub policy: ThresholdPolicy,
}

impl RecordLayer {
    pub fn new(
        id: impl Into<String>,
        id_path: impl Into<String>,
        weight_path: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            color: RECORD_LAYER_COLOR.to_string(),
            id_path: id_path.into(),
            label_path: None,
            weight_path: weight_path.into(),
            policy: ThresholdPolicy::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_label_path(mut self, path: impl Into<String>) -> Self {
        self.label_path = Some(path.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The record as a value of this layer with its weight. Records without an
    /// identifier yield `None`; a missing or negative weight reads as 0.
    pub fn read(&self, record: &Record) -> Option<(ValueEntry, u32)> {
        let id = record.scalar_at(&self.id_path)?.trim().to_string();
        if id.is_empty() {
            return None;
        }

        let label = self
            .label_path
            .as_deref()
            .and_then(|path| record.scalar_at(path))
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| id.clone());
        let weight = record
            .number_at(&self.weight_path)
            .filter(|weight| weight.is_finite() && *weight > 0.0)
            .map(|weight| weight.min(f64::from(u32::MAX)) as u32)
            .unwrap_or(0);

        Some((ValueEntry::new(id, label), weight))
    }
}

pub const RECORD_LAYER_COLOR: &str = "#202020";

/// Ordered table of field descriptors with exactly one reference field, plus
/// an optional [`RecordLayer`].
#[derive(Debug)]
pub struct FieldRegistry {
    fields: Vec<FieldDescriptor>,
    index_by_id: HashMap<String, usize>,
    reference_index: usize,
    record_layer: Option<RecordLayer>,
}

impl FieldRegistry {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self> {
        let mut index_by_id = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if index_by_id.insert(field.id.clone(), index).is_some() {
                return Err(PipelineError::DuplicateField(field.id.clone()));
            }
        }

        let references = fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.is_reference)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let &[reference_index] = references.as_slice() else {
            return Err(PipelineError::ReferenceFieldCount(references.len()));
        };

        Ok(Self {
            fields,
            index_by_id,
            reference_index,
            record_layer: None,
        })
    }

    pub fn with_record_layer(mut self, layer: RecordLayer) -> Result<Self> {
        if self.index_by_id.contains_key(&layer.id) {
            return Err(PipelineError::DuplicateField(layer.id));
        }
        self.record_layer = Some(layer);
        Ok(self)
    }

    pub fn record_layer(&self) -> Option<&RecordLayer> {
        self.record_layer.as_ref()
    }

    pub fn reference(&self) -> &FieldDescriptor {
        &self.fields[self.reference_index]
    }

    pub fn get(&self, id: &str) -> Option<&FieldDescriptor> {
        self.index_by_id.get(id).map(|&index| &self.fields[index])
    }

    pub fn require(&self, id: &str) -> Result<&FieldDescriptor> {
        self.get(id)
            .ok_or_else(|| PipelineError::MissingDescriptor(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Every id a threshold can be set on, with its default policy.
    pub fn filterable(&self) -> impl Iterator<Item = (&str, ThresholdPolicy)> {
        self.fields
            .iter()
            .map(|field| (field.id.as_str(), field.policy))
            .chain(
                self.record_layer
                    .iter()
                    .map(|layer| (layer.id.as_str(), layer.policy)),
            )
    }

    /// Fails unless `id` names a field or the record layer.
    pub fn require_filterable(&self, id: &str) -> Result<()> {
        if self.record_layer.as_ref().is_some_and(|layer| layer.id == id) {
            return Ok(());
        }
        self.require(id).map(|_| ())
    }

    /// Non-reference fields that produce graph nodes.
    pub fn metadata(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|field| !field.is_reference && !field.hidden)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str) -> FieldDescriptor {
        FieldDescriptor::new(id, SeparatedValues::new(id, Some(";")))
    }

    #[test]
    fn registry_requires_a_single_reference_field() {
        let none = FieldRegistry::new(vec![field("authors")]);
        assert!(matches!(none, Err(PipelineError::ReferenceFieldCount(0))));

        let two = FieldRegistry::new(vec![field("a").reference(), field("b").reference()]);
        assert!(matches!(two, Err(PipelineError::ReferenceFieldCount(2))));

        let ok = FieldRegistry::new(vec![field("refs").reference(), field("authors")]).unwrap();
        assert_eq!(ok.reference().id, "refs");
        assert_eq!(ok.metadata().count(), 1);
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let registry = FieldRegistry::new(vec![field("refs").reference(), field("refs")]);
        assert!(matches!(registry, Err(PipelineError::DuplicateField(id)) if id == "refs"));
    }

    #[test]
    fn missing_descriptor_is_an_explicit_error() {
        let registry = FieldRegistry::new(vec![field("refs").reference()]).unwrap();
        assert!(matches!(
            registry.require("years"),
            Err(PipelineError::MissingDescriptor(id)) if id == "years"
        ));
    }

    #[test]
    fn record_layer_reads_id_label_and_weight() {
        let layer = RecordLayer::new("records", "id", "cited_by_count").with_label_path("title");
        let record = |value: serde_json::Value| match value {
            serde_json::Value::Object(map) => Record::new(map),
            _ => unreachable!(),
        };

        let (entry, weight) = layer
            .read(&record(serde_json::json!({ "id": "W1", "title": " Paper ", "cited_by_count": 12 })))
            .unwrap();
        assert_eq!(entry, ValueEntry::new("W1", "Paper"));
        assert_eq!(weight, 12);

        let (entry, weight) = layer
            .read(&record(serde_json::json!({ "id": "W2", "cited_by_count": -3 })))
            .unwrap();
        assert_eq!(entry.label, "W2");
        assert_eq!(weight, 0);

        assert!(layer.read(&record(serde_json::json!({ "cited_by_count": 4 }))).is_none());
    }

    #[test]
    fn record_layer_joins_the_filterable_ids() {
        let registry = FieldRegistry::new(vec![field("refs").reference()])
            .unwrap()
            .with_record_layer(RecordLayer::new("records", "id", "cited_by_count"))
            .unwrap();
        assert!(registry.require_filterable("records").is_ok());
        assert!(registry.require_filterable("years").is_err());
        assert!(registry.require("records").is_err());
        assert_eq!(
            registry.filterable().map(|(id, _)| id).collect::<Vec<_>>(),
            vec!["refs", "records"]
        );

        let clash = FieldRegistry::new(vec![field("refs").reference()])
            .unwrap()
            .with_record_layer(RecordLayer::new("refs", "id", "cited_by_count"));
        assert!(matches!(clash, Err(PipelineError::DuplicateField(id)) if id == "refs"));
    }

    #[test]
    fn hidden_fields_are_not_metadata_layers() {
        let registry =
            FieldRegistry::new(vec![field("refs").reference(), field("ids").hidden()]).unwrap();
        assert_eq!(registry.metadata().count(), 0);
        assert_eq!(registry.len(), 2);
    }
}
