mod aggregate;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fields::{FieldDescriptor, FieldRegistry, RecordLayer};
use crate::record::Record;

pub use aggregate::{Aggregation, Aggregations, Bucket, aggregate_counts, default_filters};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub count: u32,
    pub label: String,
}

/// Occurrence counts per field and value, built once per record set.
#[derive(Clone, Debug, Default)]
pub struct FieldIndex {
    fields: HashMap<String, HashMap<String, IndexEntry>>,
    record_count: usize,
    failures: usize,
}

impl FieldIndex {
    pub fn count(&self, field: &str, id: &str) -> u32 {
        self.entry(field, id).map(|entry| entry.count).unwrap_or(0)
    }

    pub fn entry(&self, field: &str, id: &str) -> Option<&IndexEntry> {
        self.fields.get(field)?.get(id)
    }

    pub fn field(&self, field: &str) -> Option<&HashMap<String, IndexEntry>> {
        self.fields.get(field)
    }

    pub fn counts(&self, field: &str) -> impl Iterator<Item = u32> + '_ {
        self.fields
            .get(field)
            .into_iter()
            .flat_map(|values| values.values().map(|entry| entry.count))
    }

    pub fn distinct_values(&self, field: &str) -> usize {
        self.fields.get(field).map(HashMap::len).unwrap_or(0)
    }

    /// Distinct values of `field` whose count meets `threshold`.
    pub fn kept_values(&self, field: &str, threshold: u32) -> usize {
        self.counts(field).filter(|&count| count >= threshold).count()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn extraction_failures(&self) -> usize {
        self.failures
    }
}

/// Incremental builder for a [`FieldIndex`], fed one record at a time.
pub struct FieldIndexer<'a> {
    registry: &'a FieldRegistry,
    index: FieldIndex,
}

impl<'a> FieldIndexer<'a> {
    pub fn new(registry: &'a FieldRegistry) -> Self {
        let mut index = FieldIndex::default();
        for (id, _) in registry.filterable() {
            index.fields.insert(id.to_string(), HashMap::new());
        }
        Self { registry, index }
    }

    pub fn ingest(&mut self, record: &Record) {
        let position = self.index.record_count;
        self.index.record_count += 1;

        for field in self.registry.iter() {
            self.ingest_field(field, record, position);
        }
        if let Some(layer) = self.registry.record_layer() {
            self.ingest_record_value(layer, record, position);
        }
    }

    /// Record layer entries hold the record weight rather than a tally.
    fn ingest_record_value(&mut self, layer: &RecordLayer, record: &Record, position: usize) {
        let Some((value, weight)) = layer.read(record) else {
            debug!(layer = %layer.id, record = position, "record has no identifier");
            return;
        };
        self.index.fields.entry(layer.id.clone()).or_default().insert(
            value.id,
            IndexEntry {
                count: weight,
                label: value.label,
            },
        );
    }

    fn ingest_field(&mut self, field: &FieldDescriptor, record: &Record, position: usize) {
        let values = match field.extract(record) {
            Ok(values) => values,
            Err(error) => {
                warn!(field = %field.id, record = position, %error, "could not index field");
                self.index.failures += 1;
                return;
            }
        };

        let counts = self.index.fields.entry(field.id.clone()).or_default();
        for value in values {
            let entry = counts.entry(value.id).or_insert_with(|| IndexEntry {
                count: 0,
                label: String::new(),
            });
            entry.count += 1;
            entry.label = value.label;
        }
    }

    pub fn finish(self) -> FieldIndex {
        self.index
    }
}

pub fn index_records(records: &[Record], registry: &FieldRegistry) -> FieldIndex {
    let mut indexer = FieldIndexer::new(registry);
    for record in records {
        indexer.ingest(record);
    }
    indexer.finish()
}

/// Minimum occurrence threshold per field; absent or zero keeps everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, u32>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self, field: &str) -> u32 {
        self.0.get(field).copied().unwrap_or(0)
    }

    pub fn set(&mut self, field: impl Into<String>, threshold: u32) {
        self.0.insert(field.into(), threshold);
    }

    pub fn with(mut self, field: impl Into<String>, threshold: u32) -> Self {
        self.set(field, threshold);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(field, threshold)| (field.as_str(), *threshold))
    }

    /// Every threshold here is at least the one in `other`.
    pub fn dominates(&self, other: &Filters) -> bool {
        self.0
            .keys()
            .chain(other.0.keys())
            .all(|field| self.threshold(field) >= other.threshold(field))
    }
}

impl FromIterator<(String, u32)> for Filters {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
