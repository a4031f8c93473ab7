use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::index::FieldIndex;

pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Display-label lookup keyed by reference id. Ids the resolver does not know
/// are simply absent from the returned map.
#[async_trait]
pub trait LabelResolver: Send + Sync {
    async fn resolve(&self, ids: &[String]) -> Result<HashMap<String, String>>;
}

/// Labels remembered by the indexer for one field.
pub struct IndexLabelResolver {
    labels: HashMap<String, String>,
}

impl IndexLabelResolver {
    pub fn new(index: &FieldIndex, field: &str) -> Self {
        let labels = index
            .field(field)
            .into_iter()
            .flatten()
            .filter(|(id, entry)| !entry.label.is_empty() && entry.label != **id)
            .map(|(id, entry)| (id.clone(), entry.label.clone()))
            .collect();
        Self { labels }
    }
}

#[async_trait]
impl LabelResolver for IndexLabelResolver {
    async fn resolve(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        Ok(lookup(&self.labels, ids))
    }
}

/// Fixed id to label table, usually read from a JSON object file.
#[derive(Default)]
pub struct StaticLabelResolver {
    labels: HashMap<String, String>,
}

impl StaticLabelResolver {
    pub fn new(labels: HashMap<String, String>) -> Self {
        Self { labels }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read label table {}", path.display()))?;
        let labels = serde_json::from_str(&raw)
            .with_context(|| format!("label table {} is not a JSON object of strings", path.display()))?;
        Ok(Self { labels })
    }
}

#[async_trait]
impl LabelResolver for StaticLabelResolver {
    async fn resolve(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        Ok(lookup(&self.labels, ids))
    }
}

fn lookup(labels: &HashMap<String, String>, ids: &[String]) -> HashMap<String, String> {
    ids.iter()
        .filter_map(|id| Some((id.clone(), labels.get(id)?.clone())))
        .collect()
}

/// Resolves `ids` in chunks of `batch_size`, stopping at the first failing
/// batch.
pub async fn resolve_in_batches(
    resolver: &dyn LabelResolver,
    ids: &[String],
    batch_size: usize,
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::with_capacity(ids.len());
    for (batch, chunk) in ids.chunks(batch_size.max(1)).enumerate() {
        let labels = resolver
            .resolve(chunk)
            .await
            .with_context(|| format!("label batch {batch} ({} ids) failed", chunk.len()))?;
        resolved.extend(labels);
    }

    debug!(
        requested = ids.len(),
        resolved = resolved.len(),
        "resolved reference labels"
    );
    Ok(resolved)
}
