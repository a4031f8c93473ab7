use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::fields::{FieldRegistry, ThresholdPolicy};

use super::{FieldIndex, Filters};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub lower_bound: u32,
    pub count: usize,
}

/// Reverse-cumulative histogram: `count` values occur at least `lower_bound`
/// times. Empty input yields `{min: 0, max: 0, values: []}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub min: usize,
    pub max: usize,
    pub values: Vec<Bucket>,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct values kept at `threshold`.
    pub fn kept_at(&self, threshold: u32) -> usize {
        self.values
            .iter()
            .find(|bucket| bucket.lower_bound >= threshold)
            .map(|bucket| bucket.count)
            .unwrap_or(0)
    }

    fn default_threshold(&self, policy: ThresholdPolicy) -> u32 {
        let Some(last) = self.values.last() else {
            return 0;
        };

        let max_visible = policy.max_visible.unwrap_or(usize::MAX);
        let min_records = policy.min_records.unwrap_or(0);
        self.values
            .iter()
            .find(|bucket| bucket.count <= max_visible && bucket.lower_bound >= min_records)
            .map(|bucket| bucket.lower_bound)
            .unwrap_or(last.lower_bound + 1)
    }
}

pub fn aggregate_counts(counts: impl IntoIterator<Item = u32>) -> Aggregation {
    let mut per_level: BTreeMap<u32, usize> = BTreeMap::new();
    let mut total = 0usize;
    for count in counts {
        *per_level.entry(count).or_default() += 1;
        total += 1;
    }

    if total == 0 {
        return Aggregation::default();
    }

    let mut values = Vec::with_capacity(per_level.len());
    let mut kept = total;
    let mut previous_exact = 0usize;
    for (&level, &exact) in &per_level {
        kept -= previous_exact;
        values.push(Bucket {
            lower_bound: level,
            count: kept,
        });
        previous_exact = exact;
    }

    Aggregation {
        min: values.last().map(|bucket| bucket.count).unwrap_or(0),
        max: total,
        values,
    }
}

pub type Aggregations = BTreeMap<String, Aggregation>;

impl FieldIndex {
    pub fn aggregations(&self, registry: &FieldRegistry) -> Aggregations {
        registry
            .filterable()
            .map(|(id, _)| (id.to_string(), aggregate_counts(self.counts(id))))
            .collect()
    }
}

pub fn default_filters(aggregations: &Aggregations, registry: &FieldRegistry) -> Filters {
    let policies = registry.filterable().collect::<HashMap<_, _>>();

    aggregations
        .iter()
        .filter_map(|(field, aggregation)| {
            let policy = policies.get(field.as_str())?;
            Some((field.clone(), aggregation.default_threshold(*policy)))
        })
        .collect()
}
