use std::collections::{BTreeSet, HashMap};

use eframe::egui::Vec2;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fields::{Category, FieldDescriptor, FieldRegistry, RecordLayer};
use crate::index::{FieldIndex, Filters};
use crate::record::{Record, ValueEntry, scalar_string};

use super::{BiblioGraph, Edge, GraphAttributes, Node, NodeKey};

/// Derives the key under which near-identical records collapse.
pub trait RecordHasher: Send + Sync {
    /// `None` means the record never counts as a duplicate.
    fn hash(&self, record: &Record) -> Option<String>;
}

/// Joins the normalized values found at a list of record paths.
#[derive(Clone, Debug)]
pub struct FieldsHasher {
    paths: Vec<String>,
}

impl FieldsHasher {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

impl RecordHasher for FieldsHasher {
    fn hash(&self, record: &Record) -> Option<String> {
        let mut any = false;
        let parts = self
            .paths
            .iter()
            .map(|path| {
                let values = record
                    .values_at(path)
                    .into_iter()
                    .filter_map(scalar_string)
                    .map(|value| value.trim().to_lowercase())
                    .filter(|value| !value.is_empty())
                    .collect::<Vec<_>>();
                any |= !values.is_empty();
                values.join(" ")
            })
            .collect::<Vec<_>>();
        any.then(|| parts.join("|"))
    }
}

/// Keeps records whose numeric value at `path` lies within inclusive bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeGate {
    path: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeGate {
    pub fn new(path: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            path: path.into(),
            min,
            max,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Records without a readable value only pass an unbounded gate.
    pub fn admits(&self, record: &Record) -> bool {
        let Some(value) = record.number_at(&self.path) else {
            return self.min.is_none() && self.max.is_none();
        };
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

#[derive(Default)]
struct DuplicateCensus {
    first_seen: HashMap<String, (usize, usize)>,
}

impl DuplicateCensus {
    fn count(&mut self, hash: String, position: usize) {
        self.first_seen
            .entry(hash)
            .and_modify(|(_, count)| *count += 1)
            .or_insert((position, 1));
    }

    fn is_first(&self, hash: &str, position: usize) -> bool {
        self.first_seen
            .get(hash)
            .is_none_or(|&(first, _)| first == position)
    }

    fn duplicate_count(&self) -> usize {
        self.first_seen.values().map(|&(_, count)| count - 1).sum()
    }

    fn duplicate_groups(&self) -> usize {
        self.first_seen.values().filter(|&&(_, count)| count > 1).count()
    }
}

/// Single-owner arena for one graph build. Records go through two passes in
/// the same order: [`GraphBuilder::count_duplicates`] then
/// [`GraphBuilder::add_record`]; [`GraphBuilder::finish`] freezes the result.
pub struct GraphBuilder<'a> {
    registry: &'a FieldRegistry,
    index: &'a FieldIndex,
    filters: &'a Filters,
    range: Option<&'a RangeGate>,
    hasher: Option<&'a dyn RecordHasher>,
    census: DuplicateCensus,
    census_position: usize,
    position: usize,
    nodes: Vec<Node>,
    index_by_key: HashMap<NodeKey, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<(usize, usize), usize>,
    attributes: GraphAttributes,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        registry: &'a FieldRegistry,
        index: &'a FieldIndex,
        filters: &'a Filters,
    ) -> Result<Self> {
        for field in filters.fields() {
            registry.require_filterable(field)?;
        }

        Ok(Self {
            registry,
            index,
            filters,
            range: None,
            hasher: None,
            census: DuplicateCensus::default(),
            census_position: 0,
            position: 0,
            nodes: Vec::new(),
            index_by_key: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            attributes: GraphAttributes::default(),
        })
    }

    pub fn with_range(mut self, range: Option<&'a RangeGate>) -> Self {
        self.range = range;
        self
    }

    pub fn with_dedup(mut self, hasher: Option<&'a dyn RecordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn dedup_enabled(&self) -> bool {
        self.hasher.is_some()
    }

    fn in_range(&self, record: &Record) -> bool {
        self.range.is_none_or(|range| range.admits(record))
    }

    /// First pass: tally dedup hashes over in-range records.
    pub fn count_duplicates(&mut self, record: &Record) {
        let position = self.census_position;
        self.census_position += 1;

        let Some(hasher) = self.hasher else {
            return;
        };
        if !self.in_range(record) {
            return;
        }
        if let Some(hash) = hasher.hash(record) {
            self.census.count(hash, position);
        }
    }

    /// Second pass: fold one record into the node and edge tables.
    pub fn add_record(&mut self, record: &Record) {
        let position = self.position;
        self.position += 1;
        self.attributes.raw_record_count += 1;

        if !self.in_range(record) {
            self.attributes.out_of_range_count += 1;
            return;
        }

        if let Some(hasher) = self.hasher
            && let Some(hash) = hasher.hash(record)
            && !self.census.is_first(&hash, position)
        {
            debug!(record = position, %hash, "skipping duplicate record");
            return;
        }

        let registry = self.registry;
        let reference = registry.reference();
        let references = match reference.extract(record) {
            Ok(values) => values,
            Err(error) => {
                warn!(field = %reference.id, record = position, %error, "unreadable references");
                Vec::new()
            }
        };
        if references.is_empty() {
            self.attributes.missing_reference_count += 1;
            return;
        }
        self.attributes.record_count += 1;

        let reference_nodes = self
            .kept_values(reference, references)
            .into_iter()
            .map(|value| self.merge_node(reference, NodeKey::Reference(value.id), value.label))
            .collect::<Vec<_>>();

        let mut metadata_nodes = Vec::new();
        for field in registry.metadata() {
            let values = match field.extract(record) {
                Ok(values) => values,
                Err(error) => {
                    warn!(field = %field.id, record = position, %error, "skipping field values");
                    continue;
                }
            };
            for value in self.kept_values(field, values) {
                let key = NodeKey::metadata(field.id.clone(), value.id);
                metadata_nodes.push(self.merge_node(field, key, value.label));
            }
        }
        if let Some(layer) = registry.record_layer()
            && let Some((value, weight)) = layer.read(record)
            && weight >= self.filters.threshold(&layer.id)
        {
            metadata_nodes.push(self.merge_record_node(layer, value, weight));
        }

        for (offset, &source) in reference_nodes.iter().enumerate() {
            for &target in &reference_nodes[offset + 1..] {
                self.merge_edge(source, target);
            }
        }
        for &reference_node in &reference_nodes {
            for &metadata_node in &metadata_nodes {
                self.merge_edge(reference_node, metadata_node);
            }
        }
    }

    fn kept_values(&self, field: &FieldDescriptor, values: Vec<ValueEntry>) -> Vec<ValueEntry> {
        let threshold = self.filters.threshold(&field.id);
        values
            .into_iter()
            .filter(|value| self.index.count(&field.id, &value.id) >= threshold)
            .collect()
    }

    fn node_slot(
        &mut self,
        key: NodeKey,
        label: String,
        field: &str,
        category: Category,
        color: &str,
    ) -> usize {
        if let Some(&index) = self.index_by_key.get(&key) {
            return index;
        }

        let index = self.nodes.len();
        self.index_by_key.insert(key.clone(), index);
        self.nodes.push(Node {
            key,
            full_label: label.clone(),
            label: Some(label),
            field: field.to_string(),
            category,
            color: color.to_string(),
            nb_articles: 0,
            size: 0.0,
            position: Vec2::ZERO,
            fixed: false,
        });
        index
    }

    fn merge_node(&mut self, field: &FieldDescriptor, key: NodeKey, label: String) -> usize {
        let index = self.node_slot(key, label, &field.id, field.category(), &field.color);
        let node = &mut self.nodes[index];
        node.nb_articles += 1;
        node.size = (node.nb_articles as f32).sqrt();
        index
    }

    /// Record nodes carry the record weight instead of an occurrence tally.
    fn merge_record_node(&mut self, layer: &RecordLayer, value: ValueEntry, weight: u32) -> usize {
        let key = NodeKey::metadata(layer.id.clone(), value.id);
        let index = self.node_slot(key, value.label, &layer.id, Category::Metadata, &layer.color);
        let node = &mut self.nodes[index];
        node.nb_articles = weight;
        node.size = (weight.max(1) as f32).sqrt();
        index
    }

    fn merge_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }

        let pair = (a.min(b), a.max(b));
        match self.edge_index.get(&pair) {
            Some(&edge) => self.edges[edge].weight += 1,
            None => {
                self.edge_index.insert(pair, self.edges.len());
                self.edges.push(Edge {
                    source: a,
                    target: b,
                    weight: 1,
                });
            }
        }
    }

    pub fn finish(mut self) -> BiblioGraph {
        self.attributes.duplicate_count = self.census.duplicate_count();
        self.attributes.duplicate_groups = self.census.duplicate_groups();
        if self.attributes.duplicate_count > 0 {
            warn!(
                duplicates = self.attributes.duplicate_count,
                groups = self.attributes.duplicate_groups,
                "dropped duplicate records"
            );
        }

        let mut connected = vec![false; self.nodes.len()];
        for edge in &self.edges {
            connected[edge.source] = true;
            connected[edge.target] = true;
        }

        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (old_index, node) in self.nodes.into_iter().enumerate() {
            if connected[old_index] {
                remap[old_index] = nodes.len();
                nodes.push(node);
            }
        }
        let orphans = connected.len() - nodes.len();

        let edges = self
            .edges
            .into_iter()
            .map(|edge| Edge {
                source: remap[edge.source],
                target: remap[edge.target],
                weight: edge.weight,
            })
            .collect::<Vec<_>>();

        self.attributes.visible_fields = nodes
            .iter()
            .map(|node| (node.category, node.field.clone()))
            .collect::<BTreeSet<(Category, String)>>();

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            orphans,
            records = self.attributes.record_count,
            "graph built"
        );
        BiblioGraph::from_parts(nodes, edges, self.attributes)
    }
}

pub fn build_graph(
    records: &[Record],
    registry: &FieldRegistry,
    index: &FieldIndex,
    filters: &Filters,
    range: Option<&RangeGate>,
    hasher: Option<&dyn RecordHasher>,
) -> Result<BiblioGraph> {
    let mut builder = GraphBuilder::new(registry, index, filters)?
        .with_range(range)
        .with_dedup(hasher);

    if builder.dedup_enabled() {
        for record in records {
            builder.count_duplicates(record);
        }
    }
    for record in records {
        builder.add_record(record);
    }
    Ok(builder.finish())
}
