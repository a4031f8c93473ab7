mod build;
mod component;

use std::collections::{BTreeSet, HashMap};

use eframe::egui::Vec2;
use serde::Serialize;

use crate::fields::Category;

pub use build::{FieldsHasher, GraphBuilder, RangeGate, RecordHasher, build_graph};
pub use component::largest_component;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    Reference(String),
    Metadata { field: String, id: String },
}

impl NodeKey {
    pub fn metadata(field: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Metadata {
            field: field.into(),
            id: id.into(),
        }
    }

    pub fn value_id(&self) -> &str {
        match self {
            Self::Reference(id) => id,
            Self::Metadata { id, .. } => id,
        }
    }

    /// Graph-wide identifier; metadata ids are scoped by their field.
    pub fn graph_id(&self) -> String {
        match self {
            Self::Reference(id) => id.clone(),
            Self::Metadata { field, id } => format!("{field}::{id}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub key: NodeKey,
    pub label: Option<String>,
    pub full_label: String,
    pub field: String,
    pub category: Category,
    pub color: String,
    pub nb_articles: u32,
    pub size: f32,
    pub position: Vec2,
    pub fixed: bool,
}

impl Node {
    pub fn is_reference(&self) -> bool {
        self.category == Category::Reference
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphAttributes {
    /// Records that contributed to the graph.
    pub record_count: usize,
    pub raw_record_count: usize,
    pub duplicate_count: usize,
    pub duplicate_groups: usize,
    pub out_of_range_count: usize,
    pub missing_reference_count: usize,
    pub visible_fields: BTreeSet<(Category, String)>,
}

/// Finished co-occurrence network. Node and edge order is the order in which
/// records first produced them.
#[derive(Clone, Debug, Default)]
pub struct BiblioGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index_by_key: HashMap<NodeKey, usize>,
    pub attributes: GraphAttributes,
}

impl BiblioGraph {
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        attributes: GraphAttributes,
    ) -> Self {
        let index_by_key = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.key.clone(), index))
            .collect();
        Self {
            nodes,
            edges,
            index_by_key,
            attributes,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.index_by_key.get(key).copied()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.index_of(key).map(|index| &self.nodes[index])
    }

    pub fn reference(&self, id: &str) -> Option<&Node> {
        self.node(&NodeKey::Reference(id.to_string()))
    }

    pub fn edge_weight(&self, a: &NodeKey, b: &NodeKey) -> Option<u32> {
        let a = self.index_of(a)?;
        let b = self.index_of(b)?;
        self.edges
            .iter()
            .find(|edge| {
                (edge.source == a && edge.target == b) || (edge.source == b && edge.target == a)
            })
            .map(|edge| edge.weight)
    }

    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            adjacency[edge.source].push(edge.target);
            adjacency[edge.target].push(edge.source);
        }
        adjacency
    }

    pub fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            degrees[edge.source] += 1;
            degrees[edge.target] += 1;
        }
        degrees
    }

    /// Subgraph induced by `keep`, in ascending node order, attributes copied.
    pub fn induced(&self, keep: &[usize]) -> Self {
        let mut sorted = keep.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut remap = vec![None; self.nodes.len()];
        let mut nodes = Vec::with_capacity(sorted.len());
        for (new_index, &old_index) in sorted.iter().enumerate() {
            remap[old_index] = Some(new_index);
            nodes.push(self.nodes[old_index].clone());
        }

        let edges = self
            .edges
            .iter()
            .filter_map(|edge| {
                Some(Edge {
                    source: remap[edge.source]?,
                    target: remap[edge.target]?,
                    weight: edge.weight,
                })
            })
            .collect();

        Self::from_parts(nodes, edges, self.attributes.clone())
    }

    /// Highest occurrence weight per data type (field).
    pub fn max_nb_articles(&self) -> HashMap<String, u32> {
        let mut maxima: HashMap<String, u32> = HashMap::new();
        for node in &self.nodes {
            let entry = maxima.entry(node.field.clone()).or_default();
            *entry = (*entry).max(node.nb_articles);
        }
        maxima
    }

    pub fn export(&self) -> GraphExport {
        GraphExport {
            attributes: AttributesExport {
                record_count: self.attributes.record_count,
                raw_record_count: self.attributes.raw_record_count,
                duplicate_count: self.attributes.duplicate_count,
                out_of_range_count: self.attributes.out_of_range_count,
                missing_reference_count: self.attributes.missing_reference_count,
                visible_field_set: self
                    .attributes
                    .visible_fields
                    .iter()
                    .map(|(category, field)| format!("{category}::{field}"))
                    .collect(),
            },
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeExport {
                    id: node.key.graph_id(),
                    label: node.label.clone(),
                    full_label: node.full_label.clone(),
                    category: node.category,
                    data_type: node.field.clone(),
                    color: node.color.clone(),
                    weight: node.nb_articles,
                    size: node.size,
                    x: node.position.x,
                    y: node.position.y,
                    fixed: node.fixed,
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|edge| EdgeExport {
                    source: self.nodes[edge.source].key.graph_id(),
                    target: self.nodes[edge.target].key.graph_id(),
                    weight: edge.weight,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphExport {
    pub attributes: AttributesExport,
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributesExport {
    pub record_count: usize,
    pub raw_record_count: usize,
    pub duplicate_count: usize,
    pub out_of_range_count: usize,
    pub missing_reference_count: usize,
    pub visible_field_set: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExport {
    pub id: String,
    pub label: Option<String>,
    pub full_label: String,
    pub category: Category,
    pub data_type: String,
    pub color: String,
    pub weight: u32,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub fixed: bool,
}

#[derive(Debug, Serialize)]
pub struct EdgeExport {
    pub source: String,
    pub target: String,
    pub weight: u32,
}
