use std::collections::HashSet;

use eframe::egui::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::fields::FieldRegistry;
use crate::graph::{BiblioGraph, GraphBuilder, RangeGate, RecordHasher, largest_component};
use crate::index::{Aggregations, FieldIndex, FieldIndexer, Filters};
use crate::labels::{DEFAULT_BATCH_SIZE, LabelResolver, resolve_in_batches};
use crate::layout::{LayoutConfig, LayoutReport, apply_node_sizes, layout_graph};
use crate::record::Record;
use crate::sample::sample_representatives;

const RECORD_BATCH: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelConfig {
    /// Number of reference nodes that get a visible label.
    pub sample_size: usize,
    pub kmeans_steps: usize,
    /// At or below this many reference nodes every one is labelled.
    pub cutoff: usize,
    pub batch_size: usize,
    /// Also resolve full labels for nodes that are not sampled.
    pub hover_labels: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            sample_size: 15,
            kmeans_steps: 5,
            cutoff: 15,
            batch_size: DEFAULT_BATCH_SIZE,
            hover_labels: false,
        }
    }
}

impl LabelConfig {
    /// Above the cutoff `sample_size` representatives are drawn, so the sample
    /// must fit below it.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size > self.cutoff {
            return Err(PipelineError::LabelCountAboveCutoff {
                count: self.sample_size,
                cutoff: self.cutoff,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PipelineConfig {
    pub range_gate: Option<RangeGate>,
    pub dedup: Option<Box<dyn RecordHasher>>,
    pub layout: LayoutConfig,
    pub labels: LabelConfig,
    pub seed: u64,
}

/// Index and aggregations for one record set, reused across filter changes.
pub struct PreparedCorpus {
    pub index: FieldIndex,
    pub aggregations: Aggregations,
}

pub struct BuiltMap {
    pub graph: BiblioGraph,
    pub layout: LayoutReport,
    /// Reference ids that carry a visible label.
    pub labelled: Vec<String>,
}

pub async fn index_corpus(records: &[Record], registry: &FieldRegistry) -> PreparedCorpus {
    let mut indexer = FieldIndexer::new(registry);
    for batch in records.chunks(RECORD_BATCH) {
        for record in batch {
            indexer.ingest(record);
        }
        tokio::task::yield_now().await;
    }
    let index = indexer.finish();

    let aggregations = index.aggregations(registry);
    info!(
        records = index.record_count(),
        fields = aggregations.len(),
        failures = index.extraction_failures(),
        "indexed records"
    );
    PreparedCorpus {
        index,
        aggregations,
    }
}

/// Builds, trims, lays out and labels the map for one set of filters.
pub async fn build_map(
    records: &[Record],
    registry: &FieldRegistry,
    index: &FieldIndex,
    filters: &Filters,
    config: &PipelineConfig,
    resolver: &dyn LabelResolver,
) -> Result<BuiltMap> {
    config.labels.validate()?;
    let graph = build_graph_batched(records, registry, index, filters, config).await?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        records = graph.attributes.record_count,
        duplicates = graph.attributes.duplicate_count,
        out_of_range = graph.attributes.out_of_range_count,
        "built co-occurrence graph"
    );

    let maxima = graph.max_nb_articles();
    tokio::task::yield_now().await;

    let mut graph = largest_component(&graph);
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "kept largest component"
    );
    tokio::task::yield_now().await;

    apply_node_sizes(&mut graph, &maxima, &config.layout);
    let layout = layout_graph(&mut graph, &config.layout).await;
    tokio::task::yield_now().await;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let labelled = label_references(&mut graph, &config.labels, resolver, &mut rng).await?;
    info!(labelled = labelled.len(), "labelled reference nodes");

    Ok(BuiltMap {
        graph,
        layout,
        labelled,
    })
}

async fn build_graph_batched(
    records: &[Record],
    registry: &FieldRegistry,
    index: &FieldIndex,
    filters: &Filters,
    config: &PipelineConfig,
) -> Result<BiblioGraph> {
    let mut builder = GraphBuilder::new(registry, index, filters)?
        .with_range(config.range_gate.as_ref())
        .with_dedup(config.dedup.as_deref());

    if builder.dedup_enabled() {
        for batch in records.chunks(RECORD_BATCH) {
            for record in batch {
                builder.count_duplicates(record);
            }
            tokio::task::yield_now().await;
        }
    }

    for (number, batch) in records.chunks(RECORD_BATCH).enumerate() {
        for record in batch {
            builder.add_record(record);
        }
        debug!(batch = number, size = batch.len(), "folded record batch");
        tokio::task::yield_now().await;
    }

    Ok(builder.finish())
}

/// Samples the reference nodes that keep a visible label and resolves their
/// display text. Unsampled references keep only their full label.
async fn label_references(
    graph: &mut BiblioGraph,
    config: &LabelConfig,
    resolver: &dyn LabelResolver,
    rng: &mut StdRng,
) -> Result<Vec<String>> {
    let points = graph
        .nodes()
        .iter()
        .filter(|node| node.is_reference())
        .map(|node| (node.key.value_id().to_string(), node.position))
        .collect::<Vec<(String, Vec2)>>();
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let sampled = if points.len() <= config.cutoff {
        points.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>()
    } else {
        sample_representatives(&points, config.sample_size, config.kmeans_steps, rng)?
    };
    tokio::task::yield_now().await;

    let requested = if config.hover_labels {
        points.into_iter().map(|(id, _)| id).collect::<Vec<_>>()
    } else {
        sampled.clone()
    };
    let resolved = resolve_in_batches(resolver, &requested, config.batch_size)
        .await
        .map_err(PipelineError::Labels)?;

    let visible = sampled.iter().map(String::as_str).collect::<HashSet<_>>();
    for node in graph.nodes_mut() {
        if !node.is_reference() {
            continue;
        }

        let id = node.key.value_id();
        if let Some(label) = resolved.get(id) {
            node.full_label = label.clone();
        } else if node.full_label.is_empty() {
            node.full_label = id.to_string();
        }
        node.label = visible.contains(id).then(|| node.full_label.clone());
    }

    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::fields::{Category, FieldDescriptor, FormatSpec, SeparatedValues};
    use crate::graph::{FieldsHasher, NodeKey};
    use crate::index::default_filters;
    use crate::labels::StaticLabelResolver;
    use crate::layout::LayoutBudget;

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|value| match value {
                Value::Object(map) => Record::new(map),
                _ => panic!("fixture must be an object"),
            })
            .collect()
    }

    fn registry() -> FieldRegistry {
        FieldRegistry::new(vec![
            FieldDescriptor::new("refs", SeparatedValues::new("refs", Some(";"))).reference(),
            FieldDescriptor::new("topics", SeparatedValues::new("topics", Some(";"))),
        ])
        .unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            layout: LayoutConfig {
                core: LayoutBudget::new(120, Duration::from_secs(30)),
                satellites: LayoutBudget::new(40, Duration::from_secs(30)),
                ..LayoutConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn no_labels() -> StaticLabelResolver {
        StaticLabelResolver::default()
    }

    struct Failing;

    #[async_trait]
    impl LabelResolver for Failing {
        async fn resolve(&self, _ids: &[String]) -> anyhow::Result<HashMap<String, String>> {
            bail!("label service unavailable")
        }
    }

    fn chain(count: usize) -> Vec<Record> {
        records(
            (0..count)
                .map(|i| json!({ "refs": format!("R{i};R{}", i + 1), "topics": "t" }))
                .collect(),
        )
    }

    #[tokio::test]
    async fn small_corpus_end_to_end() {
        let records = records(vec![
            json!({ "refs": "A;B", "year": 2020 }),
            json!({ "refs": "B;C", "year": 2020 }),
            json!({ "refs": "A;B", "year": 2021 }),
        ]);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let filters = Filters::new().with("refs", 2);
        let resolver =
            StaticLabelResolver::new(HashMap::from([("A".to_string(), "Alpha 1999".to_string())]));

        let map = build_map(&records, &registry, &corpus.index, &filters, &config(), &resolver)
            .await
            .unwrap();
        let graph = &map.graph;

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.reference("A").unwrap().nb_articles, 2);
        assert_eq!(graph.reference("B").unwrap().nb_articles, 3);
        assert!(graph.reference("C").is_none());
        assert_eq!(
            graph.edge_weight(
                &NodeKey::Reference("A".to_string()),
                &NodeKey::Reference("B".to_string())
            ),
            Some(2)
        );
        assert_eq!(graph.attributes.record_count, 3);

        let a = graph.reference("A").unwrap();
        assert_eq!(a.label.as_deref(), Some("Alpha 1999"));
        assert!(a.fixed);
        let b = graph.reference("B").unwrap();
        assert_eq!(b.label.as_deref(), Some("B"));
        assert_eq!(map.labelled.len(), 2);
    }

    #[tokio::test]
    async fn large_reference_sets_are_sampled() {
        let records = chain(30);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let mut config = config();
        config.labels.sample_size = 5;
        config.labels.hover_labels = true;

        let map = build_map(
            &records,
            &registry,
            &corpus.index,
            &Filters::new(),
            &config,
            &no_labels(),
        )
        .await
        .unwrap();

        let references = map
            .graph
            .nodes()
            .iter()
            .filter(|node| node.is_reference())
            .collect::<Vec<_>>();
        assert_eq!(references.len(), 31);
        assert_eq!(map.labelled.len(), 5);
        assert_eq!(
            references.iter().filter(|node| node.label.is_some()).count(),
            5
        );
        assert!(references.iter().all(|node| !node.full_label.is_empty()));
    }

    #[test]
    fn label_count_must_fit_under_the_cutoff() {
        assert!(LabelConfig::default().validate().is_ok());
        let tight = LabelConfig {
            sample_size: 15,
            cutoff: 15,
            ..LabelConfig::default()
        };
        assert!(tight.validate().is_ok());
        let over = LabelConfig {
            sample_size: 20,
            cutoff: 15,
            ..LabelConfig::default()
        };
        assert!(matches!(
            over.validate(),
            Err(PipelineError::LabelCountAboveCutoff { count: 20, cutoff: 15 })
        ));
    }

    #[tokio::test]
    async fn label_count_above_cutoff_fails_before_building() {
        let records = chain(20);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let mut config = config();
        config.labels.cutoff = 3;
        config.labels.sample_size = 40;

        let error = build_map(
            &records,
            &registry,
            &corpus.index,
            &Filters::new(),
            &config,
            &Failing,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            error,
            PipelineError::LabelCountAboveCutoff { count: 40, cutoff: 3 }
        ));
    }

    #[tokio::test]
    async fn label_failures_reach_the_caller() {
        let records = chain(3);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;

        let error = build_map(
            &records,
            &registry,
            &corpus.index,
            &Filters::new(),
            &config(),
            &Failing,
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(error, PipelineError::Labels(_)));
    }

    #[tokio::test]
    async fn unknown_filter_field_is_rejected() {
        let records = chain(3);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let filters = Filters::new().with("journals", 1);

        let error = build_map(&records, &registry, &corpus.index, &filters, &config(), &no_labels())
            .await
            .err()
            .unwrap();
        assert!(matches!(error, PipelineError::MissingDescriptor(field) if field == "journals"));
    }

    #[tokio::test]
    async fn range_and_dedup_settings_shape_the_graph() {
        let records = records(vec![
            json!({ "refs": "A;B", "title": "Same", "year": 2020 }),
            json!({ "refs": "A;B", "title": "same ", "year": 2020 }),
            json!({ "refs": "A;C", "title": "Other", "year": 2021 }),
            json!({ "refs": "C;D", "title": "Old", "year": 1990 }),
        ]);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let config = PipelineConfig {
            range_gate: Some(RangeGate::new("year", Some(2000.0), None)),
            dedup: Some(Box::new(FieldsHasher::new(vec!["title".to_string()]))),
            ..config()
        };

        let map = build_map(
            &records,
            &registry,
            &corpus.index,
            &Filters::new(),
            &config,
            &no_labels(),
        )
        .await
        .unwrap();
        let graph = &map.graph;

        assert_eq!(graph.attributes.record_count, 2);
        assert_eq!(graph.attributes.duplicate_count, 1);
        assert_eq!(graph.attributes.out_of_range_count, 1);
        assert!(graph.reference("D").is_none());
        assert_eq!(
            graph.edge_weight(
                &NodeKey::Reference("A".to_string()),
                &NodeKey::Reference("B".to_string())
            ),
            Some(1)
        );
    }

    #[tokio::test]
    async fn openalex_maps_keep_years_out_of_the_graph() {
        let records = records(vec![
            json!({ "referenced_works": ["W1", "W2"], "publication_year": 2020 }),
            json!({ "referenced_works": ["W1", "W2"], "publication_year": 2020 }),
        ]);
        let registry = FormatSpec::openalex().registry().unwrap();
        let corpus = index_corpus(&records, &registry).await;
        let filters = default_filters(&corpus.aggregations, &registry);
        assert_eq!(corpus.index.count("years", "2020"), 2);

        let map = build_map(&records, &registry, &corpus.index, &filters, &config(), &no_labels())
            .await
            .unwrap();

        let mut ids = map
            .graph
            .nodes()
            .iter()
            .map(|node| node.key.graph_id())
            .collect::<Vec<_>>();
        ids.sort();
        assert_eq!(ids, vec!["W1".to_string(), "W2".to_string()]);
        assert!(
            map.graph
                .attributes
                .visible_fields
                .iter()
                .all(|(category, field)| *category == Category::Reference && field == "refs")
        );
    }

    #[tokio::test]
    async fn openalex_records_join_the_map_above_their_citation_threshold() {
        let records = records(vec![
            json!({
                "id": "P1",
                "display_name": "Landmark",
                "referenced_works": ["W1", "W2"],
                "cited_by_count": 40,
            }),
            json!({
                "id": "P2",
                "display_name": "Obscure",
                "referenced_works": ["W1", "W2"],
                "cited_by_count": 1,
            }),
        ]);
        let registry = FormatSpec::openalex().registry().unwrap();
        let corpus = index_corpus(&records, &registry).await;
        let filters = default_filters(&corpus.aggregations, &registry).with("records", 10);

        let map = build_map(&records, &registry, &corpus.index, &filters, &config(), &no_labels())
            .await
            .unwrap();

        let landmark = map.graph.node(&NodeKey::metadata("records", "P1")).unwrap();
        assert_eq!(landmark.nb_articles, 40);
        assert_eq!(landmark.full_label, "Landmark");
        assert!(!landmark.fixed);
        assert!(map.graph.node(&NodeKey::metadata("records", "P2")).is_none());
        assert_eq!(
            map.graph.edge_weight(&NodeKey::Reference("W1".to_string()), &landmark.key),
            Some(1)
        );
    }

    #[tokio::test]
    async fn same_input_same_map() {
        let records = chain(25);
        let registry = registry();
        let corpus = index_corpus(&records, &registry).await;
        let filters = default_filters(&corpus.aggregations, &registry);

        let first = build_map(&records, &registry, &corpus.index, &filters, &config(), &no_labels())
            .await
            .unwrap();
        let second = build_map(&records, &registry, &corpus.index, &filters, &config(), &no_labels())
            .await
            .unwrap();

        let summary = |map: &BuiltMap| {
            map.graph
                .nodes()
                .iter()
                .map(|node| (node.key.graph_id(), node.nb_articles, node.position))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.labelled, second.labelled);
        assert_eq!(first.graph.edges(), second.graph.edges());
    }
}
