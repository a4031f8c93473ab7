use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bibliograph::graph::RecordHasher;
use bibliograph::index::default_filters;
use bibliograph::labels::{IndexLabelResolver, LabelResolver, StaticLabelResolver};
use bibliograph::layout::LayoutBudget;
use bibliograph::report::{ReportContext, text_report, year_histogram};
use bibliograph::{FormatSpec, LabelConfig, PipelineConfig, build_map, index_corpus, record};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Records as a JSON array, a `{"results": [...]}` envelope or JSON Lines.
    input: PathBuf,

    /// Built-in record layout: openalex, wos or scopus.
    #[arg(long, default_value = "openalex", conflicts_with = "format_file")]
    format: String,

    /// JSON description of a custom record layout.
    #[arg(long)]
    format_file: Option<PathBuf>,

    /// Minimum occurrence threshold for a field, e.g. `refs=3`. Repeatable.
    #[arg(long = "filter", value_name = "FIELD=N", value_parser = parse_filter)]
    filters: Vec<(String, u32)>,

    #[arg(long)]
    min_year: Option<f64>,

    #[arg(long)]
    max_year: Option<f64>,

    /// Keep records that look like duplicates of an earlier one.
    #[arg(long)]
    no_dedup: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Labelled references when there are more than `--label-cutoff`.
    #[arg(long, default_value_t = 15)]
    label_count: usize,

    /// Label every reference when there are at most this many.
    #[arg(long, default_value_t = 15)]
    label_cutoff: usize,

    #[arg(long, default_value_t = 5)]
    kmeans_steps: usize,

    #[arg(long, default_value_t = 1000)]
    core_iterations: usize,

    #[arg(long, default_value_t = 200)]
    satellite_iterations: usize,

    /// Wall-clock limit for each layout phase.
    #[arg(long, default_value_t = 10_000)]
    time_budget_ms: u64,

    /// JSON object mapping reference ids to display labels.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Resolve full labels for every reference, not only labelled ones.
    #[arg(long)]
    hover_labels: bool,

    #[arg(long, short, default_value = "graph.json")]
    output: PathBuf,

    /// Also write per-field threshold aggregations.
    #[arg(long)]
    aggregations: Option<PathBuf>,

    /// Also write the plain-text method report.
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long, short)]
    verbose: bool,
}

fn parse_filter(raw: &str) -> Result<(String, u32)> {
    let (field, threshold) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=N, got `{raw}`"))?;
    let threshold = threshold
        .trim()
        .parse()
        .with_context(|| format!("invalid threshold in `{raw}`"))?;
    Ok((field.trim().to_string(), threshold))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?
        .block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let labels = LabelConfig {
        sample_size: args.label_count,
        cutoff: args.label_cutoff,
        kmeans_steps: args.kmeans_steps,
        hover_labels: args.hover_labels,
        ..LabelConfig::default()
    };
    labels.validate()?;

    let format = match &args.format_file {
        Some(path) => FormatSpec::load(path)?,
        None => FormatSpec::preset(&args.format)?,
    };
    let registry = format.registry()?;
    let records = record::load_records(&args.input)?;
    info!(records = records.len(), format = %format.name, "loaded records");

    let corpus = index_corpus(&records, &registry).await;
    let mut filters = default_filters(&corpus.aggregations, &registry);
    for (field, threshold) in &args.filters {
        registry.require_filterable(field)?;
        filters.set(field.clone(), *threshold);
    }
    info!(?filters, "using thresholds");

    let time_limit = Duration::from_millis(args.time_budget_ms);
    let mut config = PipelineConfig {
        range_gate: format.range_gate(args.min_year, args.max_year),
        dedup: if args.no_dedup {
            None
        } else {
            format
                .dedup_hasher()
                .map(|hasher| Box::new(hasher) as Box<dyn RecordHasher>)
        },
        labels,
        seed: args.seed,
        ..PipelineConfig::default()
    };
    config.layout.core = LayoutBudget::new(args.core_iterations, time_limit);
    config.layout.satellites = LayoutBudget::new(args.satellite_iterations, time_limit);

    let resolver: Box<dyn LabelResolver> = match &args.labels {
        Some(path) => Box::new(StaticLabelResolver::load(path)?),
        None => Box::new(IndexLabelResolver::new(&corpus.index, &registry.reference().id)),
    };

    let map = build_map(
        &records,
        &registry,
        &corpus.index,
        &filters,
        &config,
        resolver.as_ref(),
    )
    .await?;

    write_json(&args.output, &map.graph.export())?;
    info!(
        path = %args.output.display(),
        nodes = map.graph.node_count(),
        edges = map.graph.edge_count(),
        "wrote graph"
    );

    if let Some(path) = &args.aggregations {
        write_json(path, &corpus.aggregations)?;
    }

    if let Some(path) = &args.report {
        let years = format
            .range
            .as_ref()
            .and_then(|range| range.field.as_deref())
            .map(|field| year_histogram(&corpus.index, field))
            .unwrap_or_default();
        let report = text_report(&ReportContext {
            source: &format.name,
            years: &years,
            index: &corpus.index,
            filters: &filters,
            registry: &registry,
        });
        fs::write(path, report)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    Ok(())
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    fs::write(path, raw).with_context(|| format!("failed to write {}", path.display()))
}
