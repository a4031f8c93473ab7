use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{FieldsHasher, RangeGate};

use super::{
    DEFAULT_METADATA_COLORS, EntityList, FieldDescriptor, FieldRegistry, RECORD_LAYER_COLOR,
    RecordLayer, SeparatedValues, ThresholdPolicy,
};

const REFERENCE_COLOR: &str = "#ebebeb";

/// Declarative description of a record layout, loadable from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatSpec {
    pub name: String,
    pub reference: FieldSpec,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub range: Option<RangeSpec>,
    #[serde(default)]
    pub dedup: Vec<String>,
    /// One node per record, gated on a numeric record value.
    #[serde(default)]
    pub records: Option<RecordLayerSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordLayerSpec {
    #[serde(default = "RecordLayerSpec::default_id")]
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub id_path: String,
    #[serde(default)]
    pub label_path: Option<String>,
    pub weight_path: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub max_visible: Option<usize>,
    #[serde(default)]
    pub min_records: Option<u32>,
}

impl RecordLayerSpec {
    fn default_id() -> String {
        "records".to_string()
    }

    fn into_layer(self) -> RecordLayer {
        let label = self.label.unwrap_or_else(|| self.id.clone());
        let layer = RecordLayer::new(self.id, self.id_path, self.weight_path)
            .with_label(label)
            .with_color(self.color.as_deref().unwrap_or(RECORD_LAYER_COLOR))
            .with_policy(ThresholdPolicy {
                max_visible: self.max_visible,
                min_records: self.min_records,
            });
        match self.label_path {
            Some(path) => layer.with_label_path(path),
            None => layer,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub path: String,
    /// Further paths read with the same extractor, after `path`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_paths: Vec<String>,
    #[serde(flatten)]
    pub extractor: ExtractorSpec,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub max_visible: Option<usize>,
    #[serde(default)]
    pub min_records: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    Separated {
        #[serde(default)]
        separator: Option<String>,
    },
    Entities {
        id_key: String,
        #[serde(default)]
        label_key: Option<String>,
    },
}

/// Numeric record value used as an inclusion gate (publication year).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RangeSpec {
    pub path: String,
    /// Indexed field holding the same values, used for per-year reporting.
    #[serde(default)]
    pub field: Option<String>,
}

impl FieldSpec {
    fn separated(id: &str, label: &str, path: &str, separator: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            label: Some(label.to_string()),
            path: path.to_string(),
            extra_paths: Vec::new(),
            extractor: ExtractorSpec::Separated {
                separator: separator.map(str::to_string),
            },
            color: None,
            hidden: false,
            max_visible: None,
            min_records: None,
        }
    }

    fn entities(id: &str, label: &str, path: &str, id_key: &str, label_key: &str) -> Self {
        Self {
            extractor: ExtractorSpec::Entities {
                id_key: id_key.to_string(),
                label_key: Some(label_key.to_string()),
            },
            ..Self::separated(id, label, path, None)
        }
    }

    fn also_from(mut self, path: &str) -> Self {
        self.extra_paths.push(path.to_string());
        self
    }

    fn colored(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    fn visible_at_most(mut self, max_visible: usize) -> Self {
        self.max_visible = Some(max_visible);
        self
    }

    fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn into_descriptor(self, fallback_color: &str) -> FieldDescriptor {
        let policy = ThresholdPolicy {
            max_visible: self.max_visible,
            min_records: self.min_records,
        };
        let color = self.color.unwrap_or_else(|| fallback_color.to_string());
        let label = self.label.unwrap_or_else(|| self.id.clone());

        let extra_paths = self.extra_paths;
        let descriptor = match self.extractor {
            ExtractorSpec::Separated { separator } => {
                let extractor = extra_paths.into_iter().fold(
                    SeparatedValues::new(self.path, separator.as_deref()),
                    SeparatedValues::with_path,
                );
                FieldDescriptor::new(self.id, extractor)
            }
            ExtractorSpec::Entities { id_key, label_key } => {
                let extractor = extra_paths.into_iter().fold(
                    EntityList::new(self.path, id_key, label_key.as_deref()),
                    EntityList::with_path,
                );
                FieldDescriptor::new(self.id, extractor)
            }
        };

        let descriptor = descriptor
            .with_label(label)
            .with_color(color)
            .with_policy(policy);
        if self.hidden {
            descriptor.hidden()
        } else {
            descriptor
        }
    }
}

impl FormatSpec {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read format file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid format description in {}", path.display()))
    }

    pub fn preset(name: &str) -> anyhow::Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openalex" => Ok(Self::openalex()),
            "wos" | "webofscience" | "web-of-science" => Ok(Self::web_of_science()),
            "scopus" => Ok(Self::scopus()),
            other => Err(anyhow!(
                "unknown format preset `{other}` (expected openalex, wos or scopus)"
            )),
        }
    }

    pub fn openalex() -> Self {
        Self {
            name: "OpenAlex".to_string(),
            reference: FieldSpec::separated("refs", "References", "referenced_works", None)
                .colored(REFERENCE_COLOR)
                .visible_at_most(5000),
            fields: vec![
                FieldSpec::entities(
                    "authors",
                    "Authors",
                    "authorships.author",
                    "id",
                    "display_name",
                )
                .colored("#ffe915")
                .visible_at_most(50),
                FieldSpec::entities(
                    "sources",
                    "Sources",
                    "primary_location.source",
                    "id",
                    "display_name",
                )
                .also_from("locations.source")
                .colored("#a7d30d")
                .visible_at_most(50),
                FieldSpec::entities(
                    "institutions",
                    "Institutions",
                    "authorships.institutions",
                    "id",
                    "display_name",
                )
                .colored("#e22521")
                .visible_at_most(50),
                FieldSpec::separated("countries", "Countries", "authorships.countries", None)
                    .colored("#df60bf")
                    .visible_at_most(25),
                FieldSpec::entities(
                    "funders",
                    "Funders",
                    "grants",
                    "funder",
                    "funder_display_name",
                )
                .colored("#ff8f2e")
                .visible_at_most(25),
                FieldSpec::entities("topics", "Topics", "topics", "id", "display_name")
                    .colored("#9dabf5")
                    .visible_at_most(200),
                FieldSpec::entities("keywords", "Keywords", "keywords", "id", "display_name")
                    .colored("#47c4b8")
                    .visible_at_most(200),
                FieldSpec::separated("years", "Years", "publication_year", None).hidden(),
            ],
            range: Some(RangeSpec {
                path: "publication_year".to_string(),
                field: Some("years".to_string()),
            }),
            dedup: vec!["doi".to_string()],
            records: Some(RecordLayerSpec {
                id: RecordLayerSpec::default_id(),
                label: Some("Records".to_string()),
                id_path: "id".to_string(),
                label_path: Some("display_name".to_string()),
                weight_path: "cited_by_count".to_string(),
                color: None,
                max_visible: Some(50),
                min_records: None,
            }),
        }
    }

    pub fn web_of_science() -> Self {
        Self {
            name: "Web of Science".to_string(),
            reference: FieldSpec::separated("references", "References", "CR", Some(";"))
                .colored(REFERENCE_COLOR)
                .visible_at_most(5000),
            fields: vec![
                FieldSpec::separated("authors", "Authors", "AU", Some(";"))
                    .colored("#ffe915")
                    .visible_at_most(50),
                FieldSpec::separated("sources", "Sources", "SO", None)
                    .colored("#a7d30d")
                    .visible_at_most(50),
                FieldSpec::separated("keywords", "Keywords", "DE", Some(";"))
                    .colored("#47c4b8")
                    .visible_at_most(200),
                FieldSpec::separated("years", "Years", "PY", None).hidden(),
            ],
            range: Some(RangeSpec {
                path: "PY".to_string(),
                field: Some("years".to_string()),
            }),
            dedup: vec!["TI".to_string(), "PY".to_string()],
            records: None,
        }
    }

    pub fn scopus() -> Self {
        Self {
            name: "Scopus".to_string(),
            reference: FieldSpec::separated("references", "References", "References", Some(";"))
                .colored(REFERENCE_COLOR)
                .visible_at_most(5000),
            fields: vec![
                FieldSpec::separated("authors", "Authors", "Author(s) ID", Some(";"))
                    .colored("#ffe915")
                    .visible_at_most(50),
                FieldSpec::separated("sources", "Sources", "Source title", None)
                    .colored("#a7d30d")
                    .visible_at_most(50),
                FieldSpec::separated("keywords", "Keywords", "Author Keywords", Some(";"))
                    .colored("#47c4b8")
                    .visible_at_most(200),
                FieldSpec::separated("years", "Years", "Year", None).hidden(),
            ],
            range: Some(RangeSpec {
                path: "Year".to_string(),
                field: Some("years".to_string()),
            }),
            dedup: vec!["Title".to_string(), "Year".to_string()],
            records: None,
        }
    }

    pub fn registry(&self) -> Result<FieldRegistry> {
        let mut descriptors = Vec::with_capacity(self.fields.len() + 1);
        descriptors.push(self.reference.clone().into_descriptor(REFERENCE_COLOR).reference());
        for (position, field) in self.fields.iter().enumerate() {
            let fallback = DEFAULT_METADATA_COLORS[position % DEFAULT_METADATA_COLORS.len()];
            descriptors.push(field.clone().into_descriptor(fallback));
        }
        let registry = FieldRegistry::new(descriptors)?;
        match &self.records {
            Some(records) => registry.with_record_layer(records.clone().into_layer()),
            None => Ok(registry),
        }
    }

    pub fn range_gate(&self, min: Option<f64>, max: Option<f64>) -> Option<RangeGate> {
        let range = self.range.as_ref()?;
        if min.is_none() && max.is_none() {
            return None;
        }
        Some(RangeGate::new(range.path.clone(), min, max))
    }

    pub fn dedup_hasher(&self) -> Option<FieldsHasher> {
        if self.dedup.is_empty() {
            None
        } else {
            Some(FieldsHasher::new(self.dedup.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_build_valid_registries() {
        for name in ["openalex", "wos", "scopus"] {
            let format = FormatSpec::preset(name).unwrap();
            let registry = format.registry().unwrap();
            assert_eq!(registry.reference().id, format.reference.id);
            assert!(registry.len() > 1);
        }
        assert!(FormatSpec::preset("pubmed").is_err());
    }

    #[test]
    fn format_files_deserialize_with_tagged_extractors() {
        let raw = r##"{
            "name": "custom",
            "reference": { "id": "refs", "path": "refs", "kind": "separated", "separator": ";" },
            "fields": [
                { "id": "authors", "path": "authors", "kind": "entities", "id_key": "id" },
                { "id": "tags", "path": "tags", "kind": "separated", "hidden": true, "color": "#000" }
            ],
            "range": { "path": "year" },
            "dedup": ["title"]
        }"##;
        let format: FormatSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(
            format.reference.extractor,
            ExtractorSpec::Separated {
                separator: Some(";".to_string())
            }
        );
        assert!(format.fields[1].hidden);

        let registry = format.registry().unwrap();
        assert_eq!(registry.metadata().count(), 1);
        assert_eq!(registry.get("tags").map(|f| f.color.as_str()), Some("#000"));
        assert!(format.dedup_hasher().is_some());
        assert!(format.range_gate(None, None).is_none());
        assert!(format.range_gate(Some(2000.0), None).is_some());
    }

    fn record(value: serde_json::Value) -> crate::record::Record {
        match value {
            serde_json::Value::Object(map) => crate::record::Record::new(map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn openalex_years_only_feed_the_range_gate() {
        let format = FormatSpec::openalex();
        let registry = format.registry().unwrap();
        let years = registry.get("years").unwrap();
        assert!(years.hidden);
        assert!(registry.metadata().all(|field| field.id != "years"));
        assert_eq!(
            format.range.as_ref().and_then(|range| range.field.as_deref()),
            Some("years")
        );
    }

    #[test]
    fn openalex_sources_read_every_location() {
        let registry = FormatSpec::openalex().registry().unwrap();
        let sources = registry.get("sources").unwrap();
        let values = sources
            .extract(&record(serde_json::json!({
                "primary_location": { "source": { "id": "S1", "display_name": "Nature" } },
                "locations": [
                    { "source": { "id": "S1", "display_name": "Nature" } },
                    { "source": { "display_name": "Preprint mirror" } },
                    { "source": { "id": "S2", "display_name": "arXiv" } },
                ],
            })))
            .unwrap();
        assert_eq!(
            values.iter().map(|value| value.id.as_str()).collect::<Vec<_>>(),
            vec!["S1", "S2"]
        );
    }

    #[test]
    fn openalex_carries_a_citation_weighted_record_layer() {
        let registry = FormatSpec::openalex().registry().unwrap();
        let layer = registry.record_layer().unwrap();
        assert_eq!(layer.id, "records");
        assert_eq!(layer.weight_path, "cited_by_count");
        assert_eq!(layer.color, RECORD_LAYER_COLOR);
        assert!(FormatSpec::web_of_science().registry().unwrap().record_layer().is_none());

        let raw = r##"{
            "name": "custom",
            "reference": { "id": "refs", "path": "refs", "kind": "separated" },
            "records": { "id_path": "uid", "weight_path": "times_cited", "max_visible": 10 }
        }"##;
        let format: FormatSpec = serde_json::from_str(raw).unwrap();
        let registry = format.registry().unwrap();
        let layer = registry.record_layer().unwrap();
        assert_eq!(layer.id, "records");
        assert_eq!(layer.policy.max_visible, Some(10));
    }

    #[test]
    fn fallback_colors_cycle_through_the_palette() {
        let mut format = FormatSpec::web_of_science();
        for field in &mut format.fields {
            field.color = None;
        }
        let registry = format.registry().unwrap();
        assert_eq!(
            registry.get("authors").map(|f| f.color.as_str()),
            Some(DEFAULT_METADATA_COLORS[0])
        );
        assert_eq!(
            registry.get("sources").map(|f| f.color.as_str()),
            Some(DEFAULT_METADATA_COLORS[1])
        );
    }
}
