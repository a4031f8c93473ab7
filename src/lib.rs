pub mod error;
pub mod fields;
pub mod graph;
pub mod index;
pub mod labels;
pub mod layout;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod sample;
mod util;

pub use error::{ExtractError, PipelineError};
pub use fields::{FieldDescriptor, FieldRegistry, FormatSpec, RecordLayer};
pub use graph::BiblioGraph;
pub use index::{Aggregations, FieldIndex, Filters};
pub use pipeline::{BuiltMap, LabelConfig, PipelineConfig, PreparedCorpus, build_map, index_corpus};
pub use record::Record;
