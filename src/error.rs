use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no field descriptor registered for configured field `{0}`")]
    MissingDescriptor(String),

    #[error("field registry must declare exactly one reference field, found {0}")]
    ReferenceFieldCount(usize),

    #[error("field `{0}` is declared twice in the registry")]
    DuplicateField(String),

    #[error("k-means needs at least one cluster")]
    ZeroClusters,

    #[error("cannot cluster an empty point set")]
    EmptyPoints,

    #[error("cannot pick {k} representatives out of {available} points")]
    TooManyClusters { k: usize, available: usize },

    #[error("label count {count} is above the label cutoff {cutoff}")]
    LabelCountAboveCutoff { count: usize, cutoff: usize },

    #[error("label resolution failed")]
    Labels(#[source] anyhow::Error),
}

/// Failure while pulling one field's values out of one record.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported value at `{path}`: {found}")]
    UnsupportedValue { path: String, found: &'static str },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
