//! Error taxonomy for the feature pipeline.
//!
//! Every variant is a configuration or input problem; none of them is
//! transient, so callers fail fast instead of retrying.

use thiserror::Error;

/// Which categorical vocabulary a lookup failed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Junction,
    PartOfDay,
    TrafficLevel,
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryKind::Junction => write!(f, "junction"),
            CategoryKind::PartOfDay => write!(f, "part of day"),
            CategoryKind::TrafficLevel => write!(f, "traffic level"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown {kind} category: {value:?}")]
    UnknownCategory { kind: CategoryKind, value: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Feature vector has {found} values, classifier expects {expected}")]
    FeatureLength { expected: usize, found: usize },

    #[error("Feature {column:?} at position {position} is not finite ({value})")]
    NonFiniteFeature {
        position: usize,
        column: String,
        value: f64,
    },

    #[error("Classifier output is unusable: {0}")]
    ModelOutput(String),

    #[error("Failed to load artifact {name:?}: {reason}")]
    ArtifactLoad { name: String, reason: String },

    #[error("Class index {index} is outside the label codec (0..{classes})")]
    UnknownClassIndex { index: usize, classes: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl PipelineError {
    pub(crate) fn artifact(name: &str, reason: impl std::fmt::Display) -> Self {
        PipelineError::ArtifactLoad {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for the feature-shape family of errors (length or non-finite value).
    pub fn is_feature_shape(&self) -> bool {
        matches!(
            self,
            PipelineError::FeatureLength { .. } | PipelineError::NonFiniteFeature { .. }
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
