//! Junction Traffic Library
//!
//! Predicts a traffic level (Low/Medium/High) for a road junction at a given
//! time from a pre-trained XGBoost classifier evaluated with `gbdt`. The
//! interesting part is the feature contract: training and inference derive,
//! encode and align features through the same code so the classifier always
//! sees the columns it was fit against.

pub mod config;
pub mod error;
pub mod history;
pub mod ml;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{CategoryKind, PipelineError};
pub use history::{HourlyLevelCounts, Observation, hourly_level_counts, load_observations};
pub use ml::{
    ArtifactBundle, ArtifactStore, CalendarPolicy, Classifier, DirectoryStore, FeatureSchema,
    GbdtClassifier, LabelCodec, LabelPolicy, LoadOptions, MemoryStore, ObservationTime,
    PartOfDay, Predictor, TrafficPrediction, Vocabulary,
};
pub use traits::{Clock, MockClock, SystemClock};
