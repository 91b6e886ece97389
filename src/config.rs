use std::path::{Path, PathBuf};

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::ml::LoadOptions;
use crate::ml::calendar::DEFAULT_UTC_OFFSET_MINUTES;

/// Top-level configuration, one section per concern.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Where the model and its feature contract are stored
    pub artifacts: ArtifactsConfig,
    /// Prediction behaviour
    pub inference: InferenceConfig,
    /// Reference zone for training data
    pub timezone: TimezoneConfig,
}

/// Artifact storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    /// Directory holding model.json, feature_schema.json, label_codec.json
    /// and feature_contract.json
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
        }
    }
}

/// Inference configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Decode with the static label table when no codec was persisted
    pub allow_static_labels: bool,
    /// Attach per-class probabilities to every prediction
    pub include_probabilities: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            allow_static_labels: false,
            include_probabilities: false,
        }
    }
}

/// Timezone configuration
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TimezoneConfig {
    /// Reference zone used when preparing training data, minutes east of UTC
    pub utc_offset_minutes: i32,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default locations and the environment.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, optionally layering an explicit file above the
    /// default locations.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("junction-traffic");

        let mut builder = Config::builder()
            // 1. Defaults
            .set_default("artifacts.dir", "artifacts")?
            .set_default("inference.allow_static_labels", false)?
            .set_default("inference.include_probabilities", false)?
            .set_default("timezone.utc_offset_minutes", DEFAULT_UTC_OFFSET_MINUTES)?
            // 2. Local config file (optional)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        // 4. Explicit file from the command line (required if given)
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // 5. Environment variables (TRAFFIC__ARTIFACTS__DIR=...)
        builder = builder.add_source(Environment::with_prefix("TRAFFIC").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }

    /// Artifact loading options derived from the inference section.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            allow_static_labels: self.inference.allow_static_labels,
        }
    }
}
