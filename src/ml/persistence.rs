//! Artifact persistence - named blobs for the model and its feature contract

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::features::FeatureContract;
use super::labels::{LabelCodec, LabelDecoder};
use super::model::{Classifier, ClassifierAdapter, GbdtClassifier};
use super::schema::{FeatureSchema, SchemaReport};
use crate::error::{PipelineError, Result};

pub const MODEL: &str = "model";
pub const FEATURE_SCHEMA: &str = "feature_schema";
pub const LABEL_CODEC: &str = "label_codec";
pub const FEATURE_CONTRACT: &str = "feature_contract";

/// Key-value blob storage keyed by artifact name.
pub trait ArtifactStore {
    /// `Ok(None)` when the artifact does not exist.
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Stores each artifact as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl ArtifactStore for DirectoryStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::artifact(
                name,
                format!("{}: {e}", path.display()),
            )),
        }
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::artifact(name, e))?;
        let path = self.path_for(name);
        fs::write(&path, bytes)
            .map_err(|e| PipelineError::artifact(name, format!("{}: {e}", path.display())))
    }
}

/// In-memory store, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.remove(name)
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| PipelineError::artifact(name, e))?;
        Ok(blobs.get(name).cloned())
    }

    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| PipelineError::artifact(name, e))?;
        blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

fn require(store: &dyn ArtifactStore, name: &str) -> Result<Vec<u8>> {
    store
        .get(name)?
        .ok_or_else(|| PipelineError::artifact(name, "not found"))
}

fn parse<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| PipelineError::artifact(name, e))
}

fn write_json<T: Serialize>(store: &dyn ArtifactStore, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PipelineError::artifact(name, e))?;
    store.put(name, &bytes)
}

/// Persist everything the training side of the contract produces.
pub fn save_contract(
    store: &dyn ArtifactStore,
    contract: &FeatureContract,
    schema: &FeatureSchema,
    codec: &LabelCodec,
) -> Result<()> {
    write_json(store, FEATURE_CONTRACT, contract)?;
    write_json(store, FEATURE_SCHEMA, schema)?;
    write_json(store, LABEL_CODEC, codec)
}

pub fn save_model(store: &dyn ArtifactStore, model: &GbdtClassifier) -> Result<()> {
    store.put(MODEL, &model.to_json()?)
}

/// Convert an XGBoost dump into the stored model artifact.
///
/// The input width and class count come from the schema and codec already
/// in `store`, so `prepare` must have run first.
pub fn import_xgboost_dump(store: &dyn ArtifactStore, dump: &Path) -> Result<GbdtClassifier> {
    let schema: FeatureSchema = parse(FEATURE_SCHEMA, &require(store, FEATURE_SCHEMA)?)?;
    let codec: LabelCodec = parse(LABEL_CODEC, &require(store, LABEL_CODEC)?)?;

    let model = GbdtClassifier::from_xgboost_dump(dump, schema.len(), codec.len())?;
    save_model(store, &model)?;

    tracing::info!(
        "Imported {} from {}",
        model.describe(),
        dump.display()
    );
    Ok(model)
}

/// Options for [`ArtifactBundle::load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Use the static label table when no codec is stored
    pub allow_static_labels: bool,
}

/// All read-only state needed to serve predictions.
#[derive(Debug)]
pub struct ArtifactBundle {
    pub contract: FeatureContract,
    pub classifier: ClassifierAdapter,
    pub labels: LabelDecoder,
    pub report: SchemaReport,
}

impl ArtifactBundle {
    /// Load and cross-check every artifact. Any failure here means the
    /// process must not serve predictions.
    pub fn load(store: &dyn ArtifactStore, options: LoadOptions) -> Result<Self> {
        let contract: FeatureContract =
            parse(FEATURE_CONTRACT, &require(store, FEATURE_CONTRACT)?)?;
        let schema: FeatureSchema = parse(FEATURE_SCHEMA, &require(store, FEATURE_SCHEMA)?)?;
        let model = GbdtClassifier::from_json(&require(store, MODEL)?)?;

        let labels = match store.get(LABEL_CODEC)? {
            Some(bytes) => LabelDecoder::persisted(parse(LABEL_CODEC, &bytes)?),
            None if options.allow_static_labels => {
                tracing::warn!(
                    "No label codec stored; decoding with the static fallback table {:?}",
                    super::labels::STATIC_FALLBACK_LABELS
                );
                LabelDecoder::static_fallback()
            }
            None => return Err(PipelineError::artifact(LABEL_CODEC, "not found")),
        };

        Self::assemble(contract, schema, Box::new(model), labels)
    }

    /// Cross-check already-decoded artifacts.
    pub fn assemble(
        contract: FeatureContract,
        schema: FeatureSchema,
        model: Box<dyn Classifier>,
        labels: LabelDecoder,
    ) -> Result<Self> {
        contract.validate()?;
        if contract.policy != super::calendar::CalendarPolicy::CANONICAL {
            tracing::warn!(
                "Feature contract uses a non-canonical calendar policy: {:?}",
                contract.policy
            );
        }

        let report = schema.check_vocabulary(&contract.vocabulary)?;
        for column in &report.dropped {
            tracing::warn!("Feature {column:?} is not in the expected schema and will be dropped");
        }
        for column in &report.always_zero {
            tracing::warn!("Schema column {column:?} is never produced and will always be 0.0");
        }

        let classifier = ClassifierAdapter::new(model, schema)?;
        if classifier.num_classes() != labels.codec().len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "classifier has {} classes but the {} has {} labels",
                classifier.num_classes(),
                labels.policy(),
                labels.codec().len()
            )));
        }

        tracing::info!(
            "Loaded {} with {} columns, labels from {}",
            classifier.describe(),
            classifier.schema().len(),
            labels.policy()
        );

        Ok(Self {
            contract,
            classifier,
            labels,
            report,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{}; schema {} columns ({} dropped, {} always zero); junctions {:?}; labels {:?} ({})",
            self.classifier.describe(),
            self.classifier.schema().len(),
            self.report.dropped.len(),
            self.report.always_zero.len(),
            self.contract.vocabulary.junctions.categories,
            self.labels.codec().labels(),
            self.labels.policy()
        )
    }
}
