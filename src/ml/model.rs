//! Classifier boundary and the gradient-boosted tree model behind it
//!
//! The model is opaque to the rest of the pipeline: anything implementing
//! [`Classifier`] can sit behind [`ClassifierAdapter`], which refuses
//! malformed vectors before they reach it and malformed outputs after.
//! The concrete model is an XGBoost `multi:softprob` booster evaluated by
//! the `gbdt` crate.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use gbdt::decision_tree::{Data, DataVec, ValueType};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};

use super::persistence::MODEL;
use super::schema::FeatureSchema;
use crate::error::{PipelineError, Result};

/// XGBoost objective the booster was trained with.
pub const OBJECTIVE: &str = "multi:softprob";

/// A trained multi-class classifier with a fixed input width.
pub trait Classifier: Send + Sync {
    fn num_features(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Class index for a feature vector of length [`Self::num_features`].
    fn predict(&self, features: &[f64]) -> Result<usize>;

    /// Per-class probabilities, if the model can produce them.
    fn predict_proba(&self, _features: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }

    /// Short description for logs.
    fn describe(&self) -> String {
        format!(
            "classifier({} features, {} classes)",
            self.num_features(),
            self.num_classes()
        )
    }
}

/// Guards a classifier with the shape checks the model itself cannot make.
pub struct ClassifierAdapter {
    model: Box<dyn Classifier>,
    schema: FeatureSchema,
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("model", &self.model.describe())
            .field("schema_len", &self.schema.len())
            .finish()
    }
}

impl ClassifierAdapter {
    /// Fails with `SchemaMismatch` if the model width differs from the schema.
    pub fn new(model: Box<dyn Classifier>, schema: FeatureSchema) -> Result<Self> {
        if model.num_features() != schema.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "classifier expects {} features but the expected schema has {} columns",
                model.num_features(),
                schema.len()
            )));
        }
        Ok(Self { model, schema })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes()
    }

    pub fn describe(&self) -> String {
        self.model.describe()
    }

    fn check_shape(&self, features: &[f64]) -> Result<()> {
        if features.len() != self.schema.len() {
            return Err(PipelineError::FeatureLength {
                expected: self.schema.len(),
                found: features.len(),
            });
        }
        if let Some((position, &value)) = features.iter().enumerate().find(|(_, v)| !v.is_finite())
        {
            return Err(PipelineError::NonFiniteFeature {
                position,
                column: self.schema.columns()[position].clone(),
                value,
            });
        }
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<usize> {
        self.check_shape(features)?;
        self.model.predict(features)
    }

    /// `Ok(None)` when the model has no probability output.
    pub fn predict_proba(&self, features: &[f64]) -> Result<Option<Vec<f64>>> {
        self.check_shape(features)?;
        let Some(probs) = self.model.predict_proba(features)? else {
            return Ok(None);
        };
        check_distribution(&probs, self.model.num_classes())?;
        Ok(Some(probs))
    }
}

fn check_distribution(probs: &[f64], num_classes: usize) -> Result<()> {
    if probs.len() != num_classes || probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(PipelineError::ModelOutput(format!(
            "class probabilities {probs:?} are not a distribution over {num_classes} classes"
        )));
    }
    Ok(())
}

/// Index of the largest probability; the lowest index wins ties.
fn most_likely(probs: &[f64]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_p), (i, &p)| {
            if p > best_p { (i, p) } else { (best, best_p) }
        })
        .0
}

/// XGBoost booster evaluated through `gbdt`.
///
/// Persisted as JSON holding the input width, the class count and the
/// booster in `gbdt`'s own serialization.
#[derive(Serialize, Deserialize)]
pub struct GbdtClassifier {
    num_features: usize,
    num_classes: usize,
    booster: GBDT,
}

impl std::fmt::Debug for GbdtClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbdtClassifier")
            .field("num_features", &self.num_features)
            .field("num_classes", &self.num_classes)
            .finish_non_exhaustive()
    }
}

impl GbdtClassifier {
    /// Load an XGBoost model dump as converted by gbdt's `convert_xgboost.py`:
    /// the base score on the first line, then a JSON array of trees with
    /// trees for each class interleaved.
    pub fn from_xgboost_dump(path: &Path, num_features: usize, num_classes: usize) -> Result<Self> {
        check_dimensions(num_features, num_classes)?;
        check_base_score(path)?;

        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::artifact(MODEL, format!("{} is not UTF-8", path.display())))?;
        let booster = GBDT::from_xgboost_dump(path_str, OBJECTIVE)
            .map_err(|e| PipelineError::artifact(MODEL, format!("{}: {e}", path.display())))?;

        Self {
            num_features,
            num_classes,
            booster,
        }
        .validated()
    }

    /// Parse and validate a stored model artifact.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let model: Self =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::artifact(MODEL, e))?;
        check_dimensions(model.num_features, model.num_classes)?;
        model.validated()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PipelineError::artifact(MODEL, e))
    }

    /// Evaluate once on an all-zero vector so a booster that cannot produce
    /// a distribution is refused at load instead of at the first request.
    fn validated(self) -> Result<Self> {
        self.softprob(&vec![0.0; self.num_features])
            .map_err(|e| PipelineError::artifact(MODEL, e))?;
        Ok(self)
    }

    fn softprob(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.num_features {
            return Err(PipelineError::FeatureLength {
                expected: self.num_features,
                found: features.len(),
            });
        }

        let data: DataVec = vec![Data::new_test_data(
            features.iter().map(|&v| v as ValueType).collect(),
            None,
        )];

        // gbdt panics instead of erroring on inconsistent boosters
        let (_, mut probs) = panic::catch_unwind(AssertUnwindSafe(|| {
            self.booster.predict_multiclass(&data, self.num_classes)
        }))
        .map_err(|_| PipelineError::ModelOutput("gbdt failed to evaluate the booster".to_string()))?;

        let probs: Vec<f64> = probs
            .pop()
            .ok_or_else(|| PipelineError::ModelOutput("gbdt returned no prediction".to_string()))?
            .into_iter()
            .map(f64::from)
            .collect();

        check_distribution(&probs, self.num_classes)?;
        Ok(probs)
    }
}

fn check_dimensions(num_features: usize, num_classes: usize) -> Result<()> {
    if num_features == 0 || num_classes < 2 {
        return Err(PipelineError::artifact(
            MODEL,
            format!(
                "needs at least one feature and two classes, got {num_features} and {num_classes}"
            ),
        ));
    }
    Ok(())
}

/// The dump's first line is the base score; gbdt reads it as `f32`.
fn check_base_score(path: &Path) -> Result<()> {
    let file =
        File::open(path).map_err(|e| PipelineError::artifact(MODEL, format!("{}: {e}", path.display())))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|e| PipelineError::artifact(MODEL, format!("{}: {e}", path.display())))?;

    let finite = first
        .trim()
        .parse::<f64>()
        .is_ok_and(|score| (score as ValueType).is_finite());
    if !finite {
        return Err(PipelineError::artifact(
            MODEL,
            format!("base score {:?} is not a finite single-precision value", first.trim()),
        ));
    }
    Ok(())
}

impl Classifier for GbdtClassifier {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, features: &[f64]) -> Result<usize> {
        Ok(most_likely(&self.softprob(features)?))
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Option<Vec<f64>>> {
        self.softprob(features).map(Some)
    }

    fn describe(&self) -> String {
        format!(
            "GBDT({OBJECTIVE}, features={}, classes={})",
            self.num_features, self.num_classes
        )
    }
}
