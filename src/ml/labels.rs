//! Class index to traffic level decoding
//!
//! The codec persisted at training time is the source of truth. The static
//! table is a last resort and is always reported as such, since it does not
//! necessarily match the order the model was trained with.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CategoryKind, PipelineError, Result};

/// Labels used when no codec was persisted: index 0 is High, 1 Low, 2 Medium.
pub const STATIC_FALLBACK_LABELS: [&str; 3] = ["High", "Low", "Medium"];

/// Bidirectional index/label mapping fixed at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelCodec {
    labels: Vec<String>,
}

impl LabelCodec {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.len() < 2 {
            return Err(PipelineError::SchemaMismatch(format!(
                "label codec needs at least two classes, got {}",
                labels.len()
            )));
        }
        let distinct: BTreeSet<&str> = labels.iter().map(String::as_str).collect();
        if distinct.len() != labels.len() {
            return Err(PipelineError::SchemaMismatch(
                "label codec lists a label more than once".to_string(),
            ));
        }
        Ok(Self { labels })
    }

    /// Codec over the distinct observed labels in sorted order.
    pub fn fit<'a, I>(observed: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = observed.into_iter().collect();
        Self::new(distinct.into_iter().map(str::to_string).collect())
    }

    pub fn static_fallback() -> Self {
        Self {
            labels: STATIC_FALLBACK_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(PipelineError::UnknownClassIndex {
                index,
                classes: self.labels.len(),
            })
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| PipelineError::UnknownCategory {
                kind: CategoryKind::TrafficLevel,
                value: label.to_string(),
            })
    }
}

impl TryFrom<Vec<String>> for LabelCodec {
    type Error = PipelineError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<LabelCodec> for Vec<String> {
    fn from(codec: LabelCodec) -> Self {
        codec.labels
    }
}

/// Which mapping produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    Persisted,
    StaticFallback,
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelPolicy::Persisted => write!(f, "persisted codec"),
            LabelPolicy::StaticFallback => write!(f, "static fallback"),
        }
    }
}

/// A codec tagged with the policy it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDecoder {
    codec: LabelCodec,
    policy: LabelPolicy,
}

impl LabelDecoder {
    pub fn persisted(codec: LabelCodec) -> Self {
        Self {
            codec,
            policy: LabelPolicy::Persisted,
        }
    }

    pub fn static_fallback() -> Self {
        Self {
            codec: LabelCodec::static_fallback(),
            policy: LabelPolicy::StaticFallback,
        }
    }

    pub fn policy(&self) -> LabelPolicy {
        self.policy
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.codec.decode(index)
    }
}
