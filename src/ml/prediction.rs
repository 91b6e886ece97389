//! Prediction result types

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::labels::LabelPolicy;

/// Probability assigned to one traffic level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// A decoded traffic-level prediction for one junction and time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficPrediction {
    /// Observation time in the reference zone
    pub timestamp: DateTime<FixedOffset>,
    pub junction: String,
    pub class_index: usize,
    /// Human-readable traffic level
    pub label: String,
    /// Which label mapping produced `label`
    pub label_policy: LabelPolicy,
    /// Per-class probabilities in codec order, when requested and available
    pub probabilities: Option<Vec<ClassProbability>>,
}

impl TrafficPrediction {
    /// Probability of the predicted class, if probabilities are present.
    pub fn confidence(&self) -> Option<f64> {
        self.probabilities
            .as_ref()?
            .get(self.class_index)
            .map(|p| p.probability)
    }

    pub fn probability_of(&self, label: &str) -> Option<f64> {
        self.probabilities
            .as_ref()?
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.probability)
    }

    /// True if probabilities, when present, form a distribution.
    pub fn is_valid(&self) -> bool {
        match &self.probabilities {
            None => true,
            Some(probs) => {
                let sum: f64 = probs.iter().map(|p| p.probability).sum();
                self.class_index < probs.len()
                    && probs.iter().all(|p| (0.0..=1.0).contains(&p.probability))
                    && (sum - 1.0).abs() < 1e-6
            }
        }
    }
}
