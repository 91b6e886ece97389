//! Machine Learning module for traffic-level prediction
//!
//! Data flows calendar extraction -> one-hot encoding -> schema alignment ->
//! classifier -> label decoding. Training and inference share the first
//! three steps so both sides see identical feature vectors.

pub mod calendar;
pub mod encoding;
pub mod features;
pub mod labels;
pub mod model;
pub mod persistence;
pub mod prediction;
pub mod schema;
pub mod training;

use chrono::{FixedOffset, NaiveDate};

use crate::error::{PipelineError, Result};
use crate::traits::Clock;

pub use calendar::{CalendarFeatures, CalendarPolicy, ObservationTime, PartOfDay};
pub use encoding::{CategoryVocabulary, Vocabulary};
pub use features::{FeatureContract, FeatureExtractor, RawFeatures};
pub use labels::{LabelCodec, LabelDecoder, LabelPolicy};
pub use model::{Classifier, ClassifierAdapter, GbdtClassifier};
pub use persistence::{ArtifactBundle, ArtifactStore, DirectoryStore, LoadOptions, MemoryStore};
pub use prediction::{ClassProbability, TrafficPrediction};
pub use schema::FeatureSchema;

/// Immutable prediction context built once from loaded artifacts.
///
/// Holds no interior mutability, so it can be shared across threads behind
/// a plain reference or `Arc`.
#[derive(Debug)]
pub struct Predictor {
    extractor: FeatureExtractor,
    zone: FixedOffset,
    classifier: ClassifierAdapter,
    labels: LabelDecoder,
}

impl Predictor {
    pub fn new(bundle: ArtifactBundle) -> Result<Self> {
        Ok(Self {
            extractor: FeatureExtractor::new(&bundle.contract),
            zone: bundle.contract.zone()?,
            classifier: bundle.classifier,
            labels: bundle.labels,
        })
    }

    /// Load artifacts from `store` and build the context in one step.
    pub fn load(store: &dyn ArtifactStore, options: LoadOptions) -> Result<Self> {
        Self::new(ArtifactBundle::load(store, options)?)
    }

    pub fn zone(&self) -> FixedOffset {
        self.zone
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.extractor.vocabulary()
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.classifier.schema()
    }

    pub fn label_policy(&self) -> LabelPolicy {
        self.labels.policy()
    }

    /// Interpret a wall-clock date and time in the reference zone.
    pub fn observe_local(&self, date: NaiveDate, hour: u32, minute: u32) -> Result<ObservationTime> {
        ObservationTime::from_local(date, hour, minute, self.zone)
    }

    pub fn observe_now(&self, clock: &dyn Clock) -> ObservationTime {
        ObservationTime::from_utc(clock.now_utc(), self.zone)
    }

    fn check_zone(&self, time: &ObservationTime) -> Result<()> {
        let offset = *time.datetime().offset();
        if offset != self.zone {
            return Err(PipelineError::InvalidTimestamp(format!(
                "{time} is not in the reference zone {}",
                self.zone
            )));
        }
        Ok(())
    }

    /// The aligned feature vector for a junction at a time.
    pub fn features(&self, time: &ObservationTime, junction: &str) -> Result<Vec<f64>> {
        self.check_zone(time)?;
        let raw = self.extractor.extract(time, junction)?;
        let aligned = self.classifier.schema().align(&raw)?;
        tracing::debug!(
            "Aligned features for {junction} at {time}: {:?}",
            self.classifier.schema().label(&aligned)
        );
        Ok(aligned)
    }

    pub fn predict(
        &self,
        time: &ObservationTime,
        junction: &str,
        with_probabilities: bool,
    ) -> Result<TrafficPrediction> {
        let features = self.features(time, junction)?;
        let class_index = self.classifier.predict(&features)?;
        let label = self.labels.decode(class_index)?.to_string();

        let probabilities = if with_probabilities {
            self.classifier
                .predict_proba(&features)?
                .map(|probs| self.label_probabilities(&probs))
                .transpose()?
        } else {
            None
        };

        tracing::info!(
            "Predicted {label} (class {class_index}) for {junction} at {time} using {}",
            self.labels.policy()
        );

        Ok(TrafficPrediction {
            timestamp: time.datetime(),
            junction: junction.to_string(),
            class_index,
            label,
            label_policy: self.labels.policy(),
            probabilities,
        })
    }

    pub fn predict_now(
        &self,
        clock: &dyn Clock,
        junction: &str,
        with_probabilities: bool,
    ) -> Result<TrafficPrediction> {
        self.predict(&self.observe_now(clock), junction, with_probabilities)
    }

    fn label_probabilities(&self, probs: &[f64]) -> Result<Vec<ClassProbability>> {
        probs
            .iter()
            .enumerate()
            .map(|(index, &probability)| {
                Ok(ClassProbability {
                    label: self.labels.decode(index)?.to_string(),
                    probability,
                })
            })
            .collect()
    }
}
