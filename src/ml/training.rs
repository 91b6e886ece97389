//! Training side of the feature contract
//!
//! Builds the vocabulary, expected schema, label codec and aligned feature
//! matrix from historical observations, through the same extractor and
//! aligner that serve predictions. Fitting the trees is left to an external
//! trainer that consumes the matrix.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use chrono::Timelike;

use super::calendar::{CalendarPolicy, DEFAULT_UTC_OFFSET_MINUTES, ObservationTime};
use super::encoding::Vocabulary;
use super::features::{FeatureContract, FeatureExtractor};
use super::labels::LabelCodec;
use super::persistence::{ArtifactStore, save_contract};
use super::schema::FeatureSchema;
use crate::error::{PipelineError, Result};
use crate::history::Observation;

/// Column holding the encoded class in the exported matrix.
pub const TARGET_COLUMN: &str = "TrafficLevel";

/// Everything a trainer needs, plus the artifacts inference will load.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub contract: FeatureContract,
    pub schema: FeatureSchema,
    pub codec: LabelCodec,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<usize>,
}

impl TrainingSet {
    /// Persist contract, schema and codec.
    pub fn save(&self, store: &dyn ArtifactStore) -> Result<()> {
        save_contract(store, &self.contract, &self.schema, &self.codec)
    }

    /// Write the matrix as CSV: schema columns then the target index.
    pub fn write_matrix<W: Write>(&self, writer: W) -> Result<()> {
        let io_err = |e: csv::Error| PipelineError::Dataset(format!("writing matrix: {e}"));
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = self.schema.columns().iter().map(String::as_str).collect();
        header.push(TARGET_COLUMN);
        wtr.write_record(&header).map_err(io_err)?;

        for (row, target) in self.rows.iter().zip(&self.targets) {
            let mut record: Vec<String> = row.iter().map(f64::to_string).collect();
            record.push(target.to_string());
            wtr.write_record(&record).map_err(io_err)?;
        }

        wtr.flush()
            .map_err(|e| PipelineError::Dataset(format!("writing matrix: {e}")))
    }

    pub fn write_matrix_to_path(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| PipelineError::Dataset(format!("{}: {e}", path.display())))?;
        self.write_matrix(file)
    }
}

/// Prepares training data from labelled observations.
#[derive(Debug, Clone)]
pub struct TrainingDataPreparer {
    policy: CalendarPolicy,
    utc_offset_minutes: i32,
    min_samples: usize,
}

impl Default for TrainingDataPreparer {
    fn default() -> Self {
        Self {
            policy: CalendarPolicy::CANONICAL,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            min_samples: 1,
        }
    }
}

impl TrainingDataPreparer {
    pub fn new(policy: CalendarPolicy, utc_offset_minutes: i32) -> Self {
        Self {
            policy,
            utc_offset_minutes,
            ..Self::default()
        }
    }

    pub fn min_samples(mut self, n: usize) -> Self {
        self.min_samples = n;
        self
    }

    pub fn prepare(&self, observations: &[Observation]) -> Result<TrainingSet> {
        if observations.len() < self.min_samples.max(1) {
            return Err(PipelineError::Dataset(format!(
                "insufficient data for training: {} observations, need {}",
                observations.len(),
                self.min_samples.max(1)
            )));
        }

        let junctions: BTreeSet<&str> = observations.iter().map(|o| o.junction.as_str()).collect();
        let contract = FeatureContract::new(
            Vocabulary::new(junctions)?,
            self.policy,
            self.utc_offset_minutes,
        );
        contract.validate()?;

        let schema = FeatureSchema::for_vocabulary(&contract.vocabulary);
        let codec = LabelCodec::fit(observations.iter().map(|o| o.traffic_level.as_str()))?;
        let extractor = FeatureExtractor::new(&contract);
        let zone = contract.zone()?;

        let mut rows = Vec::with_capacity(observations.len());
        let mut targets = Vec::with_capacity(observations.len());

        for obs in observations {
            let time = ObservationTime::from_local(obs.date, obs.time.hour(), obs.time.minute(), zone)?;
            let raw = extractor.extract(&time, &obs.junction)?;
            rows.push(schema.align(&raw)?);
            targets.push(codec.encode(&obs.traffic_level)?);
        }

        tracing::info!(
            "Prepared {} rows x {} columns, {} junctions, labels {:?}",
            rows.len(),
            schema.len(),
            contract.vocabulary.junctions.len(),
            codec.labels()
        );

        Ok(TrainingSet {
            contract,
            schema,
            codec,
            rows,
            targets,
        })
    }
}
