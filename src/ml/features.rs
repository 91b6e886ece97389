//! Feature extraction for traffic predictions
//!
//! Combines calendar features and one-hot indicators into a named feature
//! map. The map is not yet ordered; [`super::schema::FeatureSchema::align`]
//! turns it into the vector the classifier consumes.

use std::collections::BTreeMap;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::calendar::{CalendarFeatures, CalendarPolicy, ObservationTime, reference_zone};
use super::encoding::Vocabulary;
use crate::error::{PipelineError, Result};

/// Named, unordered feature values for one observation.
pub type RawFeatures = BTreeMap<String, f64>;

/// Numeric calendar columns, in training order.
pub const NUMERIC_FEATURES: [&str; 9] = [
    "Hour",
    "DayOfWeek",
    "Month",
    "Year",
    "IsWeekend",
    "IsMonthStart",
    "IsMonthEnd",
    "IsWeekendMorning",
    "Quarter",
];

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl CalendarFeatures {
    /// Values matching [`NUMERIC_FEATURES`] position for position.
    pub fn numeric_values(&self) -> [f64; 9] {
        [
            self.hour as f64,
            self.day_of_week as f64,
            self.month as f64,
            self.year as f64,
            flag(self.is_weekend),
            flag(self.is_month_start),
            flag(self.is_month_end),
            flag(self.is_weekend_morning),
            self.quarter as f64,
        ]
    }
}

/// Everything besides the column order that training and inference must
/// agree on. Persisted next to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureContract {
    pub version: u32,
    pub utc_offset_minutes: i32,
    pub policy: CalendarPolicy,
    pub vocabulary: Vocabulary,
}

impl FeatureContract {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(vocabulary: Vocabulary, policy: CalendarPolicy, utc_offset_minutes: i32) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            utc_offset_minutes,
            policy,
            vocabulary,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version > Self::CURRENT_VERSION {
            return Err(PipelineError::SchemaMismatch(format!(
                "feature contract v{} is newer than supported v{}",
                self.version,
                Self::CURRENT_VERSION
            )));
        }
        reference_zone(self.utc_offset_minutes)?;
        self.policy.validate()?;
        self.vocabulary.validate()
    }

    pub fn zone(&self) -> Result<FixedOffset> {
        reference_zone(self.utc_offset_minutes)
    }
}

/// Builds raw feature maps from (timestamp, junction) pairs.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    policy: CalendarPolicy,
    vocabulary: Vocabulary,
}

impl FeatureExtractor {
    pub fn new(contract: &FeatureContract) -> Self {
        Self {
            policy: contract.policy,
            vocabulary: contract.vocabulary.clone(),
        }
    }

    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Calendar features plus the full set of indicator columns.
    pub fn extract(&self, time: &ObservationTime, junction: &str) -> Result<RawFeatures> {
        let calendar = self.policy.extract(time);
        let mut features = self.vocabulary.encode(junction, calendar.part_of_day)?;

        for (name, value) in NUMERIC_FEATURES.iter().zip(calendar.numeric_values()) {
            features.insert((*name).to_string(), value);
        }

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::ml::calendar::DEFAULT_UTC_OFFSET_MINUTES;
    use crate::ml::encoding::KNOWN_JUNCTIONS;

    fn contract() -> FeatureContract {
        FeatureContract::new(
            Vocabulary::new(KNOWN_JUNCTIONS).unwrap(),
            CalendarPolicy::CANONICAL,
            DEFAULT_UTC_OFFSET_MINUTES,
        )
    }

    fn at(y: i32, m: u32, d: u32, hour: u32) -> ObservationTime {
        let zone = reference_zone(DEFAULT_UTC_OFFSET_MINUTES).unwrap();
        ObservationTime::from_local(NaiveDate::from_ymd_opt(y, m, d).unwrap(), hour, 0, zone)
            .unwrap()
    }

    #[test]
    fn test_extract_contains_every_column() {
        let extractor = FeatureExtractor::new(&contract());
        let features = extractor.extract(&at(2024, 3, 2, 7), "Hebbal").unwrap();

        assert_eq!(features.len(), NUMERIC_FEATURES.len() + 8);
        assert_eq!(features["Hour"], 7.0);
        assert_eq!(features["DayOfWeek"], 5.0);
        assert_eq!(features["Year"], 2024.0);
        assert_eq!(features["IsWeekend"], 1.0);
        assert_eq!(features["IsWeekendMorning"], 1.0);
        assert_eq!(features["IsMonthStart"], 1.0);
        assert_eq!(features["IsMonthEnd"], 0.0);
        assert_eq!(features["Quarter"], 1.0);
        assert_eq!(features["PartOfDay_Morning"], 1.0);
        assert_eq!(features["JunctionName_Hebbal"], 1.0);
    }

    #[test]
    fn test_extract_unknown_junction() {
        let extractor = FeatureExtractor::new(&contract());
        let result = extractor.extract(&at(2024, 3, 2, 7), "Silk Board");
        assert!(matches!(
            result,
            Err(PipelineError::UnknownCategory { .. })
        ));
    }

    #[test]
    fn test_contract_validation() {
        assert!(contract().validate().is_ok());

        let mut newer = contract();
        newer.version = FeatureContract::CURRENT_VERSION + 1;
        assert!(matches!(
            newer.validate(),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_contract_json_shape() {
        let json = serde_json::to_value(contract()).unwrap();
        assert_eq!(json["utc_offset_minutes"], 330);
        assert_eq!(json["policy"]["month_end_min_day"], 28);
        assert_eq!(json["vocabulary"]["junctions"]["prefix"], "JunctionName");
    }
}
