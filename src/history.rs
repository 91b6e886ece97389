//! Historical traffic observations
//!
//! Loads the CSV the model was trained from and computes per-hour
//! aggregates for the charting side. Nothing here is used at inference time.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// One labelled row from the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub junction: String,
    pub traffic_level: String,
}

#[derive(Debug, Deserialize)]
struct ObservationRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Junction")]
    junction: String,
    #[serde(rename = "TrafficLevel", alias = "Traffic")]
    traffic_level: String,
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
}

impl TryFrom<(usize, ObservationRow)> for Observation {
    type Error = PipelineError;

    fn try_from((line, row): (usize, ObservationRow)) -> Result<Self> {
        let date = parse_date(&row.date).ok_or_else(|| {
            PipelineError::Dataset(format!("row {line}: unrecognised date {:?}", row.date))
        })?;
        let time = parse_time(&row.time).ok_or_else(|| {
            PipelineError::Dataset(format!("row {line}: unrecognised time {:?}", row.time))
        })?;
        if row.junction.is_empty() || row.traffic_level.is_empty() {
            return Err(PipelineError::Dataset(format!(
                "row {line}: junction and traffic level must not be empty"
            )));
        }
        Ok(Self {
            date,
            time,
            junction: row.junction,
            traffic_level: row.traffic_level,
        })
    }
}

/// Parse observations from CSV with a header row.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    rdr.deserialize::<ObservationRow>()
        .enumerate()
        .map(|(i, row)| {
            // Header is line 1
            let line = i + 2;
            let row = row.map_err(|e| PipelineError::Dataset(format!("row {line}: {e}")))?;
            Observation::try_from((line, row))
        })
        .collect()
}

pub fn load_observations(path: &Path) -> Result<Vec<Observation>> {
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::Dataset(format!("{}: {e}", path.display())))?;
    let observations = read_observations(file)?;
    tracing::info!(
        "Loaded {} observations from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}

/// Traffic level counts for one junction and hour of day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlyLevelCounts {
    pub junction: String,
    pub hour: u32,
    pub counts: BTreeMap<String, usize>,
}

impl HourlyLevelCounts {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Most frequent level; alphabetical order breaks ties.
    pub fn modal_level(&self) -> Option<&str> {
        self.counts
            .iter()
            .fold(None, |best: Option<(&String, usize)>, (level, &n)| match best {
                Some((_, best_n)) if best_n >= n => best,
                _ => Some((level, n)),
            })
            .map(|(level, _)| level.as_str())
    }

    /// Share of observations at `level`, in `[0, 1]`.
    pub fn share(&self, level: &str) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.get(level).copied().unwrap_or(0) as f64 / total as f64
    }
}

/// Group observations by junction and hour, sorted by both.
pub fn hourly_level_counts(observations: &[Observation]) -> Vec<HourlyLevelCounts> {
    let mut groups: BTreeMap<(&str, u32), BTreeMap<String, usize>> = BTreeMap::new();

    for obs in observations {
        *groups
            .entry((obs.junction.as_str(), obs.time.hour()))
            .or_default()
            .entry(obs.traffic_level.clone())
            .or_default() += 1;
    }

    groups
        .into_iter()
        .map(|((junction, hour), counts)| HourlyLevelCounts {
            junction: junction.to_string(),
            hour,
            counts,
        })
        .collect()
}

/// The `top_n` (junction, hour) slots with the highest share of `level`.
pub fn busiest_hours<'a>(
    aggregates: &'a [HourlyLevelCounts],
    level: &str,
    top_n: usize,
) -> Vec<(&'a str, u32, f64)> {
    let mut ranked: Vec<_> = aggregates
        .iter()
        .map(|a| (a.junction.as_str(), a.hour, a.share(level)))
        .filter(|(_, _, share)| *share > 0.0)
        .collect();

    ranked.sort_by(|a, b| b.2.total_cmp(&a.2));
    ranked.truncate(top_n);
    ranked
}
