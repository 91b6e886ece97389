//! Expected schema and column alignment
//!
//! The schema is the ordered list of column names the classifier was fit
//! against. Alignment projects a raw feature map onto it: absent columns
//! become 0.0, unknown columns are dropped, and the output always has the
//! schema's length and order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::encoding::Vocabulary;
use super::features::{NUMERIC_FEATURES, RawFeatures};
use crate::error::{PipelineError, Result};

/// Project `raw` onto `expected`, in `expected` order.
pub fn align(raw: &RawFeatures, expected: &[String]) -> Result<Vec<f64>> {
    if expected.is_empty() {
        return Err(PipelineError::SchemaMismatch(
            "expected schema is empty".to_string(),
        ));
    }
    Ok(expected
        .iter()
        .map(|name| raw.get(name).copied().unwrap_or(0.0))
        .collect())
}

/// Ordered, duplicate-free list of feature names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PipelineError::SchemaMismatch(
                "expected schema is empty".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::SchemaMismatch(format!(
                "column {dup:?} appears more than once in the expected schema"
            )));
        }
        Ok(Self { columns })
    }

    /// Training layout: numeric columns, then part of day, then junctions.
    pub fn for_vocabulary(vocabulary: &Vocabulary) -> Self {
        let mut columns: Vec<String> = NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect();
        columns.extend(vocabulary.column_names());
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn align(&self, raw: &RawFeatures) -> Result<Vec<f64>> {
        align(raw, &self.columns)
    }

    /// Pair aligned values with their column names.
    pub fn label<'a>(&'a self, values: &[f64]) -> Vec<(&'a str, f64)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(values.iter().copied())
            .collect()
    }

    /// Check the schema against the vocabulary the extractor will use.
    ///
    /// A prefixed column naming a category outside the vocabulary could never
    /// be set, so it is an error. Drift in the other direction is reported.
    pub fn check_vocabulary(&self, vocabulary: &Vocabulary) -> Result<SchemaReport> {
        for column in &self.columns {
            if let Some(owner) = vocabulary.owner_of(column) {
                let category = owner.category_of(column).unwrap_or_default();
                if !owner.contains(category) {
                    return Err(PipelineError::SchemaMismatch(format!(
                        "schema column {column:?} has no {} vocabulary entry {category:?}",
                        owner.prefix
                    )));
                }
            }
        }

        let produced: Vec<String> = NUMERIC_FEATURES
            .iter()
            .map(|s| s.to_string())
            .chain(vocabulary.column_names())
            .collect();

        let dropped = produced
            .iter()
            .filter(|p| self.position(p).is_none())
            .cloned()
            .collect();
        let always_zero = self
            .columns
            .iter()
            .filter(|c| !produced.contains(c))
            .cloned()
            .collect();

        Ok(SchemaReport {
            dropped,
            always_zero,
        })
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = PipelineError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.columns
    }
}

/// Columns that exist on only one side of the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Produced by the extractor but not in the schema
    pub dropped: Vec<String>,
    /// In the schema but never produced; always aligned to 0.0
    pub always_zero: Vec<String>,
}

impl SchemaReport {
    pub fn is_exact(&self) -> bool {
        self.dropped.is_empty() && self.always_zero.is_empty()
    }
}
