//! Fixed-vocabulary one-hot encoding
//!
//! The vocabulary is decided once at training time and persisted. Every
//! request is encoded against the full vocabulary, so a single row always
//! produces every indicator column, not just the one it happens to hit.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::calendar::PartOfDay;
use crate::error::{CategoryKind, PipelineError, Result};

pub const JUNCTION_PREFIX: &str = "JunctionName";
pub const PART_OF_DAY_PREFIX: &str = "PartOfDay";

/// Junctions observed in the reference dataset.
pub const KNOWN_JUNCTIONS: [&str; 4] = ["Electronic City", "Hebbal", "KR Puram", "Nagawara"];

/// One closed, ordered set of categories sharing a column prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub prefix: String,
    pub categories: Vec<String>,
}

impl CategoryVocabulary {
    /// Create a vocabulary, rejecting empty sets, blank or padded names, and
    /// names that differ only by case.
    pub fn new<I, S>(prefix: &str, categories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        let vocab = Self {
            prefix: prefix.to_string(),
            categories,
        };
        vocab.validate()?;
        Ok(vocab)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(PipelineError::SchemaMismatch(
                "vocabulary prefix is empty".to_string(),
            ));
        }
        if self.categories.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "vocabulary {} has no categories",
                self.prefix
            )));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.is_empty() || category.trim() != category {
                return Err(PipelineError::SchemaMismatch(format!(
                    "vocabulary {} has a blank or padded category {category:?}",
                    self.prefix
                )));
            }
            if !seen.insert(category.to_lowercase()) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "vocabulary {} lists {category:?} more than once",
                    self.prefix
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    pub fn column_name(&self, category: &str) -> String {
        format!("{}_{}", self.prefix, category)
    }

    /// Indicator column names in vocabulary order.
    pub fn column_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| self.column_name(c)).collect()
    }

    /// If `column` belongs to this vocabulary's prefix, return its category
    /// suffix (which may or may not be a known category).
    pub fn category_of<'a>(&self, column: &'a str) -> Option<&'a str> {
        column
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
    }

    /// Write one indicator per category into `out`; exactly one is 1.0.
    pub fn one_hot_into(
        &self,
        value: &str,
        kind: CategoryKind,
        out: &mut BTreeMap<String, f64>,
    ) -> Result<()> {
        if !self.contains(value) {
            return Err(PipelineError::UnknownCategory {
                kind,
                value: value.to_string(),
            });
        }
        for category in &self.categories {
            let hit = if category == value { 1.0 } else { 0.0 };
            out.insert(self.column_name(category), hit);
        }
        Ok(())
    }
}

/// The persisted categorical vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub junctions: CategoryVocabulary,
    pub parts_of_day: CategoryVocabulary,
}

impl Vocabulary {
    /// Vocabulary over the given junctions and every part of day.
    pub fn new<I, S>(junctions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            junctions: CategoryVocabulary::new(JUNCTION_PREFIX, junctions)?,
            parts_of_day: CategoryVocabulary::new(
                PART_OF_DAY_PREFIX,
                PartOfDay::ALL.iter().map(|p| p.as_str()),
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.junctions.validate()?;
        self.parts_of_day.validate()?;
        if self.junctions.prefix == self.parts_of_day.prefix {
            return Err(PipelineError::SchemaMismatch(format!(
                "junction and part-of-day vocabularies share the prefix {}",
                self.junctions.prefix
            )));
        }
        Ok(())
    }

    /// Encode a junction and part of day against the full vocabulary.
    pub fn encode(&self, junction: &str, part_of_day: PartOfDay) -> Result<BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        self.junctions
            .one_hot_into(junction, CategoryKind::Junction, &mut out)?;
        self.parts_of_day
            .one_hot_into(part_of_day.as_str(), CategoryKind::PartOfDay, &mut out)?;
        Ok(out)
    }

    /// The vocabulary that claims `column` by prefix, if any.
    pub fn owner_of(&self, column: &str) -> Option<&CategoryVocabulary> {
        [&self.junctions, &self.parts_of_day]
            .into_iter()
            .find(|v| v.category_of(column).is_some())
    }

    /// All indicator columns: part of day first, then junctions.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = self.parts_of_day.column_names();
        names.extend(self.junctions.column_names());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::new(KNOWN_JUNCTIONS).unwrap()
    }

    #[test]
    fn test_encode_sets_exactly_one_junction() {
        let encoded = vocab().encode("Hebbal", PartOfDay::Morning).unwrap();

        assert_eq!(encoded.len(), 8);
        assert_eq!(encoded["JunctionName_Hebbal"], 1.0);
        assert_eq!(encoded["JunctionName_KR Puram"], 0.0);
        assert_eq!(encoded["JunctionName_Electronic City"], 0.0);
        assert_eq!(encoded["JunctionName_Nagawara"], 0.0);
        assert_eq!(encoded["PartOfDay_Morning"], 1.0);
        assert_eq!(encoded["PartOfDay_Night"], 0.0);
    }

    #[test]
    fn test_encode_unknown_junction_fails() {
        let err = vocab()
            .encode("Hebbal Junction", PartOfDay::Morning)
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::UnknownCategory {
                kind: CategoryKind::Junction,
                value: "Hebbal Junction".to_string(),
            }
        );
    }

    #[test]
    fn test_encode_part_of_day_missing_from_vocabulary() {
        let mut vocab = vocab();
        vocab.parts_of_day.categories.retain(|c| c != "Night");

        let err = vocab.encode("Hebbal", PartOfDay::Night).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownCategory {
                kind: CategoryKind::PartOfDay,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_case_synonyms() {
        let result = Vocabulary::new(["Hebbal", "hebbal"]);
        assert!(matches!(result, Err(PipelineError::SchemaMismatch(_))));
    }

    #[test]
    fn test_rejects_padded_and_empty() {
        assert!(Vocabulary::new(["Hebbal "]).is_err());
        assert!(Vocabulary::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_category_of() {
        let v = vocab();
        assert_eq!(v.junctions.category_of("JunctionName_KR Puram"), Some("KR Puram"));
        assert_eq!(v.junctions.category_of("JunctionNameX"), None);
        assert_eq!(v.junctions.category_of("Hour"), None);
        assert_eq!(
            v.owner_of("PartOfDay_Evening").map(|o| o.prefix.as_str()),
            Some(PART_OF_DAY_PREFIX)
        );
    }

    #[test]
    fn test_column_names_order() {
        let names = vocab().column_names();
        assert_eq!(
            names,
            vec![
                "PartOfDay_Afternoon",
                "PartOfDay_Evening",
                "PartOfDay_Morning",
                "PartOfDay_Night",
                "JunctionName_Electronic City",
                "JunctionName_Hebbal",
                "JunctionName_KR Puram",
                "JunctionName_Nagawara",
            ]
        );
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn every_known_junction_is_one_hot(idx in 0usize..4, pod in 0usize..4) {
                let v = vocab();
                let junction = KNOWN_JUNCTIONS[idx];
                let encoded = v.encode(junction, PartOfDay::ALL[pod]).unwrap();

                let junction_ones: f64 = v
                    .junctions
                    .column_names()
                    .iter()
                    .map(|c| encoded[c])
                    .sum();
                prop_assert_eq!(junction_ones, 1.0);
                prop_assert_eq!(encoded[&v.junctions.column_name(junction)], 1.0);
            }

            #[test]
            fn names_outside_the_set_are_rejected(name in "[a-z]{1,12}") {
                let result = vocab().encode(&name, PartOfDay::Morning);
                let is_unknown_category = matches!(
                    result,
                    Err(PipelineError::UnknownCategory { kind: CategoryKind::Junction, .. })
                );
                prop_assert!(is_unknown_category);
            }
        }
    }
}
