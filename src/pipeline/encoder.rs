//! Target encoding of categorical columns
//!
//! Two encodings exist and are kept apart on purpose:
//!
//! - [`FoldEncoder::fit`] sees only the training partition of one fold and
//!   produces an [`EncodingMap`] that lives for that fold alone. Validation
//!   rows are encoded through the map and never contribute to it.
//! - [`fit_deployment_encoding`] uses every row of the table and feeds the
//!   exported deployment artifact. It is never used for evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use super::table::FeatureTable;

/// Category value to mean target, with a fallback for unseen categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingMap {
    /// Mean target per category observed while fitting
    pub means: BTreeMap<String, f64>,
    /// Mean target over all fitting rows (0.0 when there were none)
    pub fallback: f64,
    /// Number of rows the map was fitted on
    pub fitted_rows: usize,
}

impl EncodingMap {
    /// Encoded value for one category
    pub fn encode(&self, category: &str) -> f64 {
        self.means.get(category).copied().unwrap_or(self.fallback)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.means.contains_key(category)
    }

    /// True when the map was fitted on zero rows and only holds the neutral fallback
    pub fn is_empty_fit(&self) -> bool {
        self.fitted_rows == 0
    }
}

/// Per-fold target encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldEncoder;

impl FoldEncoder {
    /// Fit an encoding from one fold's training rows only.
    ///
    /// With no training rows the map is empty, the fallback is 0.0 and
    /// [`EncodingMap::is_empty_fit`] reports it; this is not an error.
    pub fn fit(train_categories: &[String], train_targets: &[f64]) -> PipelineResult<EncodingMap> {
        fit_group_means(train_categories, train_targets)
    }

    /// Encode categories through a fitted map. Never refits.
    pub fn transform(map: &EncodingMap, categories: &[String]) -> Vec<f64> {
        categories.iter().map(|c| map.encode(c)).collect()
    }
}

/// Full-data encoding of a categorical column for the deployment artifact.
///
/// Uses every row of `table`; must not be used to score held-out rows.
pub fn fit_deployment_encoding(
    table: &FeatureTable,
    category_column: &str,
    target: &str,
) -> PipelineResult<EncodingMap> {
    let categories = table.labels(category_column)?;
    let targets = table.numeric(target)?;
    fit_group_means(&categories, targets)
}

fn fit_group_means(categories: &[String], targets: &[f64]) -> PipelineResult<EncodingMap> {
    if categories.len() != targets.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "encoder got {} categories but {} targets",
            categories.len(),
            targets.len()
        )));
    }

    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut total = 0.0;
    for (category, &y) in categories.iter().zip(targets) {
        let entry = groups.entry(category.clone()).or_insert((0.0, 0));
        entry.0 += y;
        entry.1 += 1;
        total += y;
    }

    let fallback = if targets.is_empty() {
        0.0
    } else {
        total / targets.len() as f64
    };

    let means = groups
        .into_iter()
        .map(|(category, (sum, count))| (category, sum / count as f64))
        .collect();

    Ok(EncodingMap {
        means,
        fallback,
        fitted_rows: targets.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::table::ColumnData;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_means_and_fallback() {
        let cats = labels(&["A", "A", "B", "C"]);
        let y = [100.0, 200.0, 400.0, 500.0];
        let map = FoldEncoder::fit(&cats, &y).unwrap();

        assert_eq!(map.encode("A"), 150.0);
        assert_eq!(map.encode("B"), 400.0);
        assert_eq!(map.fallback, 300.0);
        assert_eq!(map.fitted_rows, 4);
    }

    #[test]
    fn test_unseen_category_uses_fallback() {
        let map = FoldEncoder::fit(&labels(&["A", "B"]), &[10.0, 30.0]).unwrap();
        let encoded = FoldEncoder::transform(&map, &labels(&["B", "Z"]));
        assert_eq!(encoded, vec![30.0, 20.0]);
        assert!(!map.contains("Z"));
    }

    #[test]
    fn test_empty_fit_is_neutral() {
        let map = FoldEncoder::fit(&[], &[]).unwrap();
        assert!(map.is_empty_fit());
        assert_eq!(map.fallback, 0.0);
        assert_eq!(FoldEncoder::transform(&map, &labels(&["A"])), vec![0.0]);
    }

    #[test]
    fn test_length_mismatch_errors() {
        assert!(FoldEncoder::fit(&labels(&["A"]), &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_deployment_encoding_uses_all_rows() {
        let mut table = FeatureTable::new();
        table
            .push_column("NBHD", ColumnData::Numeric(vec![1.0, 1.0, 2.0]))
            .unwrap();
        table
            .push_column("PRICE", ColumnData::Numeric(vec![100.0, 300.0, 500.0]))
            .unwrap();

        let map = fit_deployment_encoding(&table, "NBHD", "PRICE").unwrap();
        assert_eq!(map.encode("1"), 200.0);
        assert_eq!(map.encode("2"), 500.0);
        assert_eq!(map.fitted_rows, 3);
    }
}
