//! Quantile bucketing of the training target
//!
//! Edges are the 0, 1/q, ..., 1 quantiles of the training target (linear
//! interpolation between order statistics). Duplicate edges are dropped, so
//! skewed or tied targets simply yield fewer buckets. Buckets are
//! right-closed with the lowest edge included in bucket 0.

use thiserror::Error;

/// Reasons bucketing cannot produce any bucket
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DegenerateBinning {
    #[error("no target values to bin")]
    Empty,

    #[error("target contains non-finite values")]
    NonFinite,

    #[error("only {distinct} distinct target value(s); at least 2 are needed")]
    TooFewDistinct { distinct: usize },
}

/// Bucket edges computed from one training partition
#[derive(Debug, Clone, PartialEq)]
pub struct BucketEdges {
    edges: Vec<f64>,
}

impl BucketEdges {
    /// Compute up to `bucket_count` equal-frequency buckets from `targets`
    pub fn fit(targets: &[f64], bucket_count: usize) -> Result<Self, DegenerateBinning> {
        if targets.is_empty() {
            return Err(DegenerateBinning::Empty);
        }
        if targets.iter().any(|y| !y.is_finite()) {
            return Err(DegenerateBinning::NonFinite);
        }

        let mut sorted = targets.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut edges: Vec<f64> = (0..=bucket_count)
            .map(|i| quantile_sorted(&sorted, i as f64 / bucket_count as f64))
            .collect();
        edges.dedup();

        if edges.len() < 2 {
            let mut distinct = sorted.clone();
            distinct.dedup();
            return Err(DegenerateBinning::TooFewDistinct {
                distinct: distinct.len(),
            });
        }

        Ok(Self { edges })
    }

    /// Number of buckets actually formed
    pub fn bucket_count(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bucket index of one value, clamped to the fitted range
    pub fn assign(&self, value: f64) -> usize {
        let pos = self.edges.partition_point(|&e| e < value);
        pos.saturating_sub(1).min(self.bucket_count() - 1)
    }

    /// Bucket indices as a continuous regression target
    pub fn labels(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.assign(v) as f64).collect()
    }
}

/// Quantile of an ascending slice using linear interpolation
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_bucket_count_on_distinct_values() {
        let targets: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let edges = BucketEdges::fit(&targets, 100).unwrap();
        assert_eq!(edges.bucket_count(), 100);

        let labels = edges.labels(&targets);
        assert_eq!(labels[0], 0.0);
        assert_eq!(labels[999], 99.0);
        // Equal-frequency: each bucket gets about 10 rows
        let in_first = labels.iter().filter(|&&l| l == 0.0).count();
        assert!((9..=11).contains(&in_first), "first bucket has {}", in_first);
    }

    #[test]
    fn test_duplicate_edges_reduce_bucket_count() {
        let mut targets = vec![100.0; 90];
        targets.extend((0..10).map(|i| 200.0 + i as f64));
        let edges = BucketEdges::fit(&targets, 100).unwrap();
        assert!(edges.bucket_count() < 100);
        assert!(edges.bucket_count() >= 1);
        assert_eq!(edges.assign(100.0), 0);
    }

    #[test]
    fn test_two_distinct_values_form_one_bucket_at_least() {
        let edges = BucketEdges::fit(&[1.0, 2.0], 100).unwrap();
        assert!(edges.bucket_count() >= 1);
        assert_eq!(edges.assign(1.0), 0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(BucketEdges::fit(&[], 100), Err(DegenerateBinning::Empty));
        assert_eq!(
            BucketEdges::fit(&[5.0, 5.0, 5.0], 100),
            Err(DegenerateBinning::TooFewDistinct { distinct: 1 })
        );
        assert_eq!(
            BucketEdges::fit(&[1.0, f64::NAN], 100),
            Err(DegenerateBinning::NonFinite)
        );
    }

    #[test]
    fn test_assign_clamps_out_of_range() {
        let edges = BucketEdges::fit(&[0.0, 10.0, 20.0, 30.0], 3).unwrap();
        assert_eq!(edges.assign(-5.0), 0);
        assert_eq!(edges.assign(100.0), edges.bucket_count() - 1);
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.0), 1.0);
        assert_eq!(quantile_sorted(&sorted, 1.0), 4.0);
        assert!((quantile_sorted(&sorted, 0.5) - 2.5).abs() < 1e-12);
    }
}
