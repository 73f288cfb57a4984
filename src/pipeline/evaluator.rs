//! Fold scoring and cross-fold aggregation

use serde::Serialize;

/// Accuracy of one fold's validation predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FoldScore {
    /// Coefficient of determination
    pub r2: f64,
    /// Root-mean-squared error in currency units
    pub rmse: f64,
}

/// Aggregate over the scored folds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CvMetrics {
    pub r2_mean: f64,
    /// Population standard deviation of the fold r2 values
    pub r2_std: f64,
    pub rmse_mean: f64,
    /// Number of folds that contributed
    pub folds: usize,
}

/// Score predictions against truth.
///
/// Returns `None` for empty input. A constant `y_true` gives r2 = 1.0 for a
/// perfect prediction and 0.0 otherwise.
pub fn score(y_true: &[f64], y_pred: &[f64]) -> Option<FoldScore> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return None;
    }

    let n = y_true.len() as f64;
    let mean = y_true.iter().sum::<f64>() / n;

    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Some(FoldScore {
        r2,
        rmse: (ss_res / n).sqrt(),
    })
}

/// Unweighted mean and population standard deviation across folds
pub fn aggregate(scores: &[FoldScore]) -> Option<CvMetrics> {
    if scores.is_empty() {
        return None;
    }

    let k = scores.len() as f64;
    let r2_mean = scores.iter().map(|s| s.r2).sum::<f64>() / k;
    let r2_var = scores
        .iter()
        .map(|s| (s.r2 - r2_mean) * (s.r2 - r2_mean))
        .sum::<f64>()
        / k;
    let rmse_mean = scores.iter().map(|s| s.rmse).sum::<f64>() / k;

    Some(CvMetrics {
        r2_mean,
        r2_std: r2_var.sqrt(),
        rmse_mean,
        folds: scores.len(),
    })
}
