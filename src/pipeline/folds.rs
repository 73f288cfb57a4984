//! K-fold partitioning of row indices
//!
//! Rows are shuffled once with a seeded RNG and then cut into k contiguous
//! validation blocks. The first `n % k` folds receive one extra row. Fold
//! assignment depends only on (n, k, seed). With more folds than rows the
//! trailing folds have empty validation sets; callers skip them.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::{PipelineError, PipelineResult};

/// One train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Zero-based fold index
    pub index: usize,
    /// Training row indices (ascending)
    pub train: Vec<usize>,
    /// Validation row indices (ascending)
    pub validation: Vec<usize>,
}

/// Split `n_rows` row indices into `k` shuffled folds
pub fn kfold_split(n_rows: usize, k: usize, seed: u64) -> PipelineResult<Vec<Fold>> {
    if k < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "number of folds must be at least 2, got {}",
            k
        )));
    }
    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let base = n_rows / k;
    let extra = n_rows % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for index in 0..k {
        let size = base + usize::from(index < extra);
        let end = start + size;

        let mut in_validation = vec![false; n_rows];
        let mut validation: Vec<usize> = order[start..end].to_vec();
        validation.sort_unstable();
        for &row in &validation {
            in_validation[row] = true;
        }
        let train: Vec<usize> = (0..n_rows).filter(|&row| !in_validation[row]).collect();

        folds.push(Fold {
            index,
            train,
            validation,
        });
        start = end;
    }

    Ok(folds)
}
