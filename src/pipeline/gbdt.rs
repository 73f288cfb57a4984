//! Gradient-boosted regression trees
//!
//! A compact, deterministic histogram GBDT with squared loss:
//!
//! 1. Every feature is cut into at most `max_bins` bins from its sorted
//!    unique training values.
//! 2. Each round fits a depth-wise tree to the gradients `pred - y`
//!    (hessian 1 per row), choosing splits by the regularized gain
//!    `GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)`.
//! 3. Leaf weights are `-lr * G / (H + λ)`.
//!
//! Training is single-threaded so that running folds in parallel never
//! multiplies the thread count. The only randomness is optional row
//! subsampling, driven by a seeded RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::config::LearnerParams;
use super::error::LearnerError;
use super::learner::Learner;
use super::table::FeatureMatrix;

/// Minimum gain improvement for a split to be taken
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// A tree node stored in a flat arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `value <= threshold` (or NaN) go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree; node 0 is the root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] > *threshold { *right } else { *left };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

/// Per-feature bin boundaries and the binned training matrix
struct BinnedFeatures {
    /// Ascending upper bounds; bin `b` holds values in `(cuts[b-1], cuts[b]]`
    cuts: Vec<Vec<f64>>,
    /// `bins[feature][row]`
    bins: Vec<Vec<u16>>,
}

impl BinnedFeatures {
    fn build(x: &FeatureMatrix, max_bins: usize) -> Self {
        let mut cuts = Vec::with_capacity(x.n_cols());
        let mut bins = Vec::with_capacity(x.n_cols());

        for c in 0..x.n_cols() {
            let column = x.column(c);
            let feature_cuts = compute_cuts(&column, max_bins);
            // +inf lands in the last bin
            let last_bin = feature_cuts.len().saturating_sub(1);
            let feature_bins = column
                .iter()
                .map(|&v| feature_cuts.partition_point(|&cut| cut < v).min(last_bin) as u16)
                .collect();
            cuts.push(feature_cuts);
            bins.push(feature_bins);
        }

        Self { cuts, bins }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len().max(1)
    }
}

/// Bin upper bounds from the sorted unique finite values of a column
fn compute_cuts(values: &[f64], max_bins: usize) -> Vec<f64> {
    let mut unique: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    unique.sort_by(|a, b| a.total_cmp(b));
    unique.dedup();

    if unique.len() <= max_bins {
        return unique;
    }

    let u = unique.len();
    let mut cuts: Vec<f64> = (0..max_bins)
        .map(|i| unique[((i + 1) * u) / max_bins - 1])
        .collect();
    cuts.dedup();
    cuts
}

/// Best split found for a node
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Gradient-boosted tree ensemble for regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: LearnerParams,
    base_score: f64,
    trees: Vec<Tree>,
    feature_names: Vec<String>,
    fitted: bool,
}

impl GradientBoostedTrees {
    pub fn new(params: LearnerParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
            feature_names: Vec::new(),
            fitted: false,
        }
    }

    pub fn params(&self) -> &LearnerParams {
        &self.params
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Column names seen during fit, in order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn leaf_weight(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        -self.params.learning_rate * grad_sum / (hess_sum + self.params.lambda)
    }

    fn score(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        grad_sum * grad_sum / (hess_sum + self.params.lambda)
    }

    fn grow_tree(&self, binned: &BinnedFeatures, rows: Vec<usize>, grads: &[f64]) -> Tree {
        let mut nodes = Vec::new();
        self.grow_node(binned, rows, grads, 0, &mut nodes);
        Tree { nodes }
    }

    fn grow_node(
        &self,
        binned: &BinnedFeatures,
        rows: Vec<usize>,
        grads: &[f64],
        depth: usize,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let grad_sum: f64 = rows.iter().map(|&r| grads[r]).sum();
        let hess_sum = rows.len() as f64;

        let idx = nodes.len();
        nodes.push(Node::Leaf {
            value: self.leaf_weight(grad_sum, hess_sum),
        });

        if depth >= self.params.max_depth || hess_sum < 2.0 * self.params.min_child_weight {
            return idx;
        }

        let Some(split) = self.find_best_split(binned, &rows, grads, grad_sum, hess_sum) else {
            return idx;
        };

        let feature_bins = &binned.bins[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| (feature_bins[r] as usize) <= split.bin);

        let left = self.grow_node(binned, left_rows, grads, depth + 1, nodes);
        let right = self.grow_node(binned, right_rows, grads, depth + 1, nodes);

        nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: binned.cuts[split.feature][split.bin],
            left,
            right,
        };
        idx
    }

    fn find_best_split(
        &self,
        binned: &BinnedFeatures,
        rows: &[usize],
        grads: &[f64],
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<SplitCandidate> {
        let parent_score = self.score(grad_sum, hess_sum);
        let min_child = self.params.min_child_weight;
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..binned.cuts.len() {
            let n_bins = binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }

            // Histogram of (gradient sum, hessian sum) per bin
            let mut hist = vec![(0.0f64, 0.0f64); n_bins];
            let feature_bins = &binned.bins[feature];
            for &r in rows {
                let slot = &mut hist[feature_bins[r] as usize];
                slot.0 += grads[r];
                slot.1 += 1.0;
            }

            let mut left_grad = 0.0;
            let mut left_hess = 0.0;
            for (bin, &(g, h)) in hist.iter().enumerate().take(n_bins - 1) {
                left_grad += g;
                left_hess += h;
                let right_hess = hess_sum - left_hess;
                if left_hess < min_child || right_hess < min_child {
                    continue;
                }
                let right_grad = grad_sum - left_grad;
                let gain = self.score(left_grad, left_hess) + self.score(right_grad, right_hess)
                    - parent_score;

                let best_gain = best.as_ref().map(|b| b.gain).unwrap_or(0.0);
                if gain > best_gain + MIN_SPLIT_GAIN {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

impl Learner for GradientBoostedTrees {
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), LearnerError> {
        if x.n_rows() != y.len() {
            return Err(LearnerError::ShapeMismatch {
                expected: format!("{} targets", x.n_rows()),
                actual: format!("{} targets", y.len()),
            });
        }
        if y.is_empty() {
            return Err(LearnerError::EmptyInput);
        }
        if let Some(row) = y.iter().position(|v| !v.is_finite()) {
            return Err(LearnerError::NonFiniteTarget { row });
        }

        let n = y.len();
        let binned = BinnedFeatures::build(x, self.params.max_bins);
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        self.base_score = y.iter().sum::<f64>() / n as f64;
        self.trees = Vec::with_capacity(self.params.n_estimators);
        self.feature_names = x.names().to_vec();

        let mut preds = vec![self.base_score; n];
        let mut grads = vec![0.0; n];

        for _ in 0..self.params.n_estimators {
            for ((g, &p), &target) in grads.iter_mut().zip(&preds).zip(y) {
                *g = p - target;
            }

            let rows: Vec<usize> = if self.params.subsample < 1.0 {
                let sampled: Vec<usize> = (0..n)
                    .filter(|_| rng.gen::<f64>() < self.params.subsample)
                    .collect();
                if sampled.is_empty() {
                    (0..n).collect()
                } else {
                    sampled
                }
            } else {
                (0..n).collect()
            };

            let tree = self.grow_tree(&binned, rows, &grads);
            for (r, p) in preds.iter_mut().enumerate() {
                *p += tree.predict_row(x.row(r));
            }
            self.trees.push(tree);
        }

        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError> {
        if !self.fitted {
            return Err(LearnerError::NotFitted);
        }
        if x.names() != self.feature_names.as_slice() {
            return Err(LearnerError::ShapeMismatch {
                expected: format!("columns {:?}", self.feature_names),
                actual: format!("columns {:?}", x.names()),
            });
        }
        Ok((0..x.n_rows()).map(|r| self.predict_row(x.row(r))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_estimators: usize) -> LearnerParams {
        LearnerParams {
            n_estimators,
            learning_rate: 0.3,
            max_depth: 3,
            ..Default::default()
        }
    }

    fn step_data() -> (FeatureMatrix, Vec<f64>) {
        let xs: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Vec<f64> = xs.iter().map(|&v| if v < 20.0 { 100.0 } else { 300.0 }).collect();
        let x = FeatureMatrix::from_columns(vec!["x".into()], vec![xs]).unwrap();
        (x, y)
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y) = step_data();
        let mut model = GradientBoostedTrees::new(params(50));
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        assert!((preds[0] - 100.0).abs() < 5.0, "got {}", preds[0]);
        assert!((preds[39] - 300.0).abs() < 5.0, "got {}", preds[39]);
        assert_eq!(model.trees().len(), 50);
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let (x, _) = step_data();
        let y = vec![42.0; 40];
        let mut model = GradientBoostedTrees::new(params(5));
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        assert!(preds.iter().all(|&p| (p - 42.0).abs() < 1e-9));
        assert!(model.trees().iter().all(|t| t.n_leaves() == 1));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = step_data();
        let mut p = params(20);
        p.subsample = 0.7;

        let mut a = GradientBoostedTrees::new(p.clone());
        let mut b = GradientBoostedTrees::new(p);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_nan_values_route_left() {
        let x = FeatureMatrix::from_columns(
            vec!["x".into()],
            vec![vec![f64::NAN, 1.0, 2.0, 10.0, 11.0, 12.0]],
        )
        .unwrap();
        let y = vec![1.0, 1.0, 1.0, 9.0, 9.0, 9.0];
        let mut model = GradientBoostedTrees::new(params(30));
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        assert!(preds[0] < 5.0);
    }

    #[test]
    fn test_predict_errors() {
        let (x, y) = step_data();
        let model = GradientBoostedTrees::new(params(5));
        assert_eq!(model.predict(&x), Err(LearnerError::NotFitted));

        let mut model = GradientBoostedTrees::new(params(5));
        model.fit(&x, &y).unwrap();
        let other = FeatureMatrix::from_columns(vec!["z".into()], vec![vec![1.0]]).unwrap();
        assert!(matches!(
            model.predict(&other),
            Err(LearnerError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_errors() {
        let (x, _) = step_data();
        let mut model = GradientBoostedTrees::new(params(5));
        assert!(matches!(
            model.fit(&x, &[1.0]),
            Err(LearnerError::ShapeMismatch { .. })
        ));

        let mut y = vec![1.0; 40];
        y[7] = f64::INFINITY;
        assert_eq!(
            model.fit(&x, &y),
            Err(LearnerError::NonFiniteTarget { row: 7 })
        );

        let empty = FeatureMatrix::from_columns(vec!["x".into()], vec![vec![]]).unwrap();
        assert_eq!(model.fit(&empty, &[]), Err(LearnerError::EmptyInput));
    }

    #[test]
    fn test_compute_cuts_caps_bins() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let cuts = compute_cuts(&values, 10);
        assert_eq!(cuts.len(), 10);
        assert_eq!(*cuts.last().unwrap(), 999.0);

        let few = compute_cuts(&[3.0, 1.0, 3.0, f64::NAN], 10);
        assert_eq!(few, vec![1.0, 3.0]);
    }
}
