//! Run configuration
//!
//! One `ExperimentConfig` is built per pipeline invocation (from defaults,
//! an optional JSON file and CLI overrides) and passed by reference to every
//! component. Nothing here is process-wide state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Default number of cross-validation folds
pub const DEFAULT_FOLDS: usize = 5;

/// Default random seed for fold assignment and learners
pub const DEFAULT_SEED: u64 = 42;

/// Default number of quantile buckets for stage 1
pub const DEFAULT_BUCKET_COUNT: usize = 100;

/// Default minimum sale price; lower prices are placeholders or corrupt
pub const DEFAULT_PRICE_FLOOR: f64 = 1000.0;

/// Default target column
pub const TARGET_COLUMN: &str = "PRICE";

/// Default categorical column encoded per fold
pub const CATEGORY_COLUMN: &str = "NBHD";

/// Default feature list for experiments
pub const DEFAULT_FEATURES: &[&str] = &[
    "SFLA",
    "RMBED",
    "YRBLT",
    "NBHD",
    "LUC",
    "Month",
    "HouseAge_Squared",
    "Bed_Bath_Ratio",
    "NBHD_Median_Size",
    "Size_vs_NBHD",
    "SFLA_Squared",
];

/// Hyperparameters for one gradient-boosted tree learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum number of rows (hessian sum) in a child
    pub min_child_weight: f64,
    /// Maximum histogram bins per feature
    pub max_bins: usize,
    /// Row subsampling ratio per tree (1.0 = no sampling)
    pub subsample: f64,
    /// Seed for any randomized step
    pub seed: u64,
}

impl Default for LearnerParams {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.05,
            max_depth: 6,
            lambda: 1.0,
            min_child_weight: 1.0,
            max_bins: 256,
            subsample: 1.0,
            seed: DEFAULT_SEED,
        }
    }
}

impl LearnerParams {
    /// Parameters of the stage-1 bucket learner: a short, fast ensemble
    pub fn stage1_default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            ..Default::default()
        }
    }

    /// Validate parameters
    pub fn validate(&self, label: &str) -> PipelineResult<()> {
        if self.n_estimators == 0 {
            return Err(invalid(format!("{}: n_estimators must be at least 1", label)));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid(format!(
                "{}: learning_rate must be positive, got {}",
                label, self.learning_rate
            )));
        }
        if self.max_depth == 0 {
            return Err(invalid(format!("{}: max_depth must be at least 1", label)));
        }
        if self.lambda < 0.0 {
            return Err(invalid(format!("{}: lambda must be non-negative", label)));
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bins) {
            return Err(invalid(format!(
                "{}: max_bins must be between 2 and {}",
                label,
                u16::MAX
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid(format!(
                "{}: subsample must be in (0, 1], got {}",
                label, self.subsample
            )));
        }
        Ok(())
    }
}

/// Inclusive sale-year window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodFilter {
    pub start_year: i32,
    pub end_year: i32,
}

impl Default for PeriodFilter {
    fn default() -> Self {
        Self {
            start_year: 2015,
            end_year: 2019,
        }
    }
}

impl PeriodFilter {
    pub fn contains(&self, year: f64) -> bool {
        year >= self.start_year as f64 && year <= self.end_year as f64
    }
}

impl std::fmt::Display for PeriodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

/// Configuration of one cross-validated experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Number of folds (k)
    pub folds: usize,
    /// Seed for fold assignment; also seeds any learner whose own block
    /// leaves its seed unset
    pub seed: u64,
    /// Sale-year window
    pub period: PeriodFilter,
    /// Requested feature names
    pub features: Vec<String>,
    /// Target column
    pub target: String,
    /// Categorical column that is always target-encoded when present
    pub category_column: String,
    /// Number of quantile buckets for stage 1
    pub bucket_count: usize,
    /// Stage-1 (bucket) learner hyperparameters
    pub stage1: LearnerParams,
    /// Stage-2 (final regression) learner hyperparameters
    pub stage2: LearnerParams,
    /// Run folds concurrently
    pub parallel_folds: bool,
    /// Show a progress bar while folds run
    pub show_progress: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            folds: DEFAULT_FOLDS,
            seed: DEFAULT_SEED,
            period: PeriodFilter::default(),
            features: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            target: TARGET_COLUMN.to_string(),
            category_column: CATEGORY_COLUMN.to_string(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            stage1: LearnerParams::stage1_default(),
            stage2: LearnerParams::default(),
            parallel_folds: true,
            show_progress: false,
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration from a JSON file; missing keys take defaults
    pub fn from_json_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse a JSON configuration.
    ///
    /// A top-level `seed` is carried into `stage1`/`stage2` unless that block
    /// sets its own `seed`, matching [`ExperimentConfig::with_seed`].
    pub fn from_json_str(text: &str) -> PipelineResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let mut config: ExperimentConfig = serde_json::from_value(value.clone())?;

        if let Some(seed) = value.get("seed").and_then(serde_json::Value::as_u64) {
            let has_own_seed = |block: &str| {
                value
                    .get(block)
                    .and_then(|params| params.get("seed"))
                    .is_some()
            };
            if !has_own_seed("stage1") {
                config.stage1.seed = seed;
            }
            if !has_own_seed("stage2") {
                config.stage2.seed = seed;
            }
        }
        Ok(config)
    }

    /// Set the seed for fold assignment and both learners
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.stage1.seed = seed;
        self.stage2.seed = seed;
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.folds < 2 {
            return Err(invalid(format!("folds must be at least 2, got {}", self.folds)));
        }
        if self.bucket_count < 2 {
            return Err(invalid(format!(
                "bucket_count must be at least 2, got {}",
                self.bucket_count
            )));
        }
        if self.period.start_year > self.period.end_year {
            return Err(invalid(format!(
                "period start {} is after end {}",
                self.period.start_year, self.period.end_year
            )));
        }
        if self.target.is_empty() {
            return Err(invalid("target column name is empty".to_string()));
        }
        self.stage1.validate("stage1")?;
        self.stage2.validate("stage2")?;
        Ok(())
    }
}

fn invalid(message: String) -> PipelineError {
    PipelineError::InvalidConfig(message)
}
