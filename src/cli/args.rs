//! Command-line argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::pipeline::{ExperimentConfig, PipelineResult};

/// Pricetier - cross-validated two-stage sale price models
#[derive(Parser, Debug)]
#[command(name = "pricetier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Engineered feature file (CSV or Parquet)
    #[arg(short, long, default_value = "engineered_features.csv")]
    pub input: PathBuf,

    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Experiment log file; one row is appended per successful run
    #[arg(long, default_value = "experiments.csv")]
    pub experiments: PathBuf,
}

/// Flags shared by the experiment run and the export
#[derive(Args, Debug, Clone, Default)]
pub struct ExperimentArgs {
    /// JSON configuration file; flags given here override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// First sale year to include (inclusive)
    #[arg(long)]
    pub start_year: Option<i32>,

    /// Last sale year to include (inclusive)
    #[arg(long)]
    pub end_year: Option<i32>,

    /// Number of cross-validation folds
    #[arg(long)]
    pub folds: Option<usize>,

    /// Seed for fold assignment and both learners
    #[arg(long)]
    pub seed: Option<u64>,

    /// Feature columns (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub features: Vec<String>,

    /// Trees in the final-stage learner
    #[arg(long)]
    pub n_estimators: Option<usize>,

    /// Learning rate of the final-stage learner
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Maximum tree depth of the final-stage learner
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Number of quantile price buckets for stage 1
    #[arg(long)]
    pub bucket_count: Option<usize>,

    /// Run folds one after another instead of in parallel
    #[arg(long, default_value = "false")]
    pub sequential: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, join and clean the raw county extracts, then engineer features
    Prepare {
        /// Directory holding the raw extracts
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Engineered output file (CSV or Parquet)
        #[arg(short, long, default_value = "engineered_features.csv")]
        output: PathBuf,

        /// Markdown statistics log
        #[arg(long, default_value = "data_stats.md")]
        stats: PathBuf,

        /// Sales at or below this price are dropped
        #[arg(long, default_value = "1000")]
        price_floor: f64,
    },

    /// Fit the final model on all rows and write the deployment artifact
    Export {
        /// Engineered feature file (CSV or Parquet)
        #[arg(short, long, default_value = "engineered_features.csv")]
        input: PathBuf,

        /// Artifact output path (JSON)
        #[arg(short, long, default_value = "model_artifacts.json")]
        output: PathBuf,

        #[command(flatten)]
        experiment: ExperimentArgs,
    },
}

impl ExperimentArgs {
    /// Build the run configuration: defaults, then the config file, then flags
    pub fn to_config(&self) -> PipelineResult<ExperimentConfig> {
        let base = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)?,
            None => ExperimentConfig::default(),
        };
        Ok(self.apply(base))
    }

    fn apply(&self, mut config: ExperimentConfig) -> ExperimentConfig {
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(start) = self.start_year {
            config.period.start_year = start;
        }
        if let Some(end) = self.end_year {
            config.period.end_year = end;
        }
        if let Some(folds) = self.folds {
            config.folds = folds;
        }
        if !self.features.is_empty() {
            config.features = self.features.clone();
        }
        if let Some(n) = self.n_estimators {
            config.stage2.n_estimators = n;
        }
        if let Some(lr) = self.learning_rate {
            config.stage2.learning_rate = lr;
        }
        if let Some(depth) = self.max_depth {
            config.stage2.max_depth = depth;
        }
        if let Some(buckets) = self.bucket_count {
            config.bucket_count = buckets;
        }
        if self.sequential {
            config.parallel_folds = false;
        }
        config
    }
}

impl Cli {
    pub fn input(&self) -> &Path {
        &self.input
    }
}
