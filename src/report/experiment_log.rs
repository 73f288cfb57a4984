//! Append-only experiment log
//!
//! One CSV row per completed cross-validation run. The file is created with
//! a header on first write; later runs only append. Rows are never
//! rewritten.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::Local;
use polars::prelude::*;
use serde::Serialize;
use serde_json::json;

use crate::pipeline::{CvMetrics, ExperimentConfig, PeriodFilter, PipelineResult};

/// Default log file name
pub const DEFAULT_EXPERIMENTS_FILE: &str = "experiments.csv";

/// Column order of the log file
pub const LOG_COLUMNS: [&str; 8] = [
    "Timestamp",
    "Period",
    "Features",
    "Feature_Hash",
    "Params",
    "R2_Mean",
    "R2_Std",
    "RMSE_Mean",
];

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Short order-independent hash of a feature set.
///
/// FNV-1a over the sorted names, each terminated by a zero byte, rendered
/// as the first 8 hex digits.
pub fn feature_hash<S: AsRef<str>>(features: &[S]) -> String {
    let mut sorted: Vec<&str> = features.iter().map(|f| f.as_ref()).collect();
    sorted.sort_unstable();

    let mut hash = FNV_OFFSET;
    for name in sorted {
        for byte in name.bytes().chain(std::iter::once(0u8)) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    format!("{:016x}", hash)[..8].to_string()
}

/// Hyperparameters recorded with a run
pub fn run_params(config: &ExperimentConfig) -> serde_json::Value {
    json!({
        "folds": config.folds,
        "seed": config.seed,
        "bucket_count": config.bucket_count,
        "stage1": config.stage1,
        "stage2": config.stage2,
    })
}

/// One log row
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRecord {
    pub timestamp: String,
    pub period: String,
    pub features: Vec<String>,
    pub feature_hash: String,
    /// Hyperparameters as compact JSON
    pub params: String,
    pub r2_mean: f64,
    pub r2_std: f64,
    pub rmse_mean: f64,
}

impl ExperimentRecord {
    pub fn new<P: Serialize>(
        period: &PeriodFilter,
        features: &[String],
        params: &P,
        metrics: &CvMetrics,
    ) -> PipelineResult<Self> {
        Ok(Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            period: period.to_string(),
            features: features.to_vec(),
            feature_hash: feature_hash(features),
            params: serde_json::to_string(params)?,
            r2_mean: metrics.r2_mean,
            r2_std: metrics.r2_std,
            rmse_mean: metrics.rmse_mean,
        })
    }

    fn to_dataframe(&self) -> PipelineResult<DataFrame> {
        let features = serde_json::to_string(&self.features)?;
        let df = df! {
            LOG_COLUMNS[0] => [self.timestamp.as_str()],
            LOG_COLUMNS[1] => [self.period.as_str()],
            LOG_COLUMNS[2] => [features.as_str()],
            LOG_COLUMNS[3] => [self.feature_hash.as_str()],
            LOG_COLUMNS[4] => [self.params.as_str()],
            LOG_COLUMNS[5] => [self.r2_mean],
            LOG_COLUMNS[6] => [self.r2_std],
            LOG_COLUMNS[7] => [self.rmse_mean],
        }?;
        Ok(df)
    }
}

/// Handle on the log file
#[derive(Debug, Clone)]
pub struct ExperimentLog {
    path: PathBuf,
}

impl ExperimentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a record for a finished run and append it
    pub fn append<P: Serialize>(
        &mut self,
        period: &PeriodFilter,
        features: &[String],
        params: &P,
        metrics: &CvMetrics,
    ) -> PipelineResult<ExperimentRecord> {
        let record = ExperimentRecord::new(period, features, params, metrics)?;
        self.append_record(&record)?;
        Ok(record)
    }

    /// Append one row, writing the header only when the file is new
    pub fn append_record(&mut self, record: &ExperimentRecord) -> PipelineResult<()> {
        let is_new = !self.path.exists()
            || std::fs::metadata(&self.path)
                .map(|m| m.len() == 0)
                .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut df = record.to_dataframe()?;
        CsvWriter::new(&mut file)
            .include_header(is_new)
            .finish(&mut df)?;
        Ok(())
    }
}
