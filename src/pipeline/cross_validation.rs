//! K-fold cross-validation of the two-stage model
//!
//! For every fold, categorical features are target-encoded from that fold's
//! training rows only, a fresh [`TwoStageModel`] is fitted, and the
//! validation rows are scored. Folds share no mutable state and may run in
//! parallel; results are always reported in ascending fold order.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

use super::config::{ExperimentConfig, PeriodFilter};
use super::encoder::{EncodingMap, FoldEncoder};
use super::error::{PipelineError, PipelineResult};
use super::evaluator::{aggregate, score, CvMetrics, FoldScore};
use super::folds::{kfold_split, Fold};
use super::learner::LearnerFactory;
use super::policy::is_leakage;
use super::table::{ColumnKind, FeatureMatrix, FeatureTable};
use super::two_stage::{BucketStageStatus, TwoStageModel};

/// Column holding the sale year, with its fallback
const YEAR_COLUMNS: [&str; 2] = ["SaleYear", "TAXYR"];

/// Suffix of target-encoded categorical columns
pub const ENCODED_SUFFIX: &str = "_Encoded";

/// Result of one fold
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    /// One-based fold number
    pub fold: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub status: FoldStatus,
    /// Recoverable problems met in this fold
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum FoldStatus {
    Scored {
        score: FoldScore,
        stage1: BucketStageStatus,
        /// Validation rows whose category never appeared in training
        unseen_categories: usize,
    },
    Skipped {
        reason: String,
    },
}

impl FoldReport {
    pub fn score(&self) -> Option<FoldScore> {
        match &self.status {
            FoldStatus::Scored { score, .. } => Some(*score),
            FoldStatus::Skipped { .. } => None,
        }
    }
}

/// Result of a complete cross-validation run
#[derive(Debug, Clone, Serialize)]
pub struct CvReport {
    /// Features actually used, in order (raw names, before encoding)
    pub features: Vec<String>,
    /// Columns handed to the learners, before the stage-1 column is appended
    pub model_columns: Vec<String>,
    /// Rows in the table that was cross-validated
    pub rows: usize,
    /// Per-fold results in ascending fold order
    pub folds: Vec<FoldReport>,
    pub metrics: CvMetrics,
    /// Run-level and fold-level warnings, run-level first
    pub warnings: Vec<String>,
}

impl CvReport {
    pub fn fold_scores(&self) -> Vec<FoldScore> {
        self.folds.iter().filter_map(FoldReport::score).collect()
    }
}

/// Matrices and encodings for one fold
#[derive(Debug, Clone)]
pub struct FoldMatrices {
    pub train_x: FeatureMatrix,
    pub train_y: Vec<f64>,
    pub validation_x: FeatureMatrix,
    pub validation_y: Vec<f64>,
    /// Encoding fitted for each categorical feature, in feature order
    pub encodings: Vec<(String, EncodingMap)>,
    pub unseen_categories: usize,
    pub warnings: Vec<String>,
}

/// Resolve the requested feature list against the table.
///
/// Missing, leakage and target columns are dropped with a warning. The
/// category column is appended when the table has it and the list does not.
pub fn resolve_features(
    table: &FeatureTable,
    config: &ExperimentConfig,
) -> PipelineResult<(Vec<String>, Vec<String>)> {
    let mut active: Vec<String> = Vec::new();
    let mut warnings = Vec::new();

    for name in &config.features {
        if active.contains(name) {
            continue;
        }
        if name == &config.target {
            warnings.push(format!("Feature '{}' is the target; dropped", name));
        } else if is_leakage(name) {
            warnings.push(format!("Feature '{}' is a leakage field; dropped", name));
        } else if !table.has_column(name) {
            warnings.push(format!("Feature '{}' not found in table; dropped", name));
        } else {
            active.push(name.clone());
        }
    }

    if table.has_column(&config.category_column) && !active.contains(&config.category_column) {
        active.push(config.category_column.clone());
    }

    // An existing `<cat>_Encoded` column would collide with the fold encoding of `<cat>`
    let shadowed: Vec<String> = active
        .iter()
        .filter(|name| {
            name.strip_suffix(ENCODED_SUFFIX).is_some_and(|source| {
                active.iter().any(|a| a == source)
                    && table.kind(source) == Some(ColumnKind::Categorical)
            })
        })
        .cloned()
        .collect();
    for name in &shadowed {
        warnings.push(format!(
            "Feature '{}' collides with the fold encoding of its source column; dropped",
            name
        ));
    }
    active.retain(|name| !shadowed.contains(name));

    if active.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "no usable features remain after validation".to_string(),
        ));
    }

    Ok((active, warnings))
}

/// Keep rows whose sale year falls in the period.
///
/// Uses `SaleYear`, falling back to `TAXYR`. Without either column the
/// table is returned unchanged with a warning.
pub fn filter_period(
    table: &FeatureTable,
    period: &PeriodFilter,
) -> PipelineResult<(FeatureTable, Option<String>)> {
    for year_column in YEAR_COLUMNS {
        if table.has_column(year_column) {
            let years = table.numeric(year_column)?;
            let mask: Vec<bool> = years.iter().map(|&y| period.contains(y)).collect();
            return Ok((table.filter_rows(&mask), None));
        }
    }
    Ok((
        table.clone(),
        Some(format!(
            "No SaleYear or TAXYR column; period {} not applied",
            period
        )),
    ))
}

/// Build one fold's matrices, encoding categorical features from training rows only
pub fn encode_fold(
    table: &FeatureTable,
    targets: &[f64],
    fold: &Fold,
    features: &[String],
) -> PipelineResult<FoldMatrices> {
    let train_y: Vec<f64> = fold.train.iter().map(|&i| targets[i]).collect();
    let validation_y: Vec<f64> = fold.validation.iter().map(|&i| targets[i]).collect();

    let mut names: Vec<String> = Vec::new();
    let mut train_cols: Vec<Vec<f64>> = Vec::new();
    let mut validation_cols: Vec<Vec<f64>> = Vec::new();

    let mut encoded_names: Vec<String> = Vec::new();
    let mut encoded_train: Vec<Vec<f64>> = Vec::new();
    let mut encoded_validation: Vec<Vec<f64>> = Vec::new();
    let mut encodings = Vec::new();
    let mut unseen_categories = 0;
    let mut warnings = Vec::new();

    for feature in features {
        match table.kind(feature) {
            Some(ColumnKind::Numeric) => {
                let values = table.numeric(feature)?;
                names.push(feature.clone());
                train_cols.push(fold.train.iter().map(|&i| values[i]).collect());
                validation_cols.push(fold.validation.iter().map(|&i| values[i]).collect());
            }
            Some(ColumnKind::Categorical) => {
                let values = table.categorical(feature)?;
                let train_cats: Vec<String> =
                    fold.train.iter().map(|&i| values[i].clone()).collect();
                let validation_cats: Vec<String> =
                    fold.validation.iter().map(|&i| values[i].clone()).collect();

                let map = FoldEncoder::fit(&train_cats, &train_y)?;
                if map.is_empty_fit() {
                    warnings.push(format!(
                        "Fold {}: no training rows to encode '{}'; using neutral fallback",
                        fold.index + 1,
                        feature
                    ));
                }
                unseen_categories += validation_cats.iter().filter(|c| !map.contains(c)).count();

                encoded_names.push(format!("{}{}", feature, ENCODED_SUFFIX));
                encoded_train.push(FoldEncoder::transform(&map, &train_cats));
                encoded_validation.push(FoldEncoder::transform(&map, &validation_cats));
                encodings.push((feature.clone(), map));
            }
            None => return Err(PipelineError::MissingColumn(feature.clone())),
        }
    }

    names.extend(encoded_names);
    train_cols.extend(encoded_train);
    validation_cols.extend(encoded_validation);

    let to_pipeline = |source| PipelineError::Learner {
        fold: fold.index + 1,
        source,
    };
    let train_x = FeatureMatrix::from_columns(names.clone(), train_cols).map_err(to_pipeline)?;
    let validation_x = FeatureMatrix::from_columns(names, validation_cols).map_err(to_pipeline)?;

    Ok(FoldMatrices {
        train_x,
        train_y,
        validation_x,
        validation_y,
        encodings,
        unseen_categories,
        warnings,
    })
}

/// Fit and score one fold
pub fn run_fold(
    table: &FeatureTable,
    targets: &[f64],
    fold: &Fold,
    features: &[String],
    config: &ExperimentConfig,
    factory: &dyn LearnerFactory,
) -> PipelineResult<FoldReport> {
    let fold_number = fold.index + 1;
    let mut report = FoldReport {
        fold: fold_number,
        train_rows: fold.train.len(),
        validation_rows: fold.validation.len(),
        status: FoldStatus::Skipped {
            reason: String::new(),
        },
        warnings: Vec::new(),
    };

    if fold.train.is_empty() || fold.validation.is_empty() {
        let reason = format!(
            "Fold {}: empty partition ({} train, {} validation rows); skipped",
            fold_number,
            fold.train.len(),
            fold.validation.len()
        );
        report.warnings.push(reason.clone());
        report.status = FoldStatus::Skipped { reason };
        return Ok(report);
    }

    let matrices = encode_fold(table, targets, fold, features)?;
    report.warnings.extend(matrices.warnings.iter().cloned());

    let to_pipeline = |source| PipelineError::Learner {
        fold: fold_number,
        source,
    };
    let fitted = TwoStageModel::new(config.bucket_count, factory)
        .fit(&matrices.train_x, &matrices.train_y)
        .map_err(to_pipeline)?;
    let predictions = fitted.predict(&matrices.validation_x).map_err(to_pipeline)?;

    if let BucketStageStatus::Skipped { reason } = fitted.status() {
        report.warnings.push(format!(
            "Fold {}: stage 1 skipped ({}); stage 2 trained without predicted bucket",
            fold_number, reason
        ));
    }

    report.status = match score(&matrices.validation_y, &predictions) {
        Some(fold_score) => FoldStatus::Scored {
            score: fold_score,
            stage1: fitted.status().clone(),
            unseen_categories: matrices.unseen_categories,
        },
        None => {
            let reason = format!("Fold {}: no validation predictions to score; skipped", fold_number);
            report.warnings.push(reason.clone());
            FoldStatus::Skipped { reason }
        }
    };

    Ok(report)
}

/// Cross-validate the two-stage model over an already period-filtered table
pub fn run_cross_validation(
    table: &FeatureTable,
    config: &ExperimentConfig,
    factory: &dyn LearnerFactory,
) -> PipelineResult<CvReport> {
    config.validate()?;

    if table.n_rows() == 0 {
        return Err(PipelineError::EmptyDataset {
            period: config.period.to_string(),
        });
    }

    let targets = table.numeric(&config.target)?;
    if let Some(row) = targets.iter().position(|y| !y.is_finite()) {
        return Err(PipelineError::InvalidConfig(format!(
            "target '{}' is not finite at row {}",
            config.target, row
        )));
    }

    let (features, mut warnings) = resolve_features(table, config)?;
    let folds = kfold_split(table.n_rows(), config.folds, config.seed)?;

    let pb = if config.show_progress {
        let pb = ProgressBar::new(folds.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("   Cross-validating [{bar:40.cyan/blue}] {pos}/{len} folds [{elapsed}]")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let run = |fold: &Fold| {
        let result = run_fold(table, targets, fold, &features, config, factory);
        pb.inc(1);
        result
    };

    let results: Vec<PipelineResult<FoldReport>> = if config.parallel_folds {
        folds.par_iter().map(run).collect()
    } else {
        folds.iter().map(run).collect()
    };
    pb.finish_and_clear();

    let mut fold_reports = Vec::with_capacity(results.len());
    for result in results {
        fold_reports.push(result?);
    }

    for report in &fold_reports {
        warnings.extend(report.warnings.iter().cloned());
    }

    let scores: Vec<FoldScore> = fold_reports.iter().filter_map(FoldReport::score).collect();
    let metrics = aggregate(&scores).ok_or(PipelineError::AllFoldsEmpty {
        folds: fold_reports.len(),
    })?;

    let model_columns = model_columns(table, &features);

    Ok(CvReport {
        features,
        model_columns,
        rows: table.n_rows(),
        folds: fold_reports,
        metrics,
        warnings,
    })
}

/// Learner input columns: numeric features in order, then encoded categoricals
fn model_columns(table: &FeatureTable, features: &[String]) -> Vec<String> {
    let numeric = features
        .iter()
        .filter(|f| table.kind(f) == Some(ColumnKind::Numeric))
        .cloned();
    let encoded = features
        .iter()
        .filter(|f| table.kind(f) == Some(ColumnKind::Categorical))
        .map(|f| format!("{}{}", f, ENCODED_SUFFIX));
    numeric.chain(encoded).collect()
}
