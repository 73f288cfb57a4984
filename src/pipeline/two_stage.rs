//! Two-stage price model
//!
//! The model is an ordered pipeline of two stages, each testable alone:
//!
//! 1. [`BucketStage`] bins the training target into quantile buckets,
//!    fits a learner to regress the bucket index, and appends its
//!    prediction as the `Predicted_PriceBin` column to any matrix.
//! 2. [`RegressionStage`] fits the final learner on the (possibly
//!    augmented) matrix against the true price.
//!
//! Stage 1 regresses the bucket index as a continuous target; it is not a
//! classifier. When the training target cannot be binned, stage 1 is
//! skipped and stage 2 trains on the plain matrix; the skip is reported
//! through [`BucketStageStatus`].
//!
//! A `TwoStageModel` holds no fitted state. Each call to `fit` asks the
//! factory for new learners.

use serde::Serialize;

use super::binning::{BucketEdges, DegenerateBinning};
use super::error::LearnerError;
use super::learner::{Learner, LearnerFactory, LearnerRole};
use super::table::FeatureMatrix;

/// Name of the column appended by stage 1
pub const PREDICTED_BUCKET_COLUMN: &str = "Predicted_PriceBin";

/// What happened to stage 1 during a fit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BucketStageStatus {
    /// Stage 1 ran with this many buckets
    Applied { buckets: usize },
    /// Stage 1 was skipped; stage 2 trained on the un-augmented matrix
    Skipped { reason: String },
}

impl BucketStageStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, BucketStageStatus::Applied { .. })
    }
}

/// Stage 1: bucket the target and learn to predict the bucket index
#[derive(Debug, Clone, Copy)]
pub struct BucketStage {
    pub bucket_count: usize,
}

impl BucketStage {
    /// Fit stage 1.
    ///
    /// The outer `Err` is a learner failure (fatal); the inner `Err` is a
    /// degenerate target (recoverable, stage 1 is skipped).
    pub fn fit(
        &self,
        factory: &dyn LearnerFactory,
        x: &FeatureMatrix,
        y: &[f64],
    ) -> Result<Result<FittedBucketStage, DegenerateBinning>, LearnerError> {
        let edges = match BucketEdges::fit(y, self.bucket_count) {
            Ok(edges) => edges,
            Err(reason) => return Ok(Err(reason)),
        };

        let labels = edges.labels(y);
        let mut learner = factory.create(LearnerRole::Bucket);
        learner.fit(x, &labels)?;

        Ok(Ok(FittedBucketStage { edges, learner }))
    }
}

/// Fitted stage 1
pub struct FittedBucketStage {
    edges: BucketEdges,
    learner: Box<dyn Learner>,
}

impl FittedBucketStage {
    pub fn bucket_count(&self) -> usize {
        self.edges.bucket_count()
    }

    /// Predicted bucket score per row (continuous, not re-binned)
    pub fn predict_bucket(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError> {
        self.learner.predict(x)
    }

    /// Append the predicted bucket as a new column
    pub fn augment(&self, x: &FeatureMatrix) -> Result<FeatureMatrix, LearnerError> {
        let scores = self.predict_bucket(x)?;
        x.with_column(PREDICTED_BUCKET_COLUMN, &scores)
    }
}

/// Stage 2: the final price regression
#[derive(Debug, Clone, Copy, Default)]
pub struct RegressionStage;

impl RegressionStage {
    pub fn fit(
        &self,
        factory: &dyn LearnerFactory,
        x: &FeatureMatrix,
        y: &[f64],
    ) -> Result<FittedRegressionStage, LearnerError> {
        let mut learner = factory.create(LearnerRole::Final);
        learner.fit(x, y)?;
        Ok(FittedRegressionStage { learner })
    }
}

/// Fitted stage 2
pub struct FittedRegressionStage {
    learner: Box<dyn Learner>,
}

impl FittedRegressionStage {
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError> {
        self.learner.predict(x)
    }
}

/// Bucket stage followed by the final regression
pub struct TwoStageModel<'a> {
    bucket_stage: BucketStage,
    regression_stage: RegressionStage,
    factory: &'a dyn LearnerFactory,
}

impl<'a> TwoStageModel<'a> {
    pub fn new(bucket_count: usize, factory: &'a dyn LearnerFactory) -> Self {
        Self {
            bucket_stage: BucketStage { bucket_count },
            regression_stage: RegressionStage,
            factory,
        }
    }

    /// Run bin, stage-1 fit, stage-1 inference on the training rows and stage-2 fit
    pub fn fit(&self, x: &FeatureMatrix, y: &[f64]) -> Result<FittedTwoStageModel, LearnerError> {
        let (bucket_stage, status) = match self.bucket_stage.fit(self.factory, x, y)? {
            Ok(stage) => {
                let status = BucketStageStatus::Applied {
                    buckets: stage.bucket_count(),
                };
                (Some(stage), status)
            }
            Err(reason) => (
                None,
                BucketStageStatus::Skipped {
                    reason: reason.to_string(),
                },
            ),
        };

        let regression = match &bucket_stage {
            Some(stage) => {
                let augmented = stage.augment(x)?;
                self.regression_stage.fit(self.factory, &augmented, y)?
            }
            None => self.regression_stage.fit(self.factory, x, y)?,
        };

        Ok(FittedTwoStageModel {
            bucket_stage,
            status,
            regression,
        })
    }
}

/// A two-stage model fitted on one training partition
pub struct FittedTwoStageModel {
    bucket_stage: Option<FittedBucketStage>,
    status: BucketStageStatus,
    regression: FittedRegressionStage,
}

impl FittedTwoStageModel {
    pub fn status(&self) -> &BucketStageStatus {
        &self.status
    }

    pub fn bucket_stage(&self) -> Option<&FittedBucketStage> {
        self.bucket_stage.as_ref()
    }

    /// Final price predictions
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError> {
        match &self.bucket_stage {
            Some(stage) => {
                let augmented = stage.augment(x)?;
                self.regression.predict(&augmented)
            }
            None => self.regression.predict(x),
        }
    }
}
