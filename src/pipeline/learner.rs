//! Learner capability used by the two-stage model
//!
//! The engine treats the regressor as an opaque fit/predict object. A fresh
//! instance is requested from a [`LearnerFactory`] for every stage of every
//! fold, so no fitted state can cross a fold boundary.

use super::config::LearnerParams;
use super::error::LearnerError;
use super::gbdt::GradientBoostedTrees;
use super::table::FeatureMatrix;

/// A supervised regression model
pub trait Learner: Send {
    /// Fit on a feature matrix and continuous target
    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> Result<(), LearnerError>;

    /// Predict one value per row
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError>;
}

/// Which stage a learner is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnerRole {
    /// Predicts the price bucket index
    Bucket,
    /// Predicts the final price
    Final,
}

/// Creates unfitted learners
pub trait LearnerFactory: Sync {
    fn create(&self, role: LearnerRole) -> Box<dyn Learner>;
}

/// Factory producing seeded gradient-boosted tree ensembles
#[derive(Debug, Clone)]
pub struct GbdtFactory {
    pub bucket_params: LearnerParams,
    pub final_params: LearnerParams,
}

impl GbdtFactory {
    pub fn new(bucket_params: LearnerParams, final_params: LearnerParams) -> Self {
        Self {
            bucket_params,
            final_params,
        }
    }
}

impl LearnerFactory for GbdtFactory {
    fn create(&self, role: LearnerRole) -> Box<dyn Learner> {
        let params = match role {
            LearnerRole::Bucket => &self.bucket_params,
            LearnerRole::Final => &self.final_params,
        };
        Box::new(GradientBoostedTrees::new(params.clone()))
    }
}
