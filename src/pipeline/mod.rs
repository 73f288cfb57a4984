//! Pipeline module - loading, feature engineering and cross-validated training

pub mod binning;
pub mod config;
pub mod cross_validation;
pub mod encoder;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod folds;
pub mod gbdt;
pub mod learner;
pub mod loader;
pub mod policy;
pub mod table;
pub mod two_stage;

pub use binning::{BucketEdges, DegenerateBinning};
pub use config::*;
pub use cross_validation::{
    filter_period, resolve_features, run_cross_validation, CvReport, FoldReport, FoldStatus,
};
pub use encoder::{fit_deployment_encoding, EncodingMap, FoldEncoder};
pub use error::{LearnerError, PipelineError, PipelineResult};
pub use evaluator::{aggregate, score, CvMetrics, FoldScore};
pub use features::{BuiltFeatures, FeatureBuilder};
pub use folds::{kfold_split, Fold};
pub use gbdt::GradientBoostedTrees;
pub use learner::{GbdtFactory, Learner, LearnerFactory, LearnerRole};
pub use loader::{
    clean_merged, load_and_merge, load_dataset, load_feature_table, CleanedSources,
    MergedSources, SourceConfig,
};
pub use policy::{is_leakage, leakage_fields};
pub use table::{ColumnData, ColumnKind, FeatureMatrix, FeatureTable};
pub use two_stage::{BucketStageStatus, TwoStageModel, PREDICTED_BUCKET_COLUMN};
