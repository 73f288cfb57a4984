//! Report module - run summaries, experiment provenance and deployment artifacts

pub mod data_stats;
pub mod experiment_log;
pub mod export;
pub mod summary;

pub use data_stats::*;
pub use experiment_log::*;
pub use export::*;
pub use summary::*;
