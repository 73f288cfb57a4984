//! Pricetier: cross-validated two-stage sale price models
//!
//! A library for estimating residential sale prices from county assessment
//! records: leakage-safe ingestion, feature engineering, k-fold validation
//! with in-fold target encoding, and a bucket-then-regress boosted model.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
