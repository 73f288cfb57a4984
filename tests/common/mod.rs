//! Shared test utilities and fixture generators

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use pricetier::pipeline::{
    ColumnData, ExperimentConfig, FeatureTable, GbdtFactory, LearnerParams,
};

/// Number of neighbourhood codes in the synthetic data
pub const SYNTHETIC_NEIGHBOURHOODS: usize = 10;

/// Synthetic engineered sales as a DataFrame.
///
/// - `PRICE`: uniform in [50000, 500000]
/// - `NBHD`: one of 10 integer codes
/// - `SFLA`, `RMBED`, `YRBLT`, `Month`, `SaleYear`: loosely tied to price
pub fn create_sales_dataframe(rows: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let price: Vec<f64> = (0..rows).map(|_| rng.gen_range(50_000.0..=500_000.0)).collect();
    let nbhd: Vec<i64> = (0..rows)
        .map(|_| 1200 + rng.gen_range(0..SYNTHETIC_NEIGHBOURHOODS as i64))
        .collect();
    let sfla: Vec<f64> = price
        .iter()
        .map(|p| (p / 180.0 + rng.gen_range(-300.0..300.0)).round())
        .collect();
    let rmbed: Vec<f64> = sfla
        .iter()
        .map(|s| (s / 700.0).round().clamp(1.0, 6.0))
        .collect();
    let yrblt: Vec<f64> = (0..rows).map(|_| rng.gen_range(1950..=2018) as f64).collect();
    let month: Vec<f64> = (0..rows).map(|_| rng.gen_range(1..=12) as f64).collect();
    let sale_year: Vec<f64> = (0..rows).map(|_| rng.gen_range(2015..=2019) as f64).collect();

    df! {
        "PARID" => (0..rows).map(|i| format!("P{:05}", i)).collect::<Vec<_>>(),
        "SFLA" => sfla,
        "RMBED" => rmbed,
        "YRBLT" => yrblt,
        "NBHD" => nbhd,
        "Month" => month,
        "SaleYear" => sale_year,
        "PRICE" => price,
    }
    .unwrap()
}

/// Synthetic engineered sales as a feature table (`NBHD` categorical)
pub fn create_sales_table(rows: usize, seed: u64) -> FeatureTable {
    let df = create_sales_dataframe(rows, seed);
    let (table, refused) = FeatureTable::from_dataframe(&df, &["NBHD".to_string()]).unwrap();
    assert!(refused.is_empty());
    table
}

/// A table with one numeric feature, one categorical feature and a target
pub fn create_tiny_table(sfla: &[f64], nbhd: &[&str], price: &[f64]) -> FeatureTable {
    let mut table = FeatureTable::new();
    table
        .push_column("SFLA", ColumnData::Numeric(sfla.to_vec()))
        .unwrap();
    table
        .push_column(
            "NBHD",
            ColumnData::Categorical(nbhd.iter().map(|s| s.to_string()).collect()),
        )
        .unwrap();
    table
        .push_column("PRICE", ColumnData::Numeric(price.to_vec()))
        .unwrap();
    table
}

/// Small, fast learner settings for tests that do not need default depth
pub fn fast_params() -> LearnerParams {
    LearnerParams {
        n_estimators: 40,
        learning_rate: 0.2,
        max_depth: 3,
        ..Default::default()
    }
}

/// Configuration using [`fast_params`] for both stages
pub fn fast_config(features: &[&str]) -> ExperimentConfig {
    ExperimentConfig {
        features: features.iter().map(|s| s.to_string()).collect(),
        stage1: fast_params(),
        stage2: fast_params(),
        bucket_count: 10,
        ..Default::default()
    }
}

/// Factory matching the stage parameters of `config`
pub fn factory_for(config: &ExperimentConfig) -> GbdtFactory {
    GbdtFactory::new(config.stage1.clone(), config.stage2.clone())
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("engineered_features.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("engineered_features.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Write small sales, building and parcel extracts into `dir`
pub fn write_raw_sources(dir: &Path) {
    std::fs::write(
        dir.join("VCPA_CAMA_SALES.csv"),
        "PARID,SALE_PRICE,SALEDT\n\
         100,250000,2016-05-01\n\
         101,500,2016-06-01\n\
         102,180000,03/15/2018\n\
         103,320000,2019-01-20\n\
         ,150000,2017-02-02\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("VCPA_CAMA_RES_BLDG.csv"),
        "PARID,YRBLT,RMBED,FIXBATH,SFLA,TOTAL_AREA,STORIES,EXTRA\n\
         100,1990,3,2,1500,2000,1,x\n\
         100,1990,2,1,600,700,1,x\n\
         102,2019,4,0,2000,0,2,x\n\
         103,1975,3,2,1800,2400,1,x\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("VCPA_CAMA_PARCEL.csv"),
        "PARID,NBHD,NBHD_DESC,LUC,APRTOT,APRLAND,STXBL\n\
         100,1203,RIVERSIDE,0100,240000,60000,230000\n\
         102,1204,OAK HILL,0100,170000,40000,160000\n\
         103,1203,RIVERSIDE,0110,300000,80000,290000\n\
         103,9999,DUPLICATE,0100,1,1,1\n",
    )
    .unwrap();
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}

/// Assert that a DataFrame does NOT contain specific columns
pub fn assert_missing_columns(df: &DataFrame, unexpected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in unexpected_cols {
        assert!(
            !actual_cols.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}
