//! Integration tests for derived feature columns on prepared data

use pricetier::pipeline::features::{group_medians, parse_sale_date};
use pricetier::pipeline::*;
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn prepared_table() -> FeatureTable {
    let temp_dir = TempDir::new().unwrap();
    write_raw_sources(temp_dir.path());
    let merged = load_and_merge(temp_dir.path(), &SourceConfig::default()).unwrap();
    let cleaned = clean_merged(&merged.data, DEFAULT_PRICE_FLOOR).unwrap();
    let (table, refused) =
        FeatureTable::from_dataframe(&cleaned.data, &[CATEGORY_COLUMN.to_string()]).unwrap();
    assert!(refused.is_empty(), "cleaning should already remove leakage");
    table
}

fn value(table: &FeatureTable, column: &str, parcel: &str) -> f64 {
    let row = table
        .categorical("PARID")
        .unwrap()
        .iter()
        .position(|p| p == parcel)
        .unwrap();
    table.numeric(column).unwrap()[row]
}

#[test]
fn test_prepared_sales_get_every_derived_column() {
    let built = FeatureBuilder::default().build(&prepared_table()).unwrap();

    assert_eq!(
        built.added,
        vec![
            "SaleYear",
            "Month",
            "HouseAge",
            "HouseAge_Squared",
            "SFLA_Squared",
            "Efficiency_Ratio",
            "Bed_Bath_Ratio",
            "NBHD_Median_Size",
            "Size_vs_NBHD",
        ]
    );
    assert_eq!(built.unparsed_dates, 0);

    let table = &built.table;
    assert_eq!(value(table, "SaleYear", "102"), 2018.0);
    assert_eq!(value(table, "Month", "102"), 3.0);
    assert_eq!(value(table, "HouseAge", "100"), 26.0);
    assert_eq!(value(table, "HouseAge_Squared", "100"), 676.0);
    assert_eq!(value(table, "SFLA_Squared", "100"), 2_250_000.0);
    assert_eq!(value(table, "Efficiency_Ratio", "100"), 0.75);
    assert_eq!(value(table, "Bed_Bath_Ratio", "100"), 1.5);
}

#[test]
fn test_edge_values_are_clipped_or_zeroed() {
    let built = FeatureBuilder::default().build(&prepared_table()).unwrap();
    let table = &built.table;

    // Built in 2019, sold in 2018
    assert_eq!(value(table, "HouseAge", "102"), 0.0);
    // No bathrooms and no total area
    assert_eq!(value(table, "Bed_Bath_Ratio", "102"), 0.0);
    assert_eq!(value(table, "Efficiency_Ratio", "102"), 0.0);
}

#[test]
fn test_neighbourhood_size_features() {
    let built = FeatureBuilder::default().build(&prepared_table()).unwrap();
    let table = &built.table;

    // 100 and 103 share neighbourhood 1203 (SFLA 1500 and 1800)
    assert_eq!(value(table, "NBHD_Median_Size", "100"), 1650.0);
    assert_eq!(value(table, "NBHD_Median_Size", "103"), 1650.0);
    assert_eq!(value(table, "Size_vs_NBHD", "100"), -150.0);
    assert_eq!(value(table, "Size_vs_NBHD", "102"), 0.0);
}

#[test]
fn test_tax_year_fallback_sets_january() {
    let mut table = FeatureTable::new();
    table
        .push_column("TAXYR", ColumnData::Numeric(vec![2017.0, 2018.0]))
        .unwrap();
    table
        .push_column("YRBLT", ColumnData::Numeric(vec![2000.0, f64::NAN]))
        .unwrap();

    let built = FeatureBuilder::default().build(&table).unwrap();
    assert_eq!(built.table.numeric("SaleYear").unwrap(), &[2017.0, 2018.0]);
    assert_eq!(built.table.numeric("Month").unwrap(), &[1.0, 1.0]);

    let age = built.table.numeric("HouseAge").unwrap();
    assert_eq!(age[0], 17.0);
    assert!(age[1].is_nan(), "Missing build year stays missing");
}

#[test]
fn test_engineered_table_trains_end_to_end() {
    let built = FeatureBuilder::default().build(&create_sales_table(150, 21)).unwrap();
    let config = fast_config(&["SFLA", "SFLA_Squared", "NBHD_Median_Size", "Size_vs_NBHD", "NBHD"]);

    let report = run_cross_validation(&built.table, &config, &factory_for(&config)).unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.model_columns.len(), 5);
}

#[test]
fn test_date_and_median_helpers() {
    assert_eq!(
        parse_sale_date("15-MAR-18").map(|d| d.to_string()),
        Some("2018-03-15".to_string())
    );
    assert!(parse_sale_date("sometime in spring").is_none());

    let groups: Vec<String> = ["A", "A", "B", "A"].iter().map(|s| s.to_string()).collect();
    let medians = group_medians(&groups, &[1.0, 3.0, 10.0, f64::NAN]);
    assert_eq!(medians["A"], 2.0);
    assert_eq!(medians["B"], 10.0);
}
