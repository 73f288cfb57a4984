//! Integration tests for the deployment artifact

use pricetier::pipeline::*;
use pricetier::report::{export_artifact, DeploymentArtifact, ExportConfig};
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn export_config(features: &[&str]) -> ExportConfig {
    ExportConfig {
        features: features.iter().map(|s| s.to_string()).collect(),
        params: fast_params(),
        ..Default::default()
    }
}

fn engineered(rows: usize, seed: u64) -> FeatureTable {
    FeatureBuilder::default()
        .build(&create_sales_table(rows, seed))
        .unwrap()
        .table
}

#[test]
fn test_artifact_features_end_with_encoded_category() {
    let table = engineered(200, 1);
    let artifact = export_artifact(&table, &export_config(&["SFLA", "NBHD", "YRBLT"])).unwrap();

    assert_eq!(artifact.features, vec!["SFLA", "YRBLT", "NBHD_Encoded"]);
    assert_eq!(artifact.ui_stats.data_count, 200);
    assert_eq!(artifact.ui_stats.nbhds.len(), SYNTHETIC_NEIGHBOURHOODS);
    assert_eq!(artifact.ui_stats.nbhds.first().unwrap(), "1200");
    assert_eq!(artifact.ui_stats.nbhds.last().unwrap(), "1209");
    assert_eq!(artifact.nbhd_price_map.fitted_rows, 200);
    assert_eq!(artifact.top_lucs, vec!["99"]);
    assert!(artifact.warnings.iter().any(|w| w.contains("NBHD_DESC")));
}

#[test]
fn test_saved_artifact_predicts_like_the_original() {
    let table = engineered(150, 2);
    let artifact = export_artifact(&table, &export_config(&["SFLA", "RMBED", "NBHD"])).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("deploy").join("model_artifacts.json");
    artifact.save(&path).unwrap();
    let loaded = DeploymentArtifact::load(&path).unwrap();

    let before = artifact.predict_table(&table, "NBHD").unwrap();
    let after = loaded.predict_table(&table, "NBHD").unwrap();
    for (b, a) in before.iter().zip(&after) {
        assert!((b - a).abs() < 1e-6, "prediction drifted: {} vs {}", b, a);
    }
    assert_eq!(loaded.features, artifact.features);
    assert_eq!(loaded.ui_stats, artifact.ui_stats);
    assert!(loaded.warnings.is_empty(), "Warnings are not persisted");
}

#[test]
fn test_predict_requires_exact_column_order() {
    let table = engineered(100, 3);
    let artifact = export_artifact(&table, &export_config(&["SFLA", "RMBED", "NBHD"])).unwrap();

    let n = table.n_rows();
    let swapped = FeatureMatrix::from_columns(
        vec!["RMBED".to_string(), "SFLA".to_string(), "NBHD_Encoded".to_string()],
        vec![vec![3.0; n], vec![1500.0; n], vec![250_000.0; n]],
    )
    .unwrap();
    assert!(matches!(
        artifact.predict(&swapped),
        Err(LearnerError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_rows_below_price_floor_are_excluded() {
    let table = create_tiny_table(
        &[1000.0, 1200.0, 1400.0, f64::NAN],
        &["1203", "1204", "1203", "1204"],
        &[500.0, 200_000.0, 240_000.0, 260_000.0],
    );
    let artifact = export_artifact(&table, &export_config(&["SFLA", "NBHD"])).unwrap();

    assert_eq!(artifact.ui_stats.data_count, 2);
    assert_eq!(artifact.nbhd_price_map.encode("1203"), 240_000.0);
    assert_eq!(artifact.nbhd_price_map.encode("1204"), 200_000.0);
}

#[test]
fn test_missing_feature_is_reported() {
    let table = engineered(80, 4);
    let result = export_artifact(&table, &export_config(&["SFLA", "LUC", "NBHD"]));
    match result {
        Err(PipelineError::MissingColumn(name)) => assert_eq!(name, "LUC"),
        other => panic!("expected a missing column, got {:?}", other.map(|a| a.features)),
    }
}

#[test]
fn test_requested_encoded_column_is_not_duplicated() {
    let table = engineered(90, 6);
    let artifact =
        export_artifact(&table, &export_config(&["SFLA", "NBHD_Encoded", "NBHD"])).unwrap();

    assert_eq!(artifact.features, vec!["SFLA", "NBHD_Encoded"]);
    assert!(artifact.warnings.iter().any(|w| w.contains("NBHD_Encoded")));
}
