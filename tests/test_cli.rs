//! Tests for CLI argument parsing and the compiled binary

use assert_cmd::Command;
use clap::Parser;
use predicates::prelude::*;
use pricetier::cli::{Cli, Commands};
use pricetier::pipeline::{ExperimentConfig, DEFAULT_FOLDS};
use std::path::PathBuf;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_cli_default_values() {
    let cli = Cli::parse_from(["pricetier"]);

    assert_eq!(cli.input, PathBuf::from("engineered_features.csv"));
    assert_eq!(cli.experiments, PathBuf::from("experiments.csv"));
    assert!(cli.command.is_none());

    let config = cli.experiment.to_config().unwrap();
    assert_eq!(config.folds, DEFAULT_FOLDS);
    assert!(config.parallel_folds);
}

#[test]
fn test_config_file_then_flags() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config_path = temp_dir.path().join("run.json");
    std::fs::write(
        &config_path,
        r#"{"folds": 4, "bucket_count": 20, "stage2": {"max_depth": 3}}"#,
    )
    .unwrap();

    let cli = Cli::parse_from([
        "pricetier",
        "--config",
        config_path.to_str().unwrap(),
        "--folds",
        "6",
    ]);
    let config = cli.experiment.to_config().unwrap();

    assert_eq!(config.folds, 6, "Flags override the file");
    assert_eq!(config.bucket_count, 20);
    assert_eq!(config.stage2.max_depth, 3);
    assert_eq!(
        config.stage2.n_estimators,
        ExperimentConfig::default().stage2.n_estimators,
        "Keys missing from the file keep their defaults"
    );
}

#[test]
fn test_prepare_subcommand_defaults() {
    let cli = Cli::parse_from(["pricetier", "prepare", "-d", "raw"]);
    match cli.command {
        Some(Commands::Prepare {
            data_dir,
            output,
            stats,
            price_floor,
        }) => {
            assert_eq!(data_dir, PathBuf::from("raw"));
            assert_eq!(output, PathBuf::from("engineered_features.csv"));
            assert_eq!(stats, PathBuf::from("data_stats.md"));
            assert_eq!(price_floor, 1000.0);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_invalid_number_is_rejected() {
    let result = Cli::try_parse_from(["pricetier", "--folds", "five"]);
    assert!(result.is_err());
}

#[test]
fn test_binary_help_lists_subcommands() {
    Command::cargo_bin("pricetier")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("prepare"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn test_binary_fails_on_missing_input() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    Command::cargo_bin("pricetier")
        .unwrap()
        .current_dir(temp_dir.path())
        .args(["-i", "does_not_exist.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does_not_exist.csv"));
}

#[test]
fn test_binary_runs_experiment_and_logs_it() {
    let mut df = create_sales_dataframe(200, 17);
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let log_path = temp_dir.path().join("experiments.csv");

    Command::cargo_bin("pricetier")
        .unwrap()
        .current_dir(temp_dir.path())
        .arg("-i")
        .arg(&csv_path)
        .arg("--experiments")
        .arg(&log_path)
        .args([
            "--features",
            "SFLA,RMBED,NBHD",
            "--folds",
            "3",
            "--n-estimators",
            "30",
            "--max-depth",
            "3",
            "--bucket-count",
            "5",
        ])
        .assert()
        .success();

    let text = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn test_binary_exports_artifact() {
    let mut df = create_sales_dataframe(120, 5);
    let (temp_dir, csv_path) = create_temp_csv(&mut df);
    let artifact_path = temp_dir.path().join("model_artifacts.json");

    Command::cargo_bin("pricetier")
        .unwrap()
        .current_dir(temp_dir.path())
        .arg("export")
        .arg("-i")
        .arg(&csv_path)
        .arg("-o")
        .arg(&artifact_path)
        .args(["--features", "SFLA,YRBLT,NBHD", "--n-estimators", "20"])
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact_path).unwrap()).unwrap();
    assert_eq!(json["features"][2], "NBHD_Encoded");
    assert_eq!(json["ui_stats"]["data_count"], 120);
}
