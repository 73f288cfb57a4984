//! Integration tests for the append-only experiment log

use pricetier::pipeline::{CvMetrics, ExperimentConfig, PeriodFilter};
use pricetier::report::{feature_hash, run_params, ExperimentLog, LOG_COLUMNS};
use tempfile::TempDir;

fn metrics(r2: f64) -> CvMetrics {
    CvMetrics {
        r2_mean: r2,
        r2_std: 0.01,
        rmse_mean: 38_500.0,
        folds: 5,
    }
}

fn features(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_separate_handles_share_one_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("experiments.csv");
    let config = ExperimentConfig::default();

    for r2 in [0.7, 0.75, 0.8] {
        let mut log = ExperimentLog::new(&path);
        log.append(
            &config.period,
            &features(&["SFLA", "NBHD"]),
            &run_params(&config),
            &metrics(r2),
        )
        .unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], LOG_COLUMNS.join(","));
    assert_eq!(
        lines.iter().filter(|l| l.starts_with(LOG_COLUMNS[0])).count(),
        1,
        "Header must appear once"
    );
}

#[test]
fn test_existing_empty_file_gets_a_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("experiments.csv");
    std::fs::write(&path, "").unwrap();

    let mut log = ExperimentLog::new(&path);
    log.append(
        &PeriodFilter::default(),
        &features(&["SFLA"]),
        &serde_json::json!({"n_estimators": 10}),
        &metrics(0.5),
    )
    .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(&LOG_COLUMNS.join(",")));
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn test_record_carries_period_hash_and_params() {
    let temp_dir = TempDir::new().unwrap();
    let mut log = ExperimentLog::new(temp_dir.path().join("log.csv"));
    let config = ExperimentConfig {
        period: PeriodFilter {
            start_year: 2010,
            end_year: 2014,
        },
        ..Default::default()
    };
    let names = features(&["YRBLT", "SFLA", "NBHD"]);

    let record = log
        .append(&config.period, &names, &run_params(&config), &metrics(0.6))
        .unwrap();

    assert_eq!(record.period, "2010-2014");
    assert_eq!(record.feature_hash, feature_hash(&["NBHD", "SFLA", "YRBLT"]));
    assert!(record.params.contains("\"bucket_count\":100"));
    assert!(record.params.contains("\"stage2\""));
    assert_eq!(record.r2_mean, 0.6);
}
