//! Pricetier: two-stage sale price model CLI
//!
//! Prepares engineered feature tables from raw county extracts, runs
//! cross-validated experiments and exports deployment artifacts.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use polars::prelude::{CsvWriter, DataFrame, ParquetWriter, SerWriter};

use pricetier::cli::{Cli, Commands, ExperimentArgs};
use pricetier::pipeline::{
    clean_merged, filter_period, load_and_merge, load_feature_table, run_cross_validation,
    ExperimentConfig, FeatureBuilder, FeatureTable, GbdtFactory, PipelineError, SourceConfig,
};
use pricetier::report::{
    append_stats, export_artifact, feature_hash, run_params, DatasetStats, ExperimentLog,
    ExportConfig, RunSummary,
};
use pricetier::utils::{
    create_spinner, finish_with_success, print_banner, print_completion, print_config,
    print_count, print_info, print_step_header, print_step_time, print_success, print_warning,
    print_warnings,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        return match command {
            Commands::Prepare {
                data_dir,
                output,
                stats,
                price_floor,
            } => run_prepare(data_dir, output, stats, *price_floor),
            Commands::Export {
                input,
                output,
                experiment,
            } => run_export(input, output, experiment),
        };
    }

    run_experiment(&cli)
}

/// Cross-validate the two-stage model and log the run
fn run_experiment(cli: &Cli) -> Result<()> {
    let mut config = cli
        .experiment
        .to_config()
        .context("Failed to build experiment configuration")?;
    config.show_progress = true;
    config.validate()?;

    let input = cli.input();
    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(input, &config);

    // Step 1: Load the engineered table
    print_step_header(1, "Load Feature Table");
    let step_start = Instant::now();
    let table = load_table(input, &config)?;
    print_step_time(step_start.elapsed());

    // Step 2: Restrict to the sale period
    print_step_header(2, "Period Filter");
    let step_start = Instant::now();
    let (table, warning) = filter_period(&table, &config.period)?;
    if let Some(warning) = warning {
        print_warning(&warning);
    }
    println!(
        "      Data for {}: {} records",
        config.period,
        style(table.n_rows()).yellow().bold()
    );
    if table.n_rows() == 0 {
        return Err(PipelineError::EmptyDataset {
            period: config.period.to_string(),
        }
        .into());
    }
    print_step_time(step_start.elapsed());

    // Step 3: Cross-validation
    print_step_header(3, "Cross-Validation");
    let step_start = Instant::now();
    let factory = GbdtFactory::new(config.stage1.clone(), config.stage2.clone());
    let report = run_cross_validation(&table, &config, &factory)?;
    print_warnings(&report.warnings);
    print_success(&format!(
        "R² = {:.4} (± {:.4}), RMSE = {:.0}",
        report.metrics.r2_mean, report.metrics.r2_std, report.metrics.rmse_mean
    ));
    print_step_time(step_start.elapsed());

    // Step 4: Experiment log
    print_step_header(4, "Log Experiment");
    let mut log = ExperimentLog::new(&cli.experiments);
    let record = log
        .append(
            &config.period,
            &report.features,
            &run_params(&config),
            &report.metrics,
        )
        .with_context(|| format!("Failed to append to {}", cli.experiments.display()))?;
    print_success(&format!(
        "Experiment logged to {} (hash {})",
        log.path().display(),
        record.feature_hash
    ));

    RunSummary::new(config.period.to_string(), &report, feature_hash(&report.features)).display();
    print_completion("Experiment complete!");

    Ok(())
}

/// Join and clean the raw extracts, engineer features and save
fn run_prepare(data_dir: &Path, output: &Path, stats_path: &Path, price_floor: f64) -> Result<()> {
    print_banner(env!("CARGO_PKG_VERSION"));

    // Step 1: Load and join
    print_step_header(1, "Load and Join Sources");
    let step_start = Instant::now();
    let source_config = SourceConfig {
        price_floor,
        ..Default::default()
    };
    let spinner = create_spinner("Loading sales, building and parcel extracts...");
    let merged = load_and_merge(data_dir, &source_config)
        .with_context(|| format!("Failed to load sources from {}", data_dir.display()))?;
    finish_with_success(&spinner, &format!("Merged {} sale records", merged.data.height()));
    print_warnings(&merged.warnings);
    let raw_stats = DatasetStats::from_dataframe("Raw Merged Data", &merged.data)?;
    print_step_time(step_start.elapsed());

    // Step 2: Remove leakage columns and placeholder sales
    print_step_header(2, "Clean");
    let step_start = Instant::now();
    let cleaned = clean_merged(&merged.data, price_floor)?;
    if cleaned.dropped_leakage.is_empty() {
        print_info("No leakage columns present");
    } else {
        print_count(
            "leakage column(s) dropped",
            cleaned.dropped_leakage.len(),
            Some(&format!("({})", cleaned.dropped_leakage.join(", "))),
        );
    }
    let processed_stats =
        DatasetStats::from_dataframe("Processed Data (Leakage Removed)", &cleaned.data)?;
    append_stats(stats_path, "Preprocessing Run", &[raw_stats, processed_stats])
        .with_context(|| format!("Failed to write {}", stats_path.display()))?;
    print_step_time(step_start.elapsed());

    // Step 3: Feature engineering
    print_step_header(3, "Feature Engineering");
    let step_start = Instant::now();
    let defaults = ExperimentConfig::default();
    let (table, _) =
        FeatureTable::from_dataframe(&cleaned.data, &[defaults.category_column.clone()])?;
    let input_stats = DatasetStats::from_table("Input Data", &table);
    let built = FeatureBuilder::default().build(&table)?;
    print_count("derived column(s)", built.added.len(), None);
    if built.unparsed_dates > 0 {
        print_warning(&format!(
            "{} sale date(s) could not be parsed; their temporal features are missing",
            built.unparsed_dates
        ));
    }
    let engineered_stats = DatasetStats::from_table("Engineered Data", &built.table);
    append_stats(stats_path, "Feature Engineering Run", &[input_stats, engineered_stats])
        .with_context(|| format!("Failed to write {}", stats_path.display()))?;
    print_step_time(step_start.elapsed());

    // Step 4: Save
    print_step_header(4, "Save Results");
    let step_start = Instant::now();
    let spinner = create_spinner("Writing output file...");
    let mut df = built.table.to_dataframe()?;
    save_dataset(&mut df, output)?;
    finish_with_success(&spinner, &format!("Saved to {}", output.display()));
    print_step_time(step_start.elapsed());

    print_completion("Preparation complete!");
    Ok(())
}

/// Fit the final model on every row and write the artifact
fn run_export(input: &Path, output: &Path, args: &ExperimentArgs) -> Result<()> {
    let config = args
        .to_config()
        .context("Failed to build experiment configuration")?;
    config.validate()?;

    print_banner(env!("CARGO_PKG_VERSION"));

    print_step_header(1, "Load Feature Table");
    let step_start = Instant::now();
    let table = load_table(input, &config)?;
    print_step_time(step_start.elapsed());

    print_step_header(2, "Train Deployment Model");
    let step_start = Instant::now();
    let spinner = create_spinner(&format!(
        "Training on {} records ({} trees)...",
        table.n_rows(),
        config.stage2.n_estimators
    ));
    let artifact = export_artifact(&table, &ExportConfig::from(&config))?;
    finish_with_success(&spinner, "Deployment model trained");
    print_warnings(&artifact.warnings);
    print_step_time(step_start.elapsed());

    print_step_header(3, "Save Artifact");
    artifact
        .save(output)
        .with_context(|| format!("Failed to write artifact: {}", output.display()))?;
    print_success(&format!("Saved to {}", output.display()));

    print_completion("Export complete!");
    Ok(())
}

fn load_table(input: &Path, config: &ExperimentConfig) -> Result<FeatureTable> {
    let spinner = create_spinner("Loading dataset...");
    let (table, refused) = load_feature_table(input, &[config.category_column.clone()])
        .with_context(|| format!("Failed to load dataset: {}", input.display()))?;
    finish_with_success(&spinner, "Dataset loaded");

    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", table.n_rows());
    println!("      Columns: {}", table.n_columns());
    if !refused.is_empty() {
        print_warning(&format!(
            "Refused {} leakage column(s): {}",
            refused.len(),
            refused.join(", ")
        ));
    }
    Ok(table)
}

/// Save dataset to file (CSV or Parquet based on extension)
fn save_dataset(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}
