//! Cross-validation summary report

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{BucketStageStatus, CvReport, FoldStatus};

/// Everything shown at the end of an experiment run
#[derive(Debug)]
pub struct RunSummary<'a> {
    pub period: String,
    pub report: &'a CvReport,
    pub feature_hash: String,
}

impl<'a> RunSummary<'a> {
    pub fn new(period: impl Into<String>, report: &'a CvReport, feature_hash: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            report,
            feature_hash: feature_hash.into(),
        }
    }

    /// Per-fold table
    pub fn fold_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Fold").add_attribute(Attribute::Bold),
            Cell::new("Train").add_attribute(Attribute::Bold),
            Cell::new("Valid").add_attribute(Attribute::Bold),
            Cell::new("Stage 1").add_attribute(Attribute::Bold),
            Cell::new("R²").add_attribute(Attribute::Bold),
            Cell::new("RMSE").add_attribute(Attribute::Bold),
        ]);

        for fold in &self.report.folds {
            let mut row = vec![
                Cell::new(fold.fold),
                Cell::new(fold.train_rows).set_alignment(CellAlignment::Right),
                Cell::new(fold.validation_rows).set_alignment(CellAlignment::Right),
            ];
            match &fold.status {
                FoldStatus::Scored { score, stage1, .. } => {
                    let stage1_cell = match stage1 {
                        BucketStageStatus::Applied { buckets } => {
                            Cell::new(format!("{} buckets", buckets)).fg(Color::Cyan)
                        }
                        BucketStageStatus::Skipped { .. } => Cell::new("skipped").fg(Color::Yellow),
                    };
                    row.push(stage1_cell);
                    row.push(
                        Cell::new(format!("{:.4}", score.r2))
                            .fg(r2_color(score.r2))
                            .set_alignment(CellAlignment::Right),
                    );
                    row.push(
                        Cell::new(format_currency(score.rmse)).set_alignment(CellAlignment::Right),
                    );
                }
                FoldStatus::Skipped { .. } => {
                    row.push(Cell::new("-"));
                    row.push(Cell::new("skipped").fg(Color::Red));
                    row.push(Cell::new("-"));
                }
            }
            table.add_row(row);
        }
        table
    }

    /// Aggregate metrics table
    pub fn metrics_table(&self) -> Table {
        let metrics = &self.report.metrics;
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![Cell::new("📅 Period"), Cell::new(&self.period)]);
        table.add_row(vec![Cell::new("📁 Rows"), Cell::new(self.report.rows)]);
        table.add_row(vec![
            Cell::new("🧮 Features"),
            Cell::new(self.report.features.len()),
        ]);
        table.add_row(vec![Cell::new("🔑 Feature Hash"), Cell::new(&self.feature_hash)]);
        table.add_row(vec![
            Cell::new("📊 Folds Scored"),
            Cell::new(format!("{}/{}", metrics.folds, self.report.folds.len())),
        ]);
        table.add_row(vec![
            Cell::new("✅ R² Mean"),
            Cell::new(format!("{:.4} (± {:.4})", metrics.r2_mean, metrics.r2_std))
                .fg(r2_color(metrics.r2_mean))
                .add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("📉 RMSE Mean"),
            Cell::new(format_currency(metrics.rmse_mean)).add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("⚠️  Warnings"),
            Cell::new(self.report.warnings.len()).fg(if self.report.warnings.is_empty() {
                Color::White
            } else {
                Color::Yellow
            }),
        ]);
        table
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("CROSS-VALIDATION SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        for line in self.fold_table().to_string().lines() {
            println!("    {}", line);
        }
        println!();
        for line in self.metrics_table().to_string().lines() {
            println!("    {}", line);
        }

        println!();
        println!(
            "    {} {}:",
            style("Features").yellow(),
            style(format!("({})", self.report.features.len())).dim()
        );
        for feature in &self.report.features {
            println!("      {} {}", style("•").dim(), feature);
        }
    }
}

fn r2_color(r2: f64) -> Color {
    if r2 >= 0.8 {
        Color::Green
    } else if r2 >= 0.5 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Whole currency units with thousands separators: `41234.6` becomes `$41,235`
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return format!("{}", value);
    }
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}
