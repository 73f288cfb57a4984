//! Markdown log of dataset statistics across preparation runs

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use polars::prelude::*;

use crate::pipeline::{FeatureTable, PipelineResult, TARGET_COLUMN};

use super::summary::format_currency;

/// Default statistics file name
pub const DEFAULT_STATS_FILE: &str = "data_stats.md";

/// Shape and price summary of one dataset snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub label: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub price_mean: Option<f64>,
    pub price_median: Option<f64>,
}

impl DatasetStats {
    pub fn from_dataframe(label: &str, df: &DataFrame) -> PipelineResult<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let prices = match df.column(TARGET_COLUMN) {
            Ok(price) => {
                let price = price.cast(&DataType::Float64)?;
                price.f64()?.into_iter().flatten().collect()
            }
            Err(_) => Vec::new(),
        };
        Ok(Self::build(label, df.height(), columns, &prices))
    }

    pub fn from_table(label: &str, table: &FeatureTable) -> Self {
        let prices = table.numeric(TARGET_COLUMN).map(|p| p.to_vec()).unwrap_or_default();
        Self::build(label, table.n_rows(), table.column_names().to_vec(), &prices)
    }

    fn build(label: &str, rows: usize, columns: Vec<String>, prices: &[f64]) -> Self {
        let mut finite: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
        finite.sort_by(f64::total_cmp);
        let n = finite.len();
        let price_mean = (n > 0).then(|| finite.iter().sum::<f64>() / n as f64);
        let price_median = (n > 0).then(|| {
            if n % 2 == 1 {
                finite[n / 2]
            } else {
                (finite[n / 2 - 1] + finite[n / 2]) / 2.0
            }
        });
        Self {
            label: label.to_string(),
            rows,
            columns,
            price_mean,
            price_median,
        }
    }

    /// Markdown block for this snapshot
    pub fn to_markdown(&self) -> String {
        let mut text = format!("**{}**\n", self.label);
        text.push_str(&format!("- Shape: ({}, {})\n", self.rows, self.columns.len()));
        if let (Some(mean), Some(median)) = (self.price_mean, self.price_median) {
            text.push_str(&format!("- Price Mean: {}\n", format_currency(mean)));
            text.push_str(&format!("- Price Median: {}\n", format_currency(median)));
        }
        text.push_str(&format!("- Columns: {}\n", self.columns.join(", ")));
        text
    }
}

/// Append a timestamped section to the statistics file, creating it with a title
pub fn append_stats(path: &Path, run_label: &str, stats: &[DatasetStats]) -> PipelineResult<()> {
    let is_new = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if is_new {
        writeln!(file, "# Data Statistics Log")?;
    }

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file)?;
    writeln!(file, "### {}: {}", run_label, timestamp)?;
    for (i, s) in stats.iter().enumerate() {
        if i > 0 {
            writeln!(file)?;
        }
        write!(file, "{}", s.to_markdown())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stats_from_dataframe() {
        let df = df! {
            "PRICE" => [100000.0f64, 300000.0, 200000.0, 400000.0],
            "SFLA" => [1000i64, 2000, 1500, 2500],
        }
        .unwrap();
        let stats = DatasetStats::from_dataframe("Processed", &df).unwrap();
        assert_eq!(stats.rows, 4);
        assert_eq!(stats.price_mean, Some(250000.0));
        assert_eq!(stats.price_median, Some(250000.0));
        assert!(stats.to_markdown().contains("- Shape: (4, 2)"));
    }

    #[test]
    fn test_stats_without_price() {
        let df = df! { "SFLA" => [1000i64] }.unwrap();
        let stats = DatasetStats::from_dataframe("Raw", &df).unwrap();
        assert!(stats.price_mean.is_none());
        assert!(!stats.to_markdown().contains("Price"));
    }

    #[test]
    fn test_append_stats_keeps_title_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_STATS_FILE);
        let df = df! { "PRICE" => [150000.0f64] }.unwrap();
        let stats = DatasetStats::from_dataframe("Engineered", &df).unwrap();

        append_stats(&path, "Preprocessing Run", &[stats.clone()]).unwrap();
        append_stats(&path, "Feature Engineering Run", &[stats]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("# Data Statistics Log").count(), 1);
        assert_eq!(text.matches("### ").count(), 2);
        assert!(text.contains("$150,000"));
    }
}
