//! Derived feature columns
//!
//! Adds temporal, age, size and neighbourhood columns to a cleaned table.
//! Every derived column is produced only when its inputs are present and
//! numeric. Neighbourhood medians are computed over the whole table.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use super::config::CATEGORY_COLUMN;
use super::error::PipelineResult;
use super::table::{ColumnData, FeatureTable};

/// Sale date formats seen in the county extracts
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%d-%b-%y", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Output of [`FeatureBuilder::build`]
#[derive(Debug, Clone)]
pub struct BuiltFeatures {
    pub table: FeatureTable,
    /// Derived columns in the order they were added
    pub added: Vec<String>,
    /// Non-empty sale dates that could not be parsed
    pub unparsed_dates: usize,
}

/// Adds derived columns to a feature table
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    pub category_column: String,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            category_column: CATEGORY_COLUMN.to_string(),
        }
    }
}

impl FeatureBuilder {
    pub fn build(&self, table: &FeatureTable) -> PipelineResult<BuiltFeatures> {
        let mut table = table.clone();
        let mut added = Vec::new();
        let mut unparsed_dates = 0;

        // Temporal
        if let Ok(dates) = table.labels("SALEDT") {
            let mut years = Vec::with_capacity(dates.len());
            let mut months = Vec::with_capacity(dates.len());
            for raw in &dates {
                match parse_sale_date(raw) {
                    Some(date) => {
                        years.push(date.year() as f64);
                        months.push(date.month() as f64);
                    }
                    None => {
                        if !raw.trim().is_empty() {
                            unparsed_dates += 1;
                        }
                        years.push(f64::NAN);
                        months.push(f64::NAN);
                    }
                }
            }
            push(&mut table, &mut added, "SaleYear", years)?;
            push(&mut table, &mut added, "Month", months)?;
        } else if let Some(tax_year) = numeric(&table, "TAXYR") {
            let years = tax_year.to_vec();
            let months = vec![1.0; years.len()];
            push(&mut table, &mut added, "SaleYear", years)?;
            push(&mut table, &mut added, "Month", months)?;
        }

        // Age
        if let (Some(year_built), Some(sale_year)) =
            (numeric(&table, "YRBLT"), numeric(&table, "SaleYear"))
        {
            let age: Vec<f64> = sale_year
                .iter()
                .zip(year_built)
                .map(|(s, b)| clip_lower(s - b, 0.0))
                .collect();
            let age_squared = age.iter().map(|a| a * a).collect();
            push(&mut table, &mut added, "HouseAge", age)?;
            push(&mut table, &mut added, "HouseAge_Squared", age_squared)?;
        }

        // Size
        if let Some(sfla) = numeric(&table, "SFLA") {
            let sfla = sfla.to_vec();
            let squared = sfla.iter().map(|s| s * s).collect();
            push(&mut table, &mut added, "SFLA_Squared", squared)?;

            if let Some(total_area) = numeric(&table, "TOTAL_AREA") {
                let ratio = safe_ratio(&sfla, total_area);
                push(&mut table, &mut added, "Efficiency_Ratio", ratio)?;
            }
        }

        if let (Some(beds), Some(baths)) = (numeric(&table, "RMBED"), numeric(&table, "FIXBATH")) {
            let ratio = safe_ratio(beds, baths);
            push(&mut table, &mut added, "Bed_Bath_Ratio", ratio)?;
        }

        // Neighbourhood
        if table.has_column(&self.category_column) {
            if let Some(sfla) = numeric(&table, "SFLA") {
                let sfla = sfla.to_vec();
                let groups = table.labels(&self.category_column)?;
                let medians = group_medians(&groups, &sfla);
                let median_size: Vec<f64> = groups
                    .iter()
                    .map(|g| medians.get(g).copied().unwrap_or(f64::NAN))
                    .collect();
                let relative: Vec<f64> = sfla
                    .iter()
                    .zip(&median_size)
                    .map(|(s, m)| s - m)
                    .collect();
                push(&mut table, &mut added, "NBHD_Median_Size", median_size)?;
                push(&mut table, &mut added, "Size_vs_NBHD", relative)?;
            }
        }

        Ok(BuiltFeatures {
            table,
            added,
            unparsed_dates,
        })
    }
}

fn numeric<'a>(table: &'a FeatureTable, name: &str) -> Option<&'a [f64]> {
    table.numeric(name).ok()
}

fn push(
    table: &mut FeatureTable,
    added: &mut Vec<String>,
    name: &str,
    values: Vec<f64>,
) -> PipelineResult<()> {
    table.push_column(name, ColumnData::Numeric(values))?;
    added.push(name.to_string());
    Ok(())
}

/// Parse a sale date in any of the known formats
pub fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Lower clip that keeps NaN
fn clip_lower(value: f64, lower: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.max(lower)
    }
}

/// Element-wise ratio; zero denominators and missing values give 0
fn safe_ratio(numerator: &[f64], denominator: &[f64]) -> Vec<f64> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(n, d)| {
            let r = if *d == 0.0 { f64::NAN } else { n / d };
            if r.is_finite() {
                r
            } else {
                0.0
            }
        })
        .collect()
}

/// Median of the non-missing values in each group
pub fn group_medians(groups: &[String], values: &[f64]) -> HashMap<String, f64> {
    let mut buckets: HashMap<String, Vec<f64>> = HashMap::new();
    for (g, &v) in groups.iter().zip(values) {
        let entry = buckets.entry(g.clone()).or_default();
        if !v.is_nan() {
            entry.push(v);
        }
    }
    buckets
        .into_iter()
        .map(|(g, mut v)| {
            v.sort_by(f64::total_cmp);
            (g, median_sorted(&v))
        })
        .collect()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        f64::NAN
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
