//! Raw county sources: loading, joining and cleaning
//!
//! Sales, residential building and parcel extracts are joined on `PARID`
//! into one row per sale. Leakage columns are removed before anything
//! downstream can see them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use super::config::{DEFAULT_PRICE_FLOOR, TARGET_COLUMN};
use super::error::{PipelineError, PipelineResult};
use super::policy::is_leakage;
use super::table::FeatureTable;

/// Parcel identifier shared by all three sources
pub const PARCEL_ID: &str = "PARID";

/// Rows scanned to infer CSV column types
const INFER_SCHEMA_ROWS: usize = 10_000;

/// Building columns kept for the join
const BUILDING_COLUMNS: &[&str] = &[
    "PARID",
    "YRBLT",
    "RMBED",
    "FIXBATH",
    "SFLA",
    "TOTAL_AREA",
    "STORIES",
    "EXTWALL_DESC",
    "ROOF_COVER_DESC",
];

/// Parcel columns kept for the join; assessment columns are removed later
const PARCEL_COLUMNS: &[&str] = &[
    "PARID", "NBHD", "NBHD_DESC", "LUC", "LUC_DESC", "APRLAND", "APRBLDG", "APRTOT", "SASD",
    "NSASD", "STXBL", "NSTXBL", "COTXBL", "CITXBL",
];

/// Where the raw extracts live and how to filter them
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub sales_file: String,
    pub building_file: String,
    pub parcel_file: String,
    /// Sales at or below this price are placeholders
    pub price_floor: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sales_file: "VCPA_CAMA_SALES.csv".to_string(),
            building_file: "VCPA_CAMA_RES_BLDG.csv".to_string(),
            parcel_file: "VCPA_CAMA_PARCEL.csv".to_string(),
            price_floor: DEFAULT_PRICE_FLOOR,
        }
    }
}

/// Joined sources before cleaning
#[derive(Debug)]
pub struct MergedSources {
    pub data: DataFrame,
    /// Optional sources that were not found
    pub warnings: Vec<String>,
}

/// Cleaned table ready for feature engineering
#[derive(Debug)]
pub struct CleanedSources {
    pub data: DataFrame,
    /// Leakage columns that were removed
    pub dropped_leakage: Vec<String>,
}

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path) -> PipelineResult<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .finish()?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())?,
        _ => {
            return Err(PipelineError::InvalidConfig(format!(
                "unsupported file format '{}' for {}; supported formats: csv, parquet",
                extension,
                path.display()
            )))
        }
    };

    Ok(lf)
}

/// Load an engineered file into a feature table.
///
/// Returns the table and any leakage columns that were refused.
pub fn load_feature_table(
    path: &Path,
    categorical_columns: &[String],
) -> PipelineResult<(FeatureTable, Vec<String>)> {
    if !path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", path.display()),
        )));
    }
    let df = load_dataset(path)?.collect()?;
    FeatureTable::from_dataframe(&df, categorical_columns)
}

/// Load the sales file and join the building and parcel files onto it
pub fn load_and_merge(data_dir: &Path, config: &SourceConfig) -> PipelineResult<MergedSources> {
    let mut warnings = Vec::new();

    let sales_path = data_dir.join(&config.sales_file);
    if !sales_path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("sales file not found: {}", sales_path.display()),
        )));
    }
    let mut merged = load_sales(&sales_path, config.price_floor)?;

    if let Some(path) = optional_source(data_dir, &config.building_file, &mut warnings) {
        let building = read_columns(&path, BUILDING_COLUMNS)?;
        // One parcel may carry several buildings; keep the main one
        let building = if building.get_column_index("SFLA").is_some() {
            dedupe_keep_max(&building, PARCEL_ID, "SFLA")?
        } else {
            dedupe_keep_first(&building, PARCEL_ID)?
        };
        merged = join_on_parcel(merged, building)?;
    }

    if let Some(path) = optional_source(data_dir, &config.parcel_file, &mut warnings) {
        let parcel = read_columns(&path, PARCEL_COLUMNS)?;
        let parcel = dedupe_keep_first(&parcel, PARCEL_ID)?;
        merged = join_on_parcel(merged, parcel)?;
    }

    Ok(MergedSources {
        data: merged,
        warnings,
    })
}

/// Drop leakage columns, re-apply the price floor and zero-fill numeric nulls
pub fn clean_merged(df: &DataFrame, price_floor: f64) -> PipelineResult<CleanedSources> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let (dropped_leakage, kept): (Vec<String>, Vec<String>) =
        names.into_iter().partition(|n| is_leakage(n));

    let kept_df = df.select(kept)?;

    let numeric: Vec<Expr> = kept_df
        .get_columns()
        .iter()
        .filter(|c| c.dtype().is_primitive_numeric())
        .map(|c| col(c.name().as_str()).fill_null(0))
        .collect();

    let has_price = kept_df.get_column_index(TARGET_COLUMN).is_some();
    let mut lf = kept_df.lazy();
    if has_price {
        lf = lf.filter(col(TARGET_COLUMN).cast(DataType::Float64).gt(lit(price_floor)));
    }
    let data = lf.with_columns(numeric).collect()?;

    Ok(CleanedSources {
        data,
        dropped_leakage,
    })
}

fn optional_source(data_dir: &Path, file: &str, warnings: &mut Vec<String>) -> Option<PathBuf> {
    let path = data_dir.join(file);
    if path.exists() {
        Some(path)
    } else {
        warnings.push(format!("{} not found; skipping its columns", file));
        None
    }
}

/// Read sales, normalize the price column name and drop placeholder sales
fn load_sales(path: &Path, price_floor: f64) -> PipelineResult<DataFrame> {
    let sales = load_dataset(path)?.collect()?;

    let names: Vec<String> = sales
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let price_column = names
        .iter()
        .find(|n| n.to_uppercase().contains(TARGET_COLUMN))
        .cloned()
        .ok_or_else(|| PipelineError::MissingColumn(format!("price column in {}", path.display())))?;
    if !names.iter().any(|n| n == PARCEL_ID) {
        return Err(PipelineError::MissingColumn(PARCEL_ID.to_string()));
    }

    let projection: Vec<Expr> = names
        .iter()
        .filter(|n| n.as_str() == price_column || n.as_str() != TARGET_COLUMN)
        .map(|n| {
            if n == &price_column {
                col(n.as_str()).cast(DataType::Float64).alias(TARGET_COLUMN)
            } else if n == PARCEL_ID {
                col(n.as_str()).cast(DataType::String)
            } else {
                col(n.as_str())
            }
        })
        .collect();

    let df = sales
        .lazy()
        .select(projection)
        .filter(
            col(PARCEL_ID)
                .is_not_null()
                .and(col(TARGET_COLUMN).is_not_null())
                .and(col(TARGET_COLUMN).gt(lit(price_floor))),
        )
        .collect()?;
    Ok(df)
}

/// Read only the wanted columns that exist in the file, with `PARID` as string
fn read_columns(path: &Path, wanted: &[&str]) -> PipelineResult<DataFrame> {
    let lf = load_dataset(path)?;
    let schema = lf.clone().collect_schema()?;
    if schema.get(PARCEL_ID).is_none() {
        return Err(PipelineError::MissingColumn(format!(
            "{} in {}",
            PARCEL_ID,
            path.display()
        )));
    }

    let projection: Vec<Expr> = wanted
        .iter()
        .filter(|name| schema.get(name).is_some())
        .map(|&name| {
            if name == PARCEL_ID {
                col(name).cast(DataType::String)
            } else {
                col(name)
            }
        })
        .collect();

    Ok(lf
        .select(projection)
        .filter(col(PARCEL_ID).is_not_null())
        .collect()?)
}

fn join_on_parcel(left: DataFrame, right: DataFrame) -> PipelineResult<DataFrame> {
    Ok(left
        .lazy()
        .join(
            right.lazy(),
            [col(PARCEL_ID)],
            [col(PARCEL_ID)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?)
}

fn key_labels(df: &DataFrame, key: &str) -> PipelineResult<Vec<Option<String>>> {
    let keys = df.column(key)?.cast(&DataType::String)?;
    Ok(keys
        .str()?
        .iter()
        .map(|k| k.map(|s| s.to_string()))
        .collect())
}

fn take_sorted(df: &DataFrame, mut indices: Vec<IdxSize>) -> PipelineResult<DataFrame> {
    indices.sort_unstable();
    let idx = IdxCa::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}

/// Keep the first row per key, preserving row order
pub fn dedupe_keep_first(df: &DataFrame, key: &str) -> PipelineResult<DataFrame> {
    let keys = key_labels(df, key)?;
    let mut seen: HashMap<String, IdxSize> = HashMap::new();
    for (row, k) in keys.into_iter().enumerate() {
        if let Some(k) = k {
            seen.entry(k).or_insert(row as IdxSize);
        }
    }
    take_sorted(df, seen.into_values().collect())
}

/// Keep the row with the largest `by` value per key; ties keep the earlier row
pub fn dedupe_keep_max(df: &DataFrame, key: &str, by: &str) -> PipelineResult<DataFrame> {
    let keys = key_labels(df, key)?;
    let values = df.column(by)?.cast(&DataType::Float64)?;
    let values: Vec<f64> = values
        .f64()?
        .iter()
        .map(|v| v.unwrap_or(f64::NEG_INFINITY))
        .collect();

    let mut best: HashMap<String, (IdxSize, f64)> = HashMap::new();
    for (row, k) in keys.into_iter().enumerate() {
        let Some(k) = k else { continue };
        let v = values[row];
        best.entry(k)
            .and_modify(|entry| {
                if v > entry.1 {
                    *entry = (row as IdxSize, v);
                }
            })
            .or_insert((row as IdxSize, v));
    }
    take_sorted(df, best.into_values().map(|(row, _)| row).collect())
}
