//! Feature table and numeric matrix types
//!
//! `FeatureTable` is the column-major, typed table the engine works on once
//! the raw sources have been joined. Every column is declared either numeric
//! or categorical; no type inference happens past this point. The table
//! refuses any column that the field policy classifies as leakage.
//!
//! `FeatureMatrix` is the dense row-major `f64` matrix handed to learners.

use std::collections::HashSet;

use polars::prelude::*;
use serde::Serialize;

use super::error::{LearnerError, PipelineError, PipelineResult};
use super::policy::is_leakage;

/// Semantic type of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Values of a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Numeric values; missing values are NaN
    Numeric(Vec<f64>),
    /// Category labels; missing values are the empty string
    Categorical(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }

    /// Gather the values at the given row indices
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// An ordered set of typed columns sharing one row count.
///
/// Each row is one historical sale. Parcel identifiers are ordinary
/// categorical columns and may repeat.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    n_rows: usize,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, replacing any existing column with the same name.
    ///
    /// Fails if the name is a leakage field or the length does not match
    /// the table's row count.
    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> PipelineResult<()> {
        let name = name.into();
        if is_leakage(&name) {
            return Err(PipelineError::LeakageField(name));
        }
        if !self.columns.is_empty() && data.len() != self.n_rows {
            return Err(PipelineError::InvalidConfig(format!(
                "column '{}' has {} rows, table has {}",
                name,
                data.len(),
                self.n_rows
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = data.len();
        }

        match self.position(&name) {
            Some(idx) => self.columns[idx] = data,
            None => {
                self.names.push(name);
                self.columns.push(data);
            }
        }
        Ok(())
    }

    /// Remove a column and return its data
    pub fn drop_column(&mut self, name: &str) -> Option<ColumnData> {
        let idx = self.position(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(ColumnData::kind)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.position(name).map(|idx| &self.columns[idx])
    }

    /// Get a numeric column by name
    pub fn numeric(&self, name: &str) -> PipelineResult<&[f64]> {
        match self.column(name) {
            Some(ColumnData::Numeric(v)) => Ok(v),
            Some(ColumnData::Categorical(_)) => Err(PipelineError::ColumnType {
                name: name.to_string(),
                expected: "numeric",
            }),
            None => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    /// Get a categorical column by name
    pub fn categorical(&self, name: &str) -> PipelineResult<&[String]> {
        match self.column(name) {
            Some(ColumnData::Categorical(v)) => Ok(v),
            Some(ColumnData::Numeric(_)) => Err(PipelineError::ColumnType {
                name: name.to_string(),
                expected: "categorical",
            }),
            None => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    /// Column values rendered as strings (numeric values without trailing `.0`)
    pub fn labels(&self, name: &str) -> PipelineResult<Vec<String>> {
        match self.column(name) {
            Some(ColumnData::Categorical(v)) => Ok(v.clone()),
            Some(ColumnData::Numeric(v)) => Ok(v.iter().map(|x| format_number(*x)).collect()),
            None => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    /// New table holding only the given rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            n_rows: indices.len(),
        }
    }

    /// New table holding the rows where `mask` is true
    pub fn filter_rows(&self, mask: &[bool]) -> FeatureTable {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| if keep { Some(i) } else { None })
            .collect();
        self.take_rows(&indices)
    }

    /// Convert a polars DataFrame into a feature table.
    ///
    /// String columns and any column named in `categorical_columns` become
    /// categorical; other numeric and boolean columns become numeric with
    /// nulls as NaN. Temporal columns are kept as their string form.
    /// Leakage columns are refused and returned in the second element.
    pub fn from_dataframe(
        df: &DataFrame,
        categorical_columns: &[String],
    ) -> PipelineResult<(FeatureTable, Vec<String>)> {
        let declared: HashSet<&str> = categorical_columns.iter().map(|s| s.as_str()).collect();
        let mut table = FeatureTable::new();
        let mut refused = Vec::new();

        for col in df.get_columns() {
            let name = col.name().to_string();
            if is_leakage(&name) {
                refused.push(name);
                continue;
            }

            let is_numeric = col.dtype().is_primitive_numeric() || col.dtype() == &DataType::Boolean;
            let data = if is_numeric && !declared.contains(name.as_str()) {
                let float_col = col.cast(&DataType::Float64)?;
                let values: Vec<f64> = float_col
                    .f64()?
                    .iter()
                    .map(|v| v.unwrap_or(f64::NAN))
                    .collect();
                ColumnData::Numeric(values)
            } else {
                let values = column_to_labels(col)?;
                ColumnData::Categorical(values)
            };
            table.push_column(name, data)?;
        }

        if table.n_columns() == 0 {
            table.n_rows = df.height();
        }

        Ok((table, refused))
    }

    /// Convert the table back into a polars DataFrame
    pub fn to_dataframe(&self) -> PipelineResult<DataFrame> {
        let columns: Vec<Column> = self
            .names
            .iter()
            .zip(&self.columns)
            .map(|(name, data)| match data {
                ColumnData::Numeric(v) => Column::new(name.as_str().into(), v.clone()),
                ColumnData::Categorical(v) => Column::new(name.as_str().into(), v.clone()),
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Convert a polars column to string labels, integers without a decimal point
fn column_to_labels(col: &Column) -> PipelineResult<Vec<String>> {
    let values = match col.dtype() {
        DataType::Float32 | DataType::Float64 => {
            let cast = col.cast(&DataType::Float64)?;
            cast.f64()?
                .iter()
                .map(|v| v.map(format_number).unwrap_or_default())
                .collect()
        }
        _ => {
            let cast = col.cast(&DataType::String)?;
            cast.str()?
                .iter()
                .map(|v| v.map(|s| s.to_string()).unwrap_or_default())
                .collect()
        }
    };
    Ok(values)
}

/// Format a number as a category label: `1203.0` becomes `"1203"`
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Dense row-major numeric matrix with named columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build a matrix from equally long columns
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, LearnerError> {
        if names.len() != columns.len() {
            return Err(LearnerError::ShapeMismatch {
                expected: format!("{} columns", names.len()),
                actual: format!("{} columns", columns.len()),
            });
        }
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(LearnerError::ShapeMismatch {
                expected: format!("{} rows", n_rows),
                actual: format!("{} rows", bad.len()),
            });
        }

        let n_cols = columns.len();
        let mut data = vec![0.0; n_rows * n_cols];
        for (c, column) in columns.iter().enumerate() {
            for (r, &value) in column.iter().enumerate() {
                data[r * n_cols + c] = value;
            }
        }

        Ok(Self { names, n_rows, data })
    }

    /// Build a matrix from rows
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, LearnerError> {
        let n_cols = names.len();
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for row in rows {
            if row.len() != n_cols {
                return Err(LearnerError::ShapeMismatch {
                    expected: format!("{} columns", n_cols),
                    actual: format!("{} columns", row.len()),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            names,
            n_rows: rows.len(),
            data,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, r: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.data[r * n_cols..(r + 1) * n_cols]
    }

    pub fn value(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.n_cols() + c]
    }

    /// Copy out one column
    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.n_rows).map(|r| self.value(r, c)).collect()
    }

    /// New matrix with one column appended at the end
    pub fn with_column(&self, name: impl Into<String>, values: &[f64]) -> Result<Self, LearnerError> {
        if values.len() != self.n_rows {
            return Err(LearnerError::ShapeMismatch {
                expected: format!("{} rows", self.n_rows),
                actual: format!("{} rows", values.len()),
            });
        }
        let n_cols = self.n_cols();
        let mut data = Vec::with_capacity(self.n_rows * (n_cols + 1));
        for (r, &value) in values.iter().enumerate() {
            data.extend_from_slice(&self.data[r * n_cols..(r + 1) * n_cols]);
            data.push(value);
        }
        let mut names = self.names.clone();
        names.push(name.into());
        Ok(Self {
            names,
            n_rows: self.n_rows,
            data,
        })
    }
}
