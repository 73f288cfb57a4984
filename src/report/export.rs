//! Deployment artifact export
//!
//! Fits the final-stage learner on every row and bundles it with the
//! full-data neighbourhood encoding and the lookups a pricing front end
//! needs. The field names and the feature order are a compatibility
//! contract for downstream consumers.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::binning::quantile_sorted;
use crate::pipeline::cross_validation::ENCODED_SUFFIX;
use crate::pipeline::features::group_medians;
use crate::pipeline::{
    fit_deployment_encoding, EncodingMap, ExperimentConfig, FeatureMatrix, FeatureTable,
    FoldEncoder, GradientBoostedTrees, Learner, LearnerError, LearnerParams, PipelineError,
    PipelineResult, DEFAULT_FEATURES, DEFAULT_PRICE_FLOOR,
};

/// Default artifact file name
pub const DEFAULT_ARTIFACT_FILE: &str = "model_artifacts.json";

/// Number of land-use codes offered in the front end
const TOP_LUC_COUNT: usize = 5;

/// Land-use code offered when the table has no `LUC` column
const FALLBACK_LUC: &str = "99";

/// Settings for [`export_artifact`]
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Raw feature names; the category column is replaced by its encoding
    pub features: Vec<String>,
    pub target: String,
    pub category_column: String,
    pub params: LearnerParams,
    pub price_floor: f64,
    /// Label of the sale period the data covers
    pub date_range: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig::from(&ExperimentConfig::default())
    }
}

impl From<&ExperimentConfig> for ExportConfig {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            features: if config.features.is_empty() {
                DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect()
            } else {
                config.features.clone()
            },
            target: config.target.clone(),
            category_column: config.category_column.clone(),
            params: config.stage2.clone(),
            price_floor: DEFAULT_PRICE_FLOOR,
            date_range: config.period.to_string(),
        }
    }
}

/// Integer slider bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: i64,
    pub max: i64,
}

/// Input ranges and lookups for the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiStats {
    /// Living area; the maximum is the 99th percentile
    #[serde(rename = "SFLA")]
    pub sfla: Range,
    #[serde(rename = "YRBLT", skip_serializing_if = "Option::is_none", default)]
    pub yrblt: Option<Range>,
    #[serde(rename = "RMBED", skip_serializing_if = "Option::is_none", default)]
    pub rmbed: Option<Range>,
    pub nbhds: Vec<String>,
    pub data_count: usize,
    pub date_range: String,
}

/// Everything a downstream pricing service needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    pub model: GradientBoostedTrees,
    /// Exact column order the model expects
    pub features: Vec<String>,
    /// Full-data encoding; its fallback is the global mean price
    pub nbhd_price_map: EncodingMap,
    pub nbhd_size_map: BTreeMap<String, f64>,
    pub nbhd_name_map: BTreeMap<String, String>,
    pub nbhd_luc_map: BTreeMap<String, String>,
    pub top_lucs: Vec<String>,
    pub ui_stats: UiStats,
    /// Recoverable problems met during export
    #[serde(default, skip_serializing)]
    pub warnings: Vec<String>,
}

impl DeploymentArtifact {
    /// Write as pretty-printed JSON
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Score a matrix whose columns match [`DeploymentArtifact::features`] exactly
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>, LearnerError> {
        if x.names() != self.features.as_slice() {
            return Err(LearnerError::ShapeMismatch {
                expected: self.features.join(","),
                actual: x.names().join(","),
            });
        }
        self.model.predict(x)
    }

    /// Encode the category column of `table` and score every row
    pub fn predict_table(&self, table: &FeatureTable, category_column: &str) -> PipelineResult<Vec<f64>> {
        let encoded_name = format!("{}{}", category_column, ENCODED_SUFFIX);
        let mut columns = Vec::with_capacity(self.features.len());
        for name in &self.features {
            if name == &encoded_name {
                let categories = table.labels(category_column)?;
                columns.push(FoldEncoder::transform(&self.nbhd_price_map, &categories));
            } else {
                columns.push(table.numeric(name)?.to_vec());
            }
        }
        let x = FeatureMatrix::from_columns(self.features.clone(), columns)
            .map_err(|source| PipelineError::Learner { fold: 0, source })?;
        self.predict(&x)
            .map_err(|source| PipelineError::Learner { fold: 0, source })
    }
}

/// Fit the deployment model on every eligible row of `table`
pub fn export_artifact(table: &FeatureTable, config: &ExportConfig) -> PipelineResult<DeploymentArtifact> {
    let category = config.category_column.as_str();
    let mut warnings = Vec::new();

    // Rows with a usable price, size and neighbourhood
    let price = table.numeric(&config.target)?;
    let sfla = table.numeric("SFLA")?;
    let codes = table.labels(category)?;
    let mask: Vec<bool> = (0..table.n_rows())
        .map(|i| price[i].is_finite() && price[i] > config.price_floor && !sfla[i].is_nan() && !codes[i].is_empty())
        .collect();
    let table = table.filter_rows(&mask);
    if table.n_rows() == 0 {
        return Err(PipelineError::EmptyDataset {
            period: config.date_range.clone(),
        });
    }

    let codes = table.labels(category)?;
    let price = table.numeric(&config.target)?.to_vec();
    let sfla = table.numeric("SFLA")?.to_vec();

    let nbhd_price_map = fit_deployment_encoding(&table, category, &config.target)?;
    let encoded = FoldEncoder::transform(&nbhd_price_map, &codes);

    let nbhd_size_map = match table.numeric("NBHD_Median_Size") {
        Ok(sizes) => first_per_group(&codes, sizes),
        Err(_) => group_medians(&codes, &sfla).into_iter().collect(),
    };

    let nbhd_name_map: BTreeMap<String, String> = match table.labels("NBHD_DESC") {
        Ok(names) => first_per_group(&codes, &names),
        Err(_) => {
            warnings.push("NBHD_DESC not found; using neighbourhood codes as names".to_string());
            codes.iter().map(|c| (c.clone(), c.clone())).collect()
        }
    };

    let (nbhd_luc_map, top_lucs) = match table.labels("LUC") {
        Ok(lucs) => (mode_per_group(&codes, &lucs), most_frequent(&lucs, TOP_LUC_COUNT)),
        Err(_) => (BTreeMap::new(), vec![FALLBACK_LUC.to_string()]),
    };

    // Model columns: raw features without the category, then its encoding
    let encoded_name = format!("{}{}", category, ENCODED_SUFFIX);
    if config.features.contains(&encoded_name) {
        warnings.push(format!(
            "Feature '{}' is rebuilt from the full-data encoding; requested column ignored",
            encoded_name
        ));
    }
    let mut features: Vec<String> = config
        .features
        .iter()
        .filter(|f| f.as_str() != category && **f != encoded_name)
        .cloned()
        .collect();
    features.push(encoded_name.clone());

    let missing: Vec<&String> = features
        .iter()
        .filter(|f| **f != encoded_name && !table.has_column(f))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingColumn(
            missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
        ));
    }

    let mut columns = Vec::with_capacity(features.len());
    for name in &features {
        if name == &encoded_name {
            columns.push(encoded.clone());
        } else {
            columns.push(table.numeric(name)?.to_vec());
        }
    }
    let to_pipeline = |source| PipelineError::Learner { fold: 0, source };
    let x = FeatureMatrix::from_columns(features.clone(), columns).map_err(to_pipeline)?;

    let mut model = GradientBoostedTrees::new(config.params.clone());
    model.fit(&x, &price).map_err(to_pipeline)?;

    let ui_stats = UiStats {
        sfla: sfla_range(&sfla),
        yrblt: table.numeric("YRBLT").ok().and_then(min_max),
        rmbed: table.numeric("RMBED").ok().and_then(min_max),
        nbhds: sorted_codes(&codes),
        data_count: table.n_rows(),
        date_range: config.date_range.clone(),
    };

    Ok(DeploymentArtifact {
        model,
        features,
        nbhd_price_map,
        nbhd_size_map,
        nbhd_name_map,
        nbhd_luc_map,
        top_lucs,
        ui_stats,
        warnings,
    })
}

fn first_per_group<T: Clone>(groups: &[String], values: &[T]) -> BTreeMap<String, T> {
    let mut out = BTreeMap::new();
    for (g, v) in groups.iter().zip(values) {
        out.entry(g.clone()).or_insert_with(|| v.clone());
    }
    out
}

/// Most frequent value per group; ties go to the smallest value
fn mode_per_group(groups: &[String], values: &[String]) -> BTreeMap<String, String> {
    let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for (g, v) in groups.iter().zip(values) {
        *counts.entry(g.clone()).or_default().entry(v.clone()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter_map(|(g, per_value)| {
            let mut best: Option<(String, usize)> = None;
            for (value, count) in per_value {
                if best.as_ref().map_or(true, |(_, c)| count > *c) {
                    best = Some((value, count));
                }
            }
            best.map(|(value, _)| (g, value))
        })
        .collect()
}

/// The `n` most frequent values, by count then first appearance
fn most_frequent(values: &[String], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, v) in values.iter().enumerate() {
        counts.entry(v.as_str()).or_insert((0, i)).0 += 1;
    }
    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(n).map(|(v, _)| v.to_string()).collect()
}

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

fn min_max(values: &[f64]) -> Option<Range> {
    let sorted = finite_sorted(values);
    Some(Range {
        min: *sorted.first()? as i64,
        max: *sorted.last()? as i64,
    })
}

fn sfla_range(values: &[f64]) -> Range {
    let sorted = finite_sorted(values);
    match sorted.first() {
        Some(&min) => Range {
            min: min as i64,
            max: quantile_sorted(&sorted, 0.99) as i64,
        },
        None => Range { min: 0, max: 0 },
    }
}

/// Distinct codes, numerically ordered when every code is a number
fn sorted_codes(codes: &[String]) -> Vec<String> {
    let mut distinct: Vec<String> = codes.to_vec();
    distinct.sort();
    distinct.dedup();
    if distinct.iter().all(|c| c.parse::<f64>().is_ok()) {
        distinct.sort_by(|a, b| {
            let a: f64 = a.parse().unwrap_or(0.0);
            let b: f64 = b.parse().unwrap_or(0.0);
            a.total_cmp(&b)
        });
    }
    distinct
}
