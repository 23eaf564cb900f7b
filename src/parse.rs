use crate::estimator::{RawModelOutput, RawTable, RuntimeContext, DEFAULT_RSCRIPT};
use crate::process::{AdmixError, DatasetHandle, ModelOutcome, PopulationList};
use crate::stats::{FitRow, WeightsRow};

use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Settings read from the line-oriented `key: value` config file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub prefix: Option<String>,
    pub rscript: Option<String>,
    pub allsnps: bool,
    pub tmpdir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            prefix: None,
            rscript: None,
            allsnps: true,
            tmpdir: None,
        }
    }
}

impl AppConfig {
    pub fn dataset(&self) -> Option<DatasetHandle> {
        self.prefix.as_deref().map(DatasetHandle::new)
    }

    /// `rscript_override` (from the command line) wins over the config file.
    pub fn runtime_context(&self, rscript_override: Option<&str>) -> RuntimeContext {
        RuntimeContext {
            rscript: rscript_override
                .or(self.rscript.as_deref())
                .unwrap_or(DEFAULT_RSCRIPT)
                .to_string(),
            work_dir: self.tmpdir.clone().unwrap_or_else(RuntimeContext::default_work_dir),
            allsnps: self.allsnps,
        }
    }
}

// Splits on the first ':'; blank lines and lines without one are skipped.
fn key_value_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        line.split_once(':').map(|(key, value)| (key.trim(), value.trim()))
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "t" => Some(true),
        "false" | "no" | "0" | "f" => Some(false),
        _ => None,
    }
}

pub fn parse_config_str(content: &str) -> AppConfig {
    let mut config = AppConfig::default();
    for (key, value) in key_value_lines(content) {
        let non_empty = if value.is_empty() { None } else { Some(value.to_string()) };
        match key {
            "prefix" => config.prefix = non_empty,
            "rscript" => config.rscript = non_empty,
            "tmpdir" => config.tmpdir = non_empty.map(PathBuf::from),
            "allsnps" => match parse_flag(value) {
                Some(flag) => config.allsnps = flag,
                None => warn!("Ignoring unrecognized allsnps value '{}'", value),
            },
            other => debug!("Ignoring unknown config key '{}'", other),
        }
    }
    config
}

fn read_optional(path: &Path) -> Result<Option<String>, AdmixError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AdmixError::Io(e)),
    }
}

/// A missing file yields the empty configuration.
pub fn load_config(path: &Path) -> Result<AppConfig, AdmixError> {
    match read_optional(path)? {
        Some(content) => Ok(parse_config_str(&content)),
        None => {
            debug!("No config file at {}", path.display());
            Ok(AppConfig::default())
        }
    }
}

/// Predefined population lists in file order. Redefining a name replaces its
/// populations but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedLists {
    entries: Vec<(String, PopulationList)>,
}

impl NamedLists {
    pub fn parse_str(content: &str) -> Self {
        let mut lists = NamedLists::default();
        for (name, pops) in key_value_lines(content) {
            let populations: PopulationList = pops.split(',').map(|p| p.trim().to_string()).collect();
            if populations.names().iter().any(|p| p.is_empty()) {
                warn!("List '{}' contains an empty population name", name);
            }
            lists.insert(name.to_string(), populations);
        }
        lists
    }

    pub fn insert(&mut self, name: String, populations: PopulationList) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = populations,
            None => self.entries.push((name, populations)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PopulationList> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, pops)| pops)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulationList)> {
        self.entries.iter().map(|(n, pops)| (n.as_str(), pops))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_named_lists(path: &Path) -> Result<NamedLists, AdmixError> {
    Ok(read_optional(path)?
        .map(|content| NamedLists::parse_str(&content))
        .unwrap_or_default())
}

pub fn read_raw_table(path: &Path) -> Result<RawTable, AdmixError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.iter().map(String::from).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(String::from).collect());
    }
    Ok(RawTable { headers, rows })
}

fn column_index(table: &RawTable, table_name: &str, column: &str) -> Result<usize, AdmixError> {
    table.headers.iter().position(|h| h == column).ok_or_else(|| {
        AdmixError::Parse(format!(
            "{} table has no '{}' column (found: {})",
            table_name,
            column,
            table.headers.join(", ")
        ))
    })
}

fn cell<'t>(table: &'t RawTable, table_name: &str, row: usize, col: usize) -> Result<&'t str, AdmixError> {
    table.rows[row]
        .get(col)
        .map(|s| s.as_str())
        .ok_or_else(|| AdmixError::Parse(format!("{} table row {} is missing column {}", table_name, row + 1, col + 1)))
}

/// Reads a numeric cell. R's `NA`, `NaN` and `Inf` spellings are accepted.
pub fn parse_numeric(value: &str, table_name: &str, row: usize, column: &str) -> Result<f64, AdmixError> {
    match value.trim() {
        "NA" | "NaN" => Ok(f64::NAN),
        "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        trimmed => trimmed.parse::<f64>().map_err(|_| {
            AdmixError::Parse(format!(
                "{} table row {}: '{}' in column '{}' is not a number",
                table_name,
                row + 1,
                value,
                column
            ))
        }),
    }
}

fn parse_weights(table: &RawTable) -> Result<Vec<WeightsRow>, AdmixError> {
    const NAME: &str = "weights";
    let target_col = column_index(table, NAME, "target")?;
    let left_col = column_index(table, NAME, "left")?;
    let weight_col = column_index(table, NAME, "weight")?;
    let se_col = column_index(table, NAME, "se")?;

    if table.rows.is_empty() {
        return Err(AdmixError::Parse("weights table has no rows".to_string()));
    }

    (0..table.rows.len())
        .map(|i| -> Result<WeightsRow, AdmixError> {
            Ok(WeightsRow {
                target: cell(table, NAME, i, target_col)?.to_string(),
                left: cell(table, NAME, i, left_col)?.to_string(),
                weight: parse_numeric(cell(table, NAME, i, weight_col)?, NAME, i, "weight")?,
                se: parse_numeric(cell(table, NAME, i, se_col)?, NAME, i, "se")?,
            })
        })
        .collect()
}

fn parse_fit(table: &RawTable) -> Result<FitRow, AdmixError> {
    const NAME: &str = "rankdrop";
    let p_col = column_index(table, NAME, "p")?;
    let chisq_col = column_index(table, NAME, "chisq")?;

    if table.rows.is_empty() {
        return Err(AdmixError::Parse("rankdrop table has no rows".to_string()));
    }

    Ok(FitRow {
        p: parse_numeric(cell(table, NAME, 0, p_col)?, NAME, 0, "p")?,
        chisq: parse_numeric(cell(table, NAME, 0, chisq_col)?, NAME, 0, "chisq")?,
    })
}

/// Normalizes the estimator's raw output into typed rows.
pub fn parse_model_output(raw: &RawModelOutput) -> ModelOutcome<WeightsRow> {
    let weights_table = match &raw.weights {
        Some(table) => table,
        None => return ModelOutcome::Infeasible,
    };

    let parsed = parse_weights(weights_table).and_then(|weights| {
        let rankdrop = raw
            .rankdrop
            .as_ref()
            .ok_or_else(|| AdmixError::Parse("estimator returned weights without a rankdrop table".to_string()))?;
        Ok((weights, parse_fit(rankdrop)?))
    });

    match parsed {
        Ok((weights, fit)) => ModelOutcome::Feasible { weights, fit },
        Err(e) => ModelOutcome::Failed(e),
    }
}
