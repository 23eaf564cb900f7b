use std::collections::{BTreeMap, BTreeSet};

/// One source population's estimated contribution to a target.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsRow {
    pub target: String,
    pub left: String,
    pub weight: f64,
    pub se: f64,
}

/// Rank-drop fit statistics; only the first row of the estimator's table is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRow {
    pub p: f64,
    pub chisq: f64,
}

/// A `WeightsRow` extended with its z-score.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedWeightsRow {
    pub target: String,
    pub left: String,
    pub weight: f64,
    pub se: f64,
    pub zscore: f64,
}

/// weight / se, or 0 when the standard error is exactly zero.
pub fn calculate_zscore(weight: f64, se: f64) -> f64 {
    if se != 0.0 {
        weight / se
    } else {
        0.0
    }
}

pub fn derive_zscores(rows: &[WeightsRow]) -> Vec<DerivedWeightsRow> {
    rows.iter()
        .map(|row| DerivedWeightsRow {
            target: row.target.clone(),
            left: row.left.clone(),
            weight: row.weight,
            se: row.se,
            zscore: calculate_zscore(row.weight, row.se),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Weight,
    Se,
    Zscore,
}

impl Metric {
    const ALL: [Metric; 3] = [Metric::Weight, Metric::Se, Metric::Zscore];

    fn suffix(self) -> &'static str {
        match self {
            Metric::Weight => "weight",
            Metric::Se => "se",
            Metric::Zscore => "zscore",
        }
    }

    fn value(self, row: &DerivedWeightsRow) -> f64 {
        match self {
            Metric::Weight => row.weight,
            Metric::Se => row.se,
            Metric::Zscore => row.zscore,
        }
    }
}

pub const TARGET_COLUMN: &str = "target";
pub const P_VALUE_COLUMN: &str = "p-value";
pub const CHISQ_COLUMN: &str = "x2";

/// One wide export row: all cells for a single target, in header order
/// (the `target` column itself is held separately).
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub target: String,
    pub cells: Vec<(String, Option<f64>)>,
}

impl ExportRow {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
}

impl ExportTable {
    pub fn row_for(&self, target: &str) -> Option<&ExportRow> {
        self.rows.iter().find(|row| row.target == target)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

// Order-independent mean that skips NaN; NaN only when every value is NaN.
fn mean(values: &mut Vec<f64>) -> f64 {
    values.retain(|v| !v.is_nan());
    match values.len() {
        0 => f64::NAN,
        1 => values[0],
        n => {
            values.sort_by(|a, b| a.total_cmp(b));
            values.iter().sum::<f64>() / n as f64
        }
    }
}

/// Pivots per-source rows into one wide row per target.
///
/// Columns are `target`, every `{source}_weight`, every `{source}_se`, every
/// `{source}_zscore` (sources sorted by name), then `p-value` and `x2` taken
/// from `fit`. Repeated (target, source) pairs are averaged, ignoring NaN. Cells for a
/// source that a target never saw are `None`.
pub fn assemble(rows: &[DerivedWeightsRow], fit: &FitRow) -> ExportTable {
    let mut sources: BTreeSet<&str> = BTreeSet::new();
    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&DerivedWeightsRow>>> = BTreeMap::new();

    for row in rows {
        sources.insert(row.left.as_str());
        grouped
            .entry(row.target.as_str())
            .or_default()
            .entry(row.left.as_str())
            .or_default()
            .push(row);
    }

    let mut columns = vec![TARGET_COLUMN.to_string()];
    for metric in Metric::ALL {
        for source in &sources {
            columns.push(format!("{}_{}", source, metric.suffix()));
        }
    }
    columns.push(P_VALUE_COLUMN.to_string());
    columns.push(CHISQ_COLUMN.to_string());

    let export_rows = grouped
        .into_iter()
        .map(|(target, by_source)| {
            let mut cells = Vec::with_capacity(columns.len() - 1);
            for metric in Metric::ALL {
                for source in &sources {
                    let value = by_source.get(source).map(|matching| {
                        let mut values: Vec<f64> = matching.iter().map(|r| metric.value(r)).collect();
                        mean(&mut values)
                    });
                    cells.push((format!("{}_{}", source, metric.suffix()), value));
                }
            }
            cells.push((P_VALUE_COLUMN.to_string(), Some(fit.p)));
            cells.push((CHISQ_COLUMN.to_string(), Some(fit.chisq)));
            ExportRow {
                target: target.to_string(),
                cells,
            }
        })
        .collect();

    ExportTable {
        columns,
        rows: export_rows,
    }
}

/// Shortest representation that reads back to the same value; empty for missing or NaN.
pub fn format_export_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() => String::new(),
        Some(v) if v.is_infinite() => if v > 0.0 { "inf".to_string() } else { "-inf".to_string() },
        Some(v) => format!("{:?}", v),
        None => String::new(),
    }
}
