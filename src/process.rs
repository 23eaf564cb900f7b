use crate::estimator::{Estimator, EstimatorGateway};
use crate::parse::{parse_model_output, NamedLists};
use crate::progress::ProcessingStage;
use crate::stats::{assemble, derive_zscores, format_export_value, DerivedWeightsRow, ExportTable, FitRow, WeightsRow};
use crate::summary::{compose, write_svg, ChartSpec};

use clap::Parser;
use colored::*;
use csv::WriterBuilder;
use itertools::Itertools;
use log::{debug, info, warn};
use prettytable::{row, Table};
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Index files that may sit next to a dataset prefix, in lookup order.
pub const INDEX_EXTENSIONS: [&str; 2] = ["fam", "ind"];

// Define command-line arguments using clap
#[derive(Parser, Debug)]
#[command(author, version, about = "Run qpAdm admixture models and build reports", long_about = None)]
pub struct Args {
    /// Configuration file (`prefix: <dataset prefix>`)
    #[arg(long = "config", default_value = "config.txt")]
    pub config: String,

    /// File of named source lists (`name: pop1, pop2, ...`)
    #[arg(long = "left-lists", default_value = "left_list.txt")]
    pub left_lists: String,

    /// File of named outgroup lists (`name: pop1, pop2, ...`)
    #[arg(long = "right-lists", default_value = "right_list.txt")]
    pub right_lists: String,

    /// Target population
    #[arg(short, long = "target")]
    pub target: Option<String>,

    /// Use a predefined source list by name
    #[arg(long = "left-list", conflicts_with_all = ["left_file", "left"])]
    pub left_list: Option<String>,

    /// File with one source population per line
    #[arg(long = "left-file", conflicts_with = "left")]
    pub left_file: Option<String>,

    /// Source population (repeatable)
    #[arg(long = "left", value_name = "POP")]
    pub left: Vec<String>,

    /// Use a predefined outgroup list by name
    #[arg(long = "right-list", conflicts_with_all = ["right_file", "right"])]
    pub right_list: Option<String>,

    /// File with one outgroup per line
    #[arg(long = "right-file", conflicts_with = "right")]
    pub right_file: Option<String>,

    /// Outgroup population (repeatable)
    #[arg(long = "right", value_name = "POP")]
    pub right: Vec<String>,

    /// Directory for the CSV export, chart and index copy
    #[arg(short, long = "output-dir", default_value = ".")]
    pub output_dir: String,

    /// Rscript executable (overrides the config file)
    #[arg(long = "rscript")]
    pub rscript: Option<String>,

    /// Copy the dataset's .fam/.ind index file into the output directory
    #[arg(long = "export-index")]
    pub export_index: bool,

    /// Print the predefined population lists and exit
    #[arg(long = "list-populations")]
    pub list_populations: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn left_source(&self) -> Result<PopulationSource, AdmixError> {
        population_source(self.left_list.as_deref(), self.left_file.as_deref(), &self.left)
    }

    pub fn right_source(&self) -> Result<PopulationSource, AdmixError> {
        population_source(self.right_list.as_deref(), self.right_file.as_deref(), &self.right)
    }
}

fn population_source(list: Option<&str>, file: Option<&str>, inline: &[String]) -> Result<PopulationSource, AdmixError> {
    if let Some(name) = list {
        return Ok(PopulationSource::Named(name.to_string()));
    }
    if let Some(path) = file {
        return Ok(PopulationSource::FreeText(fs::read_to_string(path)?));
    }
    Ok(PopulationSource::FreeText(inline.join("\n")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField {
    Dataset,
    Target,
    Left,
    Right,
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RequestField::Dataset => "dataset prefix",
            RequestField::Target => "target",
            RequestField::Left => "left list",
            RequestField::Right => "right list",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("please define the {}", .missing_fields.iter().join(", "))]
pub struct ValidationFailure {
    pub missing_fields: Vec<RequestField>,
}

// Custom error types
#[derive(Debug, Error)]
pub enum AdmixError {
    #[error("no dataset prefix configured (add `prefix: <path>` to the config file)")]
    ConfigMissing,

    #[error("R environment could not be initialized; restart the application")]
    EstimatorUninitialized,

    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    #[error("estimator error: {0}")]
    Estimator(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown population list '{0}'")]
    UnknownList(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("chart error: {0}")]
    Chart(String),
}

impl AdmixError {
    /// Failures that happen while or after the estimator runs.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AdmixError::Estimator(_)
                | AdmixError::Parse(_)
                | AdmixError::Io(_)
                | AdmixError::Csv(_)
                | AdmixError::Chart(_)
        )
    }
}

/// Ordered population names. Duplicates and empty names pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationList(Vec<String>);

impl PopulationList {
    pub fn new(names: Vec<String>) -> Self {
        PopulationList(names)
    }

    /// One name per line, trimmed; blank lines are dropped.
    pub fn from_free_text(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn duplicates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .filter(|name| !seen.insert(name.as_str()))
            .map(String::as_str)
            .unique()
            .collect()
    }
}

impl FromIterator<String> for PopulationList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        PopulationList(iter.into_iter().collect())
    }
}

impl fmt::Display for PopulationList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().map(|n| format!("'{}'", n)).join(", "))
    }
}

/// Where a population list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationSource {
    Named(String),
    FreeText(String),
}

impl PopulationSource {
    pub fn resolve(&self, lists: &NamedLists) -> Result<PopulationList, AdmixError> {
        match self {
            PopulationSource::Named(name) => lists
                .get(name)
                .cloned()
                .ok_or_else(|| AdmixError::UnknownList(name.clone())),
            PopulationSource::FreeText(text) => Ok(PopulationList::from_free_text(text)),
        }
    }
}

/// File-prefix handle to a prepared genotype dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    prefix: String,
}

impl DatasetHandle {
    pub fn new(prefix: &str) -> Self {
        DatasetHandle {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}.fam` if present, else `{prefix}.ind`.
    pub fn index_file(&self) -> Option<PathBuf> {
        INDEX_EXTENSIONS
            .iter()
            .map(|ext| PathBuf::from(format!("{}.{}", self.prefix, ext)))
            .find(|path| path.is_file())
    }

    /// Copies the index file verbatim into `dest_dir`.
    pub fn export_index(&self, dest_dir: &Path) -> Result<Option<PathBuf>, AdmixError> {
        let source = match self.index_file() {
            Some(path) => path,
            None => return Ok(None),
        };
        let file_name = source
            .file_name()
            .ok_or_else(|| AdmixError::Io(io::Error::new(io::ErrorKind::InvalidInput, "index path has no file name")))?;
        fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(file_name);
        fs::copy(&source, &dest)?;
        Ok(Some(dest))
    }
}

/// Raw selections collected from the user, not yet checked.
#[derive(Debug, Clone, Default)]
pub struct RequestDraft {
    pub target: String,
    pub left: PopulationList,
    pub right: PopulationList,
    pub dataset: Option<DatasetHandle>,
}

/// A complete request for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    target: String,
    left: PopulationList,
    right: PopulationList,
    dataset: DatasetHandle,
}

impl AnalysisRequest {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn left(&self) -> &PopulationList {
        &self.left
    }

    pub fn right(&self) -> &PopulationList {
        &self.right
    }

    pub fn dataset(&self) -> &DatasetHandle {
        &self.dataset
    }
}

/// All-or-nothing check; every missing field is reported at once.
pub fn validate_request(draft: RequestDraft) -> Result<AnalysisRequest, ValidationFailure> {
    let target = draft.target.trim().to_string();
    let mut missing_fields = Vec::new();
    if draft.dataset.is_none() {
        missing_fields.push(RequestField::Dataset);
    }
    if target.is_empty() {
        missing_fields.push(RequestField::Target);
    }
    if draft.left.is_empty() {
        missing_fields.push(RequestField::Left);
    }
    if draft.right.is_empty() {
        missing_fields.push(RequestField::Right);
    }

    match draft.dataset {
        Some(dataset) if missing_fields.is_empty() => {
            for (side, list) in [("left", &draft.left), ("right", &draft.right)] {
                let duplicates = list.duplicates();
                if !duplicates.is_empty() {
                    warn!("Duplicate {} populations passed through: {}", side, duplicates.join(", "));
                }
            }
            Ok(AnalysisRequest {
                target,
                left: draft.left,
                right: draft.right,
                dataset,
            })
        }
        _ => Err(ValidationFailure { missing_fields }),
    }
}

/// Result of interpreting the estimator's output.
#[derive(Debug)]
pub enum ModelOutcome<W = DerivedWeightsRow> {
    Feasible { weights: Vec<W>, fit: FitRow },
    Infeasible,
    Failed(AdmixError),
}

impl ModelOutcome<WeightsRow> {
    pub fn derive(self) -> ModelOutcome<DerivedWeightsRow> {
        match self {
            ModelOutcome::Feasible { weights, fit } => ModelOutcome::Feasible {
                weights: derive_zscores(&weights),
                fit,
            },
            ModelOutcome::Infeasible => ModelOutcome::Infeasible,
            ModelOutcome::Failed(e) => ModelOutcome::Failed(e),
        }
    }
}

/// Everything produced by a feasible run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub target: String,
    pub weights: Vec<DerivedWeightsRow>,
    pub fit: FitRow,
    pub export: ExportTable,
    pub chart: ChartSpec,
}

impl AnalysisReport {
    pub fn build(target: &str, weights: Vec<DerivedWeightsRow>, fit: FitRow) -> Self {
        let export = assemble(&weights, &fit);
        let chart = compose(target, &weights, &fit);
        AnalysisReport {
            target: target.to_string(),
            weights,
            fit,
            export,
            chart,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Feasible(AnalysisReport),
    Infeasible,
    Failed(AdmixError),
}

/// Validate → invoke → parse → derive → assemble, for one request at a time.
pub struct Pipeline<'a, E> {
    gateway: EstimatorGateway<'a, E>,
    stage: Cell<ProcessingStage>,
}

impl<'a, E: Estimator> Pipeline<'a, E> {
    pub fn new(gateway: EstimatorGateway<'a, E>) -> Self {
        Pipeline {
            gateway,
            stage: Cell::new(ProcessingStage::Idle),
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage.get()
    }

    // A finished run only leaves its terminal stage when a new run starts.
    fn set_stage(&self, stage: ProcessingStage) {
        let current = self.stage.get();
        if current.is_terminal() && stage != ProcessingStage::Validating {
            warn!("Ignoring stage change {} -> {} after the run finished", current, stage);
            return;
        }
        debug!("Pipeline stage: {} -> {}", current, stage);
        self.stage.set(stage);
    }

    fn fail(&self, error: AdmixError) -> RunOutcome {
        self.set_stage(ProcessingStage::Failed);
        RunOutcome::Failed(error)
    }

    pub fn run(&self, draft: RequestDraft) -> RunOutcome {
        self.set_stage(ProcessingStage::Validating);
        if let Err(e) = self.gateway.ensure_ready() {
            return self.fail(e);
        }
        let request = match validate_request(draft) {
            Ok(request) => request,
            Err(failure) => return self.fail(failure.into()),
        };

        self.set_stage(ProcessingStage::Invoking);
        let raw = match self.gateway.run(&request) {
            Ok(raw) => raw,
            Err(e) => return self.fail(e),
        };

        self.set_stage(ProcessingStage::Parsing);
        let parsed = parse_model_output(&raw);
        if matches!(parsed, ModelOutcome::Feasible { .. }) {
            self.set_stage(ProcessingStage::Deriving);
        }

        let report = match parsed.derive() {
            ModelOutcome::Feasible { weights, fit } => {
                self.set_stage(ProcessingStage::Assembling);
                AnalysisReport::build(request.target(), weights, fit)
            }
            ModelOutcome::Infeasible => {
                self.set_stage(ProcessingStage::Infeasible);
                info!("No feasible model for target {}", request.target());
                return RunOutcome::Infeasible;
            }
            ModelOutcome::Failed(e) => return self.fail(e),
        };

        self.set_stage(ProcessingStage::Done);
        RunOutcome::Feasible(report)
    }
}

/// Holds the last successful report so it can be exported again.
pub struct AnalysisSession<'a, E> {
    pipeline: Pipeline<'a, E>,
    last_report: Option<AnalysisReport>,
}

impl<'a, E: Estimator> AnalysisSession<'a, E> {
    pub fn new(pipeline: Pipeline<'a, E>) -> Self {
        AnalysisSession {
            pipeline,
            last_report: None,
        }
    }

    pub fn pipeline(&self) -> &Pipeline<'a, E> {
        &self.pipeline
    }

    /// Starting a run discards the previous run's report.
    pub fn run(&mut self, draft: RequestDraft) -> RunOutcome {
        self.last_report = None;
        let outcome = self.pipeline.run(draft);
        if let RunOutcome::Feasible(report) = &outcome {
            self.last_report = Some(report.clone());
        }
        outcome
    }

    pub fn last_report(&self) -> Option<&AnalysisReport> {
        self.last_report.as_ref()
    }

    /// Writes `results_{target}.csv` into `dir` from the last successful run.
    pub fn export_last(&self, dir: &Path) -> Result<Option<PathBuf>, AdmixError> {
        match &self.last_report {
            Some(report) => export_csv_file(dir, report).map(Some),
            None => Ok(None),
        }
    }
}

// Keeps a target name usable as part of a file name.
fn file_stem_for(target: &str) -> String {
    target
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

pub fn export_file_name(target: &str, extension: &str) -> String {
    format!("results_{}.{}", file_stem_for(target), extension)
}

/// Writes the export table as comma-separated text with a header row.
pub fn write_export_csv<W: Write>(writer: W, table: &ExportTable) -> Result<(), AdmixError> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    csv_writer.write_record(&table.columns)?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(table.columns.len());
        record.push(row.target.clone());
        record.extend(row.cells.iter().map(|(_, value)| format_export_value(*value)));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_csv_file(dir: &Path, report: &AnalysisReport) -> Result<PathBuf, AdmixError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(&report.target, "csv"));
    let file = File::create(&path)?;
    write_export_csv(BufWriter::new(file), &report.export)?;
    info!("Wrote {}", path.display());
    Ok(path)
}

pub fn export_chart_file(dir: &Path, report: &AnalysisReport) -> Result<PathBuf, AdmixError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(&report.target, "svg"));
    write_svg(&path, &report.chart)?;
    info!("Wrote {}", path.display());
    Ok(path)
}

pub fn format_results_table(report: &AnalysisReport) -> String {
    let mut table = Table::new();
    table.add_row(row!["Source", "Weight", "SE", "Z-score"]);
    for w in &report.weights {
        table.add_row(row![
            w.left,
            format!("{:.4}", w.weight),
            format!("{:.4}", w.se),
            format!("{:.2}", w.zscore)
        ]);
    }
    table.to_string()
}

pub fn display_results_table(report: &AnalysisReport) {
    print!(
        "\n{}\n{}",
        format!("Weights for {}:", report.target).green().bold(),
        format_results_table(report)
    );
}

pub fn display_named_lists(title: &str, lists: &NamedLists) {
    if lists.is_empty() {
        println!("{}", format!("{}: no predefined lists", title).yellow());
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["List", "Populations", "Count"]);
    for (name, pops) in lists.iter() {
        table.add_row(row![name, pops.names().join(", "), pops.len()]);
    }
    print!("\n{}\n{}", title.green().bold(), table);
}
