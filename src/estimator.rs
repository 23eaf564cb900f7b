use crate::parse::read_raw_table;
use crate::process::{AdmixError, AnalysisRequest};
use crate::progress::create_spinner;

use itertools::Itertools;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_RSCRIPT: &str = "Rscript";
pub const WORK_DIR_NAME: &str = "qpadm_runner_temp";

const STATUS_FEASIBLE: &str = "feasible";
const STATUS_INFEASIBLE: &str = "infeasible";
const LIBRARY_PROBE: &str = "suppressPackageStartupMessages({ library(admixtools); library(tidyverse) })";

/// A table exactly as the estimator wrote it: a header row and string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: &[&str], rows: &[&[&str]]) -> Self {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }
}

/// The estimator's response. `weights == None` is its "no feasible model" signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawModelOutput {
    pub weights: Option<RawTable>,
    pub rankdrop: Option<RawTable>,
}

impl RawModelOutput {
    pub fn infeasible() -> Self {
        RawModelOutput::default()
    }
}

/// Execution settings for the R side, fixed at process start.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeContext {
    pub rscript: String,
    pub work_dir: PathBuf,
    pub allsnps: bool,
}

impl RuntimeContext {
    pub fn default_work_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(WORK_DIR_NAME)
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        RuntimeContext {
            rscript: DEFAULT_RSCRIPT.to_string(),
            work_dir: RuntimeContext::default_work_dir(),
            allsnps: true,
        }
    }
}

/// Process-wide estimator environment. Built once; a failed initialization is never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeState {
    Uninitialized,
    Ready(RuntimeContext),
    FailedInit(String),
}

impl RuntimeState {
    /// Creates the working directory and checks that R can load admixtools.
    pub fn initialize(context: RuntimeContext) -> RuntimeState {
        if let Err(e) = fs::create_dir_all(&context.work_dir) {
            warn!("Could not create work directory {}: {}", context.work_dir.display(), e);
            return RuntimeState::FailedInit(format!(
                "cannot create work directory {}: {}",
                context.work_dir.display(),
                e
            ));
        }

        debug!("Probing R libraries with {}", context.rscript);
        let probe = Command::new(&context.rscript)
            .arg("-e")
            .arg(LIBRARY_PROBE)
            .env("TMPDIR", &context.work_dir)
            .output();

        match probe {
            Ok(output) if output.status.success() => {
                info!("R environment ready ({})", context.rscript);
                RuntimeState::Ready(context)
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                RuntimeState::FailedInit(format!(
                    "{} exited with {}: {}",
                    context.rscript,
                    output.status,
                    stderr.trim()
                ))
            }
            Err(e) => RuntimeState::FailedInit(format!("failed to launch {}: {}", context.rscript, e)),
        }
    }

    pub fn context(&self) -> Option<&RuntimeContext> {
        match self {
            RuntimeState::Ready(context) => Some(context),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.context().is_some()
    }
}

/// The external statistical oracle.
pub trait Estimator {
    fn run(&self, context: &RuntimeContext, request: &AnalysisRequest) -> Result<RawModelOutput, AdmixError>;
}

impl<E: Estimator + ?Sized> Estimator for &E {
    fn run(&self, context: &RuntimeContext, request: &AnalysisRequest) -> Result<RawModelOutput, AdmixError> {
        (**self).run(context, request)
    }
}

/// Sole entry point to the estimator. Refuses to run unless the runtime is ready.
pub struct EstimatorGateway<'a, E> {
    runtime: &'a RuntimeState,
    estimator: E,
}

impl<'a, E: Estimator> EstimatorGateway<'a, E> {
    pub fn new(runtime: &'a RuntimeState, estimator: E) -> Self {
        EstimatorGateway { runtime, estimator }
    }

    pub fn ensure_ready(&self) -> Result<&RuntimeContext, AdmixError> {
        self.runtime.context().ok_or(AdmixError::EstimatorUninitialized)
    }

    pub fn run(&self, request: &AnalysisRequest) -> Result<RawModelOutput, AdmixError> {
        let context = self.ensure_ready()?;
        info!(
            "Invoking estimator for target {} ({} sources, {} outgroups)",
            request.target(),
            request.left().len(),
            request.right().len()
        );
        self.estimator.run(context, request)
    }
}

/// Quotes `value` as an R string literal.
pub fn r_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn r_character_vector(names: &[String]) -> String {
    format!("c({})", names.iter().map(|name| r_string_literal(name)).join(", "))
}

/// R source for one qpadm call. Output paths arrive as trailing arguments:
/// weights csv, rankdrop csv, status file.
pub fn build_qpadm_script(request: &AnalysisRequest, allsnps: bool) -> String {
    let mut script = String::new();
    script.push_str("args <- commandArgs(trailingOnly = TRUE)\n");
    script.push_str("suppressPackageStartupMessages({\n  library(admixtools)\n  library(tidyverse)\n})\n");
    script.push_str(&format!("prefix <- {}\n", r_string_literal(request.dataset().prefix())));
    script.push_str(&format!("target <- {}\n", r_string_literal(request.target())));
    script.push_str(&format!("left <- {}\n", r_character_vector(request.left().names())));
    script.push_str(&format!("right <- {}\n", r_character_vector(request.right().names())));
    script.push_str(&format!(
        "results <- qpadm(data = prefix, left = left, right = right, target = target, allsnps = {})\n",
        if allsnps { "TRUE" } else { "FALSE" }
    ));
    script.push_str(&format!(
        "if (is.null(results$weights)) {{\n  writeLines(\"{}\", args[3])\n}} else {{\n",
        STATUS_INFEASIBLE
    ));
    script.push_str("  write.csv(as.data.frame(results$weights), args[1], row.names = FALSE)\n");
    script.push_str("  write.csv(as.data.frame(results$rankdrop), args[2], row.names = FALSE)\n");
    script.push_str(&format!("  writeLines(\"{}\", args[3])\n}}\n", STATUS_FEASIBLE));
    script
}

/// Runs qpadm through an `Rscript` child process and reads back its tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct RscriptEstimator;

impl RscriptEstimator {
    fn read_outputs(weights_path: &Path, rankdrop_path: &Path, status_path: &Path) -> Result<RawModelOutput, AdmixError> {
        let status = fs::read_to_string(status_path)
            .map_err(|e| AdmixError::Estimator(format!("estimator wrote no status file: {}", e)))?;

        match status.trim() {
            STATUS_INFEASIBLE => Ok(RawModelOutput::infeasible()),
            STATUS_FEASIBLE => Ok(RawModelOutput {
                weights: Some(read_raw_table(weights_path)?),
                rankdrop: Some(read_raw_table(rankdrop_path)?),
            }),
            other => Err(AdmixError::Estimator(format!("unexpected estimator status '{}'", other))),
        }
    }
}

impl Estimator for RscriptEstimator {
    fn run(&self, context: &RuntimeContext, request: &AnalysisRequest) -> Result<RawModelOutput, AdmixError> {
        let run_dir = tempfile::Builder::new()
            .prefix("qpadm_run_")
            .tempdir_in(&context.work_dir)?;

        let script_path = run_dir.path().join("run_qpadm.R");
        let weights_path = run_dir.path().join("weights.csv");
        let rankdrop_path = run_dir.path().join("rankdrop.csv");
        let status_path = run_dir.path().join("status.txt");

        fs::write(&script_path, build_qpadm_script(request, context.allsnps))?;
        debug!("Wrote qpadm script to {}", script_path.display());

        let spinner = create_spinner("Running analysis in R...");
        let output = Command::new(&context.rscript)
            .arg(&script_path)
            .arg(&weights_path)
            .arg(&rankdrop_path)
            .arg(&status_path)
            .env("TMPDIR", &context.work_dir)
            .output();
        spinner.finish_and_clear();

        let output = output
            .map_err(|e| AdmixError::Estimator(format!("failed to launch {}: {}", context.rscript, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdmixError::Estimator(format!(
                "{} exited with {}:\n{}",
                context.rscript,
                output.status,
                stderr.trim()
            )));
        }

        RscriptEstimator::read_outputs(&weights_path, &rankdrop_path, &status_path)
    }
}
