use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;

/// Stage of a single analysis run.
///
/// A run moves `Idle → Validating → Invoking → Parsing → Deriving → Assembling → Done`,
/// or stops early in `Infeasible` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Idle,
    Validating,
    Invoking,
    Parsing,
    Deriving,
    Assembling,
    Done,
    Infeasible,
    Failed,
}

impl ProcessingStage {
    /// Returns true once the run can no longer advance.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStage::Done | ProcessingStage::Infeasible | ProcessingStage::Failed
        )
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ProcessingStage::Idle => "idle",
            ProcessingStage::Validating => "validating",
            ProcessingStage::Invoking => "invoking estimator",
            ProcessingStage::Parsing => "parsing",
            ProcessingStage::Deriving => "deriving statistics",
            ProcessingStage::Assembling => "assembling report",
            ProcessingStage::Done => "done",
            ProcessingStage::Infeasible => "infeasible",
            ProcessingStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A titled block of key/value lines printed to the terminal.
pub struct StatusBox {
    pub title: String,
    pub stats: Vec<(String, String)>,
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn format_status_box(status: &StatusBox) -> String {
    let key_width = status.stats.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    let value_width = status.stats.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);
    let inner = (key_width + value_width + 3).max(status.title.chars().count());

    let mut out = String::new();
    out.push_str(&format!("┌─{}─┐\n", "─".repeat(inner)));
    out.push_str(&format!("│ {:<width$} │\n", status.title, width = inner));
    out.push_str(&format!("├─{}─┤\n", "─".repeat(inner)));
    for (key, value) in &status.stats {
        let line = format!("{:<kw$} : {}", key, value, kw = key_width);
        out.push_str(&format!("│ {:<width$} │\n", line, width = inner));
    }
    out.push_str(&format!("└─{}─┘", "─".repeat(inner)));
    out
}

pub fn display_status_box(status: StatusBox) {
    println!("\n{}", format_status_box(&status).cyan());
}
