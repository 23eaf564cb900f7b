mod summary_tests;

use crate::estimator::{Estimator, RawModelOutput, RawTable, RuntimeContext};
use crate::process::{AdmixError, AnalysisRequest};
use crate::stats::{DerivedWeightsRow, WeightsRow};

use std::cell::{Cell, RefCell};

/// Stand-in estimator returning a fixed response and recording each call.
pub(crate) struct FixedEstimator {
    response: Result<RawModelOutput, String>,
    pub calls: Cell<usize>,
    pub last_request: RefCell<Option<AnalysisRequest>>,
}

impl FixedEstimator {
    pub fn returning(output: RawModelOutput) -> Self {
        FixedEstimator {
            response: Ok(output),
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        FixedEstimator {
            response: Err(message.to_string()),
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }
}

impl Estimator for FixedEstimator {
    fn run(&self, _context: &RuntimeContext, request: &AnalysisRequest) -> Result<RawModelOutput, AdmixError> {
        self.calls.set(self.calls.get() + 1);
        *self.last_request.borrow_mut() = Some(request.clone());
        self.response.clone().map_err(AdmixError::Estimator)
    }
}

/// Weights/rankdrop tables shaped like qpadm's output.
pub(crate) fn qpadm_output(target: &str, rows: &[(&str, &str, &str)], p: &str, chisq: &str) -> RawModelOutput {
    let weights = RawTable {
        headers: ["target", "left", "weight", "se", "z"].iter().map(|s| s.to_string()).collect(),
        rows: rows
            .iter()
            .map(|(left, weight, se)| {
                vec![target.to_string(), left.to_string(), weight.to_string(), se.to_string(), "0".to_string()]
            })
            .collect(),
    };
    let rankdrop = RawTable::new(
        &["f4rank", "dof", "chisq", "p", "dofdiff", "chisqdiff", "p_nested"],
        &[
            &["1", "2", chisq, p, "3", "10.5", "0.01"],
            &["0", "5", "40.1", "0.0001", "NA", "NA", "NA"],
        ],
    );
    RawModelOutput {
        weights: Some(weights),
        rankdrop: Some(rankdrop),
    }
}

pub(crate) fn weights_row(target: &str, left: &str, weight: f64, se: f64) -> WeightsRow {
    WeightsRow {
        target: target.to_string(),
        left: left.to_string(),
        weight,
        se,
    }
}

pub(crate) fn derived_row(target: &str, left: &str, weight: f64, se: f64, zscore: f64) -> DerivedWeightsRow {
    DerivedWeightsRow {
        target: target.to_string(),
        left: left.to_string(),
        weight,
        se,
        zscore,
    }
}
