// Module declarations
pub mod estimator;
pub mod parse;
pub mod process;
pub mod progress;
pub mod stats;
pub mod summary;

#[cfg(test)]
mod tests;

pub use crate::estimator::{Estimator, EstimatorGateway, RawModelOutput, RawTable, RscriptEstimator, RuntimeContext, RuntimeState};
pub use crate::process::{
    AdmixError, AnalysisReport, AnalysisRequest, AnalysisSession, DatasetHandle, ModelOutcome, Pipeline,
    PopulationList, PopulationSource, RequestDraft, RequestField, RunOutcome, ValidationFailure,
};
pub use crate::stats::{DerivedWeightsRow, ExportRow, ExportTable, FitRow, WeightsRow};
pub use crate::summary::{ChartSlice, ChartSpec};
