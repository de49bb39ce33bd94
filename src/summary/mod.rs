//! Run outcomes: failure taxonomy, exit codes and reports

mod failure;
mod report;

pub use failure::{ExitCode, FailureKind};
pub use report::{
    CycleReport, CycleStatus, ExportReport, FailureReport, StatusEntry, StatusReport,
};
