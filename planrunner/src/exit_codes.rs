//! Stable exit codes for `planrunner` commands.

use crate::core::types::ReportStatus;

/// Command succeeded; for `run`, every step succeeded.
pub const OK: i32 = 0;
/// Invalid input, config, plan, or state, or the run reported `error`.
pub const INVALID: i32 = 1;
/// `extract` (or `run --input`) found no usable plan or command.
pub const EXTRACTION_FAILED: i32 = 2;
/// `run` finished with at least one failed or unsupported step.
pub const PARTIAL: i32 = 3;

/// Exit code for a finished plan run.
pub fn for_report(status: ReportStatus) -> i32 {
    match status {
        ReportStatus::Success => OK,
        ReportStatus::PartialSuccess => PARTIAL,
        ReportStatus::Error => INVALID,
    }
}
