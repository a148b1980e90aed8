use std::io;

use thiserror::Error;

use crate::period::Period;

/// Errors that stop a load, build, or CLI invocation.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("required column '{column}' not found (accepted headers: {accepted})")]
    MissingColumn {
        column: &'static str,
        accepted: String,
    },
    #[error("invalid period '{0}': expected YYYYMM")]
    InvalidPeriod(String),
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),
    #[error("invalid selection '{0}': expected <dimension>=<value>")]
    InvalidSelection(String),
    #[error("product list '{0}' does not contain a product_id column")]
    MissingProductList(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Validation errors produced inside the filter chain. These never abort a
/// recompute; they are reported next to the best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("start period {start} is after end period {end}")]
    InvertedDateRange { start: Period, end: Period },
}
