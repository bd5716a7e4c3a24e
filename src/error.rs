//! Crate-wide error type.
//!
//! The fitting engine's mutators keep the boolean/Option contract described
//! in the design notes (no exceptions cross an `ROI`/`Fitter` boundary);
//! `EngineError` is reserved for entry points where a caller benefits from
//! knowing *why* something failed - persistence loads and calibration
//! construction chief among them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no peak candidates found")]
    NoCandidates,

    #[error("optimizer failed to converge: {0}")]
    OptimizerFailure(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("xml error: {0}")]
    Xml(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
