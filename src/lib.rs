//! Gamma-ray spectroscopy peak-fitting engine.
//!
//! Given a calibrated 1-D histogram (channel -> counts), the engine finds
//! regions of interest, fits Gaussian/Hypermet peak shapes and SUM4
//! deterministic integration within each, and exposes the result through
//! [`engine::Fitter`].

pub mod engine;
pub mod error;

pub use engine::{Fit, FitDescription, Fitter, Peak, Roi};
pub use error::{EngineError, EngineResult};
