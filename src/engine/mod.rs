//! Gamma-ray spectroscopy fitting engine: ROI discovery, peak shape
//! fitting, and deterministic SUM4 integration over a calibrated 1-D
//! histogram.

pub mod fit_settings;
pub mod finder;
pub mod fitter;
pub mod math;
pub mod optimizer;
pub mod peak;
pub mod persist;
pub mod roi;
pub mod sum4;

pub use fit_settings::FitSettings;
pub use finder::Finder;
pub use fitter::Fitter;
pub use optimizer::{LevenbergMarquardt, Optimizer};
pub use peak::Peak;
pub use roi::{Fit, FitDescription, Roi};
pub use sum4::{CurrieQuality, Sum4, Sum4Edge};
