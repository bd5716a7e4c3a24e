pub mod calibration;
pub mod coef_function;
pub mod fit_param;
pub mod gaussian;
pub mod hypermet;
pub mod uncertain;

pub use calibration::Calibration;
pub use coef_function::{CoefFunction, CoefFunctionOps};
pub use fit_param::FitParam;
pub use gaussian::Gaussian;
pub use hypermet::Hypermet;
pub use uncertain::UncertainValue;
