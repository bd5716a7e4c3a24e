//! `Gaussian` peak shape: three `FitParam`s (center, height, hwhm).
//! Grounded on `engine/math/gaussian.cpp`.

use super::fit_param::FitParam;
use super::uncertain::UncertainValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gaussian {
    pub center: FitParam,
    pub height: FitParam,
    pub hwhm: FitParam,
    pub rsq: f64,
}

impl Default for Gaussian {
    fn default() -> Self {
        Gaussian {
            center: FitParam::new("center", 0.0),
            height: FitParam::new("height", 0.0),
            hwhm: FitParam::new("hwhm", 1.0),
            rsq: 0.0,
        }
    }
}

impl Gaussian {
    pub fn new(center: f64, height: f64, hwhm: f64) -> Self {
        Gaussian {
            center: FitParam::new("center", center),
            height: FitParam::new("height", height),
            hwhm: FitParam::new("hwhm", hwhm),
            rsq: 0.0,
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let c = self.center.value.value;
        let h = self.height.value.value;
        let w = self.hwhm.value.value;
        if w == 0.0 {
            return 0.0;
        }
        h * (-((x - c) / w).powi(2) * std::f64::consts::LN_2).exp()
    }

    pub fn evaluate_array(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }

    /// `height * hwhm * sqrt(pi / ln 2)`, with quadrature-propagated
    /// uncertainty via a first-order relative-error combination.
    pub fn area(&self) -> UncertainValue {
        let factor = (std::f64::consts::PI / std::f64::consts::LN_2).sqrt();
        let value = self.height.value.value * self.hwhm.value.value * factor;
        let rel_h = if self.height.value.value != 0.0 {
            self.height.value.sigma / self.height.value.value
        } else {
            0.0
        };
        let rel_w = if self.hwhm.value.value != 0.0 {
            self.hwhm.value.sigma / self.hwhm.value.value
        } else {
            0.0
        };
        let sigma = value.abs() * (rel_h.powi(2) + rel_w.powi(2)).sqrt();
        UncertainValue::new(value, sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_matches_closed_form() {
        let g = Gaussian::new(512.0, 1000.0, 6.0 * std::f64::consts::LN_2.sqrt());
        let expected = 1000.0 * g.hwhm.value.value * (std::f64::consts::PI / std::f64::consts::LN_2).sqrt();
        assert!((g.area().value - expected).abs() < 1e-6);
    }

    #[test]
    fn peak_at_center_equals_height() {
        let g = Gaussian::new(10.0, 500.0, 3.0);
        assert!((g.evaluate(10.0) - 500.0).abs() < 1e-9);
    }
}
