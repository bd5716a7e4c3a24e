//! `Hypermet` peak shape: Gaussian core plus step and left/right
//! skew/tail exponentials. Grounded on `engine/math/hypermet.cpp`.

use super::fit_param::FitParam;
use super::gaussian::Gaussian;
use super::uncertain::UncertainValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypermet {
    pub center: FitParam,
    pub height: FitParam,
    pub width: FitParam,
    pub lskew_amplitude: FitParam,
    pub lskew_slope: FitParam,
    pub rskew_amplitude: FitParam,
    pub rskew_slope: FitParam,
    pub tail_amplitude: FitParam,
    pub tail_slope: FitParam,
    pub step_amplitude: FitParam,
    pub rsq: f64,
    pub user_modified: bool,
}

impl Default for Hypermet {
    fn default() -> Self {
        Hypermet::from_gaussian(&Gaussian::default())
    }
}

impl Hypermet {
    /// Build a Hypermet from a fitted Gaussian with every step/tail/skew
    /// amplitude implicitly fixed at zero (i.e. `gaussian_only()` holds).
    pub fn from_gaussian(g: &Gaussian) -> Self {
        let zero = |name: &str| FitParam::bounded(name, 0.0, 0.0, 0.0);
        Hypermet {
            center: g.center.clone(),
            height: g.height.clone(),
            width: g.hwhm.clone(),
            lskew_amplitude: zero("Lskew_amplitude"),
            lskew_slope: FitParam::new("Lskew_slope", 1.0),
            rskew_amplitude: zero("Rskew_amplitude"),
            rskew_slope: FitParam::new("Rskew_slope", 1.0),
            tail_amplitude: zero("tail_amplitude"),
            tail_slope: FitParam::new("tail_slope", 1.0),
            step_amplitude: zero("step_amplitude"),
            rsq: g.rsq,
            user_modified: false,
        }
    }

    pub fn gaussian(&self) -> Gaussian {
        Gaussian {
            center: self.center.clone(),
            height: self.height.clone(),
            hwhm: self.width.clone(),
            rsq: self.rsq,
        }
    }

    /// All step/tail/skew amplitudes collapsed to zero: the shape is a
    /// pure Gaussian.
    pub fn gaussian_only(&self) -> bool {
        self.lskew_amplitude.implicitly_fixed()
            && self.lskew_amplitude.value.value == 0.0
            && self.rskew_amplitude.implicitly_fixed()
            && self.rskew_amplitude.value.value == 0.0
            && self.tail_amplitude.implicitly_fixed()
            && self.tail_amplitude.value.value == 0.0
            && self.step_amplitude.implicitly_fixed()
            && self.step_amplitude.value.value == 0.0
    }

    /// The Gaussian core alone.
    pub fn eval_peak(&self, x: f64) -> f64 {
        let c = self.center.value.value;
        let h = self.height.value.value;
        let w = self.width.value.value;
        if w == 0.0 {
            return 0.0;
        }
        h * (-((x - c) / w).powi(2) * std::f64::consts::LN_2).exp()
    }

    /// Step plus left/right skew plus long tail - zero wherever the
    /// corresponding amplitude is implicitly fixed at zero.
    pub fn eval_step_tail(&self, x: f64) -> f64 {
        let c = self.center.value.value;
        let h = self.height.value.value;
        let w = self.width.value.value.max(1e-12);
        let dx = x - c;
        let mut total = 0.0;

        if self.step_amplitude.value.value != 0.0 {
            total += self.step_amplitude.value.value * h * erfc(dx / w);
        }
        if self.lskew_amplitude.value.value != 0.0 && dx <= 0.0 {
            total += self.lskew_amplitude.value.value
                * h
                * (dx / (self.lskew_slope.value.value.max(1e-9) * w)).exp()
                * erfc(dx / w + w / (2.0 * self.lskew_slope.value.value.max(1e-9)));
        }
        if self.rskew_amplitude.value.value != 0.0 && dx >= 0.0 {
            total += self.rskew_amplitude.value.value
                * h
                * (-dx / (self.rskew_slope.value.value.max(1e-9) * w)).exp()
                * erfc(-dx / w + w / (2.0 * self.rskew_slope.value.value.max(1e-9)));
        }
        if self.tail_amplitude.value.value != 0.0 {
            total += self.tail_amplitude.value.value
                * h
                * (dx / (self.tail_slope.value.value.max(1e-9) * w)).exp()
                * erfc(dx / w + w / (2.0 * self.tail_slope.value.value.max(1e-9)));
        }
        total
    }

    pub fn peak(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval_peak(x)).collect()
    }

    pub fn step_tail(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval_step_tail(x)).collect()
    }

    /// Gaussian-core area using `height`/`width` in place of
    /// `height`/`hwhm`.
    pub fn area(&self) -> UncertainValue {
        let factor = (std::f64::consts::PI / std::f64::consts::LN_2).sqrt();
        let value = self.height.value.value * self.width.value.value * factor;
        let rel_h = if self.height.value.value != 0.0 {
            self.height.value.sigma / self.height.value.value
        } else {
            0.0
        };
        let rel_w = if self.width.value.value != 0.0 {
            self.width.value.sigma / self.width.value.value
        } else {
            0.0
        };
        let sigma = value.abs() * (rel_h.powi(2) + rel_w.powi(2)).sqrt();
        UncertainValue::new(value, sigma)
    }
}

/// Complementary error function via Abramowitz & Stegun 7.1.26 - no
/// special-function crate appears anywhere in the example pack, so this
/// is a strict, self-contained reimplementation rather than an added
/// dependency.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let tau = t
        * (-z * z - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        tau
    } else {
        2.0 - tau
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_only_when_all_amplitudes_zero() {
        let g = Gaussian::new(10.0, 100.0, 3.0);
        let h = Hypermet::from_gaussian(&g);
        assert!(h.gaussian_only());
        assert!((h.eval_peak(10.0) - 100.0).abs() < 1e-9);
        assert!(h.eval_step_tail(10.0).abs() < 1e-9);
    }

    #[test]
    fn erfc_matches_known_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!(erfc(5.0) < 1e-10);
    }
}
