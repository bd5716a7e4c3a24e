//! `UncertainValue` - a scalar with a symmetric 1-sigma uncertainty and a
//! remembered significant-figure count for display.
//!
//! Grounded on `engine/math/UncertainDouble.cpp` in the original engine:
//! arithmetic propagates sigma in quadrature (additive for `+`/`-`,
//! relative for `*`/`/`), and `to_string` renders the conventional
//! "value(sigma)" scientific form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertainValue {
    pub value: f64,
    pub sigma: f64,
    pub sig_figs: u32,
}

fn order_of(v: f64) -> i32 {
    if !v.is_finite() || v == 0.0 {
        return 0;
    }
    v.abs().log10().floor() as i32
}

impl UncertainValue {
    pub fn new(value: f64, sigma: f64) -> Self {
        let sigma = sigma.abs();
        let sig_figs = Self::auto_sig_figs(value, sigma);
        UncertainValue {
            value,
            sigma,
            sig_figs,
        }
    }

    pub fn exact(value: f64) -> Self {
        UncertainValue::new(value, 0.0)
    }

    /// Order-of-magnitude-driven significant figure count, matching the
    /// original's `autoSigs`: scientific notation (order outside [-3, 5])
    /// is capped at 4 digits, otherwise the spread between the value's and
    /// the sigma's order of magnitude drives the count.
    fn auto_sig_figs(value: f64, sigma: f64) -> u32 {
        if !value.is_finite() {
            return 0;
        }
        let vo = order_of(value);
        if !(-3..=5).contains(&vo) {
            return 4;
        }
        if sigma <= 0.0 || !sigma.is_finite() {
            return 6;
        }
        let so = order_of(sigma);
        let spread = (vo - so).max(0) + 1;
        spread.clamp(1, 6) as u32
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite()
    }

    /// Symmetric-tolerance fuzzy equality: true when the two intervals
    /// `[value-sigma, value+sigma]` overlap.
    pub fn almost(&self, other: &UncertainValue) -> bool {
        let lo = self.value - self.sigma;
        let hi = self.value + self.sigma;
        let olo = other.value - other.sigma;
        let ohi = other.value + other.sigma;
        lo <= ohi && olo <= hi
    }

    /// Midpoint of the union of `[value-sigma, value+sigma]` intervals.
    /// This is a bracketing convenience (used to seed background slope
    /// bounds), not a weighted-mean estimator.
    pub fn average(values: &[UncertainValue]) -> UncertainValue {
        if values.is_empty() {
            return UncertainValue::new(0.0, 0.0);
        }
        let lo = values
            .iter()
            .map(|v| v.value - v.sigma)
            .fold(f64::INFINITY, f64::min);
        let hi = values
            .iter()
            .map(|v| v.value + v.sigma)
            .fold(f64::NEG_INFINITY, f64::max);
        UncertainValue::new((lo + hi) / 2.0, (hi - lo) / 2.0)
    }

    pub fn to_string_display(&self) -> String {
        if !self.value.is_finite() {
            return "?".to_string();
        }
        if !self.sigma.is_finite() {
            return format!("{}~", self.value);
        }
        if self.sigma > 0.0 && self.value.abs() > 0.0 && self.sigma / self.value.abs() > 1e6 {
            return "HUGE".to_string();
        }
        if self.sigma == 0.0 {
            return format!("{:.*}", self.sig_figs.max(1) as usize, self.value);
        }
        let so = order_of(self.sigma);
        let decimals = (-so).max(0) as usize;
        let sigma_digits = (self.sigma * 10f64.powi(decimals as i32)).round() as i64;
        format!(
            "{:.*}({})",
            decimals,
            self.value,
            sigma_digits.max(0)
        )
    }
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_display())
    }
}

impl Add for UncertainValue {
    type Output = UncertainValue;
    fn add(self, rhs: UncertainValue) -> UncertainValue {
        let value = self.value + rhs.value;
        let sigma = (self.sigma.powi(2) + rhs.sigma.powi(2)).sqrt();
        let sig_figs = self.sig_figs.min(rhs.sig_figs);
        UncertainValue {
            value,
            sigma,
            sig_figs,
        }
    }
}

impl Sub for UncertainValue {
    type Output = UncertainValue;
    fn sub(self, rhs: UncertainValue) -> UncertainValue {
        let value = self.value - rhs.value;
        let sigma = (self.sigma.powi(2) + rhs.sigma.powi(2)).sqrt();
        let sig_figs = self.sig_figs.min(rhs.sig_figs);
        UncertainValue {
            value,
            sigma,
            sig_figs,
        }
    }
}

impl Mul for UncertainValue {
    type Output = UncertainValue;
    fn mul(self, rhs: UncertainValue) -> UncertainValue {
        let value = self.value * rhs.value;
        let rel_a = if self.value != 0.0 {
            self.sigma / self.value
        } else {
            0.0
        };
        let rel_b = if rhs.value != 0.0 {
            rhs.sigma / rhs.value
        } else {
            0.0
        };
        let sigma = value.abs() * (rel_a.powi(2) + rel_b.powi(2)).sqrt();
        UncertainValue::new(value, sigma)
    }
}

impl Div for UncertainValue {
    type Output = UncertainValue;
    fn div(self, rhs: UncertainValue) -> UncertainValue {
        let value = self.value / rhs.value;
        let rel_a = if self.value != 0.0 {
            self.sigma / self.value
        } else {
            0.0
        };
        let rel_b = if rhs.value != 0.0 {
            rhs.sigma / rhs.value
        } else {
            0.0
        };
        let sigma = value.abs() * (rel_a.powi(2) + rel_b.powi(2)).sqrt();
        UncertainValue::new(value, sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_uncertainty_in_quadrature() {
        let a = UncertainValue::new(10.0, 1.0);
        let b = UncertainValue::new(5.0, 2.0);
        let sum = a + b;
        assert!((sum.value - 15.0).abs() < 1e-9);
        assert!((sum.sigma - (1f64.powi(2) + 2f64.powi(2)).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn round_trip_add_then_subtract() {
        let a = UncertainValue::new(10.0, 1.0);
        let b = UncertainValue::new(5.0, 2.0);
        let back = (a + b) - b;
        assert!((back.value - a.value).abs() < 1e-9);
        assert!(back.sigma >= a.sigma - 1e-9);
    }

    #[test]
    fn average_is_interval_midpoint() {
        let values = vec![UncertainValue::new(10.0, 1.0), UncertainValue::new(12.0, 1.0)];
        let avg = UncertainValue::average(&values);
        assert!((avg.value - 11.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_value_renders_as_unknown() {
        let v = UncertainValue::new(f64::NAN, 1.0);
        assert_eq!(v.to_string_display(), "?");
    }
}
