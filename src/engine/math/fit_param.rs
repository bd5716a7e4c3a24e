//! `FitParam` - a named `UncertainValue` with `[lower, upper]` bounds and
//! `enabled`/`fixed` flags, grounded on `engine/math/fit_param.cpp`.

use super::uncertain::UncertainValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParam {
    pub name: String,
    pub value: UncertainValue,
    pub lower: f64,
    pub upper: f64,
    pub enabled: bool,
    pub fixed: bool,
}

impl Default for FitParam {
    fn default() -> Self {
        FitParam::new("", 0.0)
    }
}

impl FitParam {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        FitParam {
            name: name.into(),
            value: UncertainValue::exact(value),
            lower: f64::MIN,
            upper: f64::MAX,
            enabled: true,
            fixed: false,
        }
    }

    pub fn bounded(name: impl Into<String>, value: f64, lower: f64, upper: f64) -> Self {
        FitParam {
            name: name.into(),
            value: UncertainValue::exact(value),
            lower,
            upper,
            enabled: true,
            fixed: false,
        }
    }

    pub fn set_value(&mut self, value: UncertainValue) {
        self.value = value;
    }

    pub fn preset_bounds(&mut self, lower: f64, upper: f64) {
        self.lower = lower;
        self.upper = upper;
    }

    pub fn constrain(&mut self, lower: f64, upper: f64) {
        self.lower = self.lower.max(lower);
        self.upper = self.upper.min(upper);
        self.value.value = self.value.value.clamp(self.lower, self.upper);
    }

    /// A param is implicitly fixed when the bounds have collapsed onto the
    /// value - the optimizer has nothing to vary.
    pub fn implicitly_fixed(&self) -> bool {
        (self.value.value - self.lower).abs() < 1e-12
            && (self.value.value - self.upper).abs() < 1e-12
    }

    /// The enforced view of this parameter as the optimizer should see it:
    /// when `enabled` is false the bounds collapse to `[0, lower]` and the
    /// value is pinned there; when `fixed` is true the bounds narrow to
    /// `value +/- 1% of value` rather than reusing a stale bound.
    pub fn enforce_policy(&self) -> FitParam {
        let mut out = self.clone();
        if !self.enabled {
            out.upper = out.lower;
            out.lower = 0.0;
            out.value = UncertainValue::exact(out.lower);
        } else if self.fixed {
            let delta = (out.value.value * 0.01).abs();
            out.lower = out.value.value - delta;
            out.upper = out.value.value + delta;
        }
        out
    }

    pub fn same_bounds_and_policy(&self, other: &FitParam) -> bool {
        self.lower == other.lower
            && self.upper == other.upper
            && self.enabled == other.enabled
            && self.fixed == other.fixed
    }
}

impl std::fmt::Display for FitParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_param_collapses_bounds() {
        let p = FitParam {
            name: "a".into(),
            value: UncertainValue::exact(5.0),
            lower: 2.0,
            upper: 10.0,
            enabled: false,
            fixed: false,
        };
        let e = p.enforce_policy();
        assert_eq!(e.lower, 0.0);
        assert_eq!(e.upper, 2.0);
        assert_eq!(e.value.value, 0.0);
    }

    #[test]
    fn fixed_param_narrows_to_one_percent() {
        let mut p = FitParam::new("a", 100.0);
        p.fixed = true;
        let e = p.enforce_policy();
        assert!((e.lower - 99.0).abs() < 1e-9);
        assert!((e.upper - 101.0).abs() < 1e-9);
    }

    #[test]
    fn implicitly_fixed_when_bounds_collapsed() {
        let p = FitParam::bounded("a", 5.0, 5.0, 5.0);
        assert!(p.implicitly_fixed());
    }
}
