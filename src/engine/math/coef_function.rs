//! `CoefFunction` family - sparse degree->`FitParam` coefficient maps plus
//! an x-offset, closed over five variants (Polynomial, SqrtPoly, PolyLog,
//! LogInverse, Effit) per the "tagged sum with a shared trait" strategy the
//! design notes call for. Grounded on `engine/math/coef_function.cpp` and
//! the sibling `polynomial.cpp`/`sqrt_poly.cpp`/`log_inverse.cpp`/`effit.cpp`.

use super::fit_param::FitParam;
use super::uncertain::UncertainValue;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared behaviour every coefficient-function variant implements.
pub trait CoefFunctionOps {
    fn type_name(&self) -> &'static str;
    fn eval(&self, x: f64) -> f64;
    fn derivative(&self, x: f64) -> f64;
    fn xoffset(&self) -> &FitParam;
    fn chi2(&self) -> f64;
    fn set_chi2(&mut self, chi2: f64);
    fn to_string_repr(&self) -> String;

    /// Newton iteration seeded at `xoffset.value`, exactly as
    /// `CoefFunction::eval_inverse` does: up to 100 steps, tolerance `e`,
    /// `NaN` plus a warning on non-convergence.
    fn eval_inverse(&self, y: f64, e: f64) -> f64 {
        let mut x0 = self.xoffset().value.value;
        let mut x1 = x0 + (y - self.eval(x0)) / self.derivative(x0);
        let mut i = 0;
        while i <= 100 && (x1 - x0).abs() > e {
            x0 = x1;
            x1 = x0 + (y - self.eval(x0)) / self.derivative(x0);
            i += 1;
        }
        if (x1 - x0).abs() <= e {
            x1 - self.xoffset().value.value
        } else {
            warn!(
                "<{}> maximum iteration reached in CoefFunction inverse evaluation",
                self.type_name()
            );
            f64::NAN
        }
    }

    fn eval_array(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}

/// Shared sparse-coefficient storage used by every chain-based variant
/// (everything but `Effit`, which has its own named seven-parameter form).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoeffChain {
    pub coeffs: BTreeMap<i32, FitParam>,
    pub xoffset: FitParam,
    pub chi2: f64,
}

impl CoeffChain {
    pub fn new() -> Self {
        CoeffChain {
            coeffs: BTreeMap::new(),
            xoffset: FitParam::new("xoffset", 0.0),
            chi2: 0.0,
        }
    }

    pub fn add_coeff(&mut self, degree: i32, lower: f64, upper: f64, initial: f64) {
        if lower > upper {
            return;
        }
        self.coeffs.insert(
            degree,
            FitParam::bounded(format!("a{degree}"), initial, lower, upper),
        );
    }

    /// Dense coefficient vector, zero-filled for missing degrees, matching
    /// `CoefFunction::coeffs()`.
    pub fn dense(&self) -> Vec<f64> {
        let top = self.coeffs.keys().copied().max().unwrap_or(-1).max(0);
        let mut out = vec![0.0; (top + 1) as usize];
        for (&d, p) in &self.coeffs {
            if d >= 0 {
                out[d as usize] = p.value.value;
            }
        }
        out
    }

    fn chain_eval(&self, transformed_x: f64) -> f64 {
        self.coeffs
            .iter()
            .map(|(&d, p)| p.value.value * transformed_x.powi(d))
            .sum()
    }

    fn chain_derivative_wrt_transformed(&self, transformed_x: f64) -> f64 {
        self.coeffs
            .iter()
            .filter(|(&d, _)| d != 0)
            .map(|(&d, p)| p.value.value * (d as f64) * transformed_x.powi(d - 1))
            .sum()
    }
}

macro_rules! chain_variant {
    ($name:ident, $type_name:literal) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $name {
            pub chain: CoeffChain,
        }

        impl $name {
            pub fn new() -> Self {
                $name {
                    chain: CoeffChain::new(),
                }
            }

            pub fn add_coeff(&mut self, degree: i32, lower: f64, upper: f64, initial: f64) {
                self.chain.add_coeff(degree, lower, upper, initial);
            }
        }
    };
}

chain_variant!(PolynomialCoef, "Polynomial");
chain_variant!(SqrtPolyCoef, "SqrtPoly");
chain_variant!(PolyLogCoef, "PolyLog");
chain_variant!(LogInverseCoef, "LogInverse");

impl CoefFunctionOps for PolynomialCoef {
    fn type_name(&self) -> &'static str {
        "Polynomial"
    }
    fn eval(&self, x: f64) -> f64 {
        self.chain.chain_eval(x - self.chain.xoffset.value.value)
    }
    fn derivative(&self, x: f64) -> f64 {
        self.chain
            .chain_derivative_wrt_transformed(x - self.chain.xoffset.value.value)
    }
    fn xoffset(&self) -> &FitParam {
        &self.chain.xoffset
    }
    fn chi2(&self) -> f64 {
        self.chain.chi2
    }
    fn set_chi2(&mut self, chi2: f64) {
        self.chain.chi2 = chi2;
    }
    fn to_string_repr(&self) -> String {
        format!("Polynomial{:?}", self.chain.dense())
    }
}

impl CoefFunctionOps for SqrtPolyCoef {
    fn type_name(&self) -> &'static str {
        "SqrtPoly"
    }
    fn eval(&self, x: f64) -> f64 {
        self.chain
            .chain_eval(x - self.chain.xoffset.value.value)
            .max(0.0)
            .sqrt()
    }
    fn derivative(&self, x: f64) -> f64 {
        let t = x - self.chain.xoffset.value.value;
        let inner = self.chain.chain_eval(t).max(1e-300);
        let dinner = self.chain.chain_derivative_wrt_transformed(t);
        dinner / (2.0 * inner.sqrt())
    }
    fn xoffset(&self) -> &FitParam {
        &self.chain.xoffset
    }
    fn chi2(&self) -> f64 {
        self.chain.chi2
    }
    fn set_chi2(&mut self, chi2: f64) {
        self.chain.chi2 = chi2;
    }
    fn to_string_repr(&self) -> String {
        format!("SqrtPoly{:?}", self.chain.dense())
    }
}

impl CoefFunctionOps for PolyLogCoef {
    fn type_name(&self) -> &'static str {
        "PolyLog"
    }
    fn eval(&self, x: f64) -> f64 {
        let t = (x - self.chain.xoffset.value.value).max(1e-300).ln();
        self.chain.chain_eval(t).exp()
    }
    fn derivative(&self, x: f64) -> f64 {
        let dx = (x - self.chain.xoffset.value.value).max(1e-300);
        let t = dx.ln();
        let y = self.chain.chain_eval(t).exp();
        y * self.chain.chain_derivative_wrt_transformed(t) / dx
    }
    fn xoffset(&self) -> &FitParam {
        &self.chain.xoffset
    }
    fn chi2(&self) -> f64 {
        self.chain.chi2
    }
    fn set_chi2(&mut self, chi2: f64) {
        self.chain.chi2 = chi2;
    }
    fn to_string_repr(&self) -> String {
        format!("PolyLog{:?}", self.chain.dense())
    }
}

impl CoefFunctionOps for LogInverseCoef {
    fn type_name(&self) -> &'static str {
        "LogInverse"
    }
    fn eval(&self, x: f64) -> f64 {
        let dx = x - self.chain.xoffset.value.value;
        let t = if dx.abs() < 1e-300 { 1e300 } else { 1.0 / dx };
        self.chain.chain_eval(t).exp()
    }
    fn derivative(&self, x: f64) -> f64 {
        let dx = x - self.chain.xoffset.value.value;
        if dx.abs() < 1e-300 {
            return 0.0;
        }
        let t = 1.0 / dx;
        let y = self.chain.chain_eval(t).exp();
        y * self.chain.chain_derivative_wrt_transformed(t) * (-1.0 / (dx * dx))
    }
    fn xoffset(&self) -> &FitParam {
        &self.chain.xoffset
    }
    fn chi2(&self) -> f64 {
        self.chain.chi2
    }
    fn set_chi2(&mut self, chi2: f64) {
        self.chain.chi2 = chi2;
    }
    fn to_string_repr(&self) -> String {
        format!("LogInverse{:?}", self.chain.dense())
    }
}

/// Efficiency-curve variant: a seven-named-parameter form, not a degree
/// chain. Grounded on `engine/math/effit.cpp`'s definition string:
/// `x = ((A + B*ln(x/100) + C*ln(x/100)^2)^-G + (D + E*ln(x/1000) + F*ln(x/1000)^2)^(1-G))^(1-1/G)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffitCoef {
    pub a: FitParam,
    pub b: FitParam,
    pub c: FitParam,
    pub d: FitParam,
    pub e: FitParam,
    pub f: FitParam,
    pub g: FitParam,
    pub xoffset: FitParam,
    pub chi2: f64,
}

impl Default for EffitCoef {
    fn default() -> Self {
        EffitCoef {
            a: FitParam::new("A", 0.0),
            b: FitParam::new("B", 0.0),
            c: FitParam::new("C", 0.0),
            d: FitParam::new("D", 0.0),
            e: FitParam::new("E", 0.0),
            f: FitParam::new("F", 0.0),
            g: FitParam::bounded("G", 20.0, 1e-6, 1e3),
            xoffset: FitParam::new("xoffset", 0.0),
            chi2: 0.0,
        }
    }
}

impl CoefFunctionOps for EffitCoef {
    fn type_name(&self) -> &'static str {
        "Effit"
    }
    fn eval(&self, x: f64) -> f64 {
        let xa = (x / 100.0).max(1e-300).ln();
        let xb = (x / 1000.0).max(1e-300).ln();
        let g = self.g.value.value;
        let left = self.a.value.value + self.b.value.value * xa + self.c.value.value * xa * xa;
        let right = self.d.value.value + self.e.value.value * xb + self.f.value.value * xb * xb;
        (left.powf(-g) + right.powf(1.0 - g)).powf(1.0 - 1.0 / g)
    }
    fn derivative(&self, x: f64) -> f64 {
        let h = (x.abs() * 1e-6).max(1e-6);
        (self.eval(x + h) - self.eval(x - h)) / (2.0 * h)
    }
    fn xoffset(&self) -> &FitParam {
        &self.xoffset
    }
    fn chi2(&self) -> f64 {
        self.chi2
    }
    fn set_chi2(&mut self, chi2: f64) {
        self.chi2 = chi2;
    }
    fn to_string_repr(&self) -> String {
        "Effit(A,B,C,D,E,F,G)".to_string()
    }
}

/// The closed sum type a `Calibration` owns by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CoefFunction {
    Polynomial(PolynomialCoef),
    SqrtPoly(SqrtPolyCoef),
    PolyLog(PolyLogCoef),
    LogInverse(LogInverseCoef),
    Effit(EffitCoef),
}

impl Default for CoefFunction {
    fn default() -> Self {
        CoefFunction::Polynomial(PolynomialCoef::default())
    }
}

impl CoefFunction {
    pub fn polynomial_from_coeffs(coeffs: &[f64], uncert: f64, xoffset: f64) -> CoefFunction {
        let mut p = PolynomialCoef::new();
        p.chain.xoffset = FitParam::new("xoffset", xoffset);
        for (i, &c) in coeffs.iter().enumerate() {
            p.add_coeff(i as i32, c - uncert, c + uncert, c);
        }
        CoefFunction::Polynomial(p)
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            CoefFunction::Polynomial(p) => p.eval(x),
            CoefFunction::SqrtPoly(p) => p.eval(x),
            CoefFunction::PolyLog(p) => p.eval(x),
            CoefFunction::LogInverse(p) => p.eval(x),
            CoefFunction::Effit(p) => p.eval(x),
        }
    }

    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            CoefFunction::Polynomial(p) => p.derivative(x),
            CoefFunction::SqrtPoly(p) => p.derivative(x),
            CoefFunction::PolyLog(p) => p.derivative(x),
            CoefFunction::LogInverse(p) => p.derivative(x),
            CoefFunction::Effit(p) => p.derivative(x),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CoefFunction::Polynomial(p) => p.type_name(),
            CoefFunction::SqrtPoly(p) => p.type_name(),
            CoefFunction::PolyLog(p) => p.type_name(),
            CoefFunction::LogInverse(p) => p.type_name(),
            CoefFunction::Effit(p) => p.type_name(),
        }
    }

    pub fn xoffset(&self) -> &FitParam {
        match self {
            CoefFunction::Polynomial(p) => p.xoffset(),
            CoefFunction::SqrtPoly(p) => p.xoffset(),
            CoefFunction::PolyLog(p) => p.xoffset(),
            CoefFunction::LogInverse(p) => p.xoffset(),
            CoefFunction::Effit(p) => p.xoffset(),
        }
    }

    pub fn chi2(&self) -> f64 {
        match self {
            CoefFunction::Polynomial(p) => p.chi2(),
            CoefFunction::SqrtPoly(p) => p.chi2(),
            CoefFunction::PolyLog(p) => p.chi2(),
            CoefFunction::LogInverse(p) => p.chi2(),
            CoefFunction::Effit(p) => p.chi2(),
        }
    }

    pub fn eval_inverse(&self, y: f64) -> f64 {
        match self {
            CoefFunction::Polynomial(p) => p.eval_inverse(y, 0.2),
            CoefFunction::SqrtPoly(p) => p.eval_inverse(y, 0.2),
            CoefFunction::PolyLog(p) => p.eval_inverse(y, 0.2),
            CoefFunction::LogInverse(p) => p.eval_inverse(y, 0.2),
            CoefFunction::Effit(p) => p.eval_inverse(y, 0.2),
        }
    }

    pub fn to_string_repr(&self) -> String {
        match self {
            CoefFunction::Polynomial(p) => p.to_string_repr(),
            CoefFunction::SqrtPoly(p) => p.to_string_repr(),
            CoefFunction::PolyLog(p) => p.to_string_repr(),
            CoefFunction::LogInverse(p) => p.to_string_repr(),
            CoefFunction::Effit(p) => p.to_string_repr(),
        }
    }
}

pub fn uncertain_eval(func: &CoefFunction, x: f64, x_sigma: f64) -> UncertainValue {
    let y = func.eval(x);
    let slope = func.derivative(x);
    UncertainValue::new(y, (slope * x_sigma).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_eval_matches_direct_computation() {
        let poly = CoefFunction::polynomial_from_coeffs(&[1.0, 2.0, 3.0], 0.0, 0.0);
        assert!((poly.eval(2.0) - (1.0 + 2.0 * 2.0 + 3.0 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn inverse_recovers_original_within_tolerance() {
        let poly = CoefFunction::polynomial_from_coeffs(&[1.0, 0.5, 1e-4], 0.0, 0.0);
        for c in [0.0, 100.0, 2048.0, 4095.0] {
            let y = poly.eval(c);
            let back = poly.eval_inverse(y);
            assert!((back - c).abs() < 1e-3, "c={c} back={back}");
        }
    }

    #[test]
    fn degenerate_derivative_reports_max_iterations() {
        let flat = CoefFunction::polynomial_from_coeffs(&[5.0], 0.0, 0.0);
        let r = flat.eval_inverse(10.0);
        assert!(r.is_nan());
    }
}
