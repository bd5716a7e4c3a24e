//! `Optimizer` - peak shape and background curve fitting. Grounded on
//! `engine/fitting/optimizer.h`/`optimizer.cpp`; the original links against
//! a bundled Levenberg-Marquardt solver, reimplemented here as a plain
//! finite-difference variant since no numerical-optimization crate appears
//! anywhere in the example pack.

use crate::engine::fit_settings::FitSettings;
use crate::engine::math::{CoefFunction, FitParam, Gaussian, Hypermet};
use crate::error::{EngineError, EngineResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// Abstraction over "something that can fit a curve shape to data",
/// matching the original's pluggable-optimizer design: a small,
/// write-once registry of optimizer implementations.
pub trait Optimizer {
    fn fit_polynomial(&self, x: &[f64], y: &[f64], degree: usize, max_iter: u16) -> EngineResult<CoefFunction>;

    fn fit_gaussian(&self, x: &[f64], y: &[f64], seed: &Gaussian, max_iter: u16) -> EngineResult<Gaussian>;

    fn fit_gaussians(
        &self,
        x: &[f64],
        y: &[f64],
        seeds: &[Gaussian],
        settings: &FitSettings,
        interruptor: &AtomicBool,
    ) -> EngineResult<Vec<Gaussian>>;

    fn fit_hypermet(
        &self,
        x: &[f64],
        y: &[f64],
        seeds: &[Hypermet],
        settings: &FitSettings,
        interruptor: &AtomicBool,
    ) -> EngineResult<Vec<Hypermet>>;
}

/// The engine's sole optimizer implementation: damped Gauss-Newton
/// (Levenberg-Marquardt) over a finite-difference Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl Optimizer for LevenbergMarquardt {
    fn fit_polynomial(&self, x: &[f64], y: &[f64], degree: usize, max_iter: u16) -> EngineResult<CoefFunction> {
        if x.len() != y.len() || x.is_empty() {
            return Err(EngineError::InvalidInput("fit_polynomial: empty or mismatched x/y".into()));
        }
        let xoffset = x[x.len() / 2];
        let mut params = vec![0.0; degree + 1];
        params[0] = y.iter().sum::<f64>() / y.len() as f64;
        let lower = vec![f64::MIN / 2.0; degree + 1];
        let upper = vec![f64::MAX / 2.0; degree + 1];

        let chi2 = levenberg_marquardt(&mut params, &lower, &upper, max_iter as usize, &AtomicBool::new(false), |p| {
            x.iter()
                .zip(y.iter())
                .map(|(&xi, &yi)| {
                    let t = xi - xoffset;
                    let mut model = 0.0;
                    for (d, &c) in p.iter().enumerate() {
                        model += c * t.powi(d as i32);
                    }
                    model - yi
                })
                .collect()
        });

        let mut func = CoefFunction::polynomial_from_coeffs(&params, 0.0, xoffset);
        if let CoefFunction::Polynomial(ref mut p) = func {
            p.chain.chi2 = chi2 / x.len() as f64;
        }
        Ok(func)
    }

    fn fit_gaussian(&self, x: &[f64], y: &[f64], seed: &Gaussian, max_iter: u16) -> EngineResult<Gaussian> {
        if x.len() != y.len() || x.is_empty() {
            return Err(EngineError::InvalidInput("fit_gaussian: empty or mismatched x/y".into()));
        }
        let mut params = vec![seed.center.value.value, seed.height.value.value, seed.hwhm.value.value];
        let lower = vec![seed.center.lower, seed.height.lower.max(0.0), seed.hwhm.lower.max(1e-6)];
        let upper = vec![seed.center.upper, seed.height.upper, seed.hwhm.upper];

        let chi2 = levenberg_marquardt(&mut params, &lower, &upper, max_iter as usize, &AtomicBool::new(false), |p| {
            let g = Gaussian::new(p[0], p[1], p[2]);
            x.iter().zip(y.iter()).map(|(&xi, &yi)| g.evaluate(xi) - yi).collect()
        });

        let mut fitted = Gaussian::new(params[0], params[1], params[2]);
        fitted.rsq = 1.0 - chi2 / sum_of_squares_about_mean(y);
        Ok(fitted)
    }

    fn fit_gaussians(
        &self,
        x: &[f64],
        y: &[f64],
        seeds: &[Gaussian],
        settings: &FitSettings,
        interruptor: &AtomicBool,
    ) -> EngineResult<Vec<Gaussian>> {
        if seeds.is_empty() {
            return Err(EngineError::InvalidInput("fit_gaussians: no seed peaks".into()));
        }
        if x.len() != y.len() || x.is_empty() {
            return Err(EngineError::InvalidInput("fit_gaussians: empty or mismatched x/y".into()));
        }

        let n = seeds.len();
        let mut params = Vec::with_capacity(n * 3);
        let mut lower = Vec::with_capacity(n * 3);
        let mut upper = Vec::with_capacity(n * 3);
        for g in seeds {
            params.push(g.center.value.value);
            params.push(g.height.value.value);
            params.push(g.hwhm.value.value);
            lower.push(g.center.lower);
            lower.push(g.height.lower.max(0.0));
            lower.push(if settings.width_common { seeds[0].hwhm.lower.max(1e-6) } else { g.hwhm.lower.max(1e-6) });
            upper.push(g.center.upper);
            upper.push(g.height.upper);
            upper.push(if settings.width_common { seeds[0].hwhm.upper } else { g.hwhm.upper });
        }

        let width_common = settings.width_common;
        let chi2 = levenberg_marquardt(
            &mut params,
            &lower,
            &upper,
            settings.fitter_max_iter as usize,
            interruptor,
            |p| {
                let shared_w = p[2];
                x.iter()
                    .zip(y.iter())
                    .map(|(&xi, &yi)| {
                        let mut model = 0.0;
                        for k in 0..n {
                            let c = p[k * 3];
                            let h = p[k * 3 + 1];
                            let w = if width_common { shared_w } else { p[k * 3 + 2] };
                            if w != 0.0 {
                                model += h * (-((xi - c) / w).powi(2) * std::f64::consts::LN_2).exp();
                            }
                        }
                        model - yi
                    })
                    .collect()
            },
        );

        if interruptor.load(Ordering::Relaxed) {
            return Err(EngineError::Interrupted);
        }

        let rsq_total = 1.0 - chi2 / sum_of_squares_about_mean(y);
        Ok((0..n)
            .map(|k| {
                let w = if width_common { params[2] } else { params[k * 3 + 2] };
                Gaussian {
                    center: FitParam::bounded(seeds[k].center.name.clone(), params[k * 3], lower[k * 3], upper[k * 3]),
                    height: FitParam::bounded(seeds[k].height.name.clone(), params[k * 3 + 1], lower[k * 3 + 1], upper[k * 3 + 1]),
                    hwhm: FitParam::bounded(seeds[k].hwhm.name.clone(), w, lower[k * 3 + 2], upper[k * 3 + 2]),
                    rsq: rsq_total,
                }
            })
            .collect())
    }

    fn fit_hypermet(
        &self,
        x: &[f64],
        y: &[f64],
        seeds: &[Hypermet],
        settings: &FitSettings,
        interruptor: &AtomicBool,
    ) -> EngineResult<Vec<Hypermet>> {
        if seeds.is_empty() {
            return Err(EngineError::InvalidInput("fit_hypermet: no seed peaks".into()));
        }
        if x.len() != y.len() || x.is_empty() {
            return Err(EngineError::InvalidInput("fit_hypermet: empty or mismatched x/y".into()));
        }

        // Per-peak param layout: [center, height, width, step_amp, tail_amp,
        // tail_slope, lskew_amp, lskew_slope, rskew_amp, rskew_slope].
        const STRIDE: usize = 10;
        let n = seeds.len();
        let mut params = Vec::with_capacity(n * STRIDE);
        let mut lower = Vec::with_capacity(n * STRIDE);
        let mut upper = Vec::with_capacity(n * STRIDE);

        for h in seeds {
            let fields: [&FitParam; STRIDE] = [
                &h.center,
                &h.height,
                &h.width,
                &h.step_amplitude,
                &h.tail_amplitude,
                &h.tail_slope,
                &h.lskew_amplitude,
                &h.lskew_slope,
                &h.rskew_amplitude,
                &h.rskew_slope,
            ];
            for field in fields {
                let enforced = field.enforce_policy();
                params.push(enforced.value.value);
                lower.push(enforced.lower);
                upper.push(enforced.upper);
            }
        }
        if settings.gaussian_only {
            for k in 0..n {
                for slot in 3..STRIDE {
                    let idx = k * STRIDE + slot;
                    lower[idx] = 0.0;
                    upper[idx] = 0.0;
                    params[idx] = 0.0;
                }
            }
        }

        let width_common = settings.width_common;
        let chi2 = levenberg_marquardt(
            &mut params,
            &lower,
            &upper,
            settings.fitter_max_iter as usize,
            interruptor,
            |p| {
                let shared_w = p[2];
                x.iter()
                    .zip(y.iter())
                    .map(|(&xi, &yi)| {
                        let mut model = 0.0;
                        for k in 0..n {
                            let base = k * STRIDE;
                            let c = p[base];
                            let h = p[base + 1];
                            let w = if width_common { shared_w } else { p[base + 2] }.max(1e-9);
                            let dx = xi - c;
                            model += h * (-(dx / w).powi(2) * std::f64::consts::LN_2).exp();

                            let step = p[base + 3];
                            let tail_a = p[base + 4];
                            let tail_s = p[base + 5].max(1e-9);
                            let lskew_a = p[base + 6];
                            let lskew_s = p[base + 7].max(1e-9);
                            let rskew_a = p[base + 8];
                            let rskew_s = p[base + 9].max(1e-9);

                            if step != 0.0 {
                                model += step * h * erfc(dx / w);
                            }
                            if lskew_a != 0.0 && dx <= 0.0 {
                                model += lskew_a * h * (dx / (lskew_s * w)).exp() * erfc(dx / w + w / (2.0 * lskew_s));
                            }
                            if rskew_a != 0.0 && dx >= 0.0 {
                                model += rskew_a * h * (-dx / (rskew_s * w)).exp() * erfc(-dx / w + w / (2.0 * rskew_s));
                            }
                            if tail_a != 0.0 {
                                model += tail_a * h * (dx / (tail_s * w)).exp() * erfc(dx / w + w / (2.0 * tail_s));
                            }
                        }
                        model - yi
                    })
                    .collect()
            },
        );

        if interruptor.load(Ordering::Relaxed) {
            return Err(EngineError::Interrupted);
        }

        let rsq_total = 1.0 - chi2 / sum_of_squares_about_mean(y);
        Ok((0..n)
            .map(|k| {
                let base = k * STRIDE;
                let w = if width_common { params[2] } else { params[base + 2] };
                let name_for = |field: &FitParam| field.name.clone();
                Hypermet {
                    center: FitParam::bounded(name_for(&seeds[k].center), params[base], lower[base], upper[base]),
                    height: FitParam::bounded(name_for(&seeds[k].height), params[base + 1], lower[base + 1], upper[base + 1]),
                    width: FitParam::bounded(name_for(&seeds[k].width), w, lower[base + 2], upper[base + 2]),
                    step_amplitude: FitParam::bounded(name_for(&seeds[k].step_amplitude), params[base + 3], lower[base + 3], upper[base + 3]),
                    tail_amplitude: FitParam::bounded(name_for(&seeds[k].tail_amplitude), params[base + 4], lower[base + 4], upper[base + 4]),
                    tail_slope: FitParam::bounded(name_for(&seeds[k].tail_slope), params[base + 5], lower[base + 5], upper[base + 5]),
                    lskew_amplitude: FitParam::bounded(name_for(&seeds[k].lskew_amplitude), params[base + 6], lower[base + 6], upper[base + 6]),
                    lskew_slope: FitParam::bounded(name_for(&seeds[k].lskew_slope), params[base + 7], lower[base + 7], upper[base + 7]),
                    rskew_amplitude: FitParam::bounded(name_for(&seeds[k].rskew_amplitude), params[base + 8], lower[base + 8], upper[base + 8]),
                    rskew_slope: FitParam::bounded(name_for(&seeds[k].rskew_slope), params[base + 9], lower[base + 9], upper[base + 9]),
                    rsq: rsq_total,
                    user_modified: seeds[k].user_modified,
                }
            })
            .collect())
    }
}

fn sum_of_squares_about_mean(y: &[f64]) -> f64 {
    let mean = y.iter().sum::<f64>() / y.len().max(1) as f64;
    y.iter().map(|&yi| (yi - mean).powi(2)).sum::<f64>().max(1e-12)
}

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

/// Damped Gauss-Newton over a finite-difference Jacobian. Returns the final
/// sum-of-squared-residuals. `interruptor` is polled once per outer
/// iteration, the cooperative-cancellation convention used throughout the
/// engine.
fn levenberg_marquardt(
    params: &mut [f64],
    lower: &[f64],
    upper: &[f64],
    max_iter: usize,
    interruptor: &AtomicBool,
    eval_residuals: impl Fn(&[f64]) -> Vec<f64>,
) -> f64 {
    let n = params.len();
    if n == 0 {
        let r = eval_residuals(params);
        return r.iter().map(|v| v * v).sum();
    }
    let mut lambda = 1e-3;
    let mut resid = eval_residuals(params);
    let mut chi2: f64 = resid.iter().map(|r| r * r).sum();

    for _ in 0..max_iter {
        if interruptor.load(Ordering::Relaxed) {
            break;
        }
        let m = resid.len();
        let mut jac = vec![vec![0.0; n]; m];
        for j in 0..n {
            let h = (params[j].abs() * 1e-6).max(1e-6);
            let mut p2 = params.to_vec();
            p2[j] += h;
            let r2 = eval_residuals(&p2);
            for i in 0..m {
                jac[i][j] = (r2[i] - resid[i]) / h;
            }
        }

        let mut jtj = vec![vec![0.0; n]; n];
        let mut jtr = vec![0.0; n];
        for i in 0..n {
            for k in 0..n {
                let mut s = 0.0;
                for row in 0..m {
                    s += jac[row][i] * jac[row][k];
                }
                jtj[i][k] = s;
            }
            let mut s = 0.0;
            for row in 0..m {
                s += jac[row][i] * resid[row];
            }
            jtr[i] = -s;
        }

        let mut improved = false;
        for _ in 0..16 {
            let mut a = jtj.clone();
            for i in 0..n {
                let diag = a[i][i].abs().max(1e-12);
                a[i][i] += lambda * diag;
            }
            let b = jtr.clone();
            let dp = match gauss_solve(a, b) {
                Some(dp) => dp,
                None => {
                    lambda *= 4.0;
                    continue;
                }
            };
            let mut trial: Vec<f64> = params.to_vec();
            for i in 0..n {
                trial[i] = (trial[i] + dp[i]).clamp(lower[i], upper[i]);
            }
            let trial_resid = eval_residuals(&trial);
            let trial_chi2: f64 = trial_resid.iter().map(|r| r * r).sum();
            if trial_chi2.is_finite() && trial_chi2 < chi2 {
                params.copy_from_slice(&trial);
                resid = trial_resid;
                chi2 = trial_chi2;
                lambda = (lambda * 0.4).max(1e-12);
                improved = true;
                break;
            } else {
                lambda *= 4.0;
                if lambda > 1e12 {
                    break;
                }
            }
        }
        if !improved {
            break;
        }
    }
    chi2
}

/// Gaussian elimination with partial pivoting. `None` on a singular system.
fn gauss_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-14 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut s = b[row];
        for k in (row + 1)..n {
            s -= a[row][k] * x[k];
        }
        x[row] = s / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_single_gaussian_close_to_truth() {
        let x: Vec<f64> = (480..545).map(|i| i as f64).collect();
        let truth = Gaussian::new(512.0, 1000.0, 5.0);
        let y = truth.evaluate_array(&x);
        let seed = Gaussian::new(510.0, 900.0, 6.0);
        let fitted = LevenbergMarquardt.fit_gaussian(&x, &y, &seed, 200).unwrap();
        assert!((fitted.center.value.value - 512.0).abs() < 0.5);
        assert!((fitted.height.value.value - 1000.0).abs() < 50.0);
    }

    #[test]
    fn fits_polynomial_background() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 3.0 + 2.0 * xi).collect();
        let func = LevenbergMarquardt.fit_polynomial(&x, &y, 1, 100).unwrap();
        assert!((func.eval(10.0) - 23.0).abs() < 1.0);
    }

    #[test]
    fn interruptor_halts_multiplet_fit() {
        let x: Vec<f64> = (480..545).map(|i| i as f64).collect();
        let truth = Gaussian::new(512.0, 1000.0, 5.0);
        let y = truth.evaluate_array(&x);
        let interruptor = AtomicBool::new(true);
        let settings = FitSettings::default();
        let result = LevenbergMarquardt.fit_gaussians(&x, &y, &[truth], &settings, &interruptor);
        assert!(matches!(result, Err(EngineError::Interrupted)));
    }
}
