//! `ROI` - a region of interest: one or more peaks sharing a background.
//! The heart of the engine. Grounded on `engine/roi.cpp`.

use crate::engine::fit_settings::FitSettings;
use crate::engine::finder::Finder;
use crate::engine::math::{CoefFunction, Gaussian, Hypermet, UncertainValue};
use crate::engine::optimizer::{LevenbergMarquardt, Optimizer};
use crate::engine::peak::Peak;
use crate::engine::sum4::{Sum4, Sum4Edge};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A label attached to each historical fit describing how it came to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitDescription {
    Initial,
    AddPeak,
    RemovePeaks,
    AdjustLB,
    AdjustRB,
    Refit,
    ResidualAdd,
    AdjustSum4,
    OverrideEnergy,
    ReplaceHypermet,
}

/// One snapshot in a ROI's undo history. `x`/`y` are `Arc`-shared so that a
/// long fit history doesn't grow quadratically with the data slice size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fit {
    pub description: FitDescription,
    pub x: Arc<[f64]>,
    pub y: Arc<[f64]>,
    pub background: CoefFunction,
    pub peaks: BTreeMap<String, Hypermet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roi {
    pub lb: Sum4Edge,
    pub rb: Sum4Edge,

    pub x: Arc<[f64]>,
    pub y: Arc<[f64]>,

    /// The ROI's own Mariscotti finder, run over just this slice - drives
    /// candidate detection for `auto_fit` and the iterative residual pass.
    pub finder: Finder,

    /// Fit-able background, built by `init_background`.
    pub background: CoefFunction,
    /// Parameter-free background used purely for SUM4, built by
    /// `make_sum4_background` - a distinct construction path from
    /// `background`.
    pub sum4_background: CoefFunction,

    pub peaks: BTreeMap<u64, Peak>,
    next_peak_id: u64,

    pub fits: Vec<Fit>,
    pub current_fit_index: usize,

    pub hr_x: Vec<f64>,
    pub hr_background: Vec<f64>,
    pub hr_fullfit: Vec<f64>,
    pub lr_background: Vec<f64>,
    pub lr_fullfit: Vec<f64>,

    pub settings: FitSettings,
}

/// Fixed-point key for `peaks`/selection bookkeeping derived from a
/// center energy, matching the original's use of peak center as the
/// natural sort key.
fn peak_key(center: f64) -> u64 {
    center.to_bits()
}

impl Roi {
    /// Constructs a new ROI from a candidate window, builds both
    /// background paths, and performs the initial fit.
    pub fn new(x: &[f64], y: &[f64], left_ch: usize, right_ch: usize, settings: FitSettings) -> EngineResult<Roi> {
        if right_ch <= left_ch || right_ch >= x.len() {
            return Err(EngineError::InvalidInput("ROI::new: degenerate channel range".into()));
        }
        let edge_n = settings.background_edge_samples.max(1) as usize;
        let lb_right = (left_ch + edge_n).min(right_ch);
        let rb_left = right_ch.saturating_sub(edge_n).max(left_ch);
        let lb = Sum4Edge::new(x, y, left_ch, lb_right)
            .ok_or_else(|| EngineError::InvalidInput("ROI::new: invalid left edge".into()))?;
        let rb = Sum4Edge::new(x, y, rb_left, right_ch)
            .ok_or_else(|| EngineError::InvalidInput("ROI::new: invalid right edge".into()))?;

        let roi_x: Arc<[f64]> = Arc::from(x[left_ch..=right_ch].to_vec());
        let roi_y: Arc<[f64]> = Arc::from(y[left_ch..=right_ch].to_vec());
        let finder = Finder::new(roi_x.to_vec(), roi_y.to_vec(), settings.clone());

        let mut roi = Roi {
            lb,
            rb,
            x: roi_x,
            y: roi_y,
            finder,
            background: CoefFunction::default(),
            sum4_background: CoefFunction::default(),
            peaks: BTreeMap::new(),
            next_peak_id: 0,
            fits: Vec::new(),
            current_fit_index: 0,
            hr_x: Vec::new(),
            hr_background: Vec::new(),
            hr_fullfit: Vec::new(),
            lr_background: Vec::new(),
            lr_fullfit: Vec::new(),
            settings,
        };

        roi.init_background()?;
        roi.make_sum4_background();
        roi.auto_fit(&AtomicBool::new(false))?;
        roi.save_current_fit(FitDescription::Initial);
        if roi.settings.resid_auto {
            roi.iterative_fit(&AtomicBool::new(false))?;
        }
        roi.render();
        Ok(roi)
    }

    pub fn left_channel(&self) -> f64 {
        self.x.first().copied().unwrap_or(0.0)
    }

    pub fn right_channel(&self) -> f64 {
        self.x.last().copied().unwrap_or(0.0)
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    /// Fits a linear background through the two edge midpoint/average
    /// pairs, exactly as `Sum4::new`'s background does, but expressed as an
    /// independent `CoefFunction` the optimizer can refine alongside peaks.
    fn init_background(&mut self) -> EngineResult<()> {
        let x = &self.x;
        let y = &self.y;
        let edge_n = self.settings.background_edge_samples.max(1) as usize;
        let n = x.len();
        let left_end = edge_n.min(n);
        let right_start = n.saturating_sub(edge_n).max(left_end);

        let bg_x: Vec<f64> = x[..left_end].iter().chain(x[right_start..].iter()).copied().collect();
        let bg_y: Vec<f64> = y[..left_end].iter().chain(y[right_start..].iter()).copied().collect();
        if bg_x.len() < 2 {
            self.background = CoefFunction::polynomial_from_coeffs(&[y.first().copied().unwrap_or(0.0)], 0.0, x.first().copied().unwrap_or(0.0));
            return Ok(());
        }
        self.background = LevenbergMarquardt.fit_polynomial(&bg_x, &bg_y, 1, self.settings.fitter_max_iter)?;
        Ok(())
    }

    /// Builds the deterministic, parameter-free background used solely by
    /// SUM4 - the straight line through the two edges' average points,
    /// independent of `background`'s fitted polynomial.
    fn make_sum4_background(&mut self) {
        let run = self.rb.midpoint() - self.lb.midpoint();
        let slope = if run.abs() > 1e-12 {
            (self.rb.average.value - self.lb.average.value) / run
        } else {
            0.0
        };
        let intercept = self.lb.average.value - slope * self.lb.midpoint();
        self.sum4_background = CoefFunction::polynomial_from_coeffs(&[intercept, slope], 0.0, 0.0);
    }

    fn background_subtracted(&self) -> Vec<f64> {
        self.x.iter().zip(self.y.iter()).map(|(&xi, &yi)| yi - self.background.eval(xi)).collect()
    }

    /// Auto-fit protocol: run the ROI's own Mariscotti finder, seed one
    /// Gaussian per accepted candidate (positive height/hwhm, center inside
    /// the ROI), and rebuilds the multiplet. Callers that want the full
    /// auto-fit protocol - base fit, then the iterative residual pass when
    /// `resid_auto` is set - call `iterative_fit` afterward, so the base
    /// fit can be snapshotted before any residual-added peaks.
    pub fn auto_fit(&mut self, interruptor: &AtomicBool) -> EngineResult<()> {
        self.peaks.clear();
        self.finder.find_peaks();
        if self.finder.filtered.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        let resid = self.background_subtracted();
        let mut candidates = self.finder.filtered.clone();
        candidates.truncate(self.settings.roi_max_peaks as usize);

        let seeds: Vec<Gaussian> = candidates
            .iter()
            .filter(|&&i| i < resid.len())
            .map(|&i| Gaussian::new(self.x[i], resid[i].max(1.0), (self.x.len() as f64 / 20.0).max(1.0)))
            .filter(|g| {
                g.height.value.value > 0.0
                    && g.hwhm.value.value > 0.0
                    && g.center.value.value > self.left_channel()
                    && g.center.value.value < self.right_channel()
            })
            .collect();
        if seeds.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        self.rebuild(seeds, interruptor)?;
        Ok(())
    }

    /// Iterative residual fit: repeatedly tries adding one peak seeded from
    /// the largest-residual finder candidate not already claimed by an
    /// existing peak, accepting the addition only when it strictly
    /// improves fit quality. Bounded by `resid_max_iterations`; the
    /// interruptor is polled once per iteration boundary.
    fn iterative_fit(&mut self, interruptor: &AtomicBool) -> EngineResult<()> {
        for _ in 0..self.settings.resid_max_iterations {
            if interruptor.load(Ordering::Relaxed) {
                return Err(EngineError::Interrupted);
            }
            self.finder.find_peaks();
            let resid = self.background_subtracted();

            let hwhm = self
                .peaks
                .values()
                .map(|p| p.hypermet.width.value.value)
                .fold(0.0_f64, f64::max)
                .max(1.0);
            let min_dist = self.settings.resid_too_close * 2.0 * hwhm;

            let candidate = self
                .finder
                .filtered
                .iter()
                .copied()
                .filter(|&i| i < resid.len())
                .filter(|&i| resid[i] > self.settings.resid_min_amplitude as f64)
                .filter(|&i| self.peaks.values().all(|p| (p.center.value - self.x[i]).abs() >= min_dist))
                .max_by(|&a, &b| resid[a].partial_cmp(&resid[b]).unwrap());

            let idx = match candidate {
                Some(i) => i,
                None => break,
            };

            let prev_peaks = self.peaks.clone();
            let prev_quality = self.fit_quality();

            let mut seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
            seeds.push(Gaussian::new(self.x[idx], resid[idx].max(1.0), (self.x.len() as f64 / 20.0).max(1.0)));

            if self.rebuild(seeds, interruptor).is_err() {
                self.peaks = prev_peaks;
                break;
            }

            if self.fit_quality() > prev_quality + 1e-9 {
                self.save_current_fit(FitDescription::ResidualAdd);
                self.render();
            } else {
                self.peaks = prev_peaks;
                break;
            }
        }
        Ok(())
    }

    /// A monotonic proxy for fit quality (higher is better), shared by
    /// every peak in the current multiplet, used to judge strict
    /// improvement across an iterative-residual step.
    fn fit_quality(&self) -> f64 {
        self.peaks.values().next().map(|p| p.hypermet.rsq).unwrap_or(f64::MIN)
    }

    fn rebuild(&mut self, seeds: Vec<Gaussian>, interruptor: &AtomicBool) -> EngineResult<()> {
        if self.settings.gaussian_only || self.settings.sum4_only {
            self.rebuild_as_gaussian(seeds, interruptor)
        } else {
            self.rebuild_as_hypermet(seeds, interruptor)
        }
    }

    fn rebuild_as_gaussian(&mut self, seeds: Vec<Gaussian>, interruptor: &AtomicBool) -> EngineResult<()> {
        let resid = self.background_subtracted();
        let fitted = if self.settings.sum4_only {
            seeds
        } else {
            LevenbergMarquardt.fit_gaussians(&self.x, &resid, &seeds, &self.settings, interruptor)?
        };
        self.peaks.clear();
        for g in fitted {
            let hyp = Hypermet::from_gaussian(&g);
            self.insert_peak(hyp)?;
        }
        Ok(())
    }

    fn rebuild_as_hypermet(&mut self, seeds: Vec<Gaussian>, interruptor: &AtomicBool) -> EngineResult<()> {
        let resid = self.background_subtracted();
        let hyp_seeds: Vec<Hypermet> = seeds.iter().map(Hypermet::from_gaussian).collect();
        let fitted = LevenbergMarquardt.fit_hypermet(&self.x, &resid, &hyp_seeds, &self.settings, interruptor)?;
        self.peaks.clear();
        for hyp in fitted {
            self.insert_peak(hyp)?;
        }
        Ok(())
    }

    fn insert_peak(&mut self, hyp: Hypermet) -> EngineResult<()> {
        let center = hyp.center.value.value;
        let ch = self.find_local_index(center);
        let win = (self.x.len() / 8).max(2);
        let l = ch.saturating_sub(win);
        let r = (ch + win).min(self.x.len() - 1);
        let lb = Sum4Edge::new(&self.x, &self.y, l, (l + 2).min(r)).unwrap_or_else(|| self.lb.clone());
        let rb = Sum4Edge::new(&self.x, &self.y, r.saturating_sub(2).max(l), r).unwrap_or_else(|| self.rb.clone());
        let sum4 = Sum4::new(&self.x, &self.y, l, r, &lb, &rb)
            .ok_or_else(|| EngineError::InvalidInput("insert_peak: degenerate SUM4 window".into()))?;
        let live = self.settings.live_time_ms as f64 / 1000.0;
        let peak = Peak::new(hyp, sum4, &self.settings, live);
        self.peaks.insert(peak_key(center), peak);
        self.next_peak_id += 1;
        Ok(())
    }

    fn find_local_index(&self, value: f64) -> usize {
        self.x
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - value).abs().partial_cmp(&(b.1 - value).abs()).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Three-case insertion per the original: merge into an existing peak's
    /// neighbourhood, seed a fresh peak and refit the whole multiplet, or
    /// reject a center outside the ROI's span.
    pub fn add_peak(&mut self, center: f64, interruptor: &AtomicBool) -> EngineResult<()> {
        if center < self.left_channel() || center > self.right_channel() {
            return Err(EngineError::InvalidInput("add_peak: center outside ROI".into()));
        }
        let too_close = self.settings.resid_too_close * (self.right_channel() - self.left_channel());
        if self.peaks.values().any(|p| (p.center.value - center).abs() < too_close) {
            return Ok(());
        }
        let mut seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
        let height = self.background_subtracted()[self.find_local_index(center)].max(1.0);
        seeds.push(Gaussian::new(center, height, (self.x.len() as f64 / 20.0).max(1.0)));
        self.rebuild(seeds, interruptor)?;
        self.save_current_fit(FitDescription::AddPeak);
        self.render();
        Ok(())
    }

    pub fn remove_peaks(&mut self, centers: &[f64], interruptor: &AtomicBool) -> EngineResult<()> {
        let keys: Vec<u64> = centers.iter().map(|&c| peak_key(self.find_nearest_key_value(c))).collect();
        for k in keys {
            self.peaks.remove(&k);
        }
        if self.peaks.is_empty() {
            self.save_current_fit(FitDescription::RemovePeaks);
            self.render();
            return Ok(());
        }
        let seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
        self.rebuild(seeds, interruptor)?;
        self.save_current_fit(FitDescription::RemovePeaks);
        self.render();
        Ok(())
    }

    fn find_nearest_key_value(&self, value: f64) -> f64 {
        self.peaks
            .values()
            .map(|p| p.center.value)
            .min_by(|a, b| (a - value).abs().partial_cmp(&(b - value).abs()).unwrap())
            .unwrap_or(value)
    }

    pub fn adjust_lb(&mut self, new_left: usize, full_x: &[f64], full_y: &[f64], interruptor: &AtomicBool) -> EngineResult<()> {
        self.lb = Sum4Edge::new(full_x, full_y, new_left, self.lb.right.max(new_left + 1))
            .ok_or_else(|| EngineError::InvalidInput("adjust_lb: invalid edge".into()))?;
        self.init_background()?;
        self.make_sum4_background();
        let seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
        if !seeds.is_empty() {
            self.rebuild(seeds, interruptor)?;
        }
        self.save_current_fit(FitDescription::AdjustLB);
        self.render();
        Ok(())
    }

    pub fn adjust_rb(&mut self, new_right: usize, full_x: &[f64], full_y: &[f64], interruptor: &AtomicBool) -> EngineResult<()> {
        self.rb = Sum4Edge::new(full_x, full_y, self.rb.left.min(new_right.saturating_sub(1)), new_right)
            .ok_or_else(|| EngineError::InvalidInput("adjust_rb: invalid edge".into()))?;
        self.init_background()?;
        self.make_sum4_background();
        let seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
        if !seeds.is_empty() {
            self.rebuild(seeds, interruptor)?;
        }
        self.save_current_fit(FitDescription::AdjustRB);
        self.render();
        Ok(())
    }

    pub fn refit(&mut self, interruptor: &AtomicBool) -> EngineResult<()> {
        let seeds: Vec<Gaussian> = self.peaks.values().map(|p| p.hypermet.gaussian()).collect();
        if seeds.is_empty() {
            self.auto_fit(interruptor)?;
            if self.settings.resid_auto {
                self.iterative_fit(interruptor)?;
            }
        } else {
            self.rebuild(seeds, interruptor)?;
        }
        self.save_current_fit(FitDescription::Refit);
        self.render();
        Ok(())
    }

    pub fn override_settings(&mut self, settings: FitSettings) {
        self.settings = settings;
        self.settings.overriden = true;
    }

    /// Surgical per-peak recomputation of SUM4 over a new `[left_ch,
    /// right_ch]` window. Does not touch the peak's Hypermet fit or invoke
    /// the optimizer.
    pub fn adjust_sum4(&mut self, center: f64, left_ch: usize, right_ch: usize) -> EngineResult<()> {
        if right_ch <= left_ch || right_ch >= self.x.len() {
            return Err(EngineError::InvalidInput("adjust_sum4: degenerate window".into()));
        }
        let key = peak_key(self.find_nearest_key_value(center));
        let hyp = self
            .peaks
            .get(&key)
            .map(|p| p.hypermet.clone())
            .ok_or_else(|| EngineError::InvalidInput("adjust_sum4: no such peak".into()))?;

        let lb = Sum4Edge::new(&self.x, &self.y, left_ch, (left_ch + 2).min(right_ch))
            .ok_or_else(|| EngineError::InvalidInput("adjust_sum4: invalid left edge".into()))?;
        let rb = Sum4Edge::new(&self.x, &self.y, right_ch.saturating_sub(2).max(left_ch), right_ch)
            .ok_or_else(|| EngineError::InvalidInput("adjust_sum4: invalid right edge".into()))?;
        let sum4 = Sum4::new(&self.x, &self.y, left_ch, right_ch, &lb, &rb)
            .ok_or_else(|| EngineError::InvalidInput("adjust_sum4: degenerate SUM4 window".into()))?;

        let live = self.settings.live_time_ms as f64 / 1000.0;
        let peak = Peak::new(hyp, sum4, &self.settings, live);
        self.peaks.insert(key, peak);
        self.save_current_fit(FitDescription::AdjustSum4);
        Ok(())
    }

    /// Stores a user override of one peak's energy directly on the peak,
    /// leaving every other peak and the ROI's calibration untouched.
    pub fn override_energy(&mut self, center: f64, energy: f64) -> EngineResult<()> {
        let key = peak_key(self.find_nearest_key_value(center));
        let peak = self
            .peaks
            .get_mut(&key)
            .ok_or_else(|| EngineError::InvalidInput("override_energy: no such peak".into()))?;
        peak.energy = UncertainValue::new(energy, 0.0);
        peak.energy_overridden = true;
        self.save_current_fit(FitDescription::OverrideEnergy);
        Ok(())
    }

    pub fn replace_hypermet(&mut self, center: f64, hyp: Hypermet) -> EngineResult<()> {
        let key = peak_key(self.find_nearest_key_value(center));
        let peak = self
            .peaks
            .get_mut(&key)
            .ok_or_else(|| EngineError::InvalidInput("replace_hypermet: no such peak".into()))?;
        let sum4 = peak.sum4.clone();
        let live = self.settings.live_time_ms as f64 / 1000.0;
        let mut new_hyp = hyp;
        new_hyp.user_modified = true;
        *peak = Peak::new(new_hyp, sum4, &self.settings, live);
        self.save_current_fit(FitDescription::ReplaceHypermet);
        self.render();
        Ok(())
    }

    /// Rolls back to a previous entry in the fit history, discarding
    /// everything after it.
    pub fn rollback(&mut self, index: usize) -> EngineResult<()> {
        if index >= self.fits.len() {
            return Err(EngineError::InvalidInput("rollback: index out of range".into()));
        }
        let snapshot = self.fits[index].clone();
        self.x = snapshot.x.clone();
        self.y = snapshot.y.clone();
        self.background = snapshot.background.clone();
        self.peaks.clear();
        let live = self.settings.live_time_ms as f64 / 1000.0;
        for hyp in snapshot.peaks.values() {
            let center = hyp.center.value.value;
            let ch = self.find_local_index(center);
            let win = (self.x.len() / 8).max(2);
            let l = ch.saturating_sub(win);
            let r = (ch + win).min(self.x.len() - 1);
            if let (Some(lb), Some(rb)) = (
                Sum4Edge::new(&self.x, &self.y, l, (l + 2).min(r)),
                Sum4Edge::new(&self.x, &self.y, r.saturating_sub(2).max(l), r),
            ) {
                if let Some(sum4) = Sum4::new(&self.x, &self.y, l, r, &lb, &rb) {
                    let peak = Peak::new(hyp.clone(), sum4, &self.settings, live);
                    self.peaks.insert(peak_key(center), peak);
                }
            }
        }
        self.fits.truncate(index + 1);
        self.current_fit_index = index;
        self.render();
        Ok(())
    }

    fn save_current_fit(&mut self, description: FitDescription) {
        let peaks: BTreeMap<String, Hypermet> = self
            .peaks
            .iter()
            .map(|(k, p)| (k.to_string(), p.hypermet.clone()))
            .collect();
        self.fits.push(Fit {
            description,
            x: self.x.clone(),
            y: self.y.clone(),
            background: self.background.clone(),
            peaks,
        });
        self.current_fit_index = self.fits.len() - 1;
    }

    /// Rasterizes background and full-fit curves at 0.1-bin spacing for
    /// rendering (the original engine's 0.25-bin spacing is superseded here),
    /// also recomputes the native-resolution curves and feeds them back to
    /// the ROI's `Finder` so its residuals reflect the current fit.
    fn render(&mut self) {
        const STEP: f64 = 0.1;
        let left = self.left_channel();
        let right = self.right_channel();
        if right <= left {
            self.hr_x.clear();
            self.hr_background.clear();
            self.hr_fullfit.clear();
            self.lr_background.clear();
            self.lr_fullfit.clear();
            return;
        }
        let n = ((right - left) / STEP).ceil() as usize + 1;
        self.hr_x = (0..n).map(|i| left + i as f64 * STEP).collect();
        self.hr_background = self.hr_x.iter().map(|&xi| self.background.eval(xi)).collect();
        self.hr_fullfit = self
            .hr_x
            .iter()
            .map(|&xi| {
                let bg = self.background.eval(xi);
                let peaks: f64 = self
                    .peaks
                    .values()
                    .map(|p| p.hypermet.eval_peak(xi) + p.hypermet.eval_step_tail(xi))
                    .sum();
                bg + peaks
            })
            .collect();

        self.lr_background = self.x.iter().map(|&xi| self.background.eval(xi)).collect();
        self.lr_fullfit = self
            .x
            .iter()
            .map(|&xi| {
                let bg = self.background.eval(xi);
                let peaks: f64 = self
                    .peaks
                    .values()
                    .map(|p| p.hypermet.eval_peak(xi) + p.hypermet.eval_step_tail(xi))
                    .sum();
                bg + peaks
            })
            .collect();

        let hr_x = self.hr_x.clone();
        let background = self.background.clone();
        let hr_fullfit = self.hr_fullfit.clone();
        for p in self.peaks.values_mut() {
            p.hr_peak_curve = hr_x
                .iter()
                .map(|&xi| background.eval(xi) + p.hypermet.eval_peak(xi) + p.hypermet.eval_step_tail(xi))
                .collect();
            p.hr_fullfit_curve = hr_fullfit.clone();
        }

        let x_native = self.x.to_vec();
        self.finder.set_fit(&x_native, &self.lr_fullfit, &self.lr_background);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_spectrum() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| 20.0 + (500.0 * (-((xi - 100.0) / 5.0).powi(2)).exp()))
            .collect();
        (x, y)
    }

    #[test]
    fn auto_fit_finds_one_peak() {
        let (x, y) = gaussian_spectrum();
        let roi = Roi::new(&x, &y, 60, 140, FitSettings::default()).unwrap();
        assert_eq!(roi.peak_count(), 1);
    }

    #[test]
    fn render_produces_ten_samples_per_bin() {
        let (x, y) = gaussian_spectrum();
        let roi = Roi::new(&x, &y, 60, 140, FitSettings::default()).unwrap();
        let span = roi.right_channel() - roi.left_channel();
        assert!((roi.hr_x.len() as f64 - (span / 0.1 + 1.0)).abs() < 2.0);
    }

    #[test]
    fn remove_all_peaks_leaves_empty_roi() {
        let (x, y) = gaussian_spectrum();
        let mut roi = Roi::new(&x, &y, 60, 140, FitSettings::default()).unwrap();
        let centers: Vec<f64> = roi.peaks.values().map(|p| p.center.value).collect();
        roi.remove_peaks(&centers, &AtomicBool::new(false)).unwrap();
        assert_eq!(roi.peak_count(), 0);
    }

    #[test]
    fn adjust_sum4_recomputes_without_touching_hypermet() {
        let (x, y) = gaussian_spectrum();
        let mut roi = Roi::new(&x, &y, 60, 140, FitSettings::default()).unwrap();
        let center = roi.peaks.values().next().unwrap().center.value;
        let hyp_before = roi.peaks.values().next().unwrap().hypermet.clone();
        roi.adjust_sum4(center, 10, 70).unwrap();
        let peak_after = roi.peaks.values().next().unwrap();
        assert_eq!(peak_after.sum4.left_ch, 10);
        assert_eq!(peak_after.sum4.right_ch, 70);
        assert_eq!(peak_after.hypermet.center.value.value, hyp_before.center.value.value);
    }

    #[test]
    fn override_energy_only_touches_the_target_peak() {
        let (x, y) = gaussian_spectrum();
        let mut roi = Roi::new(&x, &y, 60, 140, FitSettings::default()).unwrap();
        let center = roi.peaks.values().next().unwrap().center.value;
        roi.override_energy(center, 1460.8).unwrap();
        let peak = roi.peaks.values().next().unwrap();
        assert_eq!(peak.energy.value, 1460.8);
        assert!(peak.energy_overridden);
    }
}

