//! `Finder` - peak candidate location over an `(x, y)` slice via the
//! Mariscotti second-difference convolution. Grounded on
//! `engine/fitting/finder.cpp`.

use crate::engine::fit_settings::FitSettings;
use log::trace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finder {
    pub x: Arc<[f64]>,
    pub y: Arc<[f64]>,
    pub y_fit: Vec<f64>,
    pub y_background: Vec<f64>,
    pub y_resid: Vec<f64>,
    pub y_resid_on_background: Vec<f64>,

    pub theoretical_fwhm_in_energy: Vec<f64>,
    pub theoretical_fwhm_in_bins: Vec<f64>,

    pub conv_x_kon: Vec<f64>,
    pub conv_x_conv: Vec<f64>,

    pub prelim: Vec<usize>,
    pub filtered: Vec<usize>,
    pub lefts: Vec<usize>,
    pub rights: Vec<usize>,

    pub settings: FitSettings,
}

impl Default for Finder {
    fn default() -> Self {
        Finder {
            x: Arc::from(Vec::new()),
            y: Arc::from(Vec::new()),
            y_fit: Vec::new(),
            y_background: Vec::new(),
            y_resid: Vec::new(),
            y_resid_on_background: Vec::new(),
            theoretical_fwhm_in_energy: Vec::new(),
            theoretical_fwhm_in_bins: Vec::new(),
            conv_x_kon: Vec::new(),
            conv_x_conv: Vec::new(),
            prelim: Vec::new(),
            filtered: Vec::new(),
            lefts: Vec::new(),
            rights: Vec::new(),
            settings: FitSettings::default(),
        }
    }
}

impl Finder {
    pub fn new(x: Vec<f64>, y: Vec<f64>, settings: FitSettings) -> Self {
        let mut f = Finder {
            x: x.into(),
            y: y.into(),
            ..Finder::default()
        };
        f.settings = settings;
        f.set_new_data();
        f
    }

    pub fn empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn clear(&mut self) {
        self.x = Arc::from(Vec::new());
        self.y = Arc::from(Vec::new());
        self.reset();
        self.prelim.clear();
        self.filtered.clear();
        self.lefts.clear();
        self.rights.clear();
    }

    fn reset(&mut self) {
        self.y_resid = self.y.to_vec();
        self.y_resid_on_background = self.y.to_vec();
        self.y_fit = vec![0.0; self.y.len()];
        self.y_background = vec![0.0; self.y.len()];
    }

    fn set_new_data(&mut self) {
        if self.x.len() != self.y.len() {
            self.clear();
            return;
        }
        self.reset();
        self.calc_theoretical_fwhm();
        self.find_peaks();
    }

    pub fn set_data(&mut self, x: Vec<f64>, y: Vec<f64>) -> bool {
        if x.len() != y.len() {
            return false;
        }
        self.x = x.into();
        self.y = y.into();
        self.set_new_data();
        true
    }

    /// Copies the subrange `[l, r]` (by value of `x`, mapped through
    /// `find_index`) from `other` into `self`.
    pub fn clone_range(&mut self, other: &Finder, l: f64, r: f64) -> bool {
        if other.empty() {
            return false;
        }
        let li = other.find_index(l);
        let ri = other.find_index(r);
        if ri < li {
            return false;
        }
        let x = other.x[li..=ri].to_vec();
        let y = other.y[li..=ri].to_vec();
        self.settings = other.settings.clone();
        self.set_data(x, y)
    }

    /// Absorbs a fitted subsegment: writes the fit/background slices into
    /// the matching index range, recomputes residuals, and rediscovers
    /// peaks.
    pub fn set_fit(&mut self, x_fit: &[f64], y_fit: &[f64], y_background: &[f64]) -> bool {
        if x_fit.is_empty() || x_fit.len() != y_fit.len() || y_fit.len() != y_background.len() {
            return false;
        }
        let first = *x_fit.first().unwrap();
        let last = *x_fit.last().unwrap();
        let li = self.find_index(first);
        let ri = self.find_index(last);
        if ri < li || (ri - li + 1) != x_fit.len() {
            return false;
        }
        for (k, i) in (li..=ri).enumerate() {
            self.y_fit[i] = y_fit[k];
            self.y_background[i] = y_background[k];
            self.y_resid[i] = self.y[i] - y_fit[k];
            self.y_resid_on_background[i] = self.y[i] - y_background[k];
        }
        self.calc_theoretical_fwhm();
        self.find_peaks();
        true
    }

    fn calc_theoretical_fwhm(&mut self) {
        self.theoretical_fwhm_in_energy.clear();
        self.theoretical_fwhm_in_bins.clear();
        let (cali_nrg, cali_fwhm) = match (&self.settings.cali_nrg, &self.settings.cali_fwhm) {
            (Some(n), Some(f)) if n.valid() && f.valid() => (n, f),
            _ => return,
        };
        self.theoretical_fwhm_in_energy = self
            .x
            .iter()
            .map(|&bin| {
                let energy = cali_nrg.transform(bin, self.settings.bits);
                cali_fwhm.transform(energy, self.settings.bits)
            })
            .collect();
        self.theoretical_fwhm_in_bins = self
            .x
            .iter()
            .enumerate()
            .map(|(i, &bin)| {
                let fwhm_e = self.theoretical_fwhm_in_energy[i];
                let e_lo = cali_nrg.transform(bin, self.settings.bits) - fwhm_e / 2.0;
                let e_hi = cali_nrg.transform(bin, self.settings.bits) + fwhm_e / 2.0;
                let b_lo = cali_nrg.inverse_transform(e_lo, self.settings.bits);
                let b_hi = cali_nrg.inverse_transform(e_hi, self.settings.bits);
                (b_hi - b_lo).abs()
            })
            .collect();
    }

    /// First index with `x[i] >= chan_val`, clamped to `[0, len-1]`.
    pub fn find_index(&self, chan_val: f64) -> usize {
        if self.x.is_empty() {
            return 0;
        }
        match self.x.iter().position(|&xi| xi >= chan_val) {
            Some(i) => i,
            None => self.x.len() - 1,
        }
    }

    fn sigma_for(&self) -> f64 {
        let has_fit = self.y_resid != *self.y;
        if has_fit {
            self.settings.kon_sigma_resid
        } else {
            self.settings.kon_sigma_spectrum
        }
    }

    /// Mariscotti second-difference convolution.
    fn calc_kon(&mut self) {
        let n = self.y_resid.len();
        self.conv_x_kon = vec![0.0; n];
        self.conv_x_conv = vec![0.0; n];
        if n == 0 {
            return;
        }
        let width_fixed = (self.settings.kon_width.max(2)) as usize;
        let sigma = self.sigma_for();
        let has_fwhm = !self.theoretical_fwhm_in_bins.is_empty();

        let mut start = width_fixed;
        let mut end = n.saturating_sub(width_fixed + 1);

        if has_fwhm {
            for i in 0..n {
                if (self.theoretical_fwhm_in_bins[i].ceil() as usize) < i {
                    start = i;
                    break;
                }
            }
            for i in (0..n).rev() {
                let w = self.theoretical_fwhm_in_bins[i].ceil() as usize;
                if i + w + 1 < n {
                    end = i;
                    break;
                }
            }
        }

        let mut j = start;
        while j < end {
            let width = if has_fwhm {
                (self.theoretical_fwhm_in_bins[j].floor() as usize).max(2)
            } else {
                width_fixed
            };
            if j < width || j + 2 * width + 1 >= n {
                j += 1;
                continue;
            }
            let mut kon = 0.0;
            let mut sum = 0.0;
            for i in j..=(j + width + 1).min(n - 1) {
                kon += 2.0 * self.y_resid[i] - self.y_resid[i - width] - self.y_resid[i + width];
                sum += self.y_resid[i];
            }
            let avg = sum / width as f64;
            let denom = (6.0 * width as f64 * avg.max(0.0)).sqrt();
            let conv = if denom > 0.0 { kon / denom } else { 0.0 };

            let idx = j;
            self.conv_x_kon[idx] = kon;
            self.conv_x_conv[idx] = conv;
            if conv > sigma {
                self.prelim.push(idx);
            }
            j += 1;
        }
        trace!("calc_kon produced {} preliminary candidates", self.prelim.len());
    }

    /// Two-phase convolution walk, or direct FWHM-driven arithmetic when
    /// theoretical FWHM data is available.
    fn left_edge(&self, idx: usize) -> usize {
        if !self.theoretical_fwhm_in_bins.is_empty() {
            let extend = (self.theoretical_fwhm_in_bins[idx].floor() * self.settings.roi_extend_peaks / 2.0) as usize;
            return idx.saturating_sub(extend);
        }
        let sigma = self.sigma_for();
        let threshold = -0.5 * sigma;
        let mut i = idx;
        while i > 0 && self.conv_x_conv[i] >= 0.0 {
            i -= 1;
        }
        if i > 0 {
            i -= 1;
        }
        while i > 0 && self.conv_x_conv[i] < threshold {
            i -= 1;
        }
        i
    }

    fn right_edge(&self, idx: usize) -> usize {
        let n = self.conv_x_conv.len();
        if n == 0 {
            return idx;
        }
        if !self.theoretical_fwhm_in_bins.is_empty() {
            let extend = (self.theoretical_fwhm_in_bins[idx].floor() * self.settings.roi_extend_peaks / 2.0) as usize;
            return (idx + extend).min(n - 1);
        }
        let sigma = self.sigma_for();
        let threshold = -0.5 * sigma;
        let mut i = idx;
        while i + 1 < n && self.conv_x_conv[i] >= 0.0 {
            i += 1;
        }
        if i + 1 < n {
            i += 1;
        }
        while i + 1 < n && self.conv_x_conv[i] < threshold {
            i += 1;
        }
        i
    }

    pub fn find_left(&self, chan: f64) -> f64 {
        let idx = self.find_index(chan);
        let e = self.left_edge(idx);
        self.x.get(e).copied().unwrap_or(chan)
    }

    pub fn find_right(&self, chan: f64) -> f64 {
        let idx = self.find_index(chan);
        let e = self.right_edge(idx);
        self.x.get(e).copied().unwrap_or(chan)
    }

    /// Recomputes the convolution then collapses contiguous preliminary
    /// runs into `filtered` midpoints with extended `lefts`/`rights`.
    pub fn find_peaks(&mut self) {
        self.prelim.clear();
        self.filtered.clear();
        self.lefts.clear();
        self.rights.clear();
        if self.x.len() < 2 * (self.settings.kon_width.max(2) as usize) + 2 {
            return;
        }
        self.calc_kon();
        if self.prelim.is_empty() {
            return;
        }

        let mut run_start = self.prelim[0];
        let mut run_end = self.prelim[0];
        let mut runs = Vec::new();
        for &p in &self.prelim[1..] {
            if p > run_end + 1 {
                runs.push((run_start, run_end));
                run_start = p;
            }
            run_end = p;
        }
        runs.push((run_start, run_end));

        for (l, r) in runs {
            let mid = (l + r) / 2;
            self.filtered.push(mid);
            self.lefts.push(self.left_edge(l));
            self.rights.push(self.right_edge(r));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_spectrum() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..1024).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| (1000.0 * (-((xi - 512.0) / 6.0).powi(2)).exp()).round() + 5.0)
            .collect();
        (x, y)
    }

    #[test]
    fn finds_a_candidate_near_the_clean_gaussian_peak() {
        let (x, y) = gaussian_spectrum();
        let finder = Finder::new(x, y, FitSettings::default());
        assert!(!finder.filtered.is_empty(), "expected at least one candidate");
        let closest = finder
            .filtered
            .iter()
            .min_by_key(|&&idx| ((idx as f64) - 512.0).abs() as i64)
            .copied()
            .unwrap();
        assert!((closest as f64 - 512.0).abs() < 10.0);
    }

    #[test]
    fn determinism_of_find_peaks() {
        let (x, y) = gaussian_spectrum();
        let mut a = Finder::new(x.clone(), y.clone(), FitSettings::default());
        let b = Finder::new(x, y, FitSettings::default());
        a.find_peaks();
        assert_eq!(a.filtered, b.filtered);
        assert_eq!(a.lefts, b.lefts);
        assert_eq!(a.rights, b.rights);
    }

    #[test]
    fn too_short_slice_finds_nothing() {
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![1.0, 2.0, 1.0];
        let finder = Finder::new(x, y, FitSettings::default());
        assert!(finder.filtered.is_empty());
    }
}
