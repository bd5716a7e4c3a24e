//! `Fitter` - the facade over a spectrum's full set of ROIs. Grounded on
//! `engine/fitter.cpp`.

use crate::engine::fit_settings::FitSettings;
use crate::engine::finder::Finder;
use crate::engine::peak::Peak;
use crate::engine::roi::Roi;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

fn roi_key(left_ch: f64) -> u64 {
    left_ch.to_bits()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fitter {
    x: Vec<f64>,
    y: Vec<f64>,
    settings: FitSettings,
    finder: Finder,
    regions: BTreeMap<u64, Roi>,
    selected_peaks: BTreeSet<u64>,
}

impl Default for Fitter {
    fn default() -> Self {
        Fitter {
            x: Vec::new(),
            y: Vec::new(),
            settings: FitSettings::default(),
            finder: Finder::default(),
            regions: BTreeMap::new(),
            selected_peaks: BTreeSet::new(),
        }
    }
}

impl Fitter {
    pub fn new(settings: FitSettings) -> Self {
        Fitter {
            settings,
            ..Fitter::default()
        }
    }

    pub fn set_data(&mut self, x: Vec<f64>, y: Vec<f64>) -> EngineResult<()> {
        if x.len() != y.len() {
            return Err(EngineError::InvalidInput("Fitter::set_data: mismatched x/y lengths".into()));
        }
        self.finder = Finder::new(x.clone(), y.clone(), self.settings.clone());
        self.x = x;
        self.y = y;
        self.regions.clear();
        self.selected_peaks.clear();
        Ok(())
    }

    /// Runs the Mariscotti finder over the whole spectrum, then merges
    /// candidate windows within `roi_extend_background * theoretical_fwhm`
    /// of each other, extends each survivor by the same margin, discards
    /// any region whose right edge falls below `finder_cutoff_kev`, and
    /// bisects any regions left touching - so the opened ROIs are
    /// non-overlapping and ordered.
    pub fn find_regions(&mut self, interruptor: &AtomicBool) -> EngineResult<usize> {
        if self.x.is_empty() {
            return Err(EngineError::InvalidInput("Fitter::find_regions: no data loaded".into()));
        }
        self.finder.find_peaks();
        let n = self.x.len();

        let mut windows: Vec<(usize, usize)> = self
            .finder
            .lefts
            .iter()
            .zip(self.finder.rights.iter())
            .map(|(&l, &r)| (l, r))
            .collect();
        windows.sort_by_key(|&(l, _)| l);

        // Merge windows whose gap is within the FWHM-scaled margin.
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (l, r) in windows {
            if interruptor.load(Ordering::Relaxed) {
                return Err(EngineError::Interrupted);
            }
            let should_merge = match merged.last() {
                Some(&(_, last_r)) => {
                    let fwhm_bins = self.finder.theoretical_fwhm_in_bins.get(last_r).copied().unwrap_or(0.0);
                    let margin = (self.settings.roi_extend_background * fwhm_bins).max(1.0) as usize;
                    l <= last_r + margin
                }
                None => false,
            };
            if should_merge {
                let last = merged.last_mut().unwrap();
                last.1 = last.1.max(r);
            } else {
                merged.push((l, r));
            }
        }

        // Extend each merged window outward by the same margin.
        let mut extended: Vec<(usize, usize)> = merged
            .into_iter()
            .map(|(l, r)| {
                let fwhm_bins = self.finder.theoretical_fwhm_in_bins.get(r).copied().unwrap_or(0.0);
                let margin = (self.settings.roi_extend_background * fwhm_bins).max(0.0) as usize;
                (l.saturating_sub(margin), (r + margin).min(n - 1))
            })
            .collect();

        // Discard regions whose right edge energy is below the cutoff.
        extended.retain(|&(_, r)| self.settings.bin_to_nrg(self.x[r]) >= self.settings.finder_cutoff_kev);

        // Bisect any regions still touching after extension.
        for i in 1..extended.len() {
            if interruptor.load(Ordering::Relaxed) {
                return Err(EngineError::Interrupted);
            }
            let (_, prev_r) = extended[i - 1];
            let (cur_l, _) = extended[i];
            if cur_l <= prev_r {
                let mid = (prev_r + cur_l) / 2;
                extended[i - 1].1 = mid;
                extended[i].0 = (mid + 2).min(n - 1);
            }
        }

        self.regions.clear();
        let mut opened = 0;
        for (l, r) in extended {
            if interruptor.load(Ordering::Relaxed) {
                return Err(EngineError::Interrupted);
            }
            if r <= l {
                continue;
            }
            if let Ok(roi) = Roi::new(&self.x, &self.y, l, r, self.settings.clone()) {
                let key = roi_key(roi.left_channel());
                self.regions.insert(key, roi);
                opened += 1;
            }
        }
        Ok(opened)
    }

    /// ROIs whose span overlaps `[left, right]`.
    pub fn relevant_regions(&self, left: f64, right: f64) -> Vec<f64> {
        self.regions
            .values()
            .filter(|r| r.right_channel() >= left && r.left_channel() <= right)
            .map(|r| r.left_channel())
            .collect()
    }

    /// Merges all ROIs overlapping `[left, right]` into a single region and
    /// refits it.
    pub fn merge_regions(&mut self, left: f64, right: f64, interruptor: &AtomicBool) -> EngineResult<()> {
        let overlapping: Vec<u64> = self
            .regions
            .iter()
            .filter(|(_, r)| r.right_channel() >= left && r.left_channel() <= right)
            .map(|(&k, _)| k)
            .collect();
        if overlapping.len() < 2 {
            return Ok(());
        }
        let span_left = overlapping
            .iter()
            .filter_map(|k| self.regions.get(k))
            .map(|r| r.left_channel())
            .fold(f64::INFINITY, f64::min);
        let span_right = overlapping
            .iter()
            .filter_map(|k| self.regions.get(k))
            .map(|r| r.right_channel())
            .fold(f64::NEG_INFINITY, f64::max);
        for k in &overlapping {
            self.regions.remove(k);
        }
        let li = self.index_of(span_left);
        let ri = self.index_of(span_right);
        let roi = Roi::new(&self.x, &self.y, li, ri, self.settings.clone())?;
        let _ = interruptor;
        self.regions.insert(roi_key(roi.left_channel()), roi);
        Ok(())
    }

    fn index_of(&self, value: f64) -> usize {
        self.x
            .iter()
            .position(|&xi| xi >= value)
            .unwrap_or(self.x.len().saturating_sub(1))
    }

    pub fn delete_roi(&mut self, left_ch: f64) -> bool {
        self.regions.remove(&roi_key(left_ch)).is_some()
    }

    pub fn auto_fit_all(&mut self, interruptor: &AtomicBool) -> EngineResult<()> {
        for roi in self.regions.values_mut() {
            if interruptor.load(Ordering::Relaxed) {
                return Err(EngineError::Interrupted);
            }
            roi.refit(interruptor)?;
        }
        Ok(())
    }

    pub fn refit_region(&mut self, left_ch: f64, interruptor: &AtomicBool) -> EngineResult<()> {
        self.region_mut(left_ch)?.refit(interruptor)
    }

    pub fn adj_lb(&mut self, left_ch: f64, new_left: usize, interruptor: &AtomicBool) -> EngineResult<()> {
        let (x, y) = (self.x.clone(), self.y.clone());
        self.region_mut(left_ch)?.adjust_lb(new_left, &x, &y, interruptor)
    }

    pub fn adj_rb(&mut self, left_ch: f64, new_right: usize, interruptor: &AtomicBool) -> EngineResult<()> {
        let (x, y) = (self.x.clone(), self.y.clone());
        self.region_mut(left_ch)?.adjust_rb(new_right, &x, &y, interruptor)
    }

    pub fn override_roi_settings(&mut self, left_ch: f64, settings: FitSettings) -> EngineResult<()> {
        self.region_mut(left_ch)?.override_settings(settings);
        Ok(())
    }

    pub fn rollback_roi(&mut self, left_ch: f64, index: usize) -> EngineResult<()> {
        self.region_mut(left_ch)?.rollback(index)
    }

    pub fn add_peak(&mut self, left_ch: f64, center: f64, interruptor: &AtomicBool) -> EngineResult<()> {
        self.region_mut(left_ch)?.add_peak(center, interruptor)
    }

    pub fn remove_peaks(&mut self, left_ch: f64, centers: &[f64], interruptor: &AtomicBool) -> EngineResult<()> {
        self.region_mut(left_ch)?.remove_peaks(centers, interruptor)
    }

    /// Pure aggregate render: resets the parent finder over the whole
    /// spectrum and applies each ROI's already-computed fit to it. Never
    /// invokes the optimizer and never grows a ROI's fit history.
    pub fn render_all(&mut self) {
        self.finder.set_data(self.x.clone(), self.y.clone());
        for roi in self.regions.values() {
            if roi.lr_fullfit.is_empty() {
                continue;
            }
            self.finder.set_fit(&roi.x.to_vec(), &roi.lr_fullfit, &roi.lr_background);
        }
    }

    fn region_mut(&mut self, left_ch: f64) -> EngineResult<&mut Roi> {
        self.regions
            .get_mut(&roi_key(left_ch))
            .ok_or_else(|| EngineError::InvalidInput(format!("no region at {left_ch}")))
    }

    // --- selection bookkeeping ---

    pub fn get_selected_peaks(&self) -> Vec<f64> {
        self.selected_peaks.iter().map(|&bits| f64::from_bits(bits)).collect()
    }

    pub fn set_selected_peaks(&mut self, centers: &[f64]) {
        self.selected_peaks = centers.iter().map(|&c| c.to_bits()).collect();
    }

    /// Drops selected peaks that no longer exist in any region.
    pub fn filter_selection(&mut self) {
        let existing: BTreeSet<u64> = self.peaks().iter().map(|p| p.center.value.to_bits()).collect();
        self.selected_peaks.retain(|k| existing.contains(k));
    }

    // --- read-only accessors ---

    pub fn peak_count(&self) -> usize {
        self.regions.values().map(|r| r.peak_count()).sum()
    }

    pub fn contains_peak(&self, center: f64) -> bool {
        self.regions.values().any(|r| r.peaks.values().any(|p| (p.center.value - center).abs() < 1e-9))
    }

    pub fn peak(&self, center: f64) -> Option<&Peak> {
        self.regions
            .values()
            .flat_map(|r| r.peaks.values())
            .find(|p| (p.center.value - center).abs() < 1e-9)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn contains_region(&self, left_ch: f64) -> bool {
        self.regions.contains_key(&roi_key(left_ch))
    }

    pub fn region(&self, left_ch: f64) -> Option<&Roi> {
        self.regions.get(&roi_key(left_ch))
    }

    pub fn regions(&self) -> Vec<&Roi> {
        self.regions.values().collect()
    }

    pub fn peaks(&self) -> Vec<&Peak> {
        self.regions.values().flat_map(|r| r.peaks.values()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_peak_spectrum() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| {
                10.0 + 800.0 * (-((xi - 100.0) / 5.0).powi(2)).exp()
                    + 600.0 * (-((xi - 300.0) / 5.0).powi(2)).exp()
            })
            .collect();
        (x, y)
    }

    #[test]
    fn find_regions_opens_at_least_one_roi_per_peak_cluster() {
        let (x, y) = two_peak_spectrum();
        let mut fitter = Fitter::new(FitSettings::default());
        fitter.set_data(x, y).unwrap();
        let interruptor = AtomicBool::new(false);
        let opened = fitter.find_regions(&interruptor).unwrap();
        assert!(opened >= 1);
        assert_eq!(fitter.region_count(), opened);
        assert!(fitter.peak_count() >= 1);
    }

    #[test]
    fn selection_survives_only_existing_peaks() {
        let (x, y) = two_peak_spectrum();
        let mut fitter = Fitter::new(FitSettings::default());
        fitter.set_data(x, y).unwrap();
        fitter.find_regions(&AtomicBool::new(false)).unwrap();
        let centers: Vec<f64> = fitter.peaks().iter().map(|p| p.center.value).collect();
        fitter.set_selected_peaks(&centers);
        fitter.set_selected_peaks(&[centers[0], 99999.0]);
        fitter.filter_selection();
        assert_eq!(fitter.get_selected_peaks().len(), 1);
    }
}
