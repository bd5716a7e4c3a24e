//! `Peak` - a quantitatively characterized peak: one `Hypermet` fit plus
//! one `Sum4` deterministic integration, reconciled into "best" estimates.
//! Grounded on `engine/peak.cpp`.

use crate::engine::fit_settings::FitSettings;
use crate::engine::math::{Hypermet, UncertainValue};
use crate::engine::sum4::Sum4;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peak {
    pub hypermet: Hypermet,
    pub sum4: Sum4,

    pub center: UncertainValue,
    pub energy: UncertainValue,
    pub fwhm: UncertainValue,

    pub area_sum4: UncertainValue,
    pub area_hyp: UncertainValue,
    pub area_best: UncertainValue,

    pub cps_sum4: UncertainValue,
    pub cps_hyp: UncertainValue,
    pub cps_best: UncertainValue,

    pub intensity_theoretical: Option<f64>,
    pub efficiency_relative: Option<f64>,

    /// True when the Hypermet center/FWHM disagree with SUM4's beyond the
    /// calibrated theoretical FWHM tolerance.
    pub flagged: bool,

    /// True once `override_energy` has pinned this peak's energy directly.
    pub energy_overridden: bool,

    /// Per-peak rasterized curves, populated by the owning ROI's `render`.
    #[serde(default)]
    pub hr_peak_curve: Vec<f64>,
    #[serde(default)]
    pub hr_fullfit_curve: Vec<f64>,
}

impl Peak {
    pub fn new(hypermet: Hypermet, sum4: Sum4, settings: &FitSettings, live_seconds: f64) -> Peak {
        let center = hypermet.center.value;
        let energy = UncertainValue::new(settings.bin_to_nrg(center.value), 0.0);
        let fwhm = UncertainValue::new(2.0 * hypermet.width.value.value, hypermet.width.value.sigma * 2.0);

        let area_hyp = hypermet.area();
        let area_sum4 = sum4.peak_area;
        let use_sum4 = hypermet.gaussian_only() && hypermet.height.value.value.abs() < 1e-9;
        let area_best = if use_sum4 { area_sum4 } else { area_hyp };

        let to_cps = |area: UncertainValue| -> UncertainValue {
            if live_seconds > 0.0 {
                UncertainValue::new(area.value / live_seconds, area.sigma / live_seconds)
            } else {
                area
            }
        };

        let theoretical_fwhm = settings.nrg_to_fwhm(energy.value);
        let flagged = theoretical_fwhm > 0.0
            && (sum4.centroid.value - center.value).abs() > theoretical_fwhm
            || (theoretical_fwhm > 0.0 && (sum4.fwhm - fwhm.value).abs() > theoretical_fwhm);

        Peak {
            hypermet,
            sum4,
            center,
            energy,
            fwhm,
            area_sum4,
            area_hyp,
            area_best,
            cps_sum4: to_cps(area_sum4),
            cps_hyp: to_cps(area_hyp),
            cps_best: to_cps(area_best),
            intensity_theoretical: None,
            efficiency_relative: None,
            flagged,
            energy_overridden: false,
            hr_peak_curve: Vec::new(),
            hr_fullfit_curve: Vec::new(),
        }
    }

    /// Relative efficiency against a reference peak, once a theoretical
    /// intensity has been attached via `override_intensity`.
    pub fn compute_efficiency(&mut self, reference_area: f64, reference_intensity: f64) {
        if let Some(theo) = self.intensity_theoretical {
            if theo > 0.0 && reference_intensity > 0.0 {
                let measured_ratio = self.area_best.value / reference_area;
                let theoretical_ratio = theo / reference_intensity;
                self.efficiency_relative = Some(measured_ratio / theoretical_ratio);
            }
        }
    }

    pub fn override_intensity(&mut self, intensity: f64) {
        self.intensity_theoretical = Some(intensity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::math::Gaussian;
    use crate::engine::sum4::Sum4Edge;

    fn sample() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (480..545).map(|i| i as f64).collect();
        let g = Gaussian::new(512.0, 1000.0, 5.0);
        let y: Vec<f64> = x.iter().map(|&xi| g.evaluate(xi) + 10.0).collect();
        (x, y)
    }

    #[test]
    fn area_best_defaults_to_hypermet_when_amplitude_present() {
        let (x, y) = sample();
        let g = Gaussian::new(512.0, 1000.0, 5.0);
        let hyp = Hypermet::from_gaussian(&g);
        let lb = Sum4Edge::new(&x, &y, 0, 4).unwrap();
        let rb = Sum4Edge::new(&x, &y, x.len() - 5, x.len() - 1).unwrap();
        let sum4 = Sum4::new(&x, &y, 5, x.len() - 6, &lb, &rb).unwrap();
        let settings = FitSettings::default();
        let peak = Peak::new(hyp, sum4, &settings, 0.0);
        assert!((peak.area_best.value - peak.area_hyp.value).abs() < 1e-9);
    }
}
