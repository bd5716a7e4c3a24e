//! `FitSettings` - enumerated tunables for the fit; also the engine's
//! configuration surface. Grounded on `engine/math/fit_settings.h`.

use crate::engine::math::{Calibration, FitParam};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSettings {
    pub overriden: bool,

    pub finder_cutoff_kev: f64,

    pub kon_width: u16,
    pub kon_sigma_spectrum: f64,
    pub kon_sigma_resid: f64,

    pub roi_max_peaks: u16,
    pub roi_extend_peaks: f64,
    pub roi_extend_background: f64,
    pub background_edge_samples: u16,
    pub sum4_only: bool,

    pub resid_auto: bool,
    pub resid_max_iterations: u16,
    pub resid_min_amplitude: u64,
    pub resid_too_close: f64,

    pub small_simplify: bool,
    pub small_max_amplitude: u64,

    pub width_common: bool,
    pub width_common_bounds: FitParam,
    pub width_at_511_variable: bool,
    pub width_at_511_tolerance: f64,

    pub gaussian_only: bool,
    pub lateral_slack: f64,
    pub width_variable_bounds: FitParam,
    pub step_amplitude: FitParam,
    pub tail_amplitude: FitParam,
    pub tail_slope: FitParam,
    pub lskew_amplitude: FitParam,
    pub lskew_slope: FitParam,
    pub rskew_amplitude: FitParam,
    pub rskew_slope: FitParam,
    pub fitter_max_iter: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cali_nrg: Option<Calibration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cali_fwhm: Option<Calibration>,
    pub bits: u16,
    pub live_time_ms: u64,
    pub real_time_ms: u64,
}

impl Default for FitSettings {
    fn default() -> Self {
        FitSettings {
            overriden: false,
            finder_cutoff_kev: 0.0,
            kon_width: 3,
            kon_sigma_spectrum: 3.0,
            kon_sigma_resid: 3.0,
            roi_max_peaks: 10,
            roi_extend_peaks: 0.5,
            roi_extend_background: 3.0,
            background_edge_samples: 5,
            sum4_only: false,
            resid_auto: true,
            resid_max_iterations: 5,
            resid_min_amplitude: 5,
            resid_too_close: 0.2,
            small_simplify: false,
            small_max_amplitude: 100,
            width_common: false,
            width_common_bounds: FitParam::bounded("width_common_bounds", 1.0, 0.5, 2.0),
            width_at_511_variable: false,
            width_at_511_tolerance: 10.0,
            gaussian_only: false,
            lateral_slack: 0.5,
            width_variable_bounds: FitParam::bounded("width_variable_bounds", 1.0, 0.5, 2.0),
            step_amplitude: FitParam::bounded("step_amplitude", 0.0, 0.0, 1.0),
            tail_amplitude: FitParam::bounded("tail_amplitude", 0.0, 0.0, 1.0),
            tail_slope: FitParam::bounded("tail_slope", 1.0, 0.1, 10.0),
            lskew_amplitude: FitParam::bounded("Lskew_amplitude", 0.0, 0.0, 1.0),
            lskew_slope: FitParam::bounded("Lskew_slope", 1.0, 0.1, 10.0),
            rskew_amplitude: FitParam::bounded("Rskew_amplitude", 0.0, 0.0, 1.0),
            rskew_slope: FitParam::bounded("Rskew_slope", 1.0, 0.1, 10.0),
            fitter_max_iter: 100,
            cali_nrg: None,
            cali_fwhm: None,
            bits: 16,
            live_time_ms: 0,
            real_time_ms: 0,
        }
    }
}

impl FitSettings {
    /// Reads a subset of fields out of a loosely-typed JSON blob, the way
    /// `ProcessingConfig::get_parameter_or_default` does elsewhere in the
    /// codebase - any field absent from `value` keeps its `Default` value.
    pub fn from_value(value: &Value) -> FitSettings {
        let mut s = FitSettings::default();
        if let Some(v) = value.get("finder_cutoff_kev").and_then(Value::as_f64) {
            s.finder_cutoff_kev = v;
        }
        if let Some(v) = value.get("kon_width").and_then(Value::as_u64) {
            s.kon_width = v as u16;
        }
        if let Some(v) = value.get("kon_sigma_spectrum").and_then(Value::as_f64) {
            s.kon_sigma_spectrum = v;
        }
        if let Some(v) = value.get("kon_sigma_resid").and_then(Value::as_f64) {
            s.kon_sigma_resid = v;
        }
        if let Some(v) = value.get("roi_extend_peaks").and_then(Value::as_f64) {
            s.roi_extend_peaks = v;
        }
        if let Some(v) = value.get("roi_extend_background").and_then(Value::as_f64) {
            s.roi_extend_background = v;
        }
        if let Some(v) = value.get("background_edge_samples").and_then(Value::as_u64) {
            s.background_edge_samples = v as u16;
        }
        if let Some(v) = value.get("sum4_only").and_then(Value::as_bool) {
            s.sum4_only = v;
        }
        if let Some(v) = value.get("resid_auto").and_then(Value::as_bool) {
            s.resid_auto = v;
        }
        if let Some(v) = value.get("resid_max_iterations").and_then(Value::as_u64) {
            s.resid_max_iterations = v as u16;
        }
        if let Some(v) = value.get("resid_min_amplitude").and_then(Value::as_u64) {
            s.resid_min_amplitude = v;
        }
        if let Some(v) = value.get("resid_too_close").and_then(Value::as_f64) {
            s.resid_too_close = v;
        }
        if let Some(v) = value.get("gaussian_only").and_then(Value::as_bool) {
            s.gaussian_only = v;
        }
        if let Some(v) = value.get("lateral_slack").and_then(Value::as_f64) {
            s.lateral_slack = v;
        }
        if let Some(v) = value.get("fitter_max_iter").and_then(Value::as_u64) {
            s.fitter_max_iter = v as u16;
        }
        s
    }

    pub fn nrg_to_bin(&self, energy: f64) -> f64 {
        match &self.cali_nrg {
            Some(c) => c.inverse_transform(energy, self.bits),
            None => energy,
        }
    }

    pub fn bin_to_nrg(&self, bin: f64) -> f64 {
        match &self.cali_nrg {
            Some(c) => c.transform(bin, self.bits),
            None => bin,
        }
    }

    pub fn bin_to_width(&self, bin: f64) -> f64 {
        match &self.cali_fwhm {
            Some(c) => c.transform(bin, self.bits),
            None => 0.0,
        }
    }

    pub fn nrg_to_fwhm(&self, energy: f64) -> f64 {
        let bin = self.nrg_to_bin(energy);
        self.bin_to_width(bin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_value_overrides_only_present_fields() {
        let v = serde_json::json!({ "resid_max_iterations": 9 });
        let s = FitSettings::from_value(&v);
        assert_eq!(s.resid_max_iterations, 9);
        assert_eq!(s.kon_width, FitSettings::default().kon_width);
    }
}
