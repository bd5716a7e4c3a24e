//! `SUM4Edge` / `SUM4` - deterministic, non-fitting net-area integration.
//! Grounded on the SUM4 description in the design document; the original
//! engine's equivalent lives alongside `roi.cpp` rather than in its own
//! translation unit.

use crate::engine::math::UncertainValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CurrieQuality {
    Excellent,
    Quantitative,
    DetectionLimit,
    NonDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sum4Edge {
    pub left: usize,
    pub right: usize,
    pub sum: UncertainValue,
    pub average: UncertainValue,
    pub min: f64,
    pub max: f64,
}

impl Sum4Edge {
    pub fn new(x: &[f64], y: &[f64], left: usize, right: usize) -> Option<Self> {
        if right < left || right >= y.len() {
            return None;
        }
        let width = (right - left + 1) as f64;
        if width < 1.0 {
            return None;
        }
        let slice = &y[left..=right];
        let sum: f64 = slice.iter().sum();
        let sigma = sum.max(0.0).sqrt();
        let min = slice.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let _ = x;
        Some(Sum4Edge {
            left,
            right,
            sum: UncertainValue::new(sum, sigma),
            average: UncertainValue::new(sum / width, sigma / width),
            min,
            max,
        })
    }

    pub fn width(&self) -> f64 {
        (self.right - self.left + 1) as f64
    }

    pub fn midpoint(&self) -> f64 {
        (self.left + self.right) as f64 / 2.0
    }

    pub fn valid(&self) -> bool {
        self.right >= self.left && self.width() >= 1.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sum4 {
    pub left_ch: usize,
    pub right_ch: usize,
    pub gross_area: UncertainValue,
    pub background_area: UncertainValue,
    pub peak_area: UncertainValue,
    pub centroid: UncertainValue,
    pub fwhm: f64,
    pub quality: CurrieQuality,
}

impl Sum4 {
    /// Background is the straight line through `(LB.midpoint, LB.avg)` and
    /// `(RB.midpoint, RB.avg)`.
    pub fn new(x: &[f64], y: &[f64], left_ch: usize, right_ch: usize, lb: &Sum4Edge, rb: &Sum4Edge) -> Option<Self> {
        if right_ch < left_ch || right_ch >= y.len() {
            return None;
        }
        let run = rb.midpoint() - lb.midpoint();
        let slope = if run.abs() > 1e-12 {
            (rb.average.value - lb.average.value) / run
        } else {
            0.0
        };
        let intercept = lb.average.value - slope * lb.midpoint();
        let background_at = |bin: f64| slope * bin + intercept;

        let gross: f64 = y[left_ch..=right_ch].iter().sum();
        let gross_sigma = gross.max(0.0).sqrt();

        let n = (right_ch - left_ch + 1) as f64;
        let background: f64 = (left_ch..=right_ch).map(|i| background_at(i as f64)).sum();
        // Background variance combines the two edge averages' variance,
        // scaled by the number of bins integrated over (each bin's
        // background estimate inherits the same two-point uncertainty).
        let background_var = n * n * (lb.average.sigma.powi(2) + rb.average.sigma.powi(2)) / 4.0;
        let background_sigma = background_var.max(0.0).sqrt();

        let peak_value = gross - background;
        let peak_sigma = (gross_sigma.powi(2) + background_sigma.powi(2)).sqrt();

        let mut moment = 0.0;
        for i in left_ch..=right_ch {
            let net = y[i] - background_at(i as f64);
            moment += (i as f64) * net;
        }
        let centroid_value = if peak_value.abs() > 1e-12 {
            moment / peak_value
        } else {
            (left_ch + right_ch) as f64 / 2.0
        };
        let centroid = UncertainValue::new(centroid_value, 0.0);

        let half_max = {
            let peak_max = (left_ch..=right_ch)
                .map(|i| y[i] - background_at(i as f64))
                .fold(f64::NEG_INFINITY, f64::max);
            peak_max / 2.0
        };
        let fwhm = fwhm_by_linear_crossing(x, y, left_ch, right_ch, &background_at, half_max);

        let quality = classify_currie(peak_value, background_var.sqrt());

        Some(Sum4 {
            left_ch,
            right_ch,
            gross_area: UncertainValue::new(gross, gross_sigma),
            background_area: UncertainValue::new(background, background_sigma),
            peak_area: UncertainValue::new(peak_value, peak_sigma),
            centroid,
            fwhm,
            quality,
        })
    }
}

/// Half-max crossings located by linear interpolation between adjacent
/// background-subtracted samples; no special casing beyond "linear
/// between the bins straddling the crossing" even when the slice is
/// asymmetric about the peak.
fn fwhm_by_linear_crossing(
    x: &[f64],
    y: &[f64],
    left_ch: usize,
    right_ch: usize,
    background_at: &impl Fn(f64) -> f64,
    half_max: f64,
) -> f64 {
    let net: Vec<f64> = (left_ch..=right_ch)
        .map(|i| y[i] - background_at(i as f64))
        .collect();
    if net.is_empty() {
        return 0.0;
    }
    let peak_idx = net
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);

    let crossing = |range: Box<dyn Iterator<Item = usize>>| -> Option<f64> {
        let mut prev: Option<(usize, f64)> = None;
        for i in range {
            let v = net[i];
            if let Some((pi, pv)) = prev {
                if (pv - half_max) * (v - half_max) <= 0.0 && (v - pv).abs() > 1e-300 {
                    let t = (half_max - pv) / (v - pv);
                    let xi = x.get(left_ch + pi).copied().unwrap_or(pi as f64);
                    let xj = x.get(left_ch + i).copied().unwrap_or(i as f64);
                    return Some(xi + t * (xj - xi));
                }
            }
            prev = Some((i, v));
        }
        None
    };

    let left_cross = crossing(Box::new((0..=peak_idx).rev()));
    let right_cross = crossing(Box::new(peak_idx..net.len()));

    match (left_cross, right_cross) {
        (Some(l), Some(r)) => (r - l).abs(),
        _ => 0.0,
    }
}

fn classify_currie(peak_net: f64, background_sigma: f64) -> CurrieQuality {
    if peak_net >= 50.0 * background_sigma {
        CurrieQuality::Excellent
    } else if peak_net >= 10.0 {
        CurrieQuality::Quantitative
    } else if peak_net >= 2.71 + 4.65 * background_sigma {
        CurrieQuality::DetectionLimit
    } else {
        CurrieQuality::NonDetection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superposition_holds_for_disjoint_ranges() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 10.0 + 100.0 * (-(xi - 50.0).powi(2) / 50.0).exp()).collect();
        let lb = Sum4Edge::new(&x, &y, 0, 4).unwrap();
        let rb = Sum4Edge::new(&x, &y, 95, 99).unwrap();
        let whole = Sum4::new(&x, &y, 5, 94, &lb, &rb).unwrap();
        let half1 = Sum4::new(&x, &y, 5, 49, &lb, &rb).unwrap();
        let half2 = Sum4::new(&x, &y, 50, 94, &lb, &rb).unwrap();
        let combined = half1.peak_area.value + half2.peak_area.value;
        assert!((combined - whole.peak_area.value).abs() < 1.0);
    }

    #[test]
    fn edge_with_zero_width_is_invalid() {
        let x = vec![0.0, 1.0];
        let y = vec![1.0, 1.0];
        assert!(Sum4Edge::new(&x, &y, 1, 0).is_none());
    }
}
