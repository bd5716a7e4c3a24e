//! `Calibration` - a `CoefFunction` paired with bit depth, units, and a
//! label, supporting bit-depth-adaptive forward/inverse transforms.
//! Grounded on `engine/calibration.cpp`.

use super::coef_function::CoefFunction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    pub created_at: DateTime<Utc>,
    pub bits: u16,
    pub units: String,
    pub to: String,
    pub function: CoefFunction,
}

impl Calibration {
    pub fn new(bits: u16, units: impl Into<String>, to: impl Into<String>, function: CoefFunction) -> Self {
        Calibration {
            created_at: Utc::now(),
            bits,
            units: units.into(),
            to: to.into(),
            function,
        }
    }

    pub fn valid(&self) -> bool {
        self.bits > 0
    }

    /// Rescales `channel` from `bits` to this calibration's native bit
    /// depth by a power-of-two factor before evaluating the function.
    fn rescale(&self, channel: f64, bits: u16) -> f64 {
        if bits == self.bits || bits == 0 {
            return channel;
        }
        if bits > self.bits {
            channel / 2f64.powi((bits - self.bits) as i32)
        } else {
            channel * 2f64.powi((self.bits - bits) as i32)
        }
    }

    pub fn transform(&self, channel: f64, bits: u16) -> f64 {
        self.function.eval(self.rescale(channel, bits))
    }

    /// Inverse of `transform`: solve for the channel (in `bits`'
    /// bit-depth) that evaluates to `value`, then undo the rescale.
    pub fn inverse_transform(&self, value: f64, bits: u16) -> f64 {
        let native = self.function.eval_inverse(value);
        if !native.is_finite() {
            return f64::NAN;
        }
        if bits == self.bits || bits == 0 {
            return native;
        }
        if bits > self.bits {
            native * 2f64.powi((bits - self.bits) as i32)
        } else {
            native / 2f64.powi((self.bits - bits) as i32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_same_bit_depth() {
        let cal = Calibration::new(
            12,
            "channel",
            "keV",
            CoefFunction::polynomial_from_coeffs(&[1.0, 0.5, 1e-4], 0.0, 0.0),
        );
        for c in [0.0, 100.0, 2048.0, 4095.0] {
            let e = cal.transform(c, 12);
            let back = cal.inverse_transform(e, 12);
            assert!((back - c).abs() < 1e-3);
        }
    }

    #[test]
    fn transform_adapts_bit_depth() {
        let cal = Calibration::new(
            10,
            "channel",
            "keV",
            CoefFunction::polynomial_from_coeffs(&[0.0, 1.0], 0.0, 0.0),
        );
        // 12-bit channel 400 maps to 10-bit channel 100 (divide by 4).
        assert!((cal.transform(400.0, 12) - 100.0).abs() < 1e-9);
    }
}
