//! Analog prototypes and their discretization with the bilinear transform.
//!
//! Prototypes are written as s-domain polynomials of order two or less,
//! `H(s) = (b2 s^2 + b1 s + b0) / (a2 s^2 + a1 s + a0)`, built straight from
//! circuit component values. The transform uses `s = c (1 - z^-1) / (1 + z^-1)`
//! with `c = 2 * sample_rate` and no frequency pre-warping.

use std::fmt;

use crate::dsp::coefficients::{Coefficients, Response};

/// Reason a prototype could not be discretized.
///
/// Plain data so it can be produced on the audio thread without allocating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BilinearError {
    InvalidSampleRate(f64),
    /// The normalizing coefficient `a0` vanished or overflowed.
    Degenerate(f64),
    NonFinite,
}

impl fmt::Display for BilinearError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSampleRate(rate) => {
                write!(f, "invalid sample rate for bilinear transform: {rate}")
            }
            Self::Degenerate(az0) => {
                write!(f, "degenerate analog prototype: a0 after transform is {az0}")
            }
            Self::NonFinite => write!(f, "bilinear transform produced non-finite coefficients"),
        }
    }
}

impl std::error::Error for BilinearError {}

/// Continuous-time transfer function, coefficients ordered `[s^2, s^1, s^0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogPrototype {
    pub num: [f64; 3],
    pub den: [f64; 3],
}

impl AnalogPrototype {
    pub const fn new(num: [f64; 3], den: [f64; 3]) -> Self {
        Self { num, den }
    }

    /// `1 / (1 + s*tau)`
    pub const fn lowpass(tau: f64) -> Self {
        Self::new([0.0, 0.0, 1.0], [0.0, tau, 1.0])
    }

    /// No `s^2` term on either side.
    pub fn is_first_order(&self) -> bool {
        self.num[0] == 0.0 && self.den[0] == 0.0
    }

    /// Analog response at `freq` Hz, used to cross-check discretizations.
    pub fn response_at(&self, freq: f64) -> Response {
        let w = 2.0 * std::f64::consts::PI * freq;
        // s = jw, s^2 = -w^2
        let eval = |p: &[f64; 3]| Response::new(p[2] - p[0] * w * w, p[1] * w);
        eval(&self.num).div(eval(&self.den))
    }

    /// Discretizes the prototype at `sample_rate`.
    ///
    /// Fails when the normalizing coefficient vanishes or any resulting
    /// coefficient is not finite.
    pub fn bilinear(&self, sample_rate: f64) -> Result<Coefficients, BilinearError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(BilinearError::InvalidSampleRate(sample_rate));
        }

        let c = 2.0 * sample_rate;
        let c2 = c * c;
        let [b2, b1, b0] = self.num;
        let [a2, a1, a0] = self.den;

        let az0 = a2.mul_add(c2, a1.mul_add(c, a0));
        if az0 == 0.0 || !az0.is_finite() {
            return Err(BilinearError::Degenerate(az0));
        }

        let coeffs = if self.is_first_order() {
            // The second-order mapping would leave a cancelled pole/zero pair
            // sitting on z = -1, so first-order sections get their own form.
            Coefficients::new(
                (b1.mul_add(c, b0) / az0) as f32,
                ((-b1).mul_add(c, b0) / az0) as f32,
                0.0,
                ((-a1).mul_add(c, a0) / az0) as f32,
                0.0,
            )
        } else {
            let bz0 = b2.mul_add(c2, b1.mul_add(c, b0)) / az0;
            let bz1 = (-2.0 * b2).mul_add(c2, 2.0 * b0) / az0;
            let bz2 = b2.mul_add(c2, (-b1).mul_add(c, b0)) / az0;
            let az1 = (-2.0 * a2).mul_add(c2, 2.0 * a0) / az0;
            let az2 = a2.mul_add(c2, (-a1).mul_add(c, a0)) / az0;

            Coefficients::new(
                bz0 as f32,
                bz1 as f32,
                bz2 as f32,
                az1 as f32,
                az2 as f32,
            )
        };
        if !coeffs.is_finite() {
            return Err(BilinearError::NonFinite);
        }

        Ok(coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_keeps_dc_and_kills_nyquist() {
        let proto = AnalogPrototype::lowpass(1.0 / (2.0 * std::f64::consts::PI * 1_000.0));
        let c = proto.bilinear(48_000.0).unwrap();

        assert!(c.is_valid());
        assert!((c.magnitude_at(0.0, 48_000.0) - 1.0).abs() < 1e-6);
        assert!(c.magnitude_at(24_000.0, 48_000.0) < 1e-6);
        assert_eq!(c.b2, 0.0);
        assert_eq!(c.a2, 0.0);
    }

    #[test]
    fn matches_analog_response_well_below_nyquist() {
        // s / (s^2 + 2000 s + 4e7): a resonant bandpass around 1 kHz
        let proto = AnalogPrototype::new([0.0, 1.0, 0.0], [1.0, 2_000.0, 4.0e7]);
        let c = proto.bilinear(96_000.0).unwrap();

        for freq in [50.0, 500.0, 1_000.0, 2_000.0] {
            let analog = proto.response_at(freq).norm();
            let digital = c.magnitude_at(freq, 96_000.0);
            assert!(
                (analog - digital).abs() / analog < 0.02,
                "{freq} Hz: analog={analog} digital={digital}"
            );
        }
    }

    #[test]
    fn reference_formula_second_order() {
        let proto = AnalogPrototype::new([1.0e-8, 2.0e-4, 1.0], [3.0e-8, 4.0e-4, 2.0]);
        let fs = 44_100.0;
        let c = 2.0 * fs;
        let az0 = 3.0e-8 * c * c + 4.0e-4 * c + 2.0;
        let expected_b0 = (1.0e-8 * c * c + 2.0e-4 * c + 1.0) / az0;
        let expected_a2 = (3.0e-8 * c * c - 4.0e-4 * c + 2.0) / az0;

        let coeffs = proto.bilinear(fs).unwrap();
        assert!((f64::from(coeffs.b0) - expected_b0).abs() < 1e-6);
        assert!((f64::from(coeffs.a2) - expected_a2).abs() < 1e-6);
    }

    #[test]
    fn rejects_degenerate_prototypes() {
        let zero = AnalogPrototype::new([0.0, 0.0, 1.0], [0.0, 0.0, 0.0]);
        assert_eq!(
            zero.bilinear(48_000.0),
            Err(BilinearError::Degenerate(0.0))
        );

        let ok = AnalogPrototype::lowpass(1e-3);
        assert!(ok.bilinear(0.0).is_err());
        assert!(ok.bilinear(-48_000.0).is_err());
        assert!(ok.bilinear(f64::NAN).is_err());
    }
}
