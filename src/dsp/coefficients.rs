use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Discrete-time second-order section, normalized so that `a0 == 1`.
///
/// A first-order section is the degenerate case `b2 == a2 == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Coefficients {
    /// `y[n] = x[n]`
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    pub const fn new(b0: f32, b1: f32, b2: f32, a1: f32, a2: f32) -> Self {
        Self { b0, b1, b2, a1, a2 }
    }

    pub fn is_finite(&self) -> bool {
        self.b0.is_finite()
            && self.b1.is_finite()
            && self.b2.is_finite()
            && self.a1.is_finite()
            && self.a2.is_finite()
    }

    /// Both poles strictly inside the unit circle (stability triangle).
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    /// Finite and stable, i.e. safe to hand to the audio thread.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.is_stable()
    }

    /// Largest pole magnitude of `1 + a1 z^-1 + a2 z^-2`.
    pub fn max_pole_radius(&self) -> f64 {
        let a1 = f64::from(self.a1);
        let a2 = f64::from(self.a2);
        let disc = a1.mul_add(a1, -4.0 * a2);
        if disc >= 0.0 {
            let sq = disc.sqrt();
            let p1 = (-a1 + sq) / 2.0;
            let p2 = (-a1 - sq) / 2.0;
            p1.abs().max(p2.abs())
        } else {
            // complex conjugate pair: |p|^2 = a2
            a2.sqrt()
        }
    }

    /// Complex frequency response `H(e^{jw})` at `freq` Hz.
    pub fn response_at(&self, freq: f64, sample_rate: f64) -> Response {
        let w = 2.0 * PI * freq / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();

        let b0 = f64::from(self.b0);
        let b1 = f64::from(self.b1);
        let b2 = f64::from(self.b2);
        let a1 = f64::from(self.a1);
        let a2 = f64::from(self.a2);

        // z^-k = cos(kw) - j sin(kw)
        let num = Response::new(b0 + b1 * c1 + b2 * c2, -(b1 * s1) - b2 * s2);
        let den = Response::new(1.0 + a1 * c1 + a2 * c2, -(a1 * s1) - a2 * s2);
        num.div(den)
    }

    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        self.response_at(freq, sample_rate).norm()
    }
}

/// Complex value of a frequency response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub re: f64,
    pub im: f64,
}

impl Response {
    pub const ONE: Self = Self { re: 1.0, im: 0.0 };

    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub const fn scalar(value: f64) -> Self {
        Self { re: value, im: 0.0 }
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    pub fn mul(self, other: Self) -> Self {
        Self::new(
            self.re.mul_add(other.re, -(self.im * other.im)),
            self.re.mul_add(other.im, self.im * other.re),
        )
    }

    pub fn div(self, other: Self) -> Self {
        let denom = other.re.mul_add(other.re, other.im * other.im);
        Self::new(
            self.re.mul_add(other.re, self.im * other.im) / denom,
            self.im.mul_add(other.re, -(self.re * other.im)) / denom,
        )
    }

    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn db(self) -> f64 {
        20.0 * self.norm().max(1e-12).log10()
    }
}
