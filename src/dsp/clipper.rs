/// Diode saturation current (A).
pub const SATURATION_CURRENT: f64 = 1e-14;
/// Thermal voltage times ideality (V).
pub const THERMAL_VOLTAGE: f64 = 26e-3;

/// Back-to-back diode pair in the feedback loop of the drive op-amp.
///
/// The input `v` is the voltage the feedback resistor `R2` would develop on
/// its own; the diodes cap it at `nVt * asinh(i / 2Is)` with `i = v / R2`.
/// The diode voltage can never exceed the resistor voltage, so the result is
/// clamped to `v` whenever the approximation overshoots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeClipper {
    /// `1 / (2 * Is * R2)`
    scale: f64,
}

impl DiodeClipper {
    /// `feedback_resistance` is `R2` in ohms and must be positive.
    pub fn new(feedback_resistance: f32) -> Self {
        let mut clipper = Self { scale: 0.0 };
        clipper.set_feedback_resistance(feedback_resistance);
        clipper
    }

    pub fn set_feedback_resistance(&mut self, feedback_resistance: f32) {
        self.scale = 1.0 / (2.0 * SATURATION_CURRENT * f64::from(feedback_resistance));
    }

    #[inline]
    pub fn process(&self, v: f32) -> f32 {
        let clipped = (THERMAL_VOLTAGE * (f64::from(v) * self.scale).asinh()) as f32;
        if clipped.abs() > v.abs() || !clipped.is_finite() {
            v
        } else {
            clipped
        }
    }

    pub fn process_block(&self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}
