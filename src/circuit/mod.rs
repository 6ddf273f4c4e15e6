//! Component values of the two historical pedal variants and the analog
//! networks they form.

pub mod networks;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use networks::Network;

/// Which historical component set feeds the coefficient derivation.
#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CircuitModel {
    /// TS9: 470 Ω series / 100 kΩ pull-down output.
    #[default]
    Ts9,
    /// TS808: 100 Ω series / 10 kΩ pull-down output.
    Ts808,
}

impl std::fmt::Display for CircuitModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ts9 => write!(f, "TS9"),
            Self::Ts808 => write!(f, "TS808"),
        }
    }
}

impl CircuitModel {
    pub const fn components(self) -> &'static Components {
        match self {
            Self::Ts9 => &TS9,
            Self::Ts808 => &TS808,
        }
    }

    /// Numeric form used by the parameter store (0 = TS9, 1 = TS808).
    pub const fn index(self) -> u8 {
        match self {
            Self::Ts9 => 0,
            Self::Ts808 => 1,
        }
    }

    pub const fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Ts9,
            _ => Self::Ts808,
        }
    }
}

/// Physical component values in ohms and farads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Components {
    // --- clipping stage ---
    /// Fixed part of the feedback resistance.
    pub drive_fixed: f64,
    /// Drive potentiometer, swept linearly by the drive control.
    pub drive_pot: f64,
    /// Feedback capacitor across the diodes.
    pub drive_feedback_cap: f64,
    /// Resistor of the ground leg.
    pub drive_ground_res: f64,
    /// Capacitor of the ground leg.
    pub drive_ground_cap: f64,

    // --- tone stage ---
    pub tone_feedback_res: f64,
    pub tone_pot: f64,
    pub tone_r10k: f64,
    pub tone_r1k: f64,
    pub tone_r220: f64,
    /// Capacitor of the passive recovery lowpass.
    pub tone_recovery_cap: f64,
    pub tone_cap: f64,

    // --- output coupling ---
    pub output_series_res: f64,
    pub output_load_res: f64,
    pub output_cap: f64,
}

const SHARED: Components = Components {
    drive_fixed: 51e3,
    drive_pot: 500e3,
    drive_feedback_cap: 51e-12,
    drive_ground_res: 4.7e3,
    drive_ground_cap: 0.047e-6,

    tone_feedback_res: 1e3,
    tone_pot: 20e3,
    tone_r10k: 10e3,
    tone_r1k: 1e3,
    tone_r220: 220.0,
    tone_recovery_cap: 0.22e-6,
    tone_cap: 0.22e-6,

    output_series_res: 470.0,
    output_load_res: 100e3,
    output_cap: 1e-6,
};

pub const TS9: Components = SHARED;

pub const TS808: Components = Components {
    output_series_res: 100.0,
    output_load_res: 10e3,
    ..SHARED
};

impl Components {
    /// Effective feedback resistance `R2` of the clipping stage for a drive
    /// setting in `0..=1`.
    pub fn feedback_resistance(&self, drive: f32) -> f64 {
        f64::from(drive).mul_add(self.drive_pot, self.drive_fixed)
    }

    /// Splits the tone potentiometer at the wiper: `(Rpot1, Rpot2)`.
    pub fn tone_split(&self, tone: f32) -> (f64, f64) {
        let tone = f64::from(tone);
        (self.tone_pot * tone, self.tone_pot * (1.0 - tone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_only_differ_at_the_output() {
        let ts9 = CircuitModel::Ts9.components();
        let ts808 = CircuitModel::Ts808.components();

        assert_eq!(ts9.drive_pot, ts808.drive_pot);
        assert_eq!(ts9.tone_cap, ts808.tone_cap);
        assert_ne!(ts9.output_load_res, ts808.output_load_res);
        assert_ne!(ts9.output_series_res, ts808.output_series_res);
    }

    #[test]
    fn feedback_resistance_spans_the_pot() {
        let c = CircuitModel::Ts9.components();
        assert_eq!(c.feedback_resistance(0.0), 51e3);
        assert!((c.feedback_resistance(1.0) - 551e3).abs() < 1e-6);
    }

    #[test]
    fn tone_split_sums_to_pot() {
        let c = CircuitModel::Ts808.components();
        for &tone in &[0.0, 0.25, 0.5, 1.0] {
            let (p1, p2) = c.tone_split(tone);
            assert!((p1 + p2 - c.tone_pot).abs() < 1e-9);
        }
    }

    #[test]
    fn model_index_round_trips() {
        for model in [CircuitModel::Ts9, CircuitModel::Ts808] {
            assert_eq!(CircuitModel::from_index(model.index()), model);
        }
    }
}
