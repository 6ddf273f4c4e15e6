use serde::{Deserialize, Serialize};

use crate::circuit::Components;
use crate::dsp::bilinear::AnalogPrototype;

/// Every filter network the pedal can derive coefficients for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// Op-amp feedback voltage with the feedback capacitor left out.
    SinglePoleDrive,
    /// Op-amp feedback voltage including the feedback capacitor.
    ActiveDrive,
    /// Fixed passive lowpass after the clipping stage.
    Recovery,
    /// Full tapped-pot tone network.
    ToneStack,
    /// Parallel branch that, summed with its input after `Recovery`,
    /// reproduces `ToneStack`.
    ToneBranch,
    /// Output coupling capacitor into the load.
    OutputCoupling,
}

impl Network {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::SinglePoleDrive,
        Self::ActiveDrive,
        Self::Recovery,
        Self::ToneStack,
        Self::ToneBranch,
        Self::OutputCoupling,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::SinglePoleDrive => 0,
            Self::ActiveDrive => 1,
            Self::Recovery => 2,
            Self::ToneStack => 3,
            Self::ToneBranch => 4,
            Self::OutputCoupling => 5,
        }
    }

    /// Drive networks run at the oversampled rate, in front of the clipper.
    pub const fn is_drive(self) -> bool {
        matches!(self, Self::SinglePoleDrive | Self::ActiveDrive)
    }

    /// Continuous-time transfer function for the given component set and
    /// control values (`drive` and `tone` in `0..=1`).
    pub fn prototype(self, c: &Components, drive: f32, tone: f32) -> AnalogPrototype {
        match self {
            Self::SinglePoleDrive => {
                let r2 = c.feedback_resistance(drive);
                let c3 = c.drive_ground_cap;
                AnalogPrototype::new([0.0, r2 * c3, 0.0], [0.0, c.drive_ground_res * c3, 1.0])
            }
            Self::ActiveDrive => {
                let r2 = c.feedback_resistance(drive);
                let ground = c.drive_ground_res * c.drive_ground_cap;
                let feedback = r2 * c.drive_feedback_cap;
                // (1 + s*R4*C3)(1 + s*R2*Cf)
                AnalogPrototype::new(
                    [0.0, r2 * c.drive_ground_cap, 0.0],
                    [ground * feedback, ground + feedback, 1.0],
                )
            }
            Self::Recovery => AnalogPrototype::lowpass(c.tone_r1k * c.tone_recovery_cap),
            Self::ToneStack => {
                let (num, den) = tone_stack(c, tone);
                AnalogPrototype::new(num, den)
            }
            Self::ToneBranch => {
                let (num, den) = tone_stack(c, tone);
                let tau = c.tone_r1k * c.tone_recovery_cap;
                // N * (1 + s*tau) - D
                AnalogPrototype::new(
                    [num[1] * tau - den[0], num[1] + num[2] * tau - den[1], num[2] - den[2]],
                    den,
                )
            }
            Self::OutputCoupling => {
                let load = c.output_cap * c.output_load_res;
                let total = c.output_cap * (c.output_series_res + c.output_load_res);
                AnalogPrototype::new([0.0, load, 0.0], [0.0, total, 1.0])
            }
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SinglePoleDrive => "single-pole drive",
            Self::ActiveDrive => "active drive",
            Self::Recovery => "recovery",
            Self::ToneStack => "tone stack",
            Self::ToneBranch => "tone branch",
            Self::OutputCoupling => "output coupling",
        };
        write!(f, "{name}")
    }
}

/// Numerator and denominator of the tone network, `[s^2, s^1, s^0]`.
fn tone_stack(c: &Components, tone: f32) -> ([f64; 3], [f64; 3]) {
    let (p1, p2) = c.tone_split(tone);
    let sum = p1 + p2;
    let product = p1 * p2;

    let r10k = c.tone_r10k;
    let r1k = c.tone_r1k;
    let r220 = c.tone_r220;
    let c4 = c.tone_recovery_cap;
    let ct = c.tone_cap;

    let num = [
        0.0,
        ct * r10k * (r220 * sum + c.tone_feedback_res * p1 + product),
        r10k * sum,
    ];

    let den = [
        c4 * ct * r10k * r1k * (r220 * sum + product),
        c4 * r10k * r1k * sum
            + ct * r10k * r1k * p2
            + ct * r10k * r220 * sum
            + ct * r10k * product
            + ct * r1k * r220 * sum
            + ct * r1k * product,
        (r10k + r1k) * sum,
    ];

    (num, den)
}
