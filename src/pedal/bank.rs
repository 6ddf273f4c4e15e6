use crate::circuit::Network;
use crate::dsp::coefficients::Coefficients;
use crate::params::ControlSnapshot;

/// One complete derived coefficient set for every network, tagged with the
/// store generation and the rates it was computed for.
///
/// Plain `Copy` data: deriving a new set never allocates, so the audio
/// thread can do it in-line when the published set is stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitCoefficients {
    pub generation: u64,
    pub base_rate: f64,
    /// Rate of the drive section, `base_rate * oversampling`.
    pub drive_rate: f64,
    pub controls: ControlSnapshot,
    pub networks: [Coefficients; Network::COUNT],
    /// `R2` handed to the diode clipper.
    pub feedback_resistance: f32,
}

impl Default for CircuitCoefficients {
    fn default() -> Self {
        Self {
            generation: 0,
            base_rate: 0.0,
            drive_rate: 0.0,
            controls: ControlSnapshot::default(),
            networks: [Coefficients::IDENTITY; Network::COUNT],
            feedback_resistance: 1.0,
        }
    }
}

impl CircuitCoefficients {
    pub const fn get(&self, network: Network) -> Coefficients {
        self.networks[network.index()]
    }

    /// Whether this set reflects store `generation` (or a later one) at
    /// these rates.
    pub fn is_current(&self, generation: u64, base_rate: f64, drive_rate: f64) -> bool {
        self.generation >= generation
            && self.base_rate == base_rate
            && self.drive_rate == drive_rate
    }

    /// Derives a new set from `controls`, starting from `self`.
    ///
    /// A network whose derivation fails or comes out unstable keeps its
    /// coefficients from `self`. Returns the new set and the number of
    /// networks rejected this way.
    pub fn derive(
        &self,
        controls: &ControlSnapshot,
        base_rate: f64,
        drive_rate: f64,
    ) -> (Self, usize) {
        let components = controls.model.components();
        let mut next = *self;
        let mut rejected = 0;

        for network in Network::ALL {
            let rate = if network.is_drive() {
                drive_rate
            } else {
                base_rate
            };

            match network
                .prototype(components, controls.drive, controls.tone)
                .bilinear(rate)
            {
                Ok(coeffs) if coeffs.is_valid() => next.networks[network.index()] = coeffs,
                _ => rejected += 1,
            }
        }

        let r2 = components.feedback_resistance(controls.drive) as f32;
        if r2.is_finite() && r2 > 0.0 {
            next.feedback_resistance = r2;
        } else {
            rejected += 1;
        }

        next.generation = controls.generation;
        next.base_rate = base_rate;
        next.drive_rate = drive_rate;
        next.controls = *controls;

        (next, rejected)
    }
}
