use anyhow::{Context, Result, bail};
use log::debug;
use rubato::ResampleError;

use crate::circuit::Network;
use crate::dsp::{Coefficients, DiodeClipper, IirFilter, Oversampler, Response};
use crate::pedal::bank::CircuitCoefficients;
use crate::pedal::layout::{Layout, PostStage, Recombine};

/// A [`Layout`] assembled for one sample rate and block size: filters,
/// clipper, scratch buffers and the oversampler around the drive section.
///
/// All buffers are sized in [`SignalPath::new`]; [`SignalPath::process`]
/// never allocates.
pub struct SignalPath {
    layout: Layout,
    sample_rate: f64,
    max_block: usize,
    drive: Option<DriveSection>,
    post: Vec<PostSlot>,
    /// Copy of the block for parallel branches.
    scratch: Vec<f32>,
    oversampler: Oversampler,
}

struct DriveSection {
    network: Network,
    recombine: Recombine,
    filter: IirFilter,
    clipper: DiodeClipper,
    /// Drive filter output at the oversampled rate.
    modulation: Vec<f32>,
}

enum PostSlot {
    Filter(Network, IirFilter),
    ParallelSum(Network, IirFilter),
    Gain,
}

impl SignalPath {
    pub fn new(
        layout: Layout,
        sample_rate: f64,
        max_block: usize,
        oversampling: usize,
    ) -> Result<Self> {
        layout.validate().context("invalid layout")?;
        if !(sample_rate.is_finite() && sample_rate >= 1.0) {
            bail!("invalid sample rate: {sample_rate}");
        }
        if max_block == 0 {
            bail!("maximum block size must be positive");
        }

        let oversampler = Oversampler::new(oversampling, sample_rate.round() as usize, max_block)
            .context("failed to build oversampler")?;

        let drive = layout.drive.map(|spec| DriveSection {
            network: spec.network,
            recombine: spec.recombine,
            filter: IirFilter::default(),
            clipper: DiodeClipper::new(1.0),
            modulation: vec![0.0; oversampler.max_callback_len(max_block)],
        });

        let post = layout
            .post
            .iter()
            .map(|stage| match *stage {
                PostStage::Filter(network) => PostSlot::Filter(network, IirFilter::default()),
                PostStage::ParallelSum(network) => {
                    PostSlot::ParallelSum(network, IirFilter::default())
                }
                PostStage::Gain => PostSlot::Gain,
            })
            .collect();

        let path = Self {
            layout,
            sample_rate,
            max_block,
            drive,
            post,
            scratch: vec![0.0; max_block],
            oversampler,
        };

        debug!(
            "Built signal path: {} post stages, {oversampling}x oversampling, {} frames latency",
            path.layout.post.len(),
            path.latency()
        );

        Ok(path)
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn into_layout(self) -> Layout {
        self.layout
    }

    pub const fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Rate the drive section runs at.
    pub fn drive_rate(&self) -> f64 {
        self.sample_rate * self.oversampler.factor() as f64
    }

    pub const fn oversampling(&self) -> usize {
        self.oversampler.factor()
    }

    pub const fn max_block(&self) -> usize {
        self.max_block
    }

    /// Frames of delay added by the path. Only the drive section runs
    /// through the oversampler, so a path without one adds none.
    pub fn latency(&self) -> usize {
        if self.drive.is_some() {
            self.oversampler.latency()
        } else {
            0
        }
    }

    /// Installs a coefficient set. Filter state is left alone.
    pub fn apply(&mut self, coeffs: &CircuitCoefficients) {
        if let Some(drive) = self.drive.as_mut() {
            drive.filter.set_coefficients(coeffs.get(drive.network));
            drive.clipper.set_feedback_resistance(coeffs.feedback_resistance);
        }

        for slot in &mut self.post {
            match slot {
                PostSlot::Filter(network, filter) | PostSlot::ParallelSum(network, filter) => {
                    filter.set_coefficients(coeffs.get(*network));
                }
                PostSlot::Gain => {}
            }
        }
    }

    /// Coefficients currently installed for `network`, if the path uses it.
    pub fn installed(&self, network: Network) -> Option<Coefficients> {
        if let Some(drive) = &self.drive
            && drive.network == network
        {
            return Some(*drive.filter.coefficients());
        }

        self.post.iter().find_map(|slot| match slot {
            PostSlot::Filter(n, filter) | PostSlot::ParallelSum(n, filter) if *n == network => {
                Some(*filter.coefficients())
            }
            _ => None,
        })
    }

    /// Zeroes every filter, the oversampler and the scratch buffers.
    pub fn reset(&mut self) {
        if let Some(drive) = self.drive.as_mut() {
            drive.filter.reset();
            drive.modulation.fill(0.0);
        }
        for slot in &mut self.post {
            if let PostSlot::Filter(_, filter) | PostSlot::ParallelSum(_, filter) = slot {
                filter.reset();
            }
        }
        self.scratch.fill(0.0);
        self.oversampler.reset();
    }

    /// Processes one block of at most `max_block` frames in place.
    pub fn process(&mut self, block: &mut [f32], level: f32) -> Result<(), ResampleError> {
        let len = block.len().min(self.max_block);
        let block = &mut block[..len];

        if let Some(drive) = self.drive.as_mut() {
            self.oversampler.process(block, |buf| drive.run(buf))?;
        }

        for slot in &mut self.post {
            match slot {
                PostSlot::Filter(_, filter) => filter.process(block),
                PostSlot::ParallelSum(_, filter) => {
                    let branch = &mut self.scratch[..len];
                    filter.process_into(block, branch);
                    for (sample, &wet) in block.iter_mut().zip(branch.iter()) {
                        *sample += wet;
                    }
                }
                PostSlot::Gain => {
                    for sample in block.iter_mut() {
                        *sample *= level;
                    }
                }
            }
        }

        Ok(())
    }
}

impl DriveSection {
    /// Drive filter, clipper and recombination over one (oversampled) buffer.
    fn run(&mut self, buf: &mut [f32]) {
        let len = buf.len().min(self.modulation.len());
        let buf = &mut buf[..len];
        let modulation = &mut self.modulation[..len];

        self.filter.process_into(buf, modulation);

        match self.recombine {
            Recombine::AddDry => {
                for (sample, &v) in buf.iter_mut().zip(modulation.iter()) {
                    *sample += self.clipper.process(v);
                }
            }
            Recombine::Replace => {
                for (sample, &v) in buf.iter_mut().zip(modulation.iter()) {
                    *sample = self.clipper.process(v);
                }
            }
        }
    }
}

impl Layout {
    /// Linear response of the layout at `freq` Hz with the clipper treated
    /// as a wire, which holds while the feedback voltage stays below the
    /// diode knee.
    pub fn small_signal_response(&self, coeffs: &CircuitCoefficients, freq: f64) -> Response {
        let mut response = Response::ONE;

        if let Some(drive) = &self.drive {
            let h = coeffs
                .get(drive.network)
                .response_at(freq, coeffs.drive_rate);
            response = match drive.recombine {
                Recombine::AddDry => Response::ONE.add(h),
                Recombine::Replace => h,
            };
        }

        for stage in &self.post {
            let stage_response = match *stage {
                PostStage::Filter(network) => {
                    coeffs.get(network).response_at(freq, coeffs.base_rate)
                }
                PostStage::ParallelSum(network) => {
                    Response::ONE.add(coeffs.get(network).response_at(freq, coeffs.base_rate))
                }
                PostStage::Gain => Response::scalar(f64::from(coeffs.controls.level)),
            };
            response = response.mul(stage_response);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ControlSnapshot;
    use crate::pedal::layout::{DriveSpec, Topology};
    use std::f32::consts::PI;

    const SAMPLE_RATE: f64 = 48_000.0;

    fn coefficients(controls: &ControlSnapshot, oversampling: usize) -> CircuitCoefficients {
        let (set, rejected) = CircuitCoefficients::default().derive(
            controls,
            SAMPLE_RATE,
            SAMPLE_RATE * oversampling as f64,
        );
        assert_eq!(rejected, 0);
        set
    }

    fn sine(len: usize, freq: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * amplitude)
            .collect()
    }

    #[test]
    fn rejects_invalid_configuration() {
        let layout = Topology::Classic.layout();
        assert!(SignalPath::new(layout.clone(), 0.0, 256, 1).is_err());
        assert!(SignalPath::new(layout.clone(), f64::NAN, 256, 1).is_err());
        assert!(SignalPath::new(layout.clone(), SAMPLE_RATE, 0, 1).is_err());
        assert!(SignalPath::new(layout, SAMPLE_RATE, 256, 3).is_err());
    }

    #[test]
    fn apply_installs_coefficients_by_network() -> anyhow::Result<()> {
        let controls = ControlSnapshot::default();
        let coeffs = coefficients(&controls, 1);

        let mut path = SignalPath::new(Topology::Split.layout(), SAMPLE_RATE, 128, 1)?;
        path.apply(&coeffs);

        for network in [
            Network::SinglePoleDrive,
            Network::Recovery,
            Network::ToneBranch,
            Network::OutputCoupling,
        ] {
            assert_eq!(path.installed(network), Some(coeffs.get(network)));
        }
        assert_eq!(path.installed(Network::ActiveDrive), None);
        assert_eq!(path.installed(Network::ToneStack), None);
        Ok(())
    }

    #[test]
    fn split_and_classic_agree_without_the_feedback_cap() {
        let coeffs = coefficients(&ControlSnapshot::default(), 1);

        let split = Topology::Split.layout();
        let classic_single_pole = Layout {
            drive: Some(DriveSpec {
                network: Network::SinglePoleDrive,
                recombine: Recombine::AddDry,
            }),
            ..Topology::Classic.layout()
        };

        for freq in [100.0, 1_000.0, 4_000.0] {
            let a = split.small_signal_response(&coeffs, freq).norm();
            let b = classic_single_pole.small_signal_response(&coeffs, freq).norm();
            assert!((a - b).abs() / b < 1e-3, "{freq} Hz: split={a} classic={b}");
        }
    }

    #[test]
    fn replace_drops_the_dry_signal() {
        let coeffs = coefficients(&ControlSnapshot::default(), 1);
        let add = Topology::Classic.layout();
        let mut replace = add.clone();
        if let Some(drive) = replace.drive.as_mut() {
            drive.recombine = Recombine::Replace;
        }

        let with_dry = add.small_signal_response(&coeffs, 1_000.0).norm();
        let without = replace.small_signal_response(&coeffs, 1_000.0).norm();
        assert!(with_dry > without);
    }

    #[test]
    fn output_stays_bounded_with_hot_input() -> anyhow::Result<()> {
        let controls = ControlSnapshot {
            drive: 1.0,
            level: 1.0,
            ..ControlSnapshot::default()
        };

        for topology in [Topology::Classic, Topology::Split] {
            let oversampling = topology.default_oversampling();
            let mut path = SignalPath::new(topology.layout(), SAMPLE_RATE, 256, oversampling)?;
            path.apply(&coefficients(&controls, oversampling));

            let mut signal = sine(SAMPLE_RATE as usize / 4, 220.0, 1.0);
            for block in signal.chunks_mut(256) {
                path.process(block, controls.level)?;
            }

            // Clipped feedback voltage is below a volt, plus the dry signal.
            let peak = signal.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(signal.iter().all(|s| s.is_finite()), "{topology}");
            assert!(peak < 3.0 && peak > 0.1, "{topology}: peak {peak}");
        }
        Ok(())
    }

    #[test]
    fn reset_silences_ringing_filters() -> anyhow::Result<()> {
        let mut path = SignalPath::new(Topology::Classic.layout(), SAMPLE_RATE, 64, 2)?;
        path.apply(&coefficients(&ControlSnapshot::default(), 2));

        let mut loud = vec![1.0f32; 64];
        path.process(&mut loud, 1.0)?;

        path.reset();
        let mut silent = vec![0.0f32; 64];
        path.process(&mut silent, 1.0)?;
        assert!(silent.iter().all(|&s| s == 0.0));
        Ok(())
    }
}
