pub mod bank;
pub mod layout;
pub mod path;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info, warn};
use serde::Serialize;

use crate::circuit::CircuitModel;
use crate::dsp::oversampler::SUPPORTED_FACTORS;
use crate::params::{ParamId, ParameterStore};

pub use bank::CircuitCoefficients;
pub use layout::{Layout, PostStage, Recombine, Topology};
pub use path::SignalPath;

/// Paths in flight between the control and audio threads, per direction.
const PATH_QUEUE: usize = 4;

/// Stream configuration handed to [`Pedal::prepare`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub input_channels: usize,
}

impl ProcessSpec {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            bail!("invalid sample rate: {}", self.sample_rate);
        }
        if self.max_block_size == 0 {
            bail!("maximum block size must be positive");
        }
        Ok(())
    }
}

/// Control-side description of the path to build on the next prepare.
#[derive(Debug, Clone)]
struct PathConfig {
    layout: Layout,
    oversampling: usize,
}

pub enum PedalMessage {
    SetPath(Box<SignalPath>),
}

/// Counters bumped on the audio thread instead of logging.
#[derive(Debug, Default)]
struct Diagnostics {
    rejected_networks: AtomicU64,
    resampler_failures: AtomicU64,
    sanitized_blocks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub rejected_networks: u64,
    pub resampler_failures: u64,
    pub sanitized_blocks: u64,
}

struct Shared {
    store: Arc<ParameterStore>,
    published: ArcSwap<CircuitCoefficients>,
    config: ArcSwap<PathConfig>,
    /// `f64` bits, zero while unprepared.
    sample_rate: AtomicU64,
    max_block: AtomicUsize,
    diagnostics: Diagnostics,
}

impl Shared {
    fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }
}

/// Audio-thread side of the overdrive.
///
/// Created together with a [`PedalHandle`] for the control thread. The
/// handle writes parameters and publishes derived coefficients; the pedal
/// picks both up at the start of every block.
pub struct Pedal {
    shared: Arc<Shared>,
    spec: Option<ProcessSpec>,
    path: Option<Box<SignalPath>>,
    /// Coefficients installed in `path`.
    current: CircuitCoefficients,
    rx_updates: Receiver<PedalMessage>,
    tx_retired: Sender<Box<SignalPath>>,
}

/// Control-thread side of a [`Pedal`].
pub struct PedalHandle {
    shared: Arc<Shared>,
    tx_updates: Sender<PedalMessage>,
    rx_retired: Receiver<Box<SignalPath>>,
    /// Swapped-out coefficient sets the audio thread may still hold. Only
    /// dropped once this is the last reference.
    superseded: Mutex<Vec<Arc<CircuitCoefficients>>>,
}

impl Pedal {
    pub fn new(
        store: Arc<ParameterStore>,
        topology: Topology,
        oversampling: usize,
    ) -> (Self, PedalHandle) {
        Self::with_layout(store, topology.layout(), oversampling)
    }

    pub fn with_layout(
        store: Arc<ParameterStore>,
        layout: Layout,
        oversampling: usize,
    ) -> (Self, PedalHandle) {
        let shared = Arc::new(Shared {
            store,
            published: ArcSwap::from_pointee(CircuitCoefficients::default()),
            config: ArcSwap::from_pointee(PathConfig {
                layout,
                oversampling,
            }),
            sample_rate: AtomicU64::new(0),
            max_block: AtomicUsize::new(0),
            diagnostics: Diagnostics::default(),
        });

        let (tx_updates, rx_updates) = bounded(PATH_QUEUE);
        let (tx_retired, rx_retired) = bounded(PATH_QUEUE);

        (
            Self {
                shared: Arc::clone(&shared),
                spec: None,
                path: None,
                current: CircuitCoefficients::default(),
                rx_updates,
                tx_retired,
            },
            PedalHandle {
                shared,
                tx_updates,
                rx_retired,
                superseded: Mutex::new(Vec::new()),
            },
        )
    }

    /// Validates `spec`, rebuilds the signal path for it, clears all state
    /// and installs freshly derived coefficients.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        spec.validate()?;

        let config = self.shared.config.load_full();
        config.layout.validate().context("invalid layout")?;
        let mut path = Box::new(
            SignalPath::new(
                config.layout.clone(),
                spec.sample_rate,
                spec.max_block_size,
                config.oversampling,
            )
            .context("failed to build signal path")?,
        );

        // Anything queued was built for the previous stream configuration.
        while self.rx_updates.try_recv().is_ok() {}

        self.shared
            .sample_rate
            .store(spec.sample_rate.to_bits(), Ordering::Release);
        self.shared
            .max_block
            .store(spec.max_block_size, Ordering::Release);

        let snapshot = self.shared.store.snapshot();
        let (coeffs, rejected) = self
            .current
            .derive(&snapshot, path.sample_rate(), path.drive_rate());
        if rejected > 0 {
            warn!("Rejected {rejected} coefficient sets while preparing");
            self.shared
                .diagnostics
                .rejected_networks
                .fetch_add(rejected as u64, Ordering::Relaxed);
        }

        path.reset();
        path.apply(&coeffs);
        self.shared.published.store(Arc::new(coeffs));
        self.current = coeffs;

        info!(
            "Prepared pedal: {} Hz, {} frame blocks, {} input channels, {}x oversampling, {} frames latency",
            spec.sample_rate,
            spec.max_block_size,
            spec.input_channels,
            path.oversampling(),
            path.latency()
        );

        self.path = Some(path);
        self.spec = Some(spec);
        Ok(())
    }

    /// Drops the block-sized buffers. Processing afterwards yields silence
    /// until the next [`Pedal::prepare`].
    pub fn release(&mut self) {
        if let Some(path) = self.path.take() {
            debug!("Released signal path with {} post stages", path.layout().post.len());
        }
        self.spec = None;
        self.shared.sample_rate.store(0, Ordering::Release);
        self.shared.max_block.store(0, Ordering::Release);
    }

    pub const fn spec(&self) -> Option<&ProcessSpec> {
        self.spec.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.path.is_some()
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.path.as_deref().map(SignalPath::layout)
    }

    pub fn oversampling(&self) -> Option<usize> {
        self.path.as_deref().map(SignalPath::oversampling)
    }

    /// Coefficients installed at the last processed block or prepare.
    pub const fn coefficients(&self) -> &CircuitCoefficients {
        &self.current
    }

    pub fn latency_samples(&self) -> usize {
        self.path.as_deref().map_or(0, SignalPath::latency)
    }

    /// Processes one block in place.
    ///
    /// Channel 0 is the input. Channels past the prepared input count are
    /// cleared, then channel 1 receives a copy of the processed channel 0.
    /// Any further input channels are passed through unprocessed.
    /// Never allocates, blocks or fails; the output is always finite.
    pub fn process(&mut self, channels: &mut [&mut [f32]]) {
        self.handle_messages();

        let (Some(spec), Some(path)) = (self.spec, self.path.as_deref_mut()) else {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
            return;
        };

        for channel in channels.iter_mut().skip(spec.input_channels) {
            channel.fill(0.0);
        }

        let len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel[len..].fill(0.0);
        }

        let Some((first, rest)) = channels.split_first_mut() else {
            return;
        };
        if len == 0 {
            return;
        }

        Self::refresh_coefficients(&self.shared, &mut self.current, path);
        let level = self.shared.store.level();
        let block = &mut first[..len];

        for chunk in block.chunks_mut(spec.max_block_size) {
            if path.process(chunk, level).is_err() {
                chunk.fill(0.0);
                self.shared
                    .diagnostics
                    .resampler_failures
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut sanitized = false;
        for sample in block.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
                sanitized = true;
            }
        }
        if sanitized {
            path.reset();
            self.shared
                .diagnostics
                .sanitized_blocks
                .fetch_add(1, Ordering::Relaxed);
        }

        let Some((second, others)) = rest.split_first_mut() else {
            return;
        };
        second[..len].copy_from_slice(block);

        // Extra input channels pass through, minus anything non-finite.
        for channel in others.iter_mut() {
            for sample in channel[..len].iter_mut() {
                if !sample.is_finite() {
                    *sample = 0.0;
                }
            }
        }
    }

    fn handle_messages(&mut self) {
        while let Ok(message) = self.rx_updates.try_recv() {
            match message {
                PedalMessage::SetPath(mut path) => {
                    let fits = self.spec.is_some_and(|spec| {
                        path.sample_rate() == spec.sample_rate
                            && path.max_block() == spec.max_block_size
                    });
                    if !fits {
                        let _ = self.tx_retired.try_send(path);
                        continue;
                    }

                    path.apply(&self.current);
                    if let Some(old) = self.path.replace(path) {
                        let _ = self.tx_retired.try_send(old);
                    }
                }
            }
        }
    }

    /// Brings `current` up to date with the store, preferring the published
    /// set and deriving in-line when it is stale.
    fn refresh_coefficients(
        shared: &Shared,
        current: &mut CircuitCoefficients,
        path: &mut SignalPath,
    ) {
        let generation = shared.store.generation();
        let base_rate = path.sample_rate();
        let drive_rate = path.drive_rate();

        if current.is_current(generation, base_rate, drive_rate) {
            return;
        }

        let published = **shared.published.load();
        let next = if published.is_current(generation, base_rate, drive_rate) {
            published
        } else {
            let (next, rejected) = current.derive(&shared.store.snapshot(), base_rate, drive_rate);
            if rejected > 0 {
                shared
                    .diagnostics
                    .rejected_networks
                    .fetch_add(rejected as u64, Ordering::Relaxed);
            }
            next
        };

        path.apply(&next);
        *current = next;
    }
}

impl PedalHandle {
    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.shared.store
    }

    pub fn set_parameter(&self, id: ParamId, value: f32) {
        self.shared.store.set_value(id, value);
        self.publish();
    }

    pub fn set_normalized(&self, id: ParamId, position: f32) {
        self.shared.store.set_normalized(id, position);
        self.publish();
    }

    pub fn set_model(&self, model: CircuitModel) {
        self.shared.store.set_model(model);
        self.publish();
    }

    /// Derives coefficients for the current store contents and publishes
    /// them for the audio thread. Does nothing while the pedal is unprepared.
    pub fn publish(&self) {
        self.collect_retired();

        let sample_rate = self.shared.sample_rate();
        if sample_rate <= 0.0 {
            return;
        }
        let oversampling = self.shared.config.load().oversampling;
        self.publish_for(sample_rate, sample_rate * oversampling as f64);
    }

    fn publish_for(&self, base_rate: f64, drive_rate: f64) -> CircuitCoefficients {
        let snapshot = self.shared.store.snapshot();
        let previous = **self.shared.published.load();
        let (coeffs, rejected) = previous.derive(&snapshot, base_rate, drive_rate);

        if rejected > 0 {
            warn!(
                "Kept previous coefficients for {rejected} networks (drive={}, tone={}, model={})",
                snapshot.drive, snapshot.tone, snapshot.model
            );
            self.shared
                .diagnostics
                .rejected_networks
                .fetch_add(rejected as u64, Ordering::Relaxed);
        }

        self.replace_published(coeffs);
        coeffs
    }

    fn replace_published(&self, coeffs: CircuitCoefficients) {
        let previous = self.shared.published.swap(Arc::new(coeffs));
        let mut superseded = self.superseded.lock().unwrap_or_else(PoisonError::into_inner);
        superseded.push(previous);
        superseded.retain(|set| Arc::strong_count(set) > 1);
    }

    #[cfg(test)]
    fn pending_superseded(&self) -> usize {
        self.superseded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn set_topology(&self, topology: Topology) -> Result<()> {
        let oversampling = self.shared.config.load().oversampling;
        self.set_layout(topology.layout(), oversampling)
    }

    pub fn set_oversampling(&self, oversampling: usize) -> Result<()> {
        let layout = self.shared.config.load().layout.clone();
        self.set_layout(layout, oversampling)
    }

    /// Replaces the signal path. When the pedal is prepared a new path is
    /// built here and handed to the audio thread, which swaps it in at the
    /// next block; otherwise it takes effect on the next prepare.
    pub fn set_layout(&self, layout: Layout, oversampling: usize) -> Result<()> {
        layout.validate()?;
        if !SUPPORTED_FACTORS.contains(&oversampling) {
            bail!("unsupported oversampling factor {oversampling}, expected one of {SUPPORTED_FACTORS:?}");
        }

        self.collect_retired();
        self.shared.config.store(Arc::new(PathConfig {
            layout: layout.clone(),
            oversampling,
        }));

        let sample_rate = self.shared.sample_rate();
        let max_block = self.shared.max_block.load(Ordering::Acquire);
        if sample_rate <= 0.0 || max_block == 0 {
            debug!("Pedal not prepared, layout change deferred");
            return Ok(());
        }

        let mut path = Box::new(SignalPath::new(layout, sample_rate, max_block, oversampling)?);
        let coeffs = self.publish_for(sample_rate, path.drive_rate());
        path.apply(&coeffs);

        match self.tx_updates.try_send(PedalMessage::SetPath(path)) {
            Ok(()) => {
                debug!("Sent new signal path ({oversampling}x oversampling)");
                Ok(())
            }
            Err(TrySendError::Full(_)) => bail!("audio thread has not picked up earlier path changes"),
            Err(TrySendError::Disconnected(_)) => bail!("pedal has been dropped"),
        }
    }

    /// Drops paths the audio thread has swapped out.
    pub fn collect_retired(&self) -> usize {
        let mut count = 0;
        while self.rx_retired.try_recv().is_ok() {
            count += 1;
        }
        if count > 0 {
            debug!("Dropped {count} retired signal paths");
        }
        count
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        let d = &self.shared.diagnostics;
        DiagnosticsSnapshot {
            rejected_networks: d.rejected_networks.load(Ordering::Relaxed),
            resampler_failures: d.resampler_failures.load(Ordering::Relaxed),
            sanitized_blocks: d.sanitized_blocks.load(Ordering::Relaxed),
        }
    }

    pub fn log_diagnostics(&self) {
        let stats = self.diagnostics();
        if stats == DiagnosticsSnapshot::default() {
            debug!("Pedal diagnostics: all clear");
        } else {
            warn!(
                "Pedal diagnostics: {} rejected networks, {} resampler failures, {} sanitized blocks",
                stats.rejected_networks, stats.resampler_failures, stats.sanitized_blocks
            );
        }
    }
}
