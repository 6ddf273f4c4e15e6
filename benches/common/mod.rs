use screamer::params::{ControlSnapshot, ParameterStore};
use screamer::pedal::{Pedal, ProcessSpec, Topology};
use std::sync::Arc;

pub const SAMPLE_RATE: f64 = 48_000.0;
pub const BUFFER_SIZE: usize = 128;

pub fn test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

#[allow(dead_code)]
pub fn prepared_pedal(topology: Topology, oversampling: usize) -> Pedal {
    let store = Arc::new(ParameterStore::new(ControlSnapshot::default()));
    let (mut pedal, _handle) = Pedal::new(store, topology, oversampling);
    pedal
        .prepare(ProcessSpec {
            sample_rate: SAMPLE_RATE,
            max_block_size: BUFFER_SIZE,
            input_channels: 1,
        })
        .unwrap();
    pedal
}
