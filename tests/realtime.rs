use anyhow::Result;
use assert_no_alloc::{AllocDisabler, assert_no_alloc};
use screamer::params::{ControlSnapshot, ParamId, ParameterStore};
use screamer::pedal::{Pedal, ProcessSpec, Topology};
use std::sync::Arc;

#[global_allocator]
static A: AllocDisabler = AllocDisabler;

const SAMPLE_RATE: f64 = 48_000.0;
const BUFFER_SIZE: usize = 256;

#[test]
fn process_does_not_allocate_after_warm_up() -> Result<()> {
    for topology in [Topology::Classic, Topology::Split] {
        for oversampling in [1, 2, 8] {
            let store = Arc::new(ParameterStore::new(ControlSnapshot::default()));
            let (mut pedal, handle) = Pedal::new(Arc::clone(&store), topology, oversampling);
            pedal.prepare(ProcessSpec {
                sample_rate: SAMPLE_RATE,
                max_block_size: BUFFER_SIZE,
                input_channels: 1,
            })?;

            let input: Vec<f32> = (0..BUFFER_SIZE * 3)
                .map(|i| (i as f32 * 0.05).sin() * 0.5)
                .collect();
            let mut left = input.clone();
            let mut right = vec![0.0f32; input.len()];

            // Warm-up block.
            pedal.process(&mut [&mut left[..BUFFER_SIZE], &mut right[..BUFFER_SIZE]]);

            for step in 0..16 {
                // Automation straight into the store: derived in-line.
                store.set_value(ParamId::Drive, step as f32 / 16.0);
                // Through the handle: published from this thread, outside the check.
                handle.set_parameter(ParamId::Tone, 1.0 - step as f32 / 16.0);
                store.set_value(ParamId::Level, 0.5);

                left.copy_from_slice(&input);
                assert_no_alloc(|| {
                    // Longer than the prepared block size on purpose.
                    pedal.process(&mut [&mut left[..], &mut right[..]]);
                });
            }

            assert!(left.iter().all(|s| s.is_finite()), "{topology} {oversampling}x");
        }
    }
    Ok(())
}

#[test]
fn path_swap_does_not_allocate_on_the_audio_thread() -> Result<()> {
    let store = Arc::new(ParameterStore::default());
    let (mut pedal, handle) = Pedal::new(store, Topology::Classic, 2);
    pedal.prepare(ProcessSpec {
        sample_rate: SAMPLE_RATE,
        max_block_size: BUFFER_SIZE,
        input_channels: 1,
    })?;

    let mut left = vec![0.1f32; BUFFER_SIZE];
    let mut right = vec![0.0f32; BUFFER_SIZE];
    pedal.process(&mut [&mut left[..], &mut right[..]]);

    handle.set_topology(Topology::Split)?;
    assert_no_alloc(|| {
        pedal.process(&mut [&mut left[..], &mut right[..]]);
    });

    assert_eq!(pedal.layout(), Some(&Topology::Split.layout()));
    assert_eq!(handle.collect_retired(), 1);
    Ok(())
}
