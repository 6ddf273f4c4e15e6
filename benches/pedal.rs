use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use screamer::params::{ControlSnapshot, ParamId, ParameterStore};
use screamer::pedal::{Pedal, ProcessSpec, Topology};
use std::hint::black_box;
use std::sync::Arc;

mod common;
use common::{BUFFER_SIZE, SAMPLE_RATE, prepared_pedal, test_signal};

fn bench_topologies(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pedal Block Processing");
    group.throughput(Throughput::Elements(BUFFER_SIZE as u64));

    for topology in [Topology::Classic, Topology::Split] {
        for &oversampling in &[1, 2, 4, 8] {
            group.bench_with_input(
                BenchmarkId::new(topology.to_string(), format!("{oversampling}x")),
                &oversampling,
                |b, &oversampling| {
                    let mut pedal = prepared_pedal(topology, oversampling);
                    let input = test_signal(BUFFER_SIZE);
                    let mut left = input.clone();
                    let mut right = vec![0.0f32; BUFFER_SIZE];

                    b.iter(|| {
                        left.copy_from_slice(&input);
                        pedal.process(black_box(&mut [&mut left[..], &mut right[..]]));
                        black_box(&right);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_automation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parameter Automation");

    group.bench_function("in-line derivation per block", |b| {
        let store = Arc::new(ParameterStore::new(ControlSnapshot::default()));
        let (mut pedal, _handle) = Pedal::new(Arc::clone(&store), Topology::Classic, 2);
        pedal
            .prepare(ProcessSpec {
                sample_rate: SAMPLE_RATE,
                max_block_size: BUFFER_SIZE,
                input_channels: 1,
            })
            .unwrap();

        let input = test_signal(BUFFER_SIZE);
        let mut left = input.clone();
        let mut right = vec![0.0f32; BUFFER_SIZE];
        let mut drive = 0.0f32;

        b.iter(|| {
            drive = (drive + 0.01) % 1.0;
            store.set_value(ParamId::Drive, drive);
            left.copy_from_slice(&input);
            pedal.process(black_box(&mut [&mut left[..], &mut right[..]]));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_topologies, bench_automation);
criterion_main!(benches);
