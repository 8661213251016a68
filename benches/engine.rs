//! Sustained block production through the offline backend.

use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};

use velours::device::OfflineBackend;
use velours::report::NullReporter;
use velours::{Engine, EngineConfig, SampleData, Voice};

const BLOCKS: usize = 64;
const RING: usize = 4;

fn saw(len: usize) -> Vec<f64> {
    (0..len).map(|n| (n % 100) as f64 / 50.0 - 1.0).collect()
}

fn mix_throughput(c: &mut Criterion) {
    let stream = saw(48_000);

    c.bench_function("mix_64_blocks_4_looping_voices", |b| {
        b.iter(|| {
            let backend = OfflineBackend::with_budget(BLOCKS - RING);
            let engine = Engine::with_backend(
                EngineConfig::new()
                    .with_channels(2)
                    .with_block_count(RING)
                    .with_block_samples(512),
                &backend,
                Arc::new(NullReporter),
            )
            .unwrap();

            let voices: Vec<Voice> = (0..4)
                .map(|_| {
                    let voice = Voice::from_data(
                        &engine,
                        SampleData {
                            samples: stream.clone(),
                            sample_rate: 48_000,
                            channels: 2,
                            bits_per_sample: 16,
                        },
                    );
                    voice.looped().play();
                    voice
                })
                .collect();

            while backend.block_count() < BLOCKS {
                thread::yield_now();
            }
            drop(voices);
            drop(engine);
            backend.block_count()
        })
    });
}

criterion_group!(benches, mix_throughput);
criterion_main!(benches);
