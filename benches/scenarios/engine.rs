//! Benchmarks for full engine blocks: many voices, and steal churn.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polycore::{EngineConfig, SynthEngine};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

fn engine(voices: usize) -> SynthEngine {
    let config = EngineConfig {
        sample_rate: SAMPLE_RATE,
        ..EngineConfig::with_voices(voices)
    };
    match SynthEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => panic!("engine failed to build: {err}"),
    }
}

pub fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/engine");

    for &size in BLOCK_SIZES {
        let mut left = vec![0.0f32; size];
        let mut right = vec![0.0f32; size];

        // Every voice of a 16-voice pool sounding
        let mut full = engine(16);
        for note in 48..64 {
            full.note_on(note, 100);
        }
        group.bench_with_input(BenchmarkId::new("16_voices", size), &size, |b, _| {
            b.iter(|| full.render_block(black_box(&mut left), black_box(&mut right)))
        });

        // A new note each block on a full pool: every block steals
        let mut churn = engine(8);
        for note in 40..48 {
            churn.note_on(note, 100);
        }
        let mut next = 48u8;
        group.bench_with_input(BenchmarkId::new("steal_churn", size), &size, |b, _| {
            b.iter(|| {
                churn.note_on(next, 100);
                next = if next >= 96 { 48 } else { next + 1 };
                churn.render_block(black_box(&mut left), black_box(&mut right));
            })
        });
    }

    group.finish();
}
