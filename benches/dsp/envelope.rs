//! Benchmarks for the envelope generator, per segment and mode.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polycore::dsp::envelope::{EgMode, EnvelopeGenerator};
use polycore::NoteContext;

use crate::{BLOCK_SIZES, SAMPLE_RATE};

fn gated(attack_ms: f64, mode: EgMode) -> EnvelopeGenerator {
    let mut eg = EnvelopeGenerator::adsr(attack_ms, 100.0, 0.7, 300.0, SAMPLE_RATE);
    eg.set_eg_mode(mode);
    eg.note_on(&NoteContext::from_note(60, 100));
    eg
}

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for (label, mode) in [("analog", EgMode::Analog), ("linear", EgMode::Linear)] {
            // Long attack so every iteration stays in the segment
            let mut eg = gated(60_000.0, mode);
            group.bench_with_input(
                BenchmarkId::new(format!("attack_{label}"), size),
                &size,
                |b, _| b.iter(|| eg.render(black_box(&mut buffer))),
            );
        }

        let mut eg = gated(0.0, EgMode::Analog);
        for _ in 0..20_000 {
            eg.next_sample();
        }
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| eg.render(black_box(&mut buffer)))
        });

        // Release restarts each pass so it never settles to OFF
        let mut eg = gated(0.0, EgMode::Analog);
        group.bench_with_input(BenchmarkId::new("release", size), &size, |b, _| {
            b.iter(|| {
                eg.note_on(&NoteContext::from_note(60, 100));
                eg.note_off();
                eg.render(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}
