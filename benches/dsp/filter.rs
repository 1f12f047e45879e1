//! Benchmarks for the state-variable filter processor.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polycore::dsp::filter::{FilterParameters, FilterProcessor, FilterType};
use polycore::synth::component::{ModInputs, SynthProcessor};
use polycore::StereoFrame;

use crate::{BLOCK_SIZES, SAMPLE_RATE};

pub fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/filter");

    for &size in BLOCK_SIZES {
        let input: Vec<f32> = (0..size)
            .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
            .collect();

        for (label, filter_type) in [("lowpass", FilterType::LowPass), ("notch", FilterType::Notch)] {
            let mut filter = FilterProcessor::new(
                FilterParameters {
                    filter_type,
                    cutoff_hz: 1_000.0,
                    resonance: 0.5,
                },
                SAMPLE_RATE,
            );
            let mods = ModInputs::default();
            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
                b.iter(|| {
                    for &x in &input {
                        black_box(filter.process(StereoFrame::mono(x), &mods));
                    }
                })
            });
        }

        // Cutoff moving every sample recomputes the coefficients
        let mut filter = FilterProcessor::new(FilterParameters::default(), SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("swept", size), &size, |b, _| {
            b.iter(|| {
                for (i, &x) in input.iter().enumerate() {
                    let mods = ModInputs {
                        cutoff_semitones: (i % 48) as f32,
                        ..ModInputs::default()
                    };
                    black_box(filter.process(StereoFrame::mono(x), &mods));
                }
            })
        });
    }

    group.finish();
}
