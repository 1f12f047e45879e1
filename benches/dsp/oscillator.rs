//! Benchmarks for oscillator waveforms.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polycore::dsp::oscillator::{BasicOscillator, OscillatorParameters, OscillatorWaveform};
use polycore::synth::component::{ModInputs, SynthOscillator};
use polycore::NoteContext;

use crate::{BLOCK_SIZES, SAMPLE_RATE};

const WAVEFORMS: [(&str, OscillatorWaveform); 5] = [
    ("sine", OscillatorWaveform::Sine),
    ("saw", OscillatorWaveform::Saw),
    ("square", OscillatorWaveform::Square),
    ("triangle", OscillatorWaveform::Triangle),
    ("noise", OscillatorWaveform::Noise),
];

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");
    let mods = ModInputs::default();

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for (label, waveform) in WAVEFORMS {
            let mut osc = BasicOscillator::new(OscillatorParameters::new(waveform), SAMPLE_RATE);
            osc.note_on(&NoteContext::from_note(69, 100));

            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, _| {
                b.iter(|| {
                    for sample in buffer.iter_mut() {
                        *sample = osc.render(black_box(&mods));
                    }
                })
            });
        }
    }

    group.finish();
}
