//! Benchmarks for single voices built from patches.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polycore::dsp::envelope::EgParameters;
use polycore::dsp::filter::FilterParameters;
use polycore::dsp::lfo::LfoParameters;
use polycore::dsp::oscillator::{OscillatorParameters, OscillatorWaveform};
use polycore::synth::modulator::{ChildModulation, ModDestination, ModRoute};
use polycore::synth::params::{ModulatorParameters, VoiceParameters};
use polycore::{NoteContext, SynthVoice};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

/// One saw, one envelope, no filter
fn basic() -> VoiceParameters {
    VoiceParameters::default()
}

/// Two oscillators, filter envelope, vibrato and an LFO scaling the
/// amplitude envelope
fn modulated() -> VoiceParameters {
    VoiceParameters {
        oscillators: vec![
            OscillatorParameters::new(OscillatorWaveform::Saw),
            OscillatorParameters::new(OscillatorWaveform::Square),
        ],
        modulators: vec![
            ModulatorParameters::Lfo(LfoParameters::default()),
            ModulatorParameters::Envelope {
                params: EgParameters::adsr(5.0, 200.0, 0.7, 300.0),
                children: vec![ChildModulation::new(0, 0.3)],
            },
            ModulatorParameters::envelope(EgParameters::adsr(1.0, 400.0, 0.2, 300.0)),
        ],
        routes: vec![
            ModRoute::new(2, ModDestination::FilterCutoff, 24.0),
            ModRoute::new(0, ModDestination::Pitch, 0.2),
        ],
        filter: Some(FilterParameters::default()),
        output_eg: 1,
        ..VoiceParameters::default()
    }
}

pub fn bench_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/voices");

    for &size in BLOCK_SIZES {
        for (label, patch) in [("basic", basic()), ("modulated", modulated())] {
            let Ok(mut voice) = SynthVoice::from_parameters(&patch, SAMPLE_RATE) else {
                panic!("{label} patch failed to build");
            };
            voice.do_note_on(NoteContext::from_note(45, 100), 1);

            group.bench_with_input(BenchmarkId::new(label, size), &size, |b, &size| {
                b.iter(|| {
                    for _ in 0..size {
                        black_box(voice.render());
                    }
                })
            });
        }
    }

    group.finish();
}
