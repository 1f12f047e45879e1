use crate::dsp::modulate::semitones_to_ratio;
use crate::dsp::sanitize_sample_rate;
use crate::dsp::tables::WaveTables;
use crate::synth::component::{ModInputs, NoteContext, SynthOscillator};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
| waveform | source             | band-limiting        |
| -------- | ------------------ | -------------------- |
| sine     | shared table       | none needed          |
| saw      | phase ramp         | polyBLEP at the wrap |
| square   | phase comparison   | polyBLEP at both edges |
| triangle | folded phase ramp  | none (soft corners)  |
| noise    | xorshift32         | none                 |
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OscillatorWaveform {
    Sine,
    #[default]
    Saw,
    Square,
    Triangle,
    Noise,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorParameters {
    pub waveform: OscillatorWaveform,
    /// Output level, 0.0 to 1.0.
    pub level: f32,
    pub detune_cents: f32,
    pub octave: i8,
}

impl Default for OscillatorParameters {
    fn default() -> Self {
        Self {
            waveform: OscillatorWaveform::Saw,
            level: 1.0,
            detune_cents: 0.0,
            octave: 0,
        }
    }
}

impl OscillatorParameters {
    pub fn new(waveform: OscillatorWaveform) -> Self {
        Self {
            waveform,
            ..Self::default()
        }
    }
}

const NOISE_SEED: u32 = 0x9E37_79B9;

/// Synthesized (non-wavetable) oscillator. Sine comes from the shared table.
pub struct BasicOscillator {
    params: OscillatorParameters,
    tables: &'static WaveTables,
    sample_rate: f64,
    phase: f64,
    note_frequency: f32,
    rng: u32,
}

impl BasicOscillator {
    pub fn new(params: OscillatorParameters, sample_rate: f32) -> Self {
        Self {
            params,
            tables: WaveTables::global(),
            sample_rate: sanitize_sample_rate(sample_rate) as f64,
            phase: 0.0,
            note_frequency: 0.0,
            rng: NOISE_SEED,
        }
    }

    pub fn parameters(&self) -> &OscillatorParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: OscillatorParameters) {
        self.params = params;
    }

    fn next_noise(&mut self) -> f32 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

/// Polynomial band-limited step residual around a discontinuity at phase 0.
#[inline]
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

impl SynthOscillator for BasicOscillator {
    fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sanitize_sample_rate(sample_rate) as f64;
        self.phase = 0.0;
        self.rng = NOISE_SEED;
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        self.note_frequency = ctx.frequency;
        self.phase = 0.0;
    }

    fn render(&mut self, mods: &ModInputs) -> f32 {
        let semitones = mods.pitch_semitones
            + self.params.detune_cents / 100.0
            + 12.0 * self.params.octave as f32;
        let frequency = self.note_frequency * semitones_to_ratio(semitones);
        let dt = (frequency as f64 / self.sample_rate).clamp(0.0, 0.5);
        let p = self.phase;

        let value = match self.params.waveform {
            OscillatorWaveform::Sine => self.tables.sine(p),
            OscillatorWaveform::Saw => (2.0 * p - 1.0 - poly_blep(p, dt)) as f32,
            OscillatorWaveform::Square => {
                let naive = if p < 0.5 { 1.0 } else { -1.0 };
                (naive + poly_blep(p, dt) - poly_blep((p + 0.5) % 1.0, dt)) as f32
            }
            OscillatorWaveform::Triangle => (1.0 - 4.0 * (p - 0.5).abs()) as f32,
            OscillatorWaveform::Noise => self.next_noise(),
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        value * self.params.level
    }
}
