//! Low Frequency Oscillator (LFO) modulator.

use std::f64::consts::TAU;

use crate::dsp::sanitize_sample_rate;
use crate::dsp::timer::SampleTimer;
use crate::synth::component::{ModOutput, Modulator, NoteContext};
use crate::synth::modulator::ModBus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Low Frequency Oscillators
=========================

An LFO is an oscillator running below hearing (roughly 0.02 Hz to 20 Hz) whose
output moves a parameter instead of making sound. Inside a voice it is just
another modulator slot: envelopes and routes read it from the mod bus.

Vocabulary
----------

  bipolar       Output swings -1.0 to +1.0. Natural for vibrato and auto-pan.

  unipolar      Output stays in 0.0 to 1.0. What amplitude routes and
                envelope child routes read. unipolar = (bipolar + 1) / 2

  phase         Position in the cycle, 0.0 to 1.0.

  delay         Time after note-on before the LFO starts moving.

  fade-in       Time over which depth ramps from 0 to full after the delay.


Modes
-----

    Sync       Phase resets to 0 on every note-on. Same shape every note.
    OneShot    Like Sync, but stops after one cycle (a cheap extra envelope).
    FreeRun    Phase ignores note-on. Each note catches the LFO wherever it is.


Shapes
------

    Sine          smooth
    Triangle      constant slope
    RampUp        ╱╱╱╱
    RampDown      ╲╲╲╲
    Square        hard switch
    SampleHold    random step once per cycle
    QuasiRandomSampleHold
                  pseudo-noise step once per cycle
    Noise         white noise, a new value every sample
    QuasiRandomNoise
                  pseudo-noise sequence, a new value every sample

The quasi-random shapes read a 32-bit linear feedback shift register (taps 0,
1, 27, 28) instead of the white noise generator. The sequence repeats exactly
from the seed, so two voices with the same patch move identically.


Outputs on the mod bus
----------------------

    normal     bipolar value × amplitude × fade-in
    unipolar   unipolar-from-max: rests at 1.0 and dips by the depth, so an
               amplitude route gives tremolo without lowering the peak level
    biased     -normal (inverted copy)
*/

/// Convert bipolar signal (-1.0 to +1.0) to unipolar (0.0 to 1.0).
#[inline]
pub fn bipolar_to_unipolar(bipolar: f32) -> f32 {
    (bipolar + 1.0) * 0.5
}

/// Convert unipolar signal (0.0 to 1.0) to bipolar (-1.0 to +1.0).
#[inline]
pub fn unipolar_to_bipolar(unipolar: f32) -> f32 {
    (unipolar * 2.0) - 1.0
}

/// Calculate samples per LFO period.
///
/// # Example
/// ```
/// use polycore::dsp::lfo::samples_per_period;
/// let samples = samples_per_period(5.0, 48000.0);
/// assert_eq!(samples, 9600.0); // 5 Hz at 48kHz = 9600 samples
/// ```
#[inline]
pub fn samples_per_period(frequency_hz: f32, sample_rate: f32) -> f32 {
    sample_rate / frequency_hz
}

pub const MIN_LFO_HZ: f32 = 0.02;
pub const MAX_LFO_HZ: f32 = 20.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoWaveform {
    #[default]
    Sine,
    Triangle,
    RampUp,
    RampDown,
    Square,
    SampleHold,
    QuasiRandomSampleHold,
    Noise,
    QuasiRandomNoise,
}

impl LfoWaveform {
    fn holds_per_cycle(self) -> bool {
        matches!(self, LfoWaveform::SampleHold | LfoWaveform::QuasiRandomSampleHold)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoMode {
    #[default]
    Sync,
    OneShot,
    FreeRun,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LfoParameters {
    pub waveform: LfoWaveform,
    pub mode: LfoMode,
    pub frequency_hz: f32,
    /// Output depth, 0.0 to 1.0.
    pub amplitude: f32,
    pub delay_ms: f64,
    pub fade_in_ms: f64,
}

impl Default for LfoParameters {
    fn default() -> Self {
        Self {
            waveform: LfoWaveform::Sine,
            mode: LfoMode::Sync,
            frequency_hz: 5.0,
            amplitude: 1.0,
            delay_ms: 0.0,
            fade_in_ms: 0.0,
        }
    }
}

impl LfoParameters {
    pub fn sanitized(&self) -> Self {
        let frequency_hz = if self.frequency_hz.is_nan() {
            MIN_LFO_HZ
        } else {
            self.frequency_hz.clamp(MIN_LFO_HZ, MAX_LFO_HZ)
        };
        let time = |ms: f64| if ms.is_nan() { 0.0 } else { ms.clamp(0.0, 60_000.0) };

        Self {
            frequency_hz,
            amplitude: if self.amplitude.is_nan() {
                0.0
            } else {
                self.amplitude.clamp(0.0, 1.0)
            },
            delay_ms: time(self.delay_ms),
            fade_in_ms: time(self.fade_in_ms),
            ..self.clone()
        }
    }
}

pub struct Lfo {
    params: LfoParameters,
    sample_rate: f64,
    phase: f64,
    phase_inc: f64,
    delay_timer: SampleTimer,
    fade_timer: SampleTimer,
    running: bool,
    held: f32,
    rng: u32,
    pn_register: u32,
}

const PN_SEED: u32 = 0x0F0F_1357;

/// One step of the pseudo-noise shift register, mapped to -1.0..1.0.
#[inline]
fn pn_sequence(register: &mut u32) -> f32 {
    let r = *register;
    let feedback = (r ^ (r >> 1) ^ (r >> 27) ^ (r >> 28)) & 1;
    *register = (r >> 1) | (feedback << 31);
    (2.0 * (*register as f64 / 4_294_967_296.0) - 1.0) as f32
}

impl Lfo {
    pub fn new(params: LfoParameters, sample_rate: f32) -> Self {
        let mut lfo = Self {
            params: params.sanitized(),
            sample_rate: sanitize_sample_rate(sample_rate) as f64,
            phase: 0.0,
            phase_inc: 0.0,
            delay_timer: SampleTimer::default(),
            fade_timer: SampleTimer::default(),
            running: true,
            held: 0.0,
            rng: 0x1234_5678,
            pn_register: PN_SEED,
        };
        lfo.recalculate();
        lfo
    }

    pub fn parameters(&self) -> &LfoParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: LfoParameters) {
        self.params = params.sanitized();
        self.recalculate();
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    fn recalculate(&mut self) {
        self.phase_inc = self.params.frequency_hz as f64 / self.sample_rate;
        self.delay_timer
            .set_target_ms(self.params.delay_ms, self.sample_rate);
        self.fade_timer
            .set_target_ms(self.params.fade_in_ms, self.sample_rate);
    }

    fn next_random(&mut self) -> f32 {
        // xorshift32
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    fn next_pn(&mut self) -> f32 {
        pn_sequence(&mut self.pn_register)
    }

    fn next_held(&mut self) -> f32 {
        match self.params.waveform {
            LfoWaveform::QuasiRandomSampleHold => self.next_pn(),
            _ => self.next_random(),
        }
    }

    fn waveform_value(&mut self) -> f32 {
        let p = self.phase;
        let value = match self.params.waveform {
            LfoWaveform::Sine => (TAU * p).sin(),
            LfoWaveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            LfoWaveform::RampUp => 2.0 * p - 1.0,
            LfoWaveform::RampDown => 1.0 - 2.0 * p,
            LfoWaveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleHold | LfoWaveform::QuasiRandomSampleHold => return self.held,
            LfoWaveform::Noise => return self.next_random(),
            LfoWaveform::QuasiRandomNoise => return self.next_pn(),
        };
        value as f32
    }

    fn fade_gain(&self) -> f32 {
        let target = self.fade_timer.target();
        if target == 0 {
            1.0
        } else {
            (self.fade_timer.ticks() as f32 / target as f32).min(1.0)
        }
    }

    /// Next bipolar sample, including amplitude, delay and fade-in.
    pub fn next_sample(&mut self) -> f32 {
        let (raw, depth) = self.tick();
        raw * depth
    }

    /// Advance one sample. Returns the raw waveform and the current depth.
    fn tick(&mut self) -> (f32, f32) {
        if !self.delay_timer.expired() {
            self.delay_timer.advance();
            return (0.0, 0.0);
        }
        if !self.running {
            return (0.0, 0.0);
        }

        let value = self.waveform_value();
        let depth = self.params.amplitude * self.fade_gain();
        self.fade_timer.advance();

        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            if self.params.waveform.holds_per_cycle() {
                self.held = self.next_held();
            }
            if self.params.mode == LfoMode::OneShot {
                self.running = false;
            }
        }

        (value, depth)
    }
}

impl Modulator for Lfo {
    fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sanitize_sample_rate(sample_rate) as f64;
        self.recalculate();
        self.phase = 0.0;
        self.running = true;
        self.delay_timer.reset();
        self.fade_timer.reset();
    }

    fn note_on(&mut self, _ctx: &NoteContext) {
        if self.params.mode != LfoMode::FreeRun {
            self.phase = 0.0;
        }
        if self.params.waveform.holds_per_cycle() {
            self.held = self.next_held();
        }
        self.running = true;
        self.delay_timer.reset();
        self.fade_timer.reset();
    }

    fn note_off(&mut self, _ctx: &NoteContext) {}

    fn render_modulator_output(&mut self, _bus: &ModBus) -> ModOutput {
        let (raw, depth) = self.tick();
        let normal = raw * depth;
        ModOutput {
            normal,
            unipolar: 1.0 - depth * (1.0 - bipolar_to_unipolar(raw)),
            biased: -normal,
        }
    }
}
