use std::ops::{Add, AddAssign, Mul};

use crate::io::converter::note_to_freq;
use crate::synth::modulator::ModBus;

/// Note data handed to every component at note-on and note-off.
///
/// This is transient input: components copy what they need and never keep a
/// reference back to the voice or engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteContext {
    pub note: u8,
    pub velocity: u8,
    /// Pitch in Hz, including master tuning and unison detune.
    pub frequency: f32,
    /// Previously played note, the starting point of a portamento slide.
    pub glide_from: Option<u8>,
}

impl NoteContext {
    pub fn from_note(note: u8, velocity: u8) -> Self {
        Self::tuned(note, velocity, 0.0)
    }

    /// Build a context with a tuning offset in cents.
    pub fn tuned(note: u8, velocity: u8, cents: f32) -> Self {
        let note = note.min(127);
        Self {
            note,
            velocity: velocity.min(127),
            frequency: note_to_freq(note, cents),
            glide_from: None,
        }
    }

    pub fn with_glide_from(self, glide_from: Option<u8>) -> Self {
        Self {
            glide_from: glide_from.map(|note| note.min(127)),
            ..self
        }
    }
}

/// One stereo output sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub const SILENCE: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn mono(sample: f32) -> Self {
        Self {
            left: sample,
            right: sample,
        }
    }

    /// Equal-weight downmix.
    pub fn to_mono(self) -> f32 {
        0.5 * (self.left + self.right)
    }

    pub fn is_silent(self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

impl Add for StereoFrame {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for StereoFrame {
    type Output = Self;

    fn mul(self, gain: f32) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }
}

/// Per-sample output of a modulator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModOutput {
    /// Envelopes: level in [0, 1] (after child modulation). LFOs: bipolar value.
    pub normal: f32,
    /// Always in [0, 1]; what amplitude destinations and child routes read.
    pub unipolar: f32,
    /// Envelopes: level minus sustain, so a pitch route lands on the played
    /// note during SUSTAIN. LFOs: inverted output.
    pub biased: f32,
}

/// Modulation values for one sample, resolved by the voice's routing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModInputs {
    /// Product of all amplitude routes. 1.0 when nothing is routed.
    pub amplitude: f32,
    /// Pitch offset in semitones, including pitch bend.
    pub pitch_semitones: f32,
    /// Filter cutoff offset in semitones.
    pub cutoff_semitones: f32,
    /// Pan offset in [-1, 1].
    pub pan: f32,
}

impl Default for ModInputs {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            pitch_semitones: 0.0,
            cutoff_semitones: 0.0,
            pan: 0.0,
        }
    }
}

/// A control-signal source owned by a voice (envelope, LFO).
pub trait Modulator: Send {
    /// Set the sample rate and return to the idle state.
    fn reset(&mut self, sample_rate: f32);

    fn note_on(&mut self, ctx: &NoteContext);

    fn note_off(&mut self, ctx: &NoteContext);

    /// Advance one sample. `bus` holds this tick's outputs of the slots
    /// rendered before this one.
    fn render_modulator_output(&mut self, bus: &ModBus) -> ModOutput;
}

/// Sound source collaborator. The voice only depends on this capability set.
pub trait SynthOscillator: Send {
    fn reset(&mut self, sample_rate: f32);

    /// Triggered when a note starts
    fn note_on(&mut self, _ctx: &NoteContext) {
        // Default: do nothing
    }

    /// Most oscillators ignore note-off.
    fn note_off(&mut self, _ctx: &NoteContext) {}

    fn render(&mut self, mods: &ModInputs) -> f32;
}

/// Signal processor collaborator (filter, amplifier).
pub trait SynthProcessor: Send {
    fn reset(&mut self, sample_rate: f32);

    fn note_on(&mut self, _ctx: &NoteContext) {}

    fn note_off(&mut self, _ctx: &NoteContext) {}

    fn process(&mut self, input: StereoFrame, mods: &ModInputs) -> StereoFrame;
}

impl<T: SynthOscillator + ?Sized> SynthOscillator for Box<T> {
    fn reset(&mut self, sample_rate: f32) {
        (**self).reset(sample_rate)
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        (**self).note_on(ctx)
    }

    fn note_off(&mut self, ctx: &NoteContext) {
        (**self).note_off(ctx)
    }

    fn render(&mut self, mods: &ModInputs) -> f32 {
        (**self).render(mods)
    }
}

impl<T: SynthProcessor + ?Sized> SynthProcessor for Box<T> {
    fn reset(&mut self, sample_rate: f32) {
        (**self).reset(sample_rate)
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        (**self).note_on(ctx)
    }

    fn note_off(&mut self, ctx: &NoteContext) {
        (**self).note_off(ctx)
    }

    fn process(&mut self, input: StereoFrame, mods: &ModInputs) -> StereoFrame {
        (**self).process(input, mods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_context_clamps_midi_range() {
        let ctx = NoteContext::from_note(200, 255);
        assert_eq!(ctx.note, 127);
        assert_eq!(ctx.velocity, 127);
    }

    #[test]
    fn a4_is_440() {
        let ctx = NoteContext::from_note(69, 100);
        assert!((ctx.frequency - 440.0).abs() < 1e-3);
    }

    #[test]
    fn frame_arithmetic() {
        let mut acc = StereoFrame::SILENCE;
        acc += StereoFrame::new(0.5, -0.5) * 0.5;
        acc += StereoFrame::mono(0.25);
        assert_eq!(acc, StereoFrame::new(0.5, 0.0));
        assert!((acc.to_mono() - 0.25).abs() < 1e-6);
    }
}
