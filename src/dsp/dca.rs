//! Digitally controlled amplifier.
//!
//! Last processor in every voice. Applies a static gain in dB, MIDI velocity
//! and an equal-power pan. Envelope amplitude is applied by the voice itself,
//! after every processor.

use std::f32::consts::FRAC_PI_4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::modulate::db_to_gain;
use crate::io::converter::velocity_to_gain;
use crate::synth::component::{ModInputs, NoteContext, StereoFrame, SynthProcessor};

pub const MIN_GAIN_DB: f32 = -60.0;
pub const MAX_GAIN_DB: f32 = 12.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DcaParameters {
    pub gain_db: f32,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    pub velocity_sensitive: bool,
}

impl Default for DcaParameters {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            pan: 0.0,
            velocity_sensitive: true,
        }
    }
}

/// Equal-power pan gains for a position in [-1, 1].
///
/// # Example
/// ```
/// use polycore::dsp::dca::pan_gains;
/// let (l, r) = pan_gains(-1.0);
/// assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
/// ```
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

pub struct Dca {
    params: DcaParameters,
    gain: f32,
    velocity_gain: f32,
}

impl Dca {
    pub fn new(params: DcaParameters) -> Self {
        let gain = db_to_gain(params.gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB));
        Self {
            params,
            gain,
            velocity_gain: 1.0,
        }
    }

    pub fn parameters(&self) -> &DcaParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: DcaParameters) {
        *self = Self {
            velocity_gain: self.velocity_gain,
            ..Self::new(params)
        };
    }
}

impl Default for Dca {
    fn default() -> Self {
        Self::new(DcaParameters::default())
    }
}

impl SynthProcessor for Dca {
    fn reset(&mut self, _sample_rate: f32) {
        self.velocity_gain = 1.0;
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        self.velocity_gain = if self.params.velocity_sensitive {
            velocity_to_gain(ctx.velocity)
        } else {
            1.0
        };
    }

    fn process(&mut self, input: StereoFrame, mods: &ModInputs) -> StereoFrame {
        let gain = self.gain * self.velocity_gain;
        let (left, right) = pan_gains(self.params.pan + mods.pan);
        StereoFrame::new(input.left * gain * left, input.right * gain * right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_pan_is_equal_power() {
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn velocity_and_pan_scale_output() {
        let mut dca = Dca::new(DcaParameters {
            pan: 0.5,
            ..DcaParameters::default()
        });
        dca.note_on(&NoteContext::from_note(60, 127));

        let mods = ModInputs {
            pan: 0.5,
            ..ModInputs::default()
        };
        let out = dca.process(StereoFrame::mono(1.0), &mods);
        assert!(out.left.abs() < 1e-6);
        assert!((out.right - 1.0).abs() < 1e-6);

        dca.note_on(&NoteContext::from_note(60, 64));
        let quieter = dca.process(StereoFrame::mono(1.0), &mods);
        assert!(quieter.right < 0.3);
    }

    #[test]
    fn velocity_insensitive_ignores_velocity() {
        let mut dca = Dca::new(DcaParameters {
            velocity_sensitive: false,
            pan: -1.0,
            ..DcaParameters::default()
        });
        dca.note_on(&NoteContext::from_note(60, 1));
        let out = dca.process(StereoFrame::mono(1.0), &ModInputs::default());
        assert!((out.left - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gain_is_clamped() {
        let dca = Dca::new(DcaParameters {
            gain_db: 100.0,
            ..DcaParameters::default()
        });
        assert!((dca.gain - db_to_gain(MAX_GAIN_DB)).abs() < 1e-6);
    }
}
