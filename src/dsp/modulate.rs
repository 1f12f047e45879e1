//! Modulation arithmetic shared by routes and processors.

/*
Parameter Modulation
====================

A modulator (envelope, LFO) moves a parameter of something else. Every route
in a voice reduces to one of two shapes:

  additive        final = base + modulator × depth
                  Pitch, filter cutoff and pan. Bipolar modulators push the
                  parameter both ways around the base.

  multiplicative  final = base × (1 - depth + depth × modulator)
                  Amplitude. The modulator must be unipolar (0 to 1). With
                  depth 0 the gain is untouched; with depth 1 the modulator
                  is the gain.

Pitch-like parameters are modulated in semitones, not Hz, so the same depth
sounds the same at every base frequency:

    ratio = 2^(semitones / 12)

    +12 st  ×2.0   (one octave up)
     +7 st  ×1.498 (a fifth)
    -12 st  ×0.5

Levels are set in decibels:

    gain = 10^(dB / 20)

      0 dB  ×1.0
     -6 dB  ×0.501
    -12 dB  ×0.251   (the default per-voice mix gain)
    -60 dB  ×0.001


Clamping
--------

Modulation can push parameters out of range: a cutoff of 200 Hz pulled down
four octaves is 12.5 Hz. The consumer clamps (the filter keeps cutoff in
[20 Hz, 0.45 × sample rate], pan stays in [-1, 1]).
*/

/// Calculate the modulated parameter value: base + (modulator × depth).
#[inline]
pub fn apply_modulation(base_value: f32, modulator: f32, depth: f32) -> f32 {
    base_value + (modulator * depth)
}

/// Multiplicative (amplitude-style) modulation with depth in [0, 1].
#[inline]
pub fn apply_gain_modulation(base_gain: f32, unipolar: f32, depth: f32) -> f32 {
    base_gain * (1.0 - depth + depth * unipolar)
}

/// Frequency ratio for a semitone offset.
///
/// # Example
/// ```
/// use polycore::dsp::modulate::semitones_to_ratio;
/// assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-6);
/// assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-6);
/// ```
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

/// Linear gain for a level in decibels.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
