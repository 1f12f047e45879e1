//! Low-level DSP primitives used by the voice layer.
//!
//! These components are allocation-free once constructed and realtime-safe,
//! making them safe to embed directly inside voice structs. They stay focused
//! on the signal-processing math; routing and lifecycle live in `synth`.

/// Digitally controlled amplifier: gain, velocity and pan.
pub mod dca;
/// Analog-style multi-segment envelope generator.
pub mod envelope;
/// State-variable filter and the stereo filter processor.
pub mod filter;
pub mod glide;
pub mod lfo;
pub mod modulate;
/// Oscillator waveforms and noise sources.
pub mod oscillator;
/// Process-wide read-only wave tables.
pub mod tables;
pub mod timer;
/// Hann and Hamming window envelopes.
pub mod window_eg;

pub use envelope::{EgContour, EgMode, EgParameters, EgState, EnvelopeGenerator};

pub const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
pub const MIN_SAMPLE_RATE: f32 = 1_000.0;
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// Clamp a sample rate into the supported range. NaN falls back to 48 kHz.
///
/// # Example
/// ```
/// use polycore::dsp::sanitize_sample_rate;
/// assert_eq!(sanitize_sample_rate(44_100.0), 44_100.0);
/// assert_eq!(sanitize_sample_rate(-1.0), 1_000.0);
/// assert_eq!(sanitize_sample_rate(f32::NAN), 48_000.0);
/// ```
#[inline]
pub fn sanitize_sample_rate(sample_rate: f32) -> f32 {
    if sample_rate.is_nan() {
        DEFAULT_SAMPLE_RATE
    } else {
        sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
    }
}
