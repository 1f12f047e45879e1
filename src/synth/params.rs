//! Engine and patch configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::dca::DcaParameters;
use crate::dsp::envelope::EgParameters;
use crate::dsp::filter::FilterParameters;
use crate::dsp::lfo::LfoParameters;
use crate::dsp::oscillator::OscillatorParameters;
use crate::dsp::window_eg::WindowEgParameters;
use crate::dsp::{sanitize_sample_rate, DEFAULT_SAMPLE_RATE};
use crate::synth::modulator::{ChildModulation, ModRoute};
use crate::synth::scheduler::DEFAULT_EVENT_CAPACITY;

pub const MIN_MASTER_DB: f32 = -60.0;
pub const MAX_MASTER_DB: f32 = 12.0;
pub const MAX_UNISON_VOICES: usize = 4;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthMode {
    /// One voice, last-note priority, legato retrigger.
    Mono,
    #[default]
    Poly,
    /// Every note plays on up to four detuned, spread voices.
    Unison,
}

/// Victim selection among busy voices. Voices already in release or
/// shutdown are always preferred; the policy orders within a group.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StealPolicy {
    /// Smallest note-on timestamp.
    #[default]
    OldestNote,
    /// Most rendered ticks since note-on.
    LongestActive,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ModulatorParameters {
    Envelope {
        params: EgParameters,
        children: Vec<ChildModulation>,
    },
    Lfo(LfoParameters),
    Window(WindowEgParameters),
}

impl ModulatorParameters {
    pub fn envelope(params: EgParameters) -> Self {
        ModulatorParameters::Envelope {
            params,
            children: Vec::new(),
        }
    }
}

/// Patch for one voice. Every voice in the pool is built from the same one.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParameters {
    pub oscillators: Vec<OscillatorParameters>,
    /// Rendered in order. A slot may only read slots before it.
    pub modulators: Vec<ModulatorParameters>,
    pub routes: Vec<ModRoute>,
    pub filter: Option<FilterParameters>,
    pub dca: DcaParameters,
    /// Envelope whose return to OFF frees the voice. It is always wired to
    /// the voice amplitude.
    pub output_eg: usize,
    /// Portamento from the previously played note. 0 disables it.
    pub glide_ms: f64,
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            oscillators: vec![OscillatorParameters::default()],
            modulators: vec![ModulatorParameters::envelope(EgParameters::default())],
            routes: Vec::new(),
            filter: None,
            dca: DcaParameters::default(),
            output_eg: 0,
            glide_ms: 0.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub max_voices: usize,
    pub mode: SynthMode,
    pub steal_policy: StealPolicy,
    /// Mix gain applied to every voice. 0.25 is -12 dB.
    pub voice_gain: f32,
    pub master_volume_db: f32,
    pub pitch_bend_range: f32,
    pub master_tuning_cents: f32,
    pub unison_detune_cents: f32,
    /// Scheduler slots for timestamped messages.
    pub event_capacity: usize,
    pub voice: VoiceParameters,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_voices: 16,
            mode: SynthMode::Poly,
            steal_policy: StealPolicy::OldestNote,
            voice_gain: 0.25,
            master_volume_db: 0.0,
            pitch_bend_range: 7.0,
            master_tuning_cents: 0.0,
            unison_detune_cents: 10.0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            voice: VoiceParameters::default(),
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

impl EngineConfig {
    pub fn with_voices(max_voices: usize) -> Self {
        Self {
            max_voices,
            ..Self::default()
        }
    }

    /// Clamp numeric fields into range. Voice capacity is not touched; zero
    /// voices is an error, not something to paper over.
    pub fn sanitized(&self) -> Self {
        Self {
            sample_rate: sanitize_sample_rate(self.sample_rate),
            voice_gain: finite_or(self.voice_gain, 0.25).clamp(0.0, 1.0),
            master_volume_db: finite_or(self.master_volume_db, 0.0)
                .clamp(MIN_MASTER_DB, MAX_MASTER_DB),
            pitch_bend_range: finite_or(self.pitch_bend_range, 7.0).clamp(0.0, 48.0),
            master_tuning_cents: finite_or(self.master_tuning_cents, 0.0).clamp(-100.0, 100.0),
            unison_detune_cents: finite_or(self.unison_detune_cents, 0.0).clamp(0.0, 100.0),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_ranges() {
        let config = EngineConfig {
            sample_rate: 0.0,
            master_volume_db: 40.0,
            voice_gain: f32::NAN,
            ..EngineConfig::default()
        }
        .sanitized();

        assert_eq!(config.sample_rate, crate::dsp::MIN_SAMPLE_RATE);
        assert_eq!(config.master_volume_db, MAX_MASTER_DB);
        assert_eq!(config.voice_gain, 0.25);
    }

    #[test]
    fn default_patch_has_an_output_envelope() {
        let voice = VoiceParameters::default();
        assert!(matches!(
            voice.modulators[voice.output_eg],
            ModulatorParameters::Envelope { .. }
        ));
    }
}
