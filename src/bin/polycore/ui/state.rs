//! Snapshots passed from the audio thread to the UI
//!
//! Everything here is `Copy` so the audio callback never allocates.

use polycore::synth::VoiceState;
use polycore::SynthEngine;

/// Voices beyond this are counted but not drawn.
pub const MAX_DISPLAY_VOICES: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct VoiceStatus {
    pub state: VoiceState,
    pub note: Option<u8>,
    pub pending: Option<u8>,
    /// Output envelope level (0.0-1.0)
    pub level: f32,
}

impl Default for VoiceStatus {
    fn default() -> Self {
        Self {
            state: VoiceState::Free,
            note: None,
            pending: None,
            level: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EngineStatus {
    pub frame: u64,
    pub active_voices: usize,
    pub total_voices: usize,
    pub voices: [VoiceStatus; MAX_DISPLAY_VOICES],
    pub pitch_bend: i16,
    pub sustain: bool,
    pub volume: u8,
    pub last_note: Option<u8>,
}

impl EngineStatus {
    pub fn from_engine(engine: &SynthEngine) -> Self {
        let mut voices = [VoiceStatus::default(); MAX_DISPLAY_VOICES];
        for (status, voice) in voices.iter_mut().zip(engine.voices()) {
            *status = VoiceStatus {
                state: voice.state(),
                note: voice.note(),
                pending: voice.pending_note().map(|p| p.ctx.note),
                level: voice.output_level(),
            };
        }

        let midi = engine.midi();
        Self {
            frame: engine.frame(),
            active_voices: engine.active_voice_count(),
            total_voices: engine.voices().len(),
            voices,
            pitch_bend: midi.pitch_bend,
            sustain: midi.sustain_pedal,
            volume: midi.controller(polycore::io::midi::CC_VOLUME),
            last_note: midi.last_note,
        }
    }

    pub fn shown_voices(&self) -> &[VoiceStatus] {
        &self.voices[..self.total_voices.min(MAX_DISPLAY_VOICES)]
    }
}
