pub mod dsp; // Envelopes, oscillators, filters and helpers
pub mod io; // MIDI decoding and conversions
pub mod synth; // Voices, allocation and the engine

pub use synth::{
    EngineConfig, MidiSnapshot, NoteContext, StereoFrame, SynthEngine, SynthError, SynthMessage,
    SynthMode, SynthVoice, TimedMessage,
};

pub const MAX_BLOCK_SIZE: usize = 2048;
