// Purpose: Voice management, polyphony, MIDI handling
// This layer sits above the dsp primitives and manages the voice pool

pub mod component;
pub mod engine;
pub mod error;
pub mod factory;
pub mod message;
pub mod modulator;
pub mod params;
pub mod scheduler;
pub mod voice;

pub use component::{NoteContext, StereoFrame};
pub use engine::{MidiSnapshot, SynthEngine};
pub use error::SynthError;
pub use message::{SynthMessage, TimedMessage};
pub use params::{EngineConfig, StealPolicy, SynthMode, VoiceParameters};
pub use voice::{SynthVoice, VoiceState};
