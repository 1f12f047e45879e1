use crate::synth::error::SynthError;
use crate::synth::params::VoiceParameters;
use crate::synth::voice::SynthVoice;

/// Factory for creating voices with a specific patch/sound design
///
/// This is the "instrument design" layer - you configure your sound once,
/// then the engine uses this factory to fill its voice pool with identical
/// voices. Called only at engine construction, never on the render thread.
pub trait VoiceFactory: Send {
    fn create_voice(&self, sample_rate: f32) -> Result<SynthVoice, SynthError>;
}

impl<F> VoiceFactory for F
where
    F: Fn(f32) -> Result<SynthVoice, SynthError> + Send,
{
    fn create_voice(&self, sample_rate: f32) -> Result<SynthVoice, SynthError> {
        self(sample_rate)
    }
}

impl VoiceFactory for VoiceParameters {
    fn create_voice(&self, sample_rate: f32) -> Result<SynthVoice, SynthError> {
        SynthVoice::from_parameters(self, sample_rate)
    }
}
