use thiserror::Error;

/// Configuration problems caught while building voices or the engine.
///
/// Nothing on the render path returns these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error("voice pool capacity must be at least 1")]
    EmptyVoicePool,

    #[error("output envelope slot {slot} is out of range ({slots} modulator slots)")]
    OutputEgOutOfRange { slot: usize, slots: usize },

    #[error("output envelope slot {slot} is not an envelope generator")]
    OutputEgNotEnvelope { slot: usize },

    #[error("modulator slot {slot} reads slot {child}, which is not rendered before it")]
    ChildOutOfOrder { slot: usize, child: usize },

    #[error("modulation route reads slot {slot}, but the voice has {slots} modulator slots")]
    RouteSourceOutOfRange { slot: usize, slots: usize },

    #[error("no modulator slot {slot}")]
    UnknownSlot { slot: usize },

    #[error("modulator slot {slot} is not an envelope generator")]
    NotAnEnvelope { slot: usize },
}
