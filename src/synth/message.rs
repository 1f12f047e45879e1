#[cfg(feature = "rtrb")]
use rtrb::Consumer;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Centred 14-bit value, -8192 to 8191.
    PitchBend { value: i16 },
    AllNotesOff,
}

/// A message stamped with the engine frame it applies at.
///
/// Timestamp 0 (or any frame already rendered) means "at the next frame".
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimedMessage {
    pub timestamp: u64,
    pub message: SynthMessage,
}

impl TimedMessage {
    pub fn at(timestamp: u64, message: SynthMessage) -> Self {
        Self { timestamp, message }
    }

    pub fn immediate(message: SynthMessage) -> Self {
        Self::at(0, message)
    }
}

impl From<SynthMessage> for TimedMessage {
    fn from(message: SynthMessage) -> Self {
        Self::immediate(message)
    }
}

/// Non-blocking source of messages for the render thread.
pub trait MessageReceiver {
    fn pop(&mut self) -> Option<TimedMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<TimedMessage> {
    fn pop(&mut self) -> Option<TimedMessage> {
        Consumer::pop(self).ok()
    }
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<SynthMessage> {
    fn pop(&mut self) -> Option<TimedMessage> {
        Consumer::pop(self).ok().map(TimedMessage::immediate)
    }
}
