use crate::{io::midi::MidiEvent, synth::message::SynthMessage};

/// Map a MIDI event on `channel_filter` to an engine message.
///
/// A note-on with velocity 0 is a note-off, per the MIDI running-status
/// convention. Program changes are not handled by the engine.
pub fn midi_to_synth(midi: MidiEvent, channel_filter: u8) -> Option<SynthMessage> {
    if midi.channel() != channel_filter {
        return None;
    }

    match midi {
        MidiEvent::NoteOn { key, velocity: 0, .. } => Some(SynthMessage::NoteOff {
            note: key,
            velocity: 0,
        }),
        MidiEvent::NoteOn { key, velocity, .. } => Some(SynthMessage::NoteOn {
            note: key,
            velocity,
        }),
        MidiEvent::NoteOff { key, velocity, .. } => Some(SynthMessage::NoteOff {
            note: key,
            velocity,
        }),
        MidiEvent::ControlChange {
            controller, value, ..
        } => Some(SynthMessage::ControlChange { controller, value }),
        MidiEvent::PitchBend { value, .. } => Some(SynthMessage::PitchBend { value }),
        MidiEvent::ProgramChange { .. } => None,
    }
}

pub fn midi_note_to_freq(note: u8) -> f32 {
    note_to_freq(note, 0.0)
}

/// Equal-tempered frequency of `note`, offset by `cents`. A4 (69) = 440 Hz.
///
/// # Example
/// ```
/// use polycore::io::converter::note_to_freq;
/// assert!((note_to_freq(69, 0.0) - 440.0).abs() < 1e-3);
/// assert!((note_to_freq(69, 1200.0) - 880.0).abs() < 1e-2);
/// ```
pub fn note_to_freq(note: u8, cents: f32) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0 + cents / 100.0) / 12.0)
}

/// MMA recommended velocity curve: gain = (velocity / 127)².
pub fn velocity_to_gain(velocity: u8) -> f32 {
    let v = velocity.min(127) as f32 / 127.0;
    v * v
}

/// Pitch bend in semitones for a centred 14-bit value and a bend range.
pub fn pitch_bend_to_semitones(value: i16, range_semitones: f32) -> f32 {
    let normalized = if value >= 0 {
        value as f32 / 8191.0
    } else {
        value as f32 / 8192.0
    };
    normalized.clamp(-1.0, 1.0) * range_semitones
}

/// Combine the two 7-bit data bytes of a pitch-bend message into a centred
/// value.
pub fn pitch_bend_from_bytes(lsb: u8, msb: u8) -> i16 {
    ((((msb & 0x7F) as i16) << 7) | (lsb & 0x7F) as i16) - 8192
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let msg = midi_to_synth(
            MidiEvent::NoteOn {
                channel: 0,
                key: 60,
                velocity: 0,
            },
            0,
        );
        assert_eq!(
            msg,
            Some(SynthMessage::NoteOff {
                note: 60,
                velocity: 0
            })
        );
    }

    #[test]
    fn other_channels_are_filtered() {
        let msg = midi_to_synth(
            MidiEvent::NoteOn {
                channel: 3,
                key: 60,
                velocity: 100,
            },
            0,
        );
        assert_eq!(msg, None);
    }

    #[test]
    fn velocity_curve_is_square_law() {
        assert_eq!(velocity_to_gain(0), 0.0);
        assert_eq!(velocity_to_gain(127), 1.0);
        assert!((velocity_to_gain(64) - 0.254).abs() < 1e-3);
    }

    #[test]
    fn pitch_bend_extremes() {
        assert_eq!(pitch_bend_to_semitones(8191, 7.0), 7.0);
        assert_eq!(pitch_bend_to_semitones(-8192, 7.0), -7.0);
        assert_eq!(pitch_bend_to_semitones(0, 7.0), 0.0);
    }

    #[test]
    fn pitch_bend_bytes() {
        assert_eq!(pitch_bend_from_bytes(0x00, 0x40), 0);
        assert_eq!(pitch_bend_from_bytes(0x7F, 0x7F), 8191);
        assert_eq!(pitch_bend_from_bytes(0x00, 0x00), -8192);
    }
}
