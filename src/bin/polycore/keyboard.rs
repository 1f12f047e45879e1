//! Computer keyboard as a MIDI keyboard
//!
//! Terminals report key presses and repeats but usually not releases, so a
//! held key is one that pressed or repeated within `KEY_HOLD`.

use std::time::{Duration, Instant};

use polycore::io::midi::{CC_ALL_SOUND_OFF, CC_SUSTAIN_PEDAL, PITCH_BEND_CENTER};
use polycore::SynthMessage;

/// Home row is the white keys from C, the row above the black keys.
const KEY_LAYOUT: &str = "awsedftgyhujkolp;";

/// Long enough to bridge the terminal's initial repeat delay.
pub const KEY_HOLD: Duration = Duration::from_millis(600);

const BEND_STEP: i16 = 2048;

struct HeldKey {
    key: char,
    note: u8,
    last_seen: Instant,
}

pub struct Keyboard {
    octave: i8,
    velocity: u8,
    sustain: bool,
    bend: i16,
    held: Vec<HeldKey>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            octave: 4,
            velocity: 100,
            sustain: false,
            bend: PITCH_BEND_CENTER,
            held: Vec::new(),
        }
    }

    /// Note for `key` in the current octave.
    pub fn note_for(&self, key: char) -> Option<u8> {
        let offset = KEY_LAYOUT.find(key.to_ascii_lowercase())? as i32;
        let note = (self.octave as i32 + 1) * 12 + offset;
        u8::try_from(note).ok().filter(|&n| n <= 127)
    }

    /// Press or repeat a note key. Repeats only refresh the hold.
    pub fn press(&mut self, key: char, now: Instant) -> Option<SynthMessage> {
        if let Some(held) = self.held.iter_mut().find(|h| h.key == key) {
            held.last_seen = now;
            return None;
        }

        let note = self.note_for(key)?;
        self.held.push(HeldKey {
            key,
            note,
            last_seen: now,
        });
        Some(SynthMessage::NoteOn {
            note,
            velocity: self.velocity,
        })
    }

    /// Note-offs for keys not seen within `KEY_HOLD`.
    pub fn expire(&mut self, now: Instant) -> Vec<SynthMessage> {
        let mut released = Vec::new();
        self.held.retain(|held| {
            let alive = now.duration_since(held.last_seen) < KEY_HOLD;
            if !alive {
                released.push(SynthMessage::NoteOff {
                    note: held.note,
                    velocity: 0,
                });
            }
            alive
        });
        released
    }

    pub fn shift_octave(&mut self, delta: i8) {
        self.octave = (self.octave + delta).clamp(-1, 8);
    }

    pub fn shift_velocity(&mut self, delta: i16) {
        self.velocity = (self.velocity as i16 + delta).clamp(1, 127) as u8;
    }

    pub fn toggle_sustain(&mut self) -> SynthMessage {
        self.sustain = !self.sustain;
        SynthMessage::ControlChange {
            controller: CC_SUSTAIN_PEDAL,
            value: if self.sustain { 127 } else { 0 },
        }
    }

    /// Step the bend by whole steps, or recentre it with `steps == 0`.
    pub fn bend(&mut self, steps: i16) -> SynthMessage {
        self.bend = if steps == 0 {
            PITCH_BEND_CENTER
        } else {
            (self.bend as i32 + (steps * BEND_STEP) as i32).clamp(-8192, 8191) as i16
        };
        SynthMessage::PitchBend { value: self.bend }
    }

    pub fn panic(&mut self) -> SynthMessage {
        self.held.clear();
        SynthMessage::ControlChange {
            controller: CC_ALL_SOUND_OFF,
            value: 0,
        }
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}
