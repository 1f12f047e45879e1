//! Portamento: a linear pitch slide from the previous note into the new one.

use crate::dsp::timer::ms_to_samples;

/// Pitch offset in semitones that ramps linearly to zero.
///
/// Started at note-on with the previous and the new note number; the offset
/// begins at `previous - new` and reaches 0 after the glide time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlideModulator {
    offset: f64,
    increment: f64,
    remaining: u32,
}

impl GlideModulator {
    /// Begin a slide. Returns false (and stops any running slide) when the
    /// notes match or the time is under one sample.
    pub fn start(&mut self, from_note: u8, to_note: u8, glide_ms: f64, sample_rate: f64) -> bool {
        let samples = ms_to_samples(glide_ms, sample_rate);
        if samples == 0 || from_note == to_note {
            self.stop();
            return false;
        }

        self.offset = from_note as f64 - to_note as f64;
        self.increment = -self.offset / samples as f64;
        self.remaining = samples;
        true
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Current offset, then advance one sample.
    #[inline]
    pub fn next_semitones(&mut self) -> f32 {
        if self.remaining == 0 {
            return 0.0;
        }

        let current = self.offset;
        self.remaining -= 1;
        self.offset = if self.remaining == 0 {
            0.0
        } else {
            self.offset + self.increment
        };
        current as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slides_up_into_the_new_note() {
        let mut glide = GlideModulator::default();
        assert!(glide.start(48, 60, 1.0, 48_000.0));

        let first = glide.next_semitones();
        assert_eq!(first, -12.0);

        let mut previous = first;
        for _ in 1..48 {
            let value = glide.next_semitones();
            assert!(value > previous);
            previous = value;
        }
        assert!(!glide.is_active());
        assert_eq!(glide.next_semitones(), 0.0);
    }

    #[test]
    fn same_note_or_zero_time_does_not_glide() {
        let mut glide = GlideModulator::default();
        assert!(glide.start(60, 72, 100.0, 48_000.0));
        assert!(!glide.start(72, 72, 100.0, 48_000.0));
        assert!(!glide.is_active());
        assert!(!glide.start(60, 72, 0.0, 48_000.0));
        assert_eq!(glide.next_semitones(), 0.0);
    }
}
