use std::f64::consts::TAU;

use crate::dsp::sanitize_sample_rate;
use crate::dsp::timer::{ms_to_samples, SampleTimer};
use crate::synth::component::{ModOutput, Modulator, NoteContext};
use crate::synth::modulator::ModBus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Window Envelope
===============

A fixed bell-shaped contour: one Hann or Hamming window of `width_ms`, started
at note-on. With an off time the window repeats after that many silent
milliseconds, for as long as the note is held; without one it plays once.

    Off ──note_on──→ Windowing ──width──→ HoldOff ──off timer──→ Windowing
                                             │
                                             └── off time 0 ──→ Off

    note_off from any state ──→ Off

    Hann      0.5 × (1 - cos(2πn / N))        0 at both ends
    Hamming   0.54 - 0.46 × cos(2πn / N)      0.08 at both ends
*/

/// Windows shorter than this are widened.
pub const MIN_WINDOW_SAMPLES: u32 = 8;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowShape {
    #[default]
    Hann,
    Hamming,
}

impl WindowShape {
    /// Window value at `tick` of a window `width` samples wide.
    #[inline]
    pub fn value(self, tick: u32, width: u32) -> f64 {
        let x = TAU * tick as f64 / width.max(1) as f64;
        match self {
            WindowShape::Hann => 0.5 * (1.0 - x.cos()),
            WindowShape::Hamming => 0.54 - 0.46 * x.cos(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEgParameters {
    pub shape: WindowShape,
    pub width_ms: f64,
    /// Gap before the window repeats. 0 plays it once.
    pub off_ms: f64,
}

impl Default for WindowEgParameters {
    fn default() -> Self {
        Self {
            shape: WindowShape::Hann,
            width_ms: 100.0,
            off_ms: 0.0,
        }
    }
}

impl WindowEgParameters {
    pub fn sanitized(&self) -> Self {
        let time = |ms: f64| if ms.is_nan() { 0.0 } else { ms.clamp(0.0, 60_000.0) };
        Self {
            width_ms: time(self.width_ms),
            off_ms: time(self.off_ms),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEgState {
    Off,
    Windowing,
    HoldOff,
}

pub struct WindowEg {
    params: WindowEgParameters,
    sample_rate: f64,
    state: WindowEgState,
    output: f64,
    window_timer: SampleTimer,
    off_timer: SampleTimer,
}

impl WindowEg {
    pub fn new(params: WindowEgParameters, sample_rate: f32) -> Self {
        let mut eg = Self {
            params: params.sanitized(),
            sample_rate: sanitize_sample_rate(sample_rate) as f64,
            state: WindowEgState::Off,
            output: 0.0,
            window_timer: SampleTimer::default(),
            off_timer: SampleTimer::default(),
        };
        eg.recalculate();
        eg
    }

    pub fn parameters(&self) -> &WindowEgParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: WindowEgParameters) {
        self.params = params.sanitized();
        self.recalculate();
    }

    fn recalculate(&mut self) {
        let width = ms_to_samples(self.params.width_ms, self.sample_rate).max(MIN_WINDOW_SAMPLES);
        self.window_timer.set_target(width);
        self.off_timer
            .set_target_ms(self.params.off_ms, self.sample_rate);
    }

    /// Window length in samples.
    pub fn width_samples(&self) -> u32 {
        self.window_timer.target()
    }

    pub fn state(&self) -> WindowEgState {
        self.state
    }

    pub fn level(&self) -> f32 {
        self.output as f32
    }

    /// Restart the window from its first sample.
    pub fn restart(&mut self) {
        self.window_timer.reset();
        self.off_timer.reset();
        self.state = WindowEgState::Windowing;
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.state {
            WindowEgState::Off => {
                self.output = 0.0;
            }

            WindowEgState::Windowing => {
                let width = self.window_timer.target();
                self.output = self.params.shape.value(self.window_timer.ticks(), width);

                if self.window_timer.expired() {
                    self.window_timer.reset();
                    self.state = if self.off_timer.target() > 0 {
                        WindowEgState::HoldOff
                    } else {
                        WindowEgState::Off
                    };
                } else {
                    self.window_timer.advance();
                }
            }

            WindowEgState::HoldOff => {
                self.output = 0.0;
                self.off_timer.advance();
                if self.off_timer.expired() {
                    self.restart();
                }
            }
        }

        self.output
    }
}

impl Modulator for WindowEg {
    fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sanitize_sample_rate(sample_rate) as f64;
        self.recalculate();
        self.state = WindowEgState::Off;
        self.output = 0.0;
        self.window_timer.reset();
        self.off_timer.reset();
    }

    fn note_on(&mut self, _ctx: &NoteContext) {
        self.restart();
    }

    fn note_off(&mut self, _ctx: &NoteContext) {
        self.state = WindowEgState::Off;
    }

    fn render_modulator_output(&mut self, _bus: &ModBus) -> ModOutput {
        let level = self.next_sample() as f32;
        ModOutput {
            normal: level,
            unipolar: level,
            biased: 2.0 * level - 1.0,
        }
    }
}
