use crate::dsp::sanitize_sample_rate;
use crate::dsp::timer::{ms_to_samples, SampleTimer};
use crate::synth::component::{ModOutput, Modulator, NoteContext};
use crate::synth::modulator::{ChildModulation, ModBus};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Analog-Style Envelope Generator
===============================

This module implements the multi-segment envelope that shapes every voice.
It models the RC-charging curves of an analog envelope chip, with the segment
timing an analog front panel promises: "attack = 10 ms" means the output hits
full scale 10 ms after the key goes down.

Vocabulary
----------

  output        The current envelope value, always in [0.0, 1.0].

  state         Which segment is running: Off, Delay, Attack, Hold, Decay,
                Sustain, Release, HoldOff, or Shutdown.

  contour       Segment layout: ADSR, AHDSR (hold after attack), or AHR
                (attack, hold, release; no sustain).

  gate          Whether the note is still logically held, by the key or by
                the sustain pedal.

  coefficient   Per-sample multiplier of the exponential recurrence.

  offset        Per-sample additive term of the exponential recurrence.

  TCO           Time-constant offset. How far past the target the curve's
                asymptote sits, as a fraction of full scale.


The Recurrence
--------------

Every curved segment runs the same one-pole recurrence:

    output = offset + output × coeff

which converges on the asymptote `offset / (1 - coeff)`. An exponential never
truly arrives, so the asymptote is placed *beyond* the target by TCO:

    attack   asymptote = 1.0 + TCO
    decay    asymptote = sustain - TCO
    release  asymptote = 0.0 - TCO

and the curve crosses the real target in finite time. The coefficient is
chosen so the crossing happens after exactly `samples` steps:

    samples = time_ms × sample_rate / 1000
    coeff   = exp(-ln((1 + TCO) / TCO) / samples)
    offset  = asymptote × (1 - coeff)

Check for attack from 0: after n steps output = (1 + TCO)(1 - coeffⁿ). With
coeffᴺ = TCO / (1 + TCO) that is exactly 1.0 at n = samples.

Decay and release times are full-scale times, like analog hardware: the decay
knob sets how long a fall from 1.0 to 0.0 would take. A decay to 0.7 therefore
lands earlier than the knob value; a release from 0.7 likewise.


TCO Values
----------

    mode      attack TCO     decay/release TCO
    analog    e^-1.5         e^-4.95
    linear    (no TCO, straight ramps)

e^-1.5 gives the fast, slightly rounded attack of a capacitor charging towards
a rail above the trigger threshold. e^-4.95 gives a decay that is close to a
true exponential. "Arrived" is declared when the output crosses the target,
which the TCO derivation places at the configured time; a 1e-9 guard absorbs
floating-point residue.


The State Machine
-----------------

    Off ──note_on──→ Delay ──timer──→ Attack ──1.0──→ Hold ──timer──→ Decay
                       (skipped if 0)          (skipped if 0          │
                                                or ADSR)              │ sustain
     ↑                                                                 ↓
     └──────────── 0.0 ←── Release ←──────note_off─────────────────  Sustain
                              ↑
               note_off from Delay / Attack / Hold / Decay as well

AHR replaces decay and sustain: Hold runs straight into Release with the gate
still held. If the release lands on 0.0 while the gate is held and an off time
is set, the envelope waits in HoldOff and attacks again, looping until the
note is released:

    Attack ──→ Hold ──→ Release ──0.0──→ HoldOff ──off timer──→ Attack
                                            │
                                            └──note_off──→ Off

    any state ──shutdown()──→ Shutdown ──10 ms linear ramp──→ Off
    any state ──note_on()───→ Delay / Attack (retrigger)

Retrigger keeps the current output unless reset-to-zero is set, so a fast
repeated note re-attacks from where it is instead of clicking to zero.

Shutdown is not a musical release. It is a fixed 10 ms linear fade used when
the voice is stolen, so the steal itself never clicks and always finishes in
bounded time.

A time of 0 ms (or anything under one sample) makes that segment snap to its
target on the next sample. No division by zero, no NaN coefficients.
*/

/// Attack TCO for analog mode: e^-1.5.
pub const ANALOG_ATTACK_TCO: f64 = 0.223_130_160_148_429_83;
/// Decay and release TCO for analog mode: e^-4.95.
pub const ANALOG_DECAY_TCO: f64 = 0.007_083_408_929_052_118;
/// Fixed length of the voice-steal fade.
pub const SHUTDOWN_TIME_MS: f64 = 10.0;
/// Longest accepted segment time. Longer values are clamped.
pub const MAX_SEGMENT_TIME_MS: f64 = 60_000.0;

const ARRIVAL_EPSILON: f64 = 1e-9;

/// Curve family of the envelope segments.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EgMode {
    /// Exponential segments with TCO correction.
    #[default]
    Analog,
    /// Straight ramps.
    Linear,
}

/// Segment layout.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EgContour {
    /// Attack, decay, sustain, release. The hold time is ignored.
    Adsr,
    /// Attack, hold, decay, sustain, release.
    #[default]
    Ahdsr,
    /// Attack, hold, release. Percussive: the release starts by itself.
    Ahr,
}

/// Current segment of the envelope state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgState {
    Off,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    /// Silent gap before a looping envelope attacks again.
    HoldOff,
    Shutdown,
}

impl EgState {
    /// Release or shutdown: the note is on its way out.
    pub fn is_releasing(self) -> bool {
        matches!(self, EgState::Release | EgState::Shutdown)
    }

    /// Gate is still logically held (Delay through Sustain, or the gap of a
    /// looping envelope).
    pub fn is_gated(self) -> bool {
        matches!(
            self,
            EgState::Delay
                | EgState::Attack
                | EgState::Hold
                | EgState::Decay
                | EgState::Sustain
                | EgState::HoldOff
        )
    }
}

/// Envelope settings. Shared by every voice's copy of the same slot.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EgParameters {
    pub mode: EgMode,
    pub contour: EgContour,
    /// Retrigger snaps the output to 0 instead of re-attacking from the
    /// current level.
    pub reset_to_zero: bool,
    pub delay_ms: f64,
    pub attack_ms: f64,
    pub hold_ms: f64,
    /// Full-scale (1.0 → 0.0) decay time.
    pub decay_ms: f64,
    pub sustain_level: f64,
    /// Full-scale (1.0 → 0.0) release time.
    pub release_ms: f64,
    /// Gap before an AHR envelope re-attacks while the gate is held. 0 means
    /// no loop.
    pub off_ms: f64,
    /// Velocity 127 shortens the attack to 0, velocity 0 leaves it as set.
    pub velocity_to_attack: bool,
    /// Note 127 shortens the decay to 0, note 0 leaves it as set.
    pub note_to_decay: bool,
}

impl Default for EgParameters {
    fn default() -> Self {
        Self {
            mode: EgMode::Analog,
            contour: EgContour::Ahdsr,
            reset_to_zero: false,
            delay_ms: 0.0,
            attack_ms: 5.0,
            hold_ms: 0.0,
            decay_ms: 200.0,
            sustain_level: 0.7,
            release_ms: 300.0,
            off_ms: 0.0,
            velocity_to_attack: false,
            note_to_decay: false,
        }
    }
}

impl EgParameters {
    pub fn adsr(attack_ms: f64, decay_ms: f64, sustain_level: f64, release_ms: f64) -> Self {
        Self {
            attack_ms,
            decay_ms,
            sustain_level,
            release_ms,
            ..Self::default()
        }
    }

    /// Clamp every field into its valid range. NaN falls back to the nearest
    /// safe value (0 ms, sustain 0).
    pub fn sanitized(&self) -> Self {
        Self {
            delay_ms: clamp_time(self.delay_ms),
            attack_ms: clamp_time(self.attack_ms),
            hold_ms: clamp_time(self.hold_ms),
            decay_ms: clamp_time(self.decay_ms),
            sustain_level: if self.sustain_level.is_nan() {
                0.0
            } else {
                self.sustain_level.clamp(0.0, 1.0)
            },
            release_ms: clamp_time(self.release_ms),
            off_ms: clamp_time(self.off_ms),
            ..self.clone()
        }
    }
}

fn clamp_time(time_ms: f64) -> f64 {
    if time_ms.is_nan() {
        0.0
    } else {
        time_ms.clamp(0.0, MAX_SEGMENT_TIME_MS)
    }
}

/// Precomputed recurrence for one curved segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentCoefficients {
    pub coeff: f64,
    pub offset: f64,
    pub tco: f64,
    /// Segment shorter than one sample: jump to the target on the next step.
    pub immediate: bool,
}

impl SegmentCoefficients {
    fn snap(tco: f64) -> Self {
        Self {
            coeff: 0.0,
            offset: 0.0,
            tco,
            immediate: true,
        }
    }

    /// Exponential segment crossing `asymptote ∓ tco` after `samples` steps.
    pub fn exponential(samples: f64, tco: f64, asymptote: f64) -> Self {
        if !samples.is_finite() || samples < 1.0 || !(tco > 0.0) {
            return Self::snap(tco);
        }

        let coeff = (-((1.0 + tco) / tco).ln() / samples).exp();
        if !coeff.is_finite() || coeff <= 0.0 || coeff >= 1.0 {
            return Self::snap(tco);
        }

        Self {
            coeff,
            offset: asymptote * (1.0 - coeff),
            tco,
            immediate: false,
        }
    }

    /// Straight ramp moving `full_scale` in `samples` steps.
    pub fn linear(samples: f64, full_scale: f64) -> Self {
        if !samples.is_finite() || samples < 1.0 {
            return Self::snap(0.0);
        }

        Self {
            coeff: 1.0,
            offset: full_scale / samples,
            tco: 0.0,
            immediate: false,
        }
    }

    #[inline]
    fn step(&self, output: f64) -> f64 {
        self.offset + output * self.coeff
    }
}

fn segment_samples(time_ms: f64, sample_rate: f64) -> f64 {
    clamp_time(time_ms) * sample_rate / 1000.0
}

/// Envelope generator with analog timing, delay/hold timers, a steal-safe
/// shutdown fade, and optional child modulation.
pub struct EnvelopeGenerator {
    params: EgParameters,
    sample_rate: f64,

    state: EgState,
    output: f64,

    attack: SegmentCoefficients,
    decay: SegmentCoefficients,
    release: SegmentCoefficients,

    // Note-on scaling currently baked into attack/decay
    attack_scalar: f64,
    decay_scalar: f64,

    delay_timer: SampleTimer,
    hold_timer: SampleTimer,
    off_timer: SampleTimer,
    shutdown_timer: SampleTimer,
    shutdown_increment: f64,

    output_eg: bool,
    gate: bool,
    sustain_override: bool,
    release_pending: bool,

    children: Vec<ChildModulation>,
}

impl EnvelopeGenerator {
    pub fn new(params: EgParameters, sample_rate: f32) -> Self {
        let params = params.sanitized();
        let mut eg = Self {
            params,
            sample_rate: sanitize_sample_rate(sample_rate) as f64,
            state: EgState::Off,
            output: 0.0,
            attack: SegmentCoefficients::snap(0.0),
            decay: SegmentCoefficients::snap(0.0),
            release: SegmentCoefficients::snap(0.0),
            attack_scalar: 1.0,
            decay_scalar: 1.0,
            delay_timer: SampleTimer::default(),
            hold_timer: SampleTimer::default(),
            off_timer: SampleTimer::default(),
            shutdown_timer: SampleTimer::default(),
            shutdown_increment: 0.0,
            output_eg: false,
            gate: false,
            sustain_override: false,
            release_pending: false,
            children: Vec::new(),
        };
        eg.recalculate_all();
        eg
    }

    pub fn adsr(attack_ms: f64, decay_ms: f64, sustain: f64, release_ms: f64, sample_rate: f32) -> Self {
        Self::new(
            EgParameters::adsr(attack_ms, decay_ms, sustain, release_ms),
            sample_rate,
        )
    }

    /// Attach child modulators whose outputs scale this envelope's output.
    pub fn with_children(mut self, children: Vec<ChildModulation>) -> Self {
        self.children = children;
        self
    }

    pub fn children(&self) -> &[ChildModulation] {
        &self.children
    }

    pub fn parameters(&self) -> &EgParameters {
        &self.params
    }

    /// Replace the settings. Only segments whose inputs changed are
    /// recomputed. Call between render blocks, never per sample.
    pub fn set_parameters(&mut self, params: EgParameters) {
        let params = params.sanitized();
        let old = std::mem::replace(&mut self.params, params);

        if old.mode != self.params.mode {
            self.recalculate_all();
            return;
        }

        self.update_timers();

        if old.attack_ms != self.params.attack_ms {
            self.calculate_attack_time(self.params.attack_ms * self.attack_scalar, self.sample_rate);
        }
        if old.decay_ms != self.params.decay_ms || old.sustain_level != self.params.sustain_level {
            self.calculate_decay_time(self.params.decay_ms * self.decay_scalar, self.sample_rate);
        }
        if old.release_ms != self.params.release_ms {
            self.calculate_release_time(self.params.release_ms, self.sample_rate);
        }

        if self.state == EgState::Delay && self.delay_timer.target() == 0 {
            self.state = EgState::Attack;
        }
    }

    /// Select the curve family and recompute all segments.
    pub fn set_eg_mode(&mut self, mode: EgMode) {
        self.params.mode = mode;
        self.recalculate_all();
    }

    pub fn mode(&self) -> EgMode {
        self.params.mode
    }

    fn recalculate_all(&mut self) {
        self.update_timers();
        self.calculate_attack_time(self.params.attack_ms * self.attack_scalar, self.sample_rate);
        self.calculate_decay_time(self.params.decay_ms * self.decay_scalar, self.sample_rate);
        self.calculate_release_time(self.params.release_ms, self.sample_rate);
    }

    fn update_timers(&mut self) {
        self.delay_timer
            .set_target_ms(self.params.delay_ms, self.sample_rate);
        self.hold_timer
            .set_target_ms(self.params.hold_ms, self.sample_rate);
        self.off_timer
            .set_target_ms(self.params.off_ms, self.sample_rate);
    }

    /// Derive attack coefficients so the output reaches 1.0 from 0.0 in
    /// `time_ms`.
    pub fn calculate_attack_time(&mut self, time_ms: f64, sample_rate: f64) {
        let samples = segment_samples(time_ms, sample_rate);
        self.attack = match self.params.mode {
            EgMode::Analog => {
                let tco = ANALOG_ATTACK_TCO;
                SegmentCoefficients::exponential(samples, tco, 1.0 + tco)
            }
            EgMode::Linear => SegmentCoefficients::linear(samples, 1.0),
        };
    }

    /// Derive decay coefficients for a full-scale fall in `time_ms`, aimed at
    /// the current sustain level.
    pub fn calculate_decay_time(&mut self, time_ms: f64, sample_rate: f64) {
        let samples = segment_samples(time_ms, sample_rate);
        self.decay = match self.params.mode {
            EgMode::Analog => {
                let tco = ANALOG_DECAY_TCO;
                SegmentCoefficients::exponential(samples, tco, self.params.sustain_level - tco)
            }
            EgMode::Linear => SegmentCoefficients::linear(samples, -1.0),
        };
    }

    /// Derive release coefficients for a full-scale fall in `time_ms`.
    pub fn calculate_release_time(&mut self, time_ms: f64, sample_rate: f64) {
        let samples = segment_samples(time_ms, sample_rate);
        self.release = match self.params.mode {
            EgMode::Analog => {
                let tco = ANALOG_DECAY_TCO;
                SegmentCoefficients::exponential(samples, tco, -tco)
            }
            EgMode::Linear => SegmentCoefficients::linear(samples, -1.0),
        };
    }

    pub fn attack_coefficients(&self) -> SegmentCoefficients {
        self.attack
    }

    pub fn decay_coefficients(&self) -> SegmentCoefficients {
        self.decay
    }

    pub fn release_coefficients(&self) -> SegmentCoefficients {
        self.release
    }

    /// Start (or restart) the envelope.
    pub fn note_on(&mut self, ctx: &NoteContext) {
        let attack_scalar = if self.params.velocity_to_attack {
            1.0 - ctx.velocity as f64 / 127.0
        } else {
            1.0
        };
        if attack_scalar != self.attack_scalar {
            self.attack_scalar = attack_scalar;
            self.calculate_attack_time(self.params.attack_ms * attack_scalar, self.sample_rate);
        }

        let decay_scalar = if self.params.note_to_decay {
            1.0 - ctx.note as f64 / 127.0
        } else {
            1.0
        };
        if decay_scalar != self.decay_scalar {
            self.decay_scalar = decay_scalar;
            self.calculate_decay_time(self.params.decay_ms * decay_scalar, self.sample_rate);
        }

        if self.params.reset_to_zero {
            self.output = 0.0;
        }

        self.state = if self.delay_timer.target() > 0 {
            EgState::Delay
        } else {
            EgState::Attack
        };

        self.delay_timer.reset();
        self.hold_timer.reset();
        self.off_timer.reset();
        self.shutdown_timer.reset();
        self.gate = true;
        self.release_pending = false;
    }

    /// Gate low. With the sustain pedal down the release is deferred until
    /// the pedal lifts.
    pub fn note_off(&mut self) {
        if !self.gate {
            return;
        }

        if self.sustain_override {
            self.release_pending = true;
            return;
        }

        self.gate = false;
        match self.state {
            EgState::HoldOff => self.state = EgState::Off,
            state if state.is_gated() => self.state = EgState::Release,
            // An AHR release already running just stops looping
            _ => {}
        }
    }

    /// Fade to zero in a fixed 10 ms, from any state. Calling it again while
    /// the fade runs does not restart it.
    pub fn shutdown(&mut self) {
        if self.state == EgState::Shutdown {
            return;
        }

        let samples = ms_to_samples(SHUTDOWN_TIME_MS, self.sample_rate).max(1);
        self.shutdown_timer.set_target(samples);
        self.shutdown_timer.reset();
        self.shutdown_increment = -self.output / samples as f64;
        self.state = EgState::Shutdown;

        self.gate = false;
        self.sustain_override = false;
        self.release_pending = false;
    }

    /// Sustain pedal. Lifting it releases a note whose key already went up.
    pub fn set_sustain_override(&mut self, on: bool) {
        self.sustain_override = on;

        if !on && self.release_pending {
            self.release_pending = false;
            self.note_off();
        }
    }

    pub fn sustain_override(&self) -> bool {
        self.sustain_override
    }

    pub fn release_pending(&self) -> bool {
        self.release_pending
    }

    /// Note still held, by the key or by the pedal.
    pub fn gate(&self) -> bool {
        self.gate
    }

    pub fn is_output_eg(&self) -> bool {
        self.output_eg
    }

    pub fn set_is_output_eg(&mut self, output_eg: bool) {
        self.output_eg = output_eg;
    }

    pub fn state(&self) -> EgState {
        self.state
    }

    /// Current output (0.0 to 1.0)
    pub fn level(&self) -> f32 {
        self.output as f32
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    /// Advance the state machine by one sample and return the raw output.
    pub fn next_sample(&mut self) -> f64 {
        match self.state {
            EgState::Off => {
                self.output = 0.0;
            }

            EgState::Delay => {
                self.delay_timer.advance();
                if self.delay_timer.expired() {
                    self.delay_timer.reset();
                    self.state = EgState::Attack;
                }
            }

            EgState::Attack => {
                self.output = if self.attack.immediate {
                    1.0
                } else {
                    self.attack.step(self.output)
                };

                if self.output >= 1.0 - ARRIVAL_EPSILON {
                    self.output = 1.0;
                    self.hold_timer.reset();
                    let hold = self.hold_timer.target() > 0;
                    self.state = match self.params.contour {
                        EgContour::Adsr => EgState::Decay,
                        EgContour::Ahdsr | EgContour::Ahr if hold => EgState::Hold,
                        EgContour::Ahdsr => EgState::Decay,
                        EgContour::Ahr => EgState::Release,
                    };
                }
            }

            EgState::Hold => {
                self.hold_timer.advance();
                if self.hold_timer.expired() {
                    self.hold_timer.reset();
                    self.state = match self.params.contour {
                        EgContour::Ahr => EgState::Release,
                        EgContour::Adsr | EgContour::Ahdsr => EgState::Decay,
                    };
                }
            }

            EgState::Decay => {
                let sustain = self.params.sustain_level;
                self.output = if self.decay.immediate {
                    sustain
                } else {
                    self.decay.step(self.output)
                };

                if self.output <= sustain + ARRIVAL_EPSILON {
                    self.output = sustain;
                    self.state = EgState::Sustain;
                }
            }

            EgState::Sustain => {
                self.output = self.params.sustain_level;
            }

            EgState::Release => {
                // Pedal pressed after the key went up: freeze where we are
                if !(self.sustain_override && !self.gate) {
                    self.output = if self.release.immediate {
                        0.0
                    } else {
                        self.release.step(self.output)
                    };

                    if self.output <= ARRIVAL_EPSILON {
                        self.output = 0.0;
                        if self.gate && self.off_timer.target() > 0 {
                            self.off_timer.reset();
                            self.state = EgState::HoldOff;
                        } else {
                            self.gate = false;
                            self.state = EgState::Off;
                        }
                    }
                }
            }

            EgState::HoldOff => {
                self.output = 0.0;
                self.off_timer.advance();
                if self.off_timer.expired() {
                    self.off_timer.reset();
                    self.state = EgState::Attack;
                }
            }

            EgState::Shutdown => {
                self.output += self.shutdown_increment;
                self.shutdown_timer.advance();

                if self.output <= ARRIVAL_EPSILON || self.shutdown_timer.expired() {
                    self.output = 0.0;
                    self.state = EgState::Off;
                }
            }
        }

        self.output = self.output.clamp(0.0, 1.0);
        self.output
    }

    /// Render a block of raw envelope values (no child modulation).
    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample() as f32;
        }
    }
}

impl Modulator for EnvelopeGenerator {
    fn reset(&mut self, sample_rate: f32) {
        let sample_rate = sanitize_sample_rate(sample_rate) as f64;
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.recalculate_all();
        }

        self.output = 0.0;
        self.state = EgState::Off;
        self.delay_timer.reset();
        self.hold_timer.reset();
        self.off_timer.reset();
        self.shutdown_timer.reset();
        self.gate = false;
        self.sustain_override = false;
        self.release_pending = false;
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        EnvelopeGenerator::note_on(self, ctx);
    }

    fn note_off(&mut self, _ctx: &NoteContext) {
        EnvelopeGenerator::note_off(self);
    }

    fn render_modulator_output(&mut self, bus: &ModBus) -> ModOutput {
        let level = self.next_sample() as f32;

        let mut normal = level;
        for child in &self.children {
            normal *= child.gain(bus);
        }

        ModOutput {
            normal,
            unipolar: normal.clamp(0.0, 1.0),
            biased: level - self.params.sustain_level as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn ctx() -> NoteContext {
        NoteContext::from_note(60, 100)
    }

    /// Render until `done` holds; returns the 1-based sample count.
    fn samples_until(
        eg: &mut EnvelopeGenerator,
        limit: usize,
        done: impl Fn(&EnvelopeGenerator) -> bool,
    ) -> Option<usize> {
        for n in 1..=limit {
            eg.next_sample();
            if done(eg) {
                return Some(n);
            }
        }
        None
    }

    #[test]
    fn attack_arrives_in_configured_time() {
        for &(attack_ms, sample_rate) in &[
            (10.0, 48_000.0),
            (1.0, 44_100.0),
            (7.35, 44_100.0),
            (250.0, 96_000.0),
            (1000.0, 48_000.0),
        ] {
            for mode in [EgMode::Analog, EgMode::Linear] {
                let mut params = EgParameters::adsr(attack_ms, 100.0, 0.5, 100.0);
                params.mode = mode;
                let mut eg = EnvelopeGenerator::new(params, sample_rate);
                eg.note_on(&ctx());

                let expected = (attack_ms * sample_rate as f64 / 1000.0).round() as i64;
                let arrived = samples_until(&mut eg, 200_000, |e| e.level() >= 1.0 - 1e-6)
                    .expect("attack never arrived") as i64;

                assert!(
                    (arrived - expected).abs() <= 1,
                    "{mode:?} {attack_ms}ms @ {sample_rate}: arrived at {arrived}, expected {expected}"
                );
            }
        }
    }

    #[test]
    fn attack_is_strictly_monotonic() {
        let mut eg = EnvelopeGenerator::adsr(20.0, 100.0, 0.5, 100.0, SAMPLE_RATE);
        eg.note_on(&ctx());

        let mut previous = 0.0;
        while eg.state() == EgState::Attack {
            let value = eg.next_sample();
            assert!(value > previous, "attack stalled at {previous}");
            assert!(value <= 1.0);
            previous = value;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn reference_scenario_timing() {
        let mut eg = EnvelopeGenerator::adsr(10.0, 200.0, 0.7, 300.0, SAMPLE_RATE);
        eg.note_on(&ctx());

        let mut peak_at = None;
        let mut sustain_at = None;
        let mut off_at = None;

        for n in 0..40_000 {
            if n == 20_000 {
                assert_eq!(eg.state(), EgState::Sustain);
                eg.note_off();
            }
            let value = eg.next_sample();

            if peak_at.is_none() && value >= 1.0 - 1e-6 {
                peak_at = Some(n);
            }
            if sustain_at.is_none() && eg.state() == EgState::Sustain {
                sustain_at = Some(n);
                assert!((value - 0.7).abs() < 1e-6);
            }
            if n >= 20_000 && off_at.is_none() && eg.state() == EgState::Off {
                off_at = Some(n);
            }
        }

        let peak_at = peak_at.unwrap();
        assert!((478..=481).contains(&peak_at), "peak at {peak_at}");

        let sustain_at = sustain_at.unwrap();
        assert!(sustain_at <= 480 + 9_600, "sustain reached at {sustain_at}");

        // Release is a full-scale time, so a fall from 0.7 ends a little early
        let off_at = off_at.unwrap();
        assert!(off_at > 20_000 + 12_000, "release ended too soon at {off_at}");
        assert!(off_at <= 20_000 + 14_400 + 1, "release ended late at {off_at}");
    }

    #[test]
    fn zero_times_snap_in_one_sample() {
        let mut eg = EnvelopeGenerator::adsr(0.0, 0.0, 0.4, 0.0, SAMPLE_RATE);
        eg.note_on(&ctx());

        assert_eq!(eg.next_sample(), 1.0);
        assert_eq!(eg.state(), EgState::Decay);
        assert_eq!(eg.next_sample(), 0.4);
        assert_eq!(eg.state(), EgState::Sustain);

        eg.note_off();
        assert_eq!(eg.next_sample(), 0.0);
        assert_eq!(eg.state(), EgState::Off);
        assert!(eg.attack_coefficients().immediate);
    }

    #[test]
    fn negative_and_nan_settings_are_clamped() {
        let mut params = EgParameters::adsr(-10.0, f64::NAN, 3.0, -1.0);
        params.hold_ms = f64::INFINITY;
        let eg = EnvelopeGenerator::new(params, -1.0);

        let p = eg.parameters();
        assert_eq!(p.attack_ms, 0.0);
        assert_eq!(p.decay_ms, 0.0);
        assert_eq!(p.sustain_level, 1.0);
        assert_eq!(p.release_ms, 0.0);
        assert_eq!(p.hold_ms, MAX_SEGMENT_TIME_MS);
        assert!(eg.sample_rate() > 0.0);
    }

    #[test]
    fn delay_and_hold_run_for_their_sample_counts() {
        let mut params = EgParameters::adsr(0.0, 0.0, 0.5, 10.0);
        params.delay_ms = 1.0; // 48 samples
        params.hold_ms = 2.0; // 96 samples
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());
        assert_eq!(eg.state(), EgState::Delay);

        for _ in 0..47 {
            assert_eq!(eg.next_sample(), 0.0);
            assert_eq!(eg.state(), EgState::Delay);
        }
        eg.next_sample();
        assert_eq!(eg.state(), EgState::Attack);

        eg.next_sample();
        assert_eq!(eg.state(), EgState::Hold);
        for _ in 0..95 {
            assert_eq!(eg.next_sample(), 1.0);
            assert_eq!(eg.state(), EgState::Hold);
        }
        eg.next_sample();
        assert_eq!(eg.state(), EgState::Decay);
    }

    #[test]
    fn shutdown_is_bounded_and_idempotent() {
        let mut eg = EnvelopeGenerator::adsr(1.0, 50.0, 0.8, 2000.0, SAMPLE_RATE);
        eg.note_on(&ctx());
        for _ in 0..5_000 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::Sustain);

        let budget = ms_to_samples(SHUTDOWN_TIME_MS, SAMPLE_RATE as f64) as usize;
        eg.shutdown();

        let mut previous = eg.level();
        for n in 0..budget {
            if n == budget / 2 {
                // A second call must not restart the fade
                eg.shutdown();
            }
            eg.next_sample();
            assert!(eg.level() <= previous);
            previous = eg.level();
        }

        assert_eq!(eg.state(), EgState::Off);
        assert_eq!(eg.level(), 0.0);
    }

    #[test]
    fn retrigger_mid_release_is_continuous() {
        let mut eg = EnvelopeGenerator::adsr(10.0, 100.0, 0.6, 500.0, SAMPLE_RATE);
        eg.note_on(&ctx());
        for _ in 0..10_000 {
            eg.next_sample();
        }
        eg.note_off();
        for _ in 0..2_000 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::Release);

        // Largest natural step of the attack segment from zero
        let attack = eg.attack_coefficients();
        let max_slew = attack.offset as f32;

        let before = eg.level();
        eg.note_on(&ctx());
        assert_eq!(eg.state(), EgState::Attack);
        let after = eg.next_sample() as f32;

        assert!(after >= before);
        assert!(
            after - before <= max_slew,
            "jump of {} exceeds slew {}",
            after - before,
            max_slew
        );
    }

    #[test]
    fn reset_to_zero_restarts_from_silence() {
        let mut params = EgParameters::adsr(10.0, 100.0, 0.6, 500.0);
        params.reset_to_zero = true;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());
        for _ in 0..10_000 {
            eg.next_sample();
        }
        assert!(eg.level() > 0.5);

        eg.note_on(&ctx());
        assert_eq!(eg.level(), 0.0);
        assert_eq!(eg.state(), EgState::Attack);
    }

    #[test]
    fn note_off_from_every_gated_state_enters_release() {
        let mut params = EgParameters::adsr(5.0, 50.0, 0.5, 50.0);
        params.delay_ms = 1.0;
        params.hold_ms = 1.0;

        for advance in [0usize, 48 + 10, 48 + 240 + 10, 48 + 240 + 48 + 10, 20_000] {
            let mut eg = EnvelopeGenerator::new(params.clone(), SAMPLE_RATE);
            eg.note_on(&ctx());
            for _ in 0..advance {
                eg.next_sample();
            }
            let state = eg.state();
            assert!(state.is_gated(), "{state:?}");
            eg.note_off();
            assert_eq!(eg.state(), EgState::Release, "from {state:?}");
        }
    }

    #[test]
    fn sustain_pedal_defers_release() {
        let mut eg = EnvelopeGenerator::adsr(1.0, 10.0, 0.5, 10.0, SAMPLE_RATE);
        eg.note_on(&ctx());
        eg.set_sustain_override(true);
        for _ in 0..2_000 {
            eg.next_sample();
        }

        eg.note_off();
        assert!(eg.release_pending());
        assert_eq!(eg.state(), EgState::Sustain);
        for _ in 0..2_000 {
            eg.next_sample();
        }
        assert_eq!(eg.level(), 0.5);

        eg.set_sustain_override(false);
        assert!(!eg.release_pending());
        assert_eq!(eg.state(), EgState::Release);

        let next = eg.next_sample();
        assert!(next < 0.5);
    }

    #[test]
    fn pedal_during_release_freezes_output() {
        let mut eg = EnvelopeGenerator::adsr(1.0, 10.0, 0.5, 100.0, SAMPLE_RATE);
        eg.note_on(&ctx());
        for _ in 0..2_000 {
            eg.next_sample();
        }
        eg.note_off();
        for _ in 0..100 {
            eg.next_sample();
        }

        eg.set_sustain_override(true);
        let held = eg.level();
        for _ in 0..1_000 {
            eg.next_sample();
        }
        assert_eq!(eg.level(), held);
        assert_eq!(eg.state(), EgState::Release);
    }

    #[test]
    fn velocity_shortens_attack() {
        let mut params = EgParameters::adsr(100.0, 100.0, 0.5, 100.0);
        params.velocity_to_attack = true;
        params.reset_to_zero = true;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);

        eg.note_on(&NoteContext::from_note(60, 127));
        eg.next_sample();
        assert_eq!(eg.state(), EgState::Decay, "full velocity snaps the attack");

        eg.note_on(&NoteContext::from_note(60, 0));
        let arrived = samples_until(&mut eg, 10_000, |e| e.state() != EgState::Attack).unwrap();
        assert!(arrived > 4_000);
    }

    #[test]
    fn linear_mode_ramps_evenly() {
        let mut params = EgParameters::adsr(1.0, 100.0, 0.5, 100.0);
        params.mode = EgMode::Linear;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());

        let first = eg.next_sample();
        let second = eg.next_sample();
        assert!((first - 1.0 / 48.0).abs() < 1e-12);
        assert!(((second - first) - first).abs() < 1e-12);
    }

    #[test]
    fn mode_switch_recomputes_coefficients() {
        let mut eg = EnvelopeGenerator::adsr(10.0, 100.0, 0.5, 100.0, SAMPLE_RATE);
        let analog = eg.attack_coefficients();
        assert!(analog.coeff < 1.0);

        eg.set_eg_mode(EgMode::Linear);
        assert_eq!(eg.attack_coefficients().coeff, 1.0);
        assert_eq!(eg.mode(), EgMode::Linear);
    }

    #[test]
    fn sample_rate_change_recomputes_coefficients() {
        let mut eg = EnvelopeGenerator::adsr(10.0, 100.0, 0.5, 100.0, 48_000.0);
        let before = eg.attack_coefficients();
        Modulator::reset(&mut eg, 96_000.0);
        let after = eg.attack_coefficients();
        assert!(after.coeff > before.coeff, "more samples means a slower per-sample step");
        assert_eq!(eg.state(), EgState::Off);
    }

    #[test]
    fn adsr_contour_skips_hold() {
        let mut params = EgParameters::adsr(0.0, 10.0, 0.5, 10.0);
        params.hold_ms = 5.0;
        params.contour = EgContour::Adsr;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());

        eg.next_sample();
        assert_eq!(eg.state(), EgState::Decay);
    }

    #[test]
    fn ahr_releases_after_hold_with_key_down() {
        let mut params = EgParameters::adsr(0.0, 10.0, 0.5, 10.0);
        params.hold_ms = 1.0; // 48 samples
        params.contour = EgContour::Ahr;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());

        eg.next_sample();
        assert_eq!(eg.state(), EgState::Hold);
        for _ in 0..48 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::Release);
        assert!(eg.gate());

        // No sustain stage: the release runs all the way down
        let off = samples_until(&mut eg, 1_000, |e| e.state() == EgState::Off);
        assert!(off.is_some());
        assert_eq!(eg.level(), 0.0);
        assert!(!eg.gate());
    }

    #[test]
    fn ahr_ignores_pedal_while_key_is_down() {
        let mut params = EgParameters::adsr(0.0, 10.0, 0.5, 10.0);
        params.contour = EgContour::Ahr;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.set_sustain_override(true);
        eg.note_on(&ctx());

        eg.next_sample();
        assert_eq!(eg.state(), EgState::Release);
        eg.next_sample();
        assert!(eg.level() < 1.0);
    }

    #[test]
    fn off_time_loops_while_gate_is_held() {
        let mut params = EgParameters::adsr(0.0, 10.0, 0.5, 0.0);
        params.contour = EgContour::Ahr;
        params.hold_ms = 1.0; // 48 samples
        params.off_ms = 2.0; // 96 samples
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());

        // attack (1) + hold (48) + release (1)
        for _ in 0..50 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::HoldOff);
        assert_eq!(eg.level(), 0.0);

        for _ in 0..95 {
            eg.next_sample();
            assert_eq!(eg.state(), EgState::HoldOff);
        }
        eg.next_sample();
        assert_eq!(eg.state(), EgState::Attack);
        assert_eq!(eg.next_sample(), 1.0);

        // Second lap lands in the gap again
        for _ in 0..49 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::HoldOff);

        eg.note_off();
        assert_eq!(eg.state(), EgState::Off);
        eg.next_sample();
        assert_eq!(eg.state(), EgState::Off);
    }

    #[test]
    fn note_off_during_ahr_release_stops_the_loop() {
        let mut params = EgParameters::adsr(0.0, 10.0, 0.5, 5.0);
        params.contour = EgContour::Ahr;
        params.off_ms = 1.0;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());
        for _ in 0..10 {
            eg.next_sample();
        }
        assert_eq!(eg.state(), EgState::Release);

        eg.note_off();
        assert!(!eg.gate());
        assert_eq!(eg.state(), EgState::Release);

        let off = samples_until(&mut eg, 1_000, |e| e.state() != EgState::Release);
        assert!(off.is_some());
        assert_eq!(eg.state(), EgState::Off);
    }

    #[test]
    fn off_time_does_not_loop_after_key_up() {
        let mut params = EgParameters::adsr(0.0, 0.0, 0.5, 1.0);
        params.off_ms = 1.0;
        let mut eg = EnvelopeGenerator::new(params, SAMPLE_RATE);
        eg.note_on(&ctx());
        eg.next_sample();
        eg.next_sample();
        eg.note_off();

        let off = samples_until(&mut eg, 1_000, |e| e.state() != EgState::Release);
        assert!(off.is_some());
        assert_eq!(eg.state(), EgState::Off);
    }

    #[test]
    fn biased_output_centres_on_sustain() {
        let mut eg = EnvelopeGenerator::adsr(0.0, 0.0, 0.25, 10.0, SAMPLE_RATE);
        eg.note_on(&ctx());
        let bus = ModBus::empty();
        eg.render_modulator_output(&bus);
        let out = eg.render_modulator_output(&bus);
        assert_eq!(eg.state(), EgState::Sustain);
        assert!(out.biased.abs() < 1e-6);
        assert!((out.normal - 0.25).abs() < 1e-6);
    }
}
