use log::{debug, warn};

use crate::dsp::dca::Dca;
use crate::dsp::envelope::{EgParameters, EgState, EnvelopeGenerator, MAX_SEGMENT_TIME_MS};
use crate::dsp::filter::FilterProcessor;
use crate::dsp::glide::GlideModulator;
use crate::dsp::lfo::Lfo;
use crate::dsp::oscillator::BasicOscillator;
use crate::dsp::sanitize_sample_rate;
use crate::dsp::window_eg::WindowEg;
use crate::synth::component::{
    ModInputs, Modulator, NoteContext, StereoFrame, SynthOscillator, SynthProcessor,
};
use crate::synth::error::SynthError;
use crate::synth::modulator::{resolve_routes, ModBus, ModRoute, ModulatorSlot};
use crate::synth::params::{ModulatorParameters, VoiceParameters};

/// Coarse lifecycle view of a voice, for allocation and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,      // Available for allocation
    Active,    // Gate held: delay through sustain
    Releasing, // Key released, output envelope in release
    Stealing,  // Shutdown fade running before a queued note
}

/// A note waiting for a stolen voice to finish its shutdown fade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingNote {
    pub ctx: NoteContext,
    pub timestamp: u64,
    /// Note-off arrived while queued: start, then release at once.
    pub released: bool,
}

/// One note's complete signal chain.
///
/// The voice owns every component exclusively. Modulator slots render in
/// order into a per-voice bus; routes fold the bus into the oscillator and
/// processor inputs. The output envelope is hardwired to the voice amplitude
/// and its return to OFF ends the note.
pub struct SynthVoice {
    modulators: Vec<ModulatorSlot>,
    bus: ModBus,
    routes: Vec<ModRoute>,
    oscillators: Vec<Box<dyn SynthOscillator>>,
    processors: Vec<Box<dyn SynthProcessor>>,
    output_eg: usize,
    sample_rate: f32,

    note: Option<NoteContext>,
    note_on_timestamp: u64,
    active_ticks: u64,
    steal_pending: Option<PendingNote>,

    sustain_pedal: bool,
    glide: GlideModulator,
    glide_ms: f64,
    pitch_bend: f32,
    pan_offset: f32,
}

impl SynthVoice {
    /// Build a voice from a patch.
    pub fn from_parameters(params: &VoiceParameters, sample_rate: f32) -> Result<Self, SynthError> {
        let mut builder = VoiceBuilder::new(sample_rate);

        for slot in &params.modulators {
            builder = match slot {
                ModulatorParameters::Envelope { params, children } => builder.modulator(
                    EnvelopeGenerator::new(params.clone(), sample_rate)
                        .with_children(children.clone()),
                ),
                ModulatorParameters::Lfo(lfo) => {
                    builder.modulator(Lfo::new(lfo.clone(), sample_rate))
                }
                ModulatorParameters::Window(window) => {
                    builder.modulator(WindowEg::new(window.clone(), sample_rate))
                }
            };
        }

        for osc in &params.oscillators {
            builder = builder.oscillator(BasicOscillator::new(osc.clone(), sample_rate));
        }

        if let Some(filter) = &params.filter {
            builder = builder.processor(FilterProcessor::new(filter.clone(), sample_rate));
        }

        builder
            .processor(Dca::new(params.dca.clone()))
            .routes(params.routes.iter().copied())
            .output_eg(params.output_eg)
            .glide_ms(params.glide_ms)
            .build()
    }

    pub fn builder(sample_rate: f32) -> VoiceBuilder {
        VoiceBuilder::new(sample_rate)
    }

    /// Start `ctx` on this voice, retriggering whatever was sounding.
    ///
    /// A retrigger keeps the tick count: the voice never stopped sounding.
    /// A held sustain pedal applies to the new note at once.
    pub fn do_note_on(&mut self, ctx: NoteContext, timestamp: u64) {
        if self.is_voice_free() {
            self.active_ticks = 0;
        }
        self.note = Some(ctx);
        self.note_on_timestamp = timestamp;

        match ctx.glide_from {
            Some(from) if self.glide_ms > 0.0 => {
                self.glide
                    .start(from, ctx.note, self.glide_ms, self.sample_rate as f64);
            }
            _ => self.glide.stop(),
        }

        let pedal = self.sustain_pedal;
        for modulator in &mut self.modulators {
            modulator.note_on(&ctx);
            if let Some(eg) = modulator.as_envelope_mut() {
                eg.set_sustain_override(pedal);
            }
        }
        for osc in &mut self.oscillators {
            osc.note_on(&ctx);
        }
        for processor in &mut self.processors {
            processor.note_on(&ctx);
        }
    }

    /// Release `note` if this voice holds it, either sounding or queued.
    /// Returns false when the note is not here.
    pub fn do_note_off(&mut self, note: u8) -> bool {
        if let Some(pending) = self.steal_pending.as_mut() {
            if pending.ctx.note == note {
                pending.released = true;
                return true;
            }
        }

        match self.note {
            Some(ctx) if ctx.note == note => {
                self.release_current(&ctx);
                true
            }
            _ => false,
        }
    }

    /// Release the sounding note, whatever it is. Queued notes are untouched.
    pub fn release(&mut self) {
        if let Some(ctx) = self.note {
            self.release_current(&ctx);
        }
    }

    fn release_current(&mut self, ctx: &NoteContext) {
        for modulator in &mut self.modulators {
            modulator.note_off(ctx);
        }
        for osc in &mut self.oscillators {
            osc.note_off(ctx);
        }
        for processor in &mut self.processors {
            processor.note_off(ctx);
        }
    }

    /// Fade out the current note and queue `ctx` to start once the output
    /// envelope reaches OFF.
    pub fn steal(&mut self, ctx: NoteContext, timestamp: u64) {
        if self.is_voice_free() {
            self.do_note_on(ctx, timestamp);
            return;
        }

        if let Some(dropped) = self.steal_pending.replace(PendingNote {
            ctx,
            timestamp,
            released: false,
        }) {
            warn!(
                "queued note {} replaced by {} before it could start",
                dropped.ctx.note, ctx.note
            );
        }

        self.shutdown_envelopes();
    }

    /// Replace the queued note of a voice that is already being stolen.
    pub fn requeue(&mut self, ctx: NoteContext, timestamp: u64) {
        if let Some(pending) = self.steal_pending.as_mut() {
            *pending = PendingNote {
                ctx,
                timestamp,
                released: false,
            };
        }
    }

    /// Fast fade to silence with nothing queued behind it.
    pub fn shutdown(&mut self) {
        self.steal_pending = None;
        self.shutdown_envelopes();
    }

    fn shutdown_envelopes(&mut self) {
        for modulator in &mut self.modulators {
            if let Some(eg) = modulator.as_envelope_mut() {
                eg.shutdown();
            }
        }
    }

    /// No note assigned and the output envelope is OFF.
    pub fn is_voice_free(&self) -> bool {
        self.note.is_none() && self.output_eg_state() == EgState::Off
    }

    /// One render tick of continuous activity.
    pub fn increment_timestamp(&mut self) {
        self.active_ticks = self.active_ticks.saturating_add(1);
    }

    /// Render one stereo frame. A free voice renders silence.
    pub fn render(&mut self) -> StereoFrame {
        if self.note.is_none() {
            return StereoFrame::SILENCE;
        }

        let bus = &mut self.bus;
        for (slot, modulator) in self.modulators.iter_mut().enumerate() {
            let out = modulator.render_modulator_output(bus);
            bus.set(slot, out);
        }

        let base = ModInputs {
            amplitude: self.bus.get(self.output_eg).unipolar,
            pitch_semitones: self.pitch_bend + self.glide.next_semitones(),
            cutoff_semitones: 0.0,
            pan: self.pan_offset,
        };
        let mods = resolve_routes(&self.routes, &self.bus, base);

        let mut sample = 0.0;
        for osc in &mut self.oscillators {
            sample += osc.render(&mods);
        }

        let mut frame = StereoFrame::mono(sample);
        for processor in &mut self.processors {
            frame = processor.process(frame, &mods);
        }
        let frame = frame * mods.amplitude;

        if self.output_eg_state() == EgState::Off {
            self.finish_note();
        }

        frame
    }

    /// Output envelope reached OFF: start the queued note or go free.
    fn finish_note(&mut self) {
        match self.steal_pending.take() {
            Some(pending) => {
                debug!("voice starting queued note {}", pending.ctx.note);
                self.active_ticks = 0;
                self.do_note_on(pending.ctx, pending.timestamp);
                if pending.released {
                    self.release();
                }
            }
            None => {
                self.note = None;
            }
        }
    }

    /// Reset every component for `sample_rate` and return to free.
    pub fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sanitize_sample_rate(sample_rate);
        for modulator in &mut self.modulators {
            modulator.reset(self.sample_rate);
        }
        for osc in &mut self.oscillators {
            osc.reset(self.sample_rate);
        }
        for processor in &mut self.processors {
            processor.reset(self.sample_rate);
        }
        self.bus.clear();
        self.glide.stop();
        self.note = None;
        self.steal_pending = None;
        self.active_ticks = 0;
    }

    /// Sustain pedal for every envelope in the voice. The state is kept and
    /// re-applied to every note this voice starts later.
    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.sustain_pedal = down;
        for modulator in &mut self.modulators {
            if let Some(eg) = modulator.as_envelope_mut() {
                eg.set_sustain_override(down);
            }
        }
    }

    pub fn set_pitch_bend(&mut self, semitones: f32) {
        self.pitch_bend = semitones;
    }

    /// Extra pan position, used for unison spread.
    pub fn set_pan_offset(&mut self, pan: f32) {
        self.pan_offset = pan;
    }

    /// Replace the settings of envelope `slot`. Call between render blocks.
    pub fn set_envelope_parameters(
        &mut self,
        slot: usize,
        params: &EgParameters,
    ) -> Result<(), SynthError> {
        let modulator = self
            .modulators
            .get_mut(slot)
            .ok_or(SynthError::UnknownSlot { slot })?;
        let eg = modulator
            .as_envelope_mut()
            .ok_or(SynthError::NotAnEnvelope { slot })?;
        eg.set_parameters(params.clone());
        Ok(())
    }

    pub fn state(&self) -> VoiceState {
        if self.note.is_none() {
            return VoiceState::Free;
        }
        match self.output_eg_state() {
            EgState::Shutdown if self.steal_pending.is_some() => VoiceState::Stealing,
            state if state.is_releasing() => VoiceState::Releasing,
            // Pedal-held notes still count as active
            _ => VoiceState::Active,
        }
    }

    pub fn output_eg_state(&self) -> EgState {
        self.output_envelope().map_or(EgState::Off, EnvelopeGenerator::state)
    }

    pub fn output_level(&self) -> f32 {
        self.output_envelope().map_or(0.0, EnvelopeGenerator::level)
    }

    fn output_envelope(&self) -> Option<&EnvelopeGenerator> {
        self.modulators
            .get(self.output_eg)
            .and_then(ModulatorSlot::as_envelope)
    }

    pub fn envelope(&self, slot: usize) -> Option<&EnvelopeGenerator> {
        self.modulators.get(slot).and_then(ModulatorSlot::as_envelope)
    }

    pub fn note(&self) -> Option<u8> {
        self.note.map(|ctx| ctx.note)
    }

    pub fn note_context(&self) -> Option<NoteContext> {
        self.note
    }

    pub fn pending_note(&self) -> Option<PendingNote> {
        self.steal_pending
    }

    pub fn sustain_pedal(&self) -> bool {
        self.sustain_pedal
    }

    /// A portamento slide is still running.
    pub fn is_gliding(&self) -> bool {
        self.glide.is_active()
    }

    pub fn note_on_timestamp(&self) -> u64 {
        self.note_on_timestamp
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_ticks
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn modulator_count(&self) -> usize {
        self.modulators.len()
    }
}

/// Assembles and validates a voice from components.
pub struct VoiceBuilder {
    sample_rate: f32,
    modulators: Vec<ModulatorSlot>,
    routes: Vec<ModRoute>,
    oscillators: Vec<Box<dyn SynthOscillator>>,
    processors: Vec<Box<dyn SynthProcessor>>,
    output_eg: usize,
    glide_ms: f64,
}

impl VoiceBuilder {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sanitize_sample_rate(sample_rate),
            modulators: Vec::new(),
            routes: Vec::new(),
            oscillators: Vec::new(),
            processors: Vec::new(),
            output_eg: 0,
            glide_ms: 0.0,
        }
    }

    pub fn modulator(mut self, modulator: impl Into<ModulatorSlot>) -> Self {
        self.modulators.push(modulator.into());
        self
    }

    pub fn oscillator(mut self, osc: impl SynthOscillator + 'static) -> Self {
        self.oscillators.push(Box::new(osc));
        self
    }

    pub fn processor(mut self, processor: impl SynthProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn route(mut self, route: ModRoute) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = ModRoute>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn output_eg(mut self, slot: usize) -> Self {
        self.output_eg = slot;
        self
    }

    /// Portamento time. Negative and NaN disable it.
    pub fn glide_ms(mut self, glide_ms: f64) -> Self {
        self.glide_ms = if glide_ms.is_nan() {
            0.0
        } else {
            glide_ms.clamp(0.0, MAX_SEGMENT_TIME_MS)
        };
        self
    }

    pub fn build(mut self) -> Result<SynthVoice, SynthError> {
        let slots = self.modulators.len();

        for (slot, modulator) in self.modulators.iter().enumerate() {
            if let Some(child) = modulator.dependencies().find(|&child| child >= slot) {
                return Err(SynthError::ChildOutOfOrder { slot, child });
            }
        }

        if let Some(route) = self.routes.iter().find(|route| route.source >= slots) {
            return Err(SynthError::RouteSourceOutOfRange {
                slot: route.source,
                slots,
            });
        }

        let output_eg = self.output_eg;
        let eg = self
            .modulators
            .get_mut(output_eg)
            .ok_or(SynthError::OutputEgOutOfRange {
                slot: output_eg,
                slots,
            })?
            .as_envelope_mut()
            .ok_or(SynthError::OutputEgNotEnvelope { slot: output_eg })?;
        eg.set_is_output_eg(true);

        let mut voice = SynthVoice {
            bus: ModBus::new(slots),
            modulators: self.modulators,
            routes: self.routes,
            oscillators: self.oscillators,
            processors: self.processors,
            output_eg,
            sample_rate: self.sample_rate,
            note: None,
            note_on_timestamp: 0,
            active_ticks: 0,
            steal_pending: None,
            sustain_pedal: false,
            glide: GlideModulator::default(),
            glide_ms: self.glide_ms,
            pitch_bend: 0.0,
            pan_offset: 0.0,
        };
        voice.reset(self.sample_rate);
        Ok(voice)
    }
}
