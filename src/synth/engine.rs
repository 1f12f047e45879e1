use log::debug;

use crate::dsp::envelope::EgParameters;
use crate::dsp::modulate::db_to_gain;
use crate::dsp::tables::WaveTables;
use crate::io::converter::{pitch_bend_to_semitones, velocity_to_gain};
use crate::io::midi::{
    CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_PAN, CC_RESET_ALL_CONTROLLERS, CC_SUSTAIN_PEDAL,
    CC_VOLUME, PITCH_BEND_CENTER,
};
use crate::synth::component::{NoteContext, StereoFrame};
use crate::synth::error::SynthError;
use crate::synth::factory::VoiceFactory;
use crate::synth::message::{MessageReceiver, SynthMessage, TimedMessage};
use crate::synth::params::{
    EngineConfig, ModulatorParameters, StealPolicy, SynthMode, MAX_UNISON_VOICES,
};
use crate::synth::scheduler::Scheduler;
use crate::synth::voice::SynthVoice;

/// Detune multipliers (of the unison detune amount) per unison voice.
const UNISON_DETUNE: [f32; MAX_UNISON_VOICES] = [0.0, 1.0, -1.0, 0.707];
/// Stereo position per unison voice.
const UNISON_PAN: [f32; MAX_UNISON_VOICES] = [0.5, -1.0, 1.0, -0.5];

const CC_MODULATION: u8 = 1;

/// Most recent MIDI input state seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiSnapshot {
    pub controllers: [u8; 128],
    pub pitch_bend: i16,
    pub last_note: Option<u8>,
    pub last_velocity: u8,
    pub sustain_pedal: bool,
}

impl Default for MidiSnapshot {
    fn default() -> Self {
        let mut controllers = [0; 128];
        controllers[CC_VOLUME as usize] = 127;
        controllers[CC_PAN as usize] = 64;
        Self {
            controllers,
            pitch_bend: PITCH_BEND_CENTER,
            last_note: None,
            last_velocity: 0,
            sustain_pedal: false,
        }
    }
}

impl MidiSnapshot {
    pub fn controller(&self, controller: u8) -> u8 {
        self.controllers[(controller & 0x7F) as usize]
    }
}

/// Fixed-size voice pool with allocation, stealing and mixing.
///
/// Everything here runs on the render thread. Messages from other threads
/// come in through [`SynthEngine::drain`] with a lock-free receiver.
pub struct SynthEngine {
    config: EngineConfig,
    voices: Vec<SynthVoice>,
    scheduler: Scheduler,
    midi: MidiSnapshot,
    tables: &'static WaveTables,

    note_counter: u64,
    frame: u64,

    master_gain: f32,
    balance: f32,
}

impl SynthEngine {
    /// Build an engine whose voices come from `config.voice`.
    pub fn new(config: EngineConfig) -> Result<Self, SynthError> {
        let patch = config.voice.clone();
        Self::with_factory(config, &patch)
    }

    /// Build an engine whose voices come from `factory`.
    pub fn with_factory<F>(config: EngineConfig, factory: &F) -> Result<Self, SynthError>
    where
        F: VoiceFactory + ?Sized,
    {
        let config = config.sanitized();
        if config.max_voices == 0 {
            return Err(SynthError::EmptyVoicePool);
        }

        // Shared tables are built here, before any voice renders
        let tables = WaveTables::global();

        let voices = (0..config.max_voices)
            .map(|_| factory.create_voice(config.sample_rate))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "engine ready: {} voices at {} Hz, {:?} mode, {:?} stealing",
            voices.len(),
            config.sample_rate,
            config.mode,
            config.steal_policy
        );

        let mut engine = Self {
            scheduler: Scheduler::new(config.event_capacity),
            config,
            voices,
            midi: MidiSnapshot::default(),
            tables,
            note_counter: 0,
            frame: 0,
            master_gain: 1.0,
            balance: 0.0,
        };
        engine.update_master_gain();
        Ok(engine)
    }

    /// Apply a message now.
    pub fn process_event(&mut self, message: SynthMessage) {
        match message {
            SynthMessage::NoteOn { note, velocity: 0 } => self.note_off(note),
            SynthMessage::NoteOn { note, velocity } => self.note_on(note, velocity),
            SynthMessage::NoteOff { note, .. } => self.note_off(note),
            SynthMessage::ControlChange { controller, value } => {
                self.control_change(controller, value)
            }
            SynthMessage::PitchBend { value } => self.set_pitch_bend(value),
            SynthMessage::AllNotesOff => self.all_notes_off(),
        }
    }

    /// Apply a message at its frame. Messages already due are applied at
    /// once; later ones wait in the scheduler. Returns false if it was
    /// dropped because the scheduler is full.
    pub fn schedule(&mut self, message: TimedMessage) -> bool {
        if message.timestamp <= self.frame {
            self.process_event(message.message);
            true
        } else {
            self.scheduler.enqueue(message)
        }
    }

    /// Take everything waiting in `rx`. Never blocks.
    pub fn drain<R: MessageReceiver + ?Sized>(&mut self, rx: &mut R) {
        while let Some(message) = rx.pop() {
            self.schedule(message);
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let note = note.min(127);
        let velocity = velocity.min(127);
        let glide_from = self.midi.last_note.replace(note);
        self.midi.last_velocity = velocity;

        match self.config.mode {
            SynthMode::Poly => self.poly_note_on(note, velocity, glide_from),
            SynthMode::Mono => self.mono_note_on(note, velocity, glide_from),
            SynthMode::Unison => self.unison_note_on(note, velocity, glide_from),
        }
    }

    fn poly_note_on(&mut self, note: u8, velocity: u8, glide_from: Option<u8>) {
        let ctx = self.note_context(note, velocity, 0.0).with_glide_from(glide_from);
        let timestamp = self.next_timestamp();

        if let Some(index) = self.get_active_voice_index_in_note_on(note) {
            debug!("note {note}: retrigger on voice {index}");
            self.voices[index].do_note_on(ctx, timestamp);
        } else if let Some(index) = self.get_pending_voice_index(note) {
            debug!("note {note}: already queued on voice {index}, restamping");
            self.voices[index].requeue(ctx, timestamp);
        } else if let Some(index) = self.get_free_voice_index() {
            debug!("note {note}: free voice {index}");
            self.voices[index].do_note_on(ctx, timestamp);
        } else if let Some(index) = self.get_voice_index_to_steal() {
            debug!(
                "note {note}: stealing voice {index} from note {:?}",
                self.voices[index].note()
            );
            self.voices[index].steal(ctx, timestamp);
        }
    }

    fn mono_note_on(&mut self, note: u8, velocity: u8, glide_from: Option<u8>) {
        let ctx = self.note_context(note, velocity, 0.0).with_glide_from(glide_from);
        let timestamp = self.next_timestamp();
        let voice = &mut self.voices[0];

        if voice.pending_note().is_some() {
            voice.requeue(ctx, timestamp);
        } else {
            // Legato: the envelopes re-attack from their current level
            voice.do_note_on(ctx, timestamp);
        }
    }

    fn unison_note_on(&mut self, note: u8, velocity: u8, glide_from: Option<u8>) {
        let timestamp = self.next_timestamp();
        let detune = self.config.unison_detune_cents;
        let count = self.voices.len().min(MAX_UNISON_VOICES);

        for index in 0..count {
            let ctx = self
                .note_context(note, velocity, UNISON_DETUNE[index] * detune)
                .with_glide_from(glide_from);
            let voice = &mut self.voices[index];
            voice.set_pan_offset(UNISON_PAN[index]);
            if voice.pending_note().is_some() {
                voice.requeue(ctx, timestamp);
            } else {
                voice.do_note_on(ctx, timestamp);
            }
        }
    }

    pub fn note_off(&mut self, note: u8) {
        let mut handled = false;
        for voice in &mut self.voices {
            handled |= voice.do_note_off(note);
        }

        // Also routine when a percussive envelope ended before the key went up
        if !handled {
            debug!("note-off for unassigned note {note}, ignored");
        }
    }

    /// Voice sounding `note` with nothing queued behind it.
    pub fn get_active_voice_index_in_note_on(&self, note: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|voice| voice.note() == Some(note) && voice.pending_note().is_none())
    }

    /// Voice being stolen for `note`.
    pub fn get_pending_voice_index(&self, note: u8) -> Option<usize> {
        self.voices.iter().position(|voice| {
            voice
                .pending_note()
                .is_some_and(|pending| pending.ctx.note == note)
        })
    }

    /// Lowest-index free voice.
    pub fn get_free_voice_index(&self) -> Option<usize> {
        self.voices.iter().position(SynthVoice::is_voice_free)
    }

    /// Steal victim among busy voices.
    ///
    /// Order: voices not already being stolen, then voices whose output
    /// envelope is in release or shutdown, then the steal policy, then the
    /// lowest index. A queued note is only replaced when every voice already
    /// has one.
    pub fn get_voice_index_to_steal(&self) -> Option<usize> {
        let policy = self.config.steal_policy;
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|&(index, voice)| {
                let queued = voice.pending_note().is_some();
                let gated = !voice.output_eg_state().is_releasing();
                let age = match policy {
                    StealPolicy::OldestNote => voice.note_on_timestamp(),
                    StealPolicy::LongestActive => u64::MAX - voice.active_ticks(),
                };
                (queued, gated, age, index)
            })
            .map(|(index, _)| index)
    }

    pub fn control_change(&mut self, controller: u8, value: u8) {
        let controller = controller & 0x7F;
        let value = value.min(127);
        self.midi.controllers[controller as usize] = value;

        match controller {
            CC_VOLUME => self.update_master_gain(),
            CC_PAN => self.balance = ((value as f32 - 64.0) / 63.0).clamp(-1.0, 1.0),
            CC_SUSTAIN_PEDAL => self.set_sustain_pedal(value >= 64),
            CC_ALL_SOUND_OFF => self.all_sound_off(),
            CC_RESET_ALL_CONTROLLERS => self.reset_controllers(),
            CC_ALL_NOTES_OFF => self.all_notes_off(),
            _ => {}
        }
    }

    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.midi.sustain_pedal = down;
        self.midi.controllers[CC_SUSTAIN_PEDAL as usize] = if down { 127 } else { 0 };
        for voice in &mut self.voices {
            voice.set_sustain_pedal(down);
        }
    }

    /// Centred 14-bit bend applied to every voice.
    pub fn set_pitch_bend(&mut self, value: i16) {
        self.midi.pitch_bend = value;
        let semitones = pitch_bend_to_semitones(value, self.config.pitch_bend_range);
        for voice in &mut self.voices {
            voice.set_pitch_bend(semitones);
        }
    }

    /// Release every note, queued ones included. The sustain pedal still
    /// holds notes it is holding.
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            if let Some(pending) = voice.pending_note() {
                voice.do_note_off(pending.ctx.note);
            }
            voice.release();
        }
    }

    /// Fade every voice out with the shutdown ramp and drop queued notes.
    pub fn all_sound_off(&mut self) {
        for voice in &mut self.voices {
            if !voice.is_voice_free() {
                voice.shutdown();
            }
        }
    }

    fn reset_controllers(&mut self) {
        self.midi.controllers[CC_MODULATION as usize] = 0;
        self.set_pitch_bend(PITCH_BEND_CENTER);
        self.set_sustain_pedal(false);
    }

    fn update_master_gain(&mut self) {
        let volume = velocity_to_gain(self.midi.controller(CC_VOLUME));
        self.master_gain = db_to_gain(self.config.master_volume_db) * volume;
    }

    /// Replace envelope `slot` settings on every voice. Call between blocks.
    pub fn set_envelope_parameters(
        &mut self,
        slot: usize,
        params: EgParameters,
    ) -> Result<(), SynthError> {
        for voice in &mut self.voices {
            voice.set_envelope_parameters(slot, &params)?;
        }
        if let Some(ModulatorParameters::Envelope { params: stored, .. }) =
            self.config.voice.modulators.get_mut(slot)
        {
            *stored = params;
        }
        Ok(())
    }

    /// Render one stereo frame of the mix.
    pub fn render_audio_output(&mut self) -> StereoFrame {
        while let Some(message) = self.scheduler.pop_due(self.frame) {
            self.process_event(message);
        }

        let voice_gain = self.config.voice_gain;
        let mut mix = StereoFrame::SILENCE;
        for voice in &mut self.voices {
            if voice.is_voice_free() {
                continue;
            }
            voice.increment_timestamp();
            mix += voice.render() * voice_gain;
        }

        self.frame += 1;

        let left = self.master_gain * (1.0 - self.balance).min(1.0);
        let right = self.master_gain * (1.0 + self.balance).min(1.0);
        StereoFrame::new(mix.left * left, mix.right * right)
    }

    /// Render into a pair of channel buffers. Extra samples in the longer
    /// buffer are left untouched.
    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let frame = self.render_audio_output();
            *l = frame.left;
            *r = frame.right;
        }
    }

    /// Render a mono downmix.
    pub fn render_mono(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.render_audio_output().to_mono();
        }
    }

    /// Reset every voice for `sample_rate` and forget queued messages.
    pub fn reset(&mut self, sample_rate: f32) {
        for voice in &mut self.voices {
            voice.reset(sample_rate);
        }
        if let Some(voice) = self.voices.first() {
            self.config.sample_rate = voice.sample_rate();
        }
        self.scheduler.clear();
        self.frame = 0;
    }

    fn note_context(&self, note: u8, velocity: u8, detune_cents: f32) -> NoteContext {
        NoteContext::tuned(
            note,
            velocity,
            self.config.master_tuning_cents + detune_cents,
        )
    }

    fn next_timestamp(&mut self) -> u64 {
        self.note_counter += 1;
        self.note_counter
    }

    pub fn voices(&self) -> &[SynthVoice] {
        &self.voices
    }

    pub fn voice(&self, index: usize) -> Option<&SynthVoice> {
        self.voices.get(index)
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_voice_free()).count()
    }

    pub fn midi(&self) -> &MidiSnapshot {
        &self.midi
    }

    /// Index of the next frame to render.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    pub fn wave_tables(&self) -> &'static WaveTables {
        self.tables
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }
}
