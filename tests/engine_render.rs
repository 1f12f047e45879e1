use polycore::dsp::envelope::{EgParameters, EgState};
use polycore::io::converter::midi_to_synth;
use polycore::io::midi::MidiEvent;
use polycore::synth::params::{ModulatorParameters, StealPolicy, VoiceParameters};
use polycore::{EngineConfig, StereoFrame, SynthEngine, SynthMessage, TimedMessage};

const SAMPLE_RATE: f32 = 48_000.0;

fn reference_engine(voices: usize) -> SynthEngine {
    let config = EngineConfig {
        sample_rate: SAMPLE_RATE,
        voice: VoiceParameters {
            modulators: vec![ModulatorParameters::envelope(EgParameters::adsr(
                10.0, 200.0, 0.7, 300.0,
            ))],
            ..VoiceParameters::default()
        },
        ..EngineConfig::with_voices(voices)
    };
    SynthEngine::new(config).unwrap()
}

/// Overlapping notes on a small pool, so the run includes steals.
fn busy_sequence() -> Vec<TimedMessage> {
    let mut messages = Vec::new();
    for (i, note) in [48u8, 55, 60, 64, 67, 72, 76, 79].into_iter().enumerate() {
        let start = i as u64 * 1_500;
        messages.push(TimedMessage::at(start, SynthMessage::NoteOn { note, velocity: 110 }));
        messages.push(TimedMessage::at(start + 6_000, SynthMessage::NoteOff { note, velocity: 0 }));
    }
    messages.push(TimedMessage::at(
        3_000,
        SynthMessage::PitchBend { value: 3_000 },
    ));
    messages
}

fn render_sequence(messages: &[TimedMessage], frames: usize) -> Vec<StereoFrame> {
    let mut engine = reference_engine(4);
    for &message in messages {
        assert!(engine.schedule(message));
    }
    (0..frames).map(|_| engine.render_audio_output()).collect()
}

#[test]
fn idle_engine_renders_silence() {
    let mut engine = reference_engine(8);
    for _ in 0..1_024 {
        assert!(engine.render_audio_output().is_silent());
    }
    assert_eq!(engine.frame(), 1_024);
}

#[test]
fn identical_events_render_identical_output() {
    let messages = busy_sequence();
    let first = render_sequence(&messages, 24_000);
    let second = render_sequence(&messages, 24_000);

    assert!(first.iter().any(|f| !f.is_silent()));
    for (n, (a, b)) in first.iter().zip(&second).enumerate() {
        assert_eq!(a.left.to_bits(), b.left.to_bits(), "left differs at {n}");
        assert_eq!(a.right.to_bits(), b.right.to_bits(), "right differs at {n}");
    }
}

#[test]
fn mix_stays_bounded_under_load() {
    let messages = busy_sequence();
    for frame in render_sequence(&messages, 24_000) {
        assert!(frame.left.is_finite() && frame.right.is_finite());
        assert!(frame.left.abs() <= 1.0 && frame.right.abs() <= 1.0);
    }
}

#[test]
fn reference_envelope_through_the_engine() {
    let mut engine = reference_engine(1);
    engine.note_on(69, 127);

    let mut peak_at = None;
    let mut sustain_at = None;
    let mut free_at = None;

    for n in 0..40_000usize {
        if n == 20_000 {
            engine.note_off(69);
        }
        engine.render_audio_output();

        let voice = &engine.voices()[0];
        if peak_at.is_none() && voice.output_level() >= 1.0 - 1e-6 {
            peak_at = Some(n);
        }
        if sustain_at.is_none() && voice.output_eg_state() == EgState::Sustain {
            sustain_at = Some(n);
            assert!((voice.output_level() - 0.7).abs() < 1e-6);
        }
        if n >= 20_000 && free_at.is_none() && voice.is_voice_free() {
            free_at = Some(n);
        }
    }

    let peak_at = peak_at.unwrap();
    assert!((478..=481).contains(&peak_at), "peak at {peak_at}");
    assert!(sustain_at.unwrap() <= 480 + 9_600);

    let free_at = free_at.unwrap();
    assert!(free_at <= 20_000 + 14_400 + 1, "voice freed late at {free_at}");
}

fn steal_after_retrigger(policy: StealPolicy) -> usize {
    let config = EngineConfig {
        steal_policy: policy,
        ..EngineConfig::with_voices(2)
    };
    let mut engine = SynthEngine::new(config).unwrap();

    engine.note_on(60, 100);
    for _ in 0..500 {
        engine.render_audio_output();
    }
    engine.note_on(62, 100);
    // Retrigger: newest note-on, but still the longest sounding voice
    engine.note_on(60, 100);
    for _ in 0..10 {
        engine.render_audio_output();
    }

    engine.note_on(64, 100);
    engine
        .voices()
        .iter()
        .position(|v| v.pending_note().is_some())
        .unwrap()
}

#[test]
fn steal_policies_rank_retriggered_voices_differently() {
    assert_eq!(steal_after_retrigger(StealPolicy::OldestNote), 1);
    assert_eq!(steal_after_retrigger(StealPolicy::LongestActive), 0);
}

#[test]
fn midi_events_drive_the_engine() {
    let mut engine = reference_engine(4);
    let events = [
        MidiEvent::NoteOn { channel: 0, key: 60, velocity: 100 },
        MidiEvent::NoteOn { channel: 1, key: 62, velocity: 100 },
        MidiEvent::ProgramChange { channel: 0, program: 3 },
        MidiEvent::ControlChange { channel: 0, controller: 64, value: 127 },
    ];
    for event in events {
        if let Some(message) = midi_to_synth(event, 0) {
            engine.process_event(message);
        }
    }

    assert_eq!(engine.active_voice_count(), 1);
    assert!(engine.midi().sustain_pedal);
    assert_eq!(engine.midi().last_note, Some(60));

    // Velocity zero is a note-off, held by the pedal
    let off = midi_to_synth(MidiEvent::NoteOn { channel: 0, key: 60, velocity: 0 }, 0);
    engine.process_event(off.unwrap());
    for _ in 0..48_000 {
        engine.render_audio_output();
    }
    assert_eq!(engine.active_voice_count(), 1);
}
