//! Render a chord progression offline and print level statistics.
//!
//! Run with: cargo run --example offline_render
//!
//! Eight voices play four-note chords with overlapping releases, so later
//! chords steal voices still ringing out from earlier ones.

use color_eyre::eyre::eyre;
use log::info;
use rtrb::RingBuffer;

use polycore::synth::params::StealPolicy;
use polycore::{EngineConfig, SynthEngine, SynthMessage, TimedMessage, MAX_BLOCK_SIZE};

const SAMPLE_RATE: f32 = 48_000.0;
const CHORD_FRAMES: u64 = 24_000;
const CHORDS: [[u8; 4]; 4] = [[60, 64, 67, 71], [57, 60, 64, 67], [62, 65, 69, 72], [55, 59, 62, 65]];

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = EngineConfig {
        sample_rate: SAMPLE_RATE,
        max_voices: 8,
        steal_policy: StealPolicy::OldestNote,
        ..EngineConfig::default()
    };
    let mut engine = SynthEngine::new(config)?;

    // Stamp the whole progression up front, as a sequencer thread would
    let (mut tx, mut rx) = RingBuffer::<TimedMessage>::new(64);
    for (index, chord) in CHORDS.iter().enumerate() {
        let start = index as u64 * CHORD_FRAMES;
        for &note in chord {
            let on = SynthMessage::NoteOn { note, velocity: 100 };
            let off = SynthMessage::NoteOff { note, velocity: 0 };
            for message in [TimedMessage::at(start, on), TimedMessage::at(start + CHORD_FRAMES * 3 / 4, off)] {
                tx.push(message).map_err(|_| eyre!("event queue full"))?;
            }
        }
    }
    engine.drain(&mut rx);

    let total = CHORD_FRAMES as usize * (CHORDS.len() + 1);
    let mut left = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut right = vec![0.0f32; MAX_BLOCK_SIZE];
    let mut rendered = 0;
    let mut peak = 0.0f32;
    let mut energy = 0.0f64;
    let mut most_voices = 0;

    while rendered < total {
        let frames = (total - rendered).min(MAX_BLOCK_SIZE);
        engine.render_block(&mut left[..frames], &mut right[..frames]);

        for (&l, &r) in left[..frames].iter().zip(&right[..frames]) {
            peak = peak.max(l.abs()).max(r.abs());
            energy += (l as f64).powi(2) + (r as f64).powi(2);
        }
        most_voices = most_voices.max(engine.active_voice_count());
        rendered += frames;
    }

    let rms = (energy / (2 * total) as f64).sqrt();
    info!(
        "rendered {total} frames ({:.1}s): peak {peak:.3}, rms {rms:.4}, up to {most_voices} voices",
        total as f32 / SAMPLE_RATE
    );
    println!("peak {peak:.3}  rms {rms:.4}  voices {most_voices}/{}", engine.voices().len());
    Ok(())
}
