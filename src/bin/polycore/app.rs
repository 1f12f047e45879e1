//! Audio device setup and the realtime render callback

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use rtrb::RingBuffer;

use polycore::dsp::envelope::EgParameters;
use polycore::dsp::filter::{FilterParameters, FilterType};
use polycore::dsp::lfo::LfoParameters;
use polycore::dsp::oscillator::{OscillatorParameters, OscillatorWaveform};
use polycore::synth::modulator::{ModDestination, ModRoute};
use polycore::synth::params::ModulatorParameters;
use polycore::synth::VoiceParameters;
use polycore::{EngineConfig, SynthEngine, SynthMessage, MAX_BLOCK_SIZE};

use super::ui::{EngineStatus, UiApp};

/// UI -> audio note and controller messages
const EVENT_QUEUE_SIZE: usize = 256;
/// Audio -> UI mono samples for the scope and spectrum
const AUDIO_QUEUE_SIZE: usize = 16_384;
/// Audio -> UI voice snapshots, one per callback
const STATUS_QUEUE_SIZE: usize = 32;

/// Two detuned saws through a low-pass filter. Slot 0 is the amplitude
/// envelope, slot 1 sweeps the cutoff, slot 2 is a delayed vibrato.
fn default_patch() -> VoiceParameters {
    let mut detuned = OscillatorParameters::new(OscillatorWaveform::Saw);
    detuned.detune_cents = 7.0;
    detuned.level = 0.5;
    let mut saw = OscillatorParameters::new(OscillatorWaveform::Saw);
    saw.level = 0.5;

    VoiceParameters {
        oscillators: vec![saw, detuned],
        modulators: vec![
            ModulatorParameters::envelope(EgParameters::adsr(8.0, 400.0, 0.6, 500.0)),
            ModulatorParameters::envelope(EgParameters::adsr(2.0, 600.0, 0.2, 400.0)),
            ModulatorParameters::Lfo(LfoParameters {
                frequency_hz: 5.5,
                delay_ms: 400.0,
                fade_in_ms: 600.0,
                ..LfoParameters::default()
            }),
        ],
        routes: vec![
            ModRoute::new(1, ModDestination::FilterCutoff, 36.0),
            ModRoute::new(2, ModDestination::Pitch, 0.15),
        ],
        filter: Some(FilterParameters {
            filter_type: FilterType::LowPass,
            cutoff_hz: 400.0,
            resonance: 0.3,
        }),
        ..VoiceParameters::default()
    }
}

pub struct App {
    config: EngineConfig,
}

impl App {
    pub fn new(mut config: EngineConfig) -> Self {
        config.voice = default_patch();
        Self { config }
    }

    /// Open the default output device and run the UI until the user quits.
    pub fn run(self) -> EyreResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let supported = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = supported.sample_rate().0 as f32;
        let channels = supported.channels() as usize;
        info!(
            "output device {:?}: {} Hz, {} channels",
            device.name().unwrap_or_default(),
            sample_rate,
            channels
        );

        let config = EngineConfig {
            sample_rate,
            ..self.config
        };
        let mut engine =
            SynthEngine::new(config.clone()).wrap_err("failed to build the voice pool")?;
        let initial = EngineStatus::from_engine(&engine);

        let (event_tx, mut event_rx) = RingBuffer::<SynthMessage>::new(EVENT_QUEUE_SIZE);
        let (mut audio_tx, audio_rx) = RingBuffer::<f32>::new(AUDIO_QUEUE_SIZE);
        let (mut status_tx, status_rx) = RingBuffer::<EngineStatus>::new(STATUS_QUEUE_SIZE);

        let mut left = vec![0.0f32; MAX_BLOCK_SIZE];
        let mut right = vec![0.0f32; MAX_BLOCK_SIZE];

        let stream = device.build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _| {
                engine.drain(&mut event_rx);

                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(MAX_BLOCK_SIZE);
                    let (l, r) = (&mut left[..frames], &mut right[..frames]);
                    engine.render_block(l, r);

                    let out = &mut data[frames_written * channels..(frames_written + frames) * channels];
                    for ((frame, &l), &r) in out.chunks_exact_mut(channels).zip(l.iter()).zip(r.iter()) {
                        let mono = 0.5 * (l + r);
                        for (ch, sample) in frame.iter_mut().enumerate() {
                            *sample = match (channels, ch) {
                                (1, _) => mono,
                                (_, 0) => l,
                                (_, 1) => r,
                                _ => mono,
                            };
                        }
                        // Scope falls behind rather than blocking audio
                        let _ = audio_tx.push(mono);
                    }

                    frames_written += frames;
                }

                let _ = status_tx.push(EngineStatus::from_engine(&engine));
            },
            |err| error!("audio stream error: {err}"),
            None,
        )?;

        stream.play()?;
        info!("stream running, {} voices, {:?} mode", config.max_voices, config.mode);

        let mut terminal = ratatui::init();
        let result = UiApp::new(event_tx, audio_rx, status_rx, config, initial).run(&mut terminal);
        ratatui::restore();

        drop(stream);
        info!("stream closed");
        result
    }
}
