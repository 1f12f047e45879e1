//! Terminal UI: voice pool view, scope and spectrum
//!
//! Runs on the main thread. Talks to the audio callback only through
//! lock-free ring buffers.

mod spectrum;
pub mod state;
mod status;
mod voices;
mod waveform;

use std::time::{Duration, Instant};

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use log::warn;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};
use rtrb::{Consumer, Producer};

use polycore::{EngineConfig, SynthMessage};

pub use state::EngineStatus;

use crate::keyboard::Keyboard;
use spectrum::{render_spectrum, SpectrumAnalyzer};
use status::{render_status, AudioStats};
use voices::render_voices;
use waveform::render_waveform;

/// Samples kept for the scope and the FFT
const VIS_BUFFER_SIZE: usize = 2048;

pub struct UiApp {
    event_tx: Producer<SynthMessage>,
    audio_rx: Consumer<f32>,
    status_rx: Consumer<EngineStatus>,
    config: EngineConfig,
    status: EngineStatus,
    keyboard: Keyboard,
    audio_buffer: Vec<f32>,
    spectrum: SpectrumAnalyzer,
    should_quit: bool,
}

impl UiApp {
    pub fn new(
        event_tx: Producer<SynthMessage>,
        audio_rx: Consumer<f32>,
        status_rx: Consumer<EngineStatus>,
        config: EngineConfig,
        status: EngineStatus,
    ) -> Self {
        Self {
            event_tx,
            audio_rx,
            status_rx,
            spectrum: SpectrumAnalyzer::new(VIS_BUFFER_SIZE, config.sample_rate),
            config,
            status,
            keyboard: Keyboard::new(),
            audio_buffer: vec![0.0; VIS_BUFFER_SIZE],
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            self.poll_audio();
            self.poll_status();

            for message in self.keyboard.expire(Instant::now()) {
                self.send(message);
            }

            terminal.draw(|frame| self.render(frame))?;

            // ~60fps
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                        self.handle_key(key.code);
                    }
                }
            }
        }

        Ok(())
    }

    fn poll_audio(&mut self) {
        let available = self.audio_rx.slots();
        if available == 0 {
            return;
        }
        if let Ok(chunk) = self.audio_rx.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            self.audio_buffer.extend_from_slice(first);
            self.audio_buffer.extend_from_slice(second);
            chunk.commit_all();
        }

        if self.audio_buffer.len() > VIS_BUFFER_SIZE {
            let excess = self.audio_buffer.len() - VIS_BUFFER_SIZE;
            self.audio_buffer.drain(..excess);
        }
        self.spectrum.update(&self.audio_buffer);
    }

    fn poll_status(&mut self) {
        while let Ok(status) = self.status_rx.pop() {
            self.status = status;
        }
    }

    fn send(&mut self, message: SynthMessage) {
        if self.event_tx.push(message).is_err() {
            warn!("event queue full, dropped {message:?}");
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        let message = match key {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
                None
            }
            KeyCode::Char('z') => {
                self.keyboard.shift_octave(-1);
                None
            }
            KeyCode::Char('x') => {
                self.keyboard.shift_octave(1);
                None
            }
            KeyCode::Char('c') => {
                self.keyboard.shift_velocity(-16);
                None
            }
            KeyCode::Char('v') => {
                self.keyboard.shift_velocity(16);
                None
            }
            KeyCode::Char(' ') => Some(self.keyboard.toggle_sustain()),
            KeyCode::Char(',') => Some(self.keyboard.bend(-1)),
            KeyCode::Char('.') => Some(self.keyboard.bend(1)),
            KeyCode::Char('/') => Some(self.keyboard.bend(0)),
            KeyCode::Backspace => Some(self.keyboard.panic()),
            KeyCode::Char(c) => self.keyboard.press(c, Instant::now()),
            _ => None,
        };

        if let Some(message) = message {
            self.send(message);
        }
    }

    fn render(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Status
                Constraint::Min(8),    // Voices + spectrum
                Constraint::Length(8), // Scope
                Constraint::Length(1), // Help
            ])
            .split(frame.area());

        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(48), Constraint::Min(20)])
            .split(rows[1]);

        let stats = AudioStats::from_buffer(&self.audio_buffer);
        render_status(frame, rows[0], &self.config, &self.status, &self.keyboard, &stats);
        render_voices(frame, middle[0], &self.status);
        render_spectrum(frame, middle[1], self.spectrum.data());
        render_waveform(frame, rows[2], &self.audio_buffer);

        let help = Paragraph::new(
            " [a-;] Play  [Z/X] Octave  [C/V] Velocity  [Space] Pedal  [,./] Bend  [Bksp] Panic  [Q] Quit",
        )
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, rows[3]);
    }
}
