//! Status bar: engine mode, MIDI state, keyboard settings and levels

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use polycore::EngineConfig;

use super::state::EngineStatus;
use super::voices::note_name;
use crate::keyboard::Keyboard;

pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
}

impl AudioStats {
    pub fn from_buffer(buffer: &[f32]) -> Self {
        if buffer.is_empty() {
            return Self { peak: 0.0, rms: 0.0 };
        }
        let peak = buffer.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let rms = (buffer.iter().map(|&x| x * x).sum::<f32>() / buffer.len() as f32).sqrt();
        Self { peak, rms }
    }
}

pub fn render_status(
    frame: &mut Frame,
    area: Rect,
    config: &EngineConfig,
    status: &EngineStatus,
    keyboard: &Keyboard,
    stats: &AudioStats,
) {
    let seconds = status.frame as f64 / config.sample_rate as f64;
    let last = status.last_note.map(note_name).unwrap_or_else(|| "--".into());
    let pedal = if status.sustain { "down" } else { "up" };
    let peak_color = if stats.peak >= 1.0 { Color::Red } else { Color::Magenta };

    let line = Line::from(vec![
        Span::styled(
            format!(" {:?} / {:?}  ", config.mode, config.steal_policy),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(format!("{seconds:>7.1}s  "), Style::default().fg(Color::DarkGray)),
        Span::raw(format!("last {last:<4} ")),
        Span::raw(format!("oct {} vel {:<3} ", keyboard.octave(), keyboard.velocity())),
        Span::raw(format!("bend {:+5} pedal {pedal:<4} vol {:<3} ", status.pitch_bend, status.volume)),
        Span::styled(
            format!("{:.1}kHz  ", config.sample_rate / 1000.0),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("Peak: {:.2}  RMS: {:.2}", stats.peak, stats.rms),
            Style::default().fg(peak_color),
        ),
    ]);

    let paragraph = Paragraph::new(line).block(Block::default().title(" polycore ").borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}
