//! Voice pool view: one row per voice with its note and output level

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use polycore::synth::VoiceState;

use super::state::EngineStatus;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const METER_WIDTH: usize = 24;

pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

fn state_style(state: VoiceState) -> (&'static str, Color) {
    match state {
        VoiceState::Free => ("free", Color::DarkGray),
        VoiceState::Active => ("on", Color::Green),
        VoiceState::Releasing => ("rel", Color::Yellow),
        VoiceState::Stealing => ("steal", Color::Red),
    }
}

fn meter(level: f32) -> String {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    format!("{}{}", "█".repeat(filled), "·".repeat(METER_WIDTH - filled))
}

pub fn render_voices(frame: &mut Frame, area: Rect, status: &EngineStatus) {
    let lines: Vec<Line> = status
        .shown_voices()
        .iter()
        .enumerate()
        .map(|(index, voice)| {
            let (label, color) = state_style(voice.state);
            let note = voice.note.map(note_name).unwrap_or_else(|| "--".into());
            let queued = voice
                .pending
                .map(|n| format!(" → {}", note_name(n)))
                .unwrap_or_default();

            Line::from(vec![
                Span::styled(format!("{index:>2} "), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{label:<6}"), Style::default().fg(color)),
                Span::raw(format!("{note:<4}")),
                Span::styled(meter(voice.level), Style::default().fg(color)),
                Span::styled(queued, Style::default().fg(Color::Red)),
            ])
        })
        .collect();

    let title = format!(
        " Voices {}/{} ",
        status.active_voices, status.total_voices
    );
    let paragraph = Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}
