//! Log-frequency spectrum of the mono mix

use std::f32::consts::TAU;
use std::sync::Arc;

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

const BANDS: usize = 64;
const MIN_FREQ: f64 = 30.0;
const FLOOR_DB: f64 = -100.0;
/// Per-update fall of displayed peaks, in dB
const FALL_DB: f64 = 3.0;

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    /// FFT bin per band
    bins: Vec<usize>,
    /// (log10 frequency, dB) per band
    bands: Vec<(f64, f64)>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize, sample_rate: f32) -> Self {
        let size = size.max(2);
        let fft = FftPlanner::new().plan_fft_forward(size);

        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (TAU * i as f32 / (size - 1) as f32).cos())
            .collect();

        let nyquist = (sample_rate as f64 / 2.0).min(20_000.0);
        let span = (nyquist / MIN_FREQ).max(1.0);
        let last_bin = size / 2 - 1;

        let (bins, bands): (Vec<usize>, Vec<(f64, f64)>) = (0..BANDS)
            .map(|band| {
                let freq = MIN_FREQ * span.powf(band as f64 / (BANDS - 1) as f64);
                let bin = ((freq * size as f64 / sample_rate as f64).round() as usize).min(last_bin);
                (bin, (freq.log10(), FLOOR_DB))
            })
            .unzip();

        Self {
            fft,
            window,
            scratch: vec![Complex::default(); size],
            bins,
            bands,
        }
    }

    /// Analyse the latest `samples`. Buffers of the wrong size are ignored.
    pub fn update(&mut self, samples: &[f32]) {
        if samples.len() != self.window.len() {
            return;
        }

        for ((slot, &s), &w) in self.scratch.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let norm = 2.0 / self.window.len() as f32;
        for (band, &bin) in self.bands.iter_mut().zip(&self.bins) {
            let magnitude = (self.scratch[bin].norm() * norm).max(1e-6);
            let db = (20.0 * (magnitude as f64).log10()).max(FLOOR_DB);
            // Rise instantly, fall slowly
            band.1 = db.max(band.1 - FALL_DB);
        }
    }

    pub fn data(&self) -> &[(f64, f64)] {
        &self.bands
    }
}

pub fn render_spectrum(frame: &mut Frame, area: Rect, bands: &[(f64, f64)]) {
    let (low, high) = match (bands.first(), bands.last()) {
        (Some(first), Some(last)) => (first.0, last.0.max(first.0 + 1.0)),
        _ => (MIN_FREQ.log10(), 4.3),
    };

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Green))
        .data(bands);

    let chart = Chart::new(vec![dataset])
        .block(Block::default().title(" Spectrum ").borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .bounds([low, high])
                .labels(vec!["30", "1k", "20k"])
                .style(Style::default().fg(Color::DarkGray)),
        )
        .y_axis(
            Axis::default()
                .bounds([FLOOR_DB, 0.0])
                .labels(vec!["-100", "-50", "0"])
                .style(Style::default().fg(Color::DarkGray)),
        );

    frame.render_widget(chart, area);
}
