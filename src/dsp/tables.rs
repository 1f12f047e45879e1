//! Process-wide read-only wave tables.
//!
//! Built once on first use and shared by every oscillator in every voice
//! without synchronization. Nothing mutates them after construction.

use std::f64::consts::TAU;
use std::sync::OnceLock;

/// Samples per table cycle. A power of two so the phase wraps with a mask.
pub const TABLE_SIZE: usize = 4096;

pub struct WaveTables {
    // One guard sample at the end for interpolation
    sine: Vec<f32>,
}

static TABLES: OnceLock<WaveTables> = OnceLock::new();

impl WaveTables {
    fn build() -> Self {
        let sine = (0..=TABLE_SIZE)
            .map(|i| (TAU * i as f64 / TABLE_SIZE as f64).sin() as f32)
            .collect();
        Self { sine }
    }

    /// The shared tables. The first call builds them; call it outside the
    /// render thread (engine construction does).
    pub fn global() -> &'static WaveTables {
        TABLES.get_or_init(Self::build)
    }

    /// Linearly interpolated sine at `phase` in [0, 1).
    #[inline]
    pub fn sine(&self, phase: f64) -> f32 {
        let pos = phase.rem_euclid(1.0) * TABLE_SIZE as f64;
        let index = (pos as usize).min(TABLE_SIZE - 1);
        let frac = (pos - index as f64) as f32;

        let a = self.sine[index];
        let b = self.sine[index + 1];
        a + (b - a) * frac
    }
}
