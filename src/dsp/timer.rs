//! Sample-count timers for the fixed-length envelope segments.

/// Convert a duration in milliseconds to a whole number of samples.
///
/// Negative and NaN durations give zero samples.
///
/// # Example
/// ```
/// use polycore::dsp::timer::ms_to_samples;
/// assert_eq!(ms_to_samples(10.0, 48_000.0), 480);
/// assert_eq!(ms_to_samples(-5.0, 48_000.0), 0);
/// ```
#[inline]
pub fn ms_to_samples(time_ms: f64, sample_rate: f64) -> u32 {
    let samples = (time_ms * sample_rate / 1000.0).round();
    if samples.is_nan() || samples <= 0.0 {
        0
    } else if samples >= u32::MAX as f64 {
        u32::MAX
    } else {
        samples as u32
    }
}

/// Counts rendered samples towards a target.
///
/// Used for DELAY, HOLD and SHUTDOWN, where the segment length is a fixed
/// number of samples rather than a curve reaching a level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleTimer {
    ticks: u32,
    target: u32,
}

impl SampleTimer {
    pub fn new(target: u32) -> Self {
        Self { ticks: 0, target }
    }

    pub fn set_target_ms(&mut self, time_ms: f64, sample_rate: f64) {
        self.target = ms_to_samples(time_ms, sample_rate);
    }

    pub fn set_target(&mut self, samples: u32) {
        self.target = samples;
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }

    #[inline]
    pub fn advance(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    #[inline]
    pub fn expired(&self) -> bool {
        self.ticks >= self.target
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn target(&self) -> u32 {
        self.target
    }
}
