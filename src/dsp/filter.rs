use std::f32::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dsp::modulate::semitones_to_ratio;
use crate::dsp::sanitize_sample_rate;
use crate::synth::component::{ModInputs, StereoFrame, SynthProcessor};

/*
| type              | constructed by       | passes          | rejects      |
| ----------------- | -------------------- | --------------- | ------------ |
| low-pass          | LPF                  | below cutoff    | above cutoff |
| high-pass         | HPF                  | above cutoff    | below cutoff |
| band-pass         | LPF ∘ HPF (series)   | between cutoffs | outside      |
| notch / band-stop | LPF + HPF (parallel) | outside         | between      |
*/

pub const MIN_CUTOFF_HZ: f32 = 20.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

pub struct FilterOutputs {
    pub lowpass: f32,
    pub bandpass: f32,
    pub highpass: f32,
    pub notch: f32,
}

impl FilterOutputs {
    #[inline]
    pub fn select(&self, filter_type: FilterType) -> f32 {
        match filter_type {
            FilterType::LowPass => self.lowpass,
            FilterType::HighPass => self.highpass,
            FilterType::BandPass => self.bandpass,
            FilterType::Notch => self.notch,
        }
    }
}

/// Topology-preserving-transform state-variable filter core.
#[derive(Debug, Clone, Default)]
pub struct SVFilter {
    ic1eq: f32, // First integrator's memory
    ic2eq: f32, // Second integrator's memory
}

impl SVFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prewarped integrator gain for `cutoff_hz`, clamped below Nyquist.
    #[inline]
    pub fn compute_g(cutoff_hz: f32, sample_rate: f32) -> f32 {
        let cutoff_hz = cutoff_hz.clamp(MIN_CUTOFF_HZ, 0.45 * sample_rate);
        (PI * cutoff_hz / sample_rate).tan()
    }

    /// Damping for a resonance in [0, 1]. 1.0 sits just short of
    /// self-oscillation.
    #[inline]
    pub fn compute_k(resonance: f32) -> f32 {
        2.0 - 1.98 * resonance.clamp(0.0, 1.0)
    }

    pub fn next_sample(&mut self, sample: f32, k: f32, g: f32) -> FilterOutputs {
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        FilterOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: sample - k * v1 - v2,
            notch: sample - k * v1,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParameters {
    pub filter_type: FilterType,
    pub cutoff_hz: f32,
    /// 0.0 to 1.0
    pub resonance: f32,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            filter_type: FilterType::LowPass,
            cutoff_hz: 2_000.0,
            resonance: 0.2,
        }
    }
}

/// Twin (left/right) state-variable filter processor. Cutoff follows the
/// voice's cutoff modulation in semitones.
pub struct FilterProcessor {
    params: FilterParameters,
    sample_rate: f32,
    left: SVFilter,
    right: SVFilter,
    k: f32,
    g: f32,
    last_cutoff: f32,
}

impl FilterProcessor {
    pub fn new(params: FilterParameters, sample_rate: f32) -> Self {
        let sample_rate = sanitize_sample_rate(sample_rate);
        let k = SVFilter::compute_k(params.resonance);
        let g = SVFilter::compute_g(params.cutoff_hz, sample_rate);
        Self {
            last_cutoff: params.cutoff_hz,
            params,
            sample_rate,
            left: SVFilter::new(),
            right: SVFilter::new(),
            k,
            g,
        }
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: FilterParameters) {
        self.k = SVFilter::compute_k(params.resonance);
        self.params = params;
        self.update_cutoff(self.params.cutoff_hz);
    }

    #[inline]
    fn update_cutoff(&mut self, cutoff_hz: f32) {
        self.last_cutoff = cutoff_hz;
        self.g = SVFilter::compute_g(cutoff_hz, self.sample_rate);
    }
}

impl SynthProcessor for FilterProcessor {
    fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sanitize_sample_rate(sample_rate);
        self.left.reset();
        self.right.reset();
        self.update_cutoff(self.params.cutoff_hz);
    }

    fn process(&mut self, input: StereoFrame, mods: &ModInputs) -> StereoFrame {
        let cutoff = self.params.cutoff_hz * semitones_to_ratio(mods.cutoff_semitones);
        // Only re-derive g when the cutoff actually moved
        if cutoff != self.last_cutoff {
            self.update_cutoff(cutoff);
        }

        let filter_type = self.params.filter_type;
        let left = self.left.next_sample(input.left, self.k, self.g);
        let right = self.right.next_sample(input.right, self.k, self.g);
        StereoFrame::new(left.select(filter_type), right.select(filter_type))
    }
}
