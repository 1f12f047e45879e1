//! Per-voice modulation routing.
//!
//! A voice owns an ordered list of [`ModulatorSlot`]s. Each sample the slots
//! render in order into a [`ModBus`], so a slot may read the outputs of the
//! slots before it (child modulation). The voice's [`ModRoute`]s then fold the
//! bus into a single [`ModInputs`] for the oscillators and processors.

use crate::dsp::envelope::EnvelopeGenerator;
use crate::dsp::lfo::Lfo;
use crate::dsp::window_eg::WindowEg;
use crate::dsp::modulate::{apply_gain_modulation, apply_modulation};
use crate::synth::component::{ModInputs, ModOutput, Modulator, NoteContext};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// This tick's modulator outputs, indexed by slot.
#[derive(Debug, Clone, Default)]
pub struct ModBus {
    outputs: Vec<ModOutput>,
}

impl ModBus {
    pub fn new(slots: usize) -> Self {
        Self {
            outputs: vec![ModOutput::default(); slots],
        }
    }

    /// A bus with no slots. Does not allocate.
    pub fn empty() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    /// Output of `slot`, or all zeros for a slot that does not exist.
    #[inline]
    pub fn get(&self, slot: usize) -> ModOutput {
        self.outputs.get(slot).copied().unwrap_or_default()
    }

    #[inline]
    pub(crate) fn set(&mut self, slot: usize, output: ModOutput) {
        if let Some(out) = self.outputs.get_mut(slot) {
            *out = output;
        }
    }

    pub fn clear(&mut self) {
        self.outputs.fill(ModOutput::default());
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Scales an envelope by another slot's unipolar output.
///
/// gain = 1 - depth + depth × child
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildModulation {
    pub slot: usize,
    pub depth: f32,
}

impl ChildModulation {
    pub fn new(slot: usize, depth: f32) -> Self {
        Self {
            slot,
            depth: if depth.is_nan() { 0.0 } else { depth.clamp(0.0, 1.0) },
        }
    }

    #[inline]
    pub fn gain(&self, bus: &ModBus) -> f32 {
        1.0 - self.depth + self.depth * bus.get(self.slot).unipolar
    }
}

/// Where a route sends its source.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModDestination {
    /// Multiplies the voice gain by `1 - depth + depth × unipolar`.
    Amplitude,
    /// Adds `normal × depth` semitones to the oscillator pitch.
    Pitch,
    /// Adds `normal × depth` semitones to the filter cutoff.
    FilterCutoff,
    /// Adds `normal × depth` to the pan position.
    Pan,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModRoute {
    pub source: usize,
    pub destination: ModDestination,
    pub depth: f32,
}

impl ModRoute {
    pub fn new(source: usize, destination: ModDestination, depth: f32) -> Self {
        Self {
            source,
            destination,
            depth,
        }
    }
}

/// Fold the bus through the routes. `base` carries non-routed offsets such as
/// pitch bend and unison detune.
pub fn resolve_routes(routes: &[ModRoute], bus: &ModBus, base: ModInputs) -> ModInputs {
    let mut mods = base;

    for route in routes {
        let out = bus.get(route.source);
        match route.destination {
            ModDestination::Amplitude => {
                let depth = route.depth.clamp(0.0, 1.0);
                mods.amplitude = apply_gain_modulation(mods.amplitude, out.unipolar, depth);
            }
            ModDestination::Pitch => {
                mods.pitch_semitones = apply_modulation(mods.pitch_semitones, out.normal, route.depth)
            }
            ModDestination::FilterCutoff => {
                mods.cutoff_semitones =
                    apply_modulation(mods.cutoff_semitones, out.normal, route.depth)
            }
            ModDestination::Pan => mods.pan = apply_modulation(mods.pan, out.normal, route.depth),
        }
    }

    mods.pan = mods.pan.clamp(-1.0, 1.0);
    mods
}

/// A modulator owned by a voice. Enum dispatch keeps the per-sample path free
/// of virtual calls.
pub enum ModulatorSlot {
    Envelope(EnvelopeGenerator),
    Lfo(Lfo),
    Window(WindowEg),
}

impl ModulatorSlot {
    pub fn as_envelope(&self) -> Option<&EnvelopeGenerator> {
        match self {
            ModulatorSlot::Envelope(eg) => Some(eg),
            ModulatorSlot::Lfo(_) | ModulatorSlot::Window(_) => None,
        }
    }

    pub fn as_envelope_mut(&mut self) -> Option<&mut EnvelopeGenerator> {
        match self {
            ModulatorSlot::Envelope(eg) => Some(eg),
            ModulatorSlot::Lfo(_) | ModulatorSlot::Window(_) => None,
        }
    }

    /// Slots this one reads from the bus.
    pub fn dependencies(&self) -> impl Iterator<Item = usize> + '_ {
        let children: &[ChildModulation] = match self {
            ModulatorSlot::Envelope(eg) => eg.children(),
            ModulatorSlot::Lfo(_) | ModulatorSlot::Window(_) => &[],
        };
        children.iter().map(|child| child.slot)
    }
}

impl Modulator for ModulatorSlot {
    fn reset(&mut self, sample_rate: f32) {
        match self {
            ModulatorSlot::Envelope(eg) => Modulator::reset(eg, sample_rate),
            ModulatorSlot::Lfo(lfo) => lfo.reset(sample_rate),
            ModulatorSlot::Window(window) => window.reset(sample_rate),
        }
    }

    fn note_on(&mut self, ctx: &NoteContext) {
        match self {
            ModulatorSlot::Envelope(eg) => eg.note_on(ctx),
            ModulatorSlot::Lfo(lfo) => lfo.note_on(ctx),
            ModulatorSlot::Window(window) => window.note_on(ctx),
        }
    }

    fn note_off(&mut self, ctx: &NoteContext) {
        match self {
            ModulatorSlot::Envelope(eg) => Modulator::note_off(eg, ctx),
            ModulatorSlot::Lfo(lfo) => lfo.note_off(ctx),
            ModulatorSlot::Window(window) => window.note_off(ctx),
        }
    }

    #[inline]
    fn render_modulator_output(&mut self, bus: &ModBus) -> ModOutput {
        match self {
            ModulatorSlot::Envelope(eg) => eg.render_modulator_output(bus),
            ModulatorSlot::Lfo(lfo) => lfo.render_modulator_output(bus),
            ModulatorSlot::Window(window) => window.render_modulator_output(bus),
        }
    }
}

impl From<EnvelopeGenerator> for ModulatorSlot {
    fn from(eg: EnvelopeGenerator) -> Self {
        ModulatorSlot::Envelope(eg)
    }
}

impl From<Lfo> for ModulatorSlot {
    fn from(lfo: Lfo) -> Self {
        ModulatorSlot::Lfo(lfo)
    }
}

impl From<WindowEg> for ModulatorSlot {
    fn from(window: WindowEg) -> Self {
        ModulatorSlot::Window(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with(values: &[(f32, f32)]) -> ModBus {
        let mut bus = ModBus::new(values.len());
        for (slot, &(normal, unipolar)) in values.iter().enumerate() {
            bus.set(
                slot,
                ModOutput {
                    normal,
                    unipolar,
                    biased: 0.0,
                },
            );
        }
        bus
    }

    #[test]
    fn missing_slot_reads_as_zero() {
        let bus = ModBus::new(1);
        assert_eq!(bus.get(5), ModOutput::default());
    }

    #[test]
    fn child_gain_blends_by_depth() {
        let bus = bus_with(&[(0.5, 0.5)]);
        assert_eq!(ChildModulation::new(0, 0.0).gain(&bus), 1.0);
        assert_eq!(ChildModulation::new(0, 1.0).gain(&bus), 0.5);
        assert!((ChildModulation::new(0, 0.5).gain(&bus) - 0.75).abs() < 1e-6);
        assert_eq!(ChildModulation::new(0, 7.0).depth, 1.0);
    }

    #[test]
    fn routes_fold_into_inputs() {
        let bus = bus_with(&[(0.5, 0.5), (-1.0, 0.0)]);
        let routes = [
            ModRoute::new(0, ModDestination::Amplitude, 1.0),
            ModRoute::new(1, ModDestination::Pitch, 2.0),
            ModRoute::new(0, ModDestination::FilterCutoff, 24.0),
            ModRoute::new(1, ModDestination::Pan, 3.0),
        ];

        let base = ModInputs {
            pitch_semitones: 1.0,
            ..ModInputs::default()
        };
        let mods = resolve_routes(&routes, &bus, base);

        assert_eq!(mods.amplitude, 0.5);
        assert_eq!(mods.pitch_semitones, -1.0);
        assert_eq!(mods.cutoff_semitones, 12.0);
        assert_eq!(mods.pan, -1.0);
    }

    #[test]
    fn no_routes_is_identity() {
        let mods = resolve_routes(&[], &ModBus::empty(), ModInputs::default());
        assert_eq!(mods, ModInputs::default());
    }
}
