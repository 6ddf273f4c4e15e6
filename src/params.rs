//! Control parameters and the lock-free store shared between the control
//! surface and the audio thread.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::circuit::CircuitModel;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    Drive,
    Tone,
    Level,
    Model,
}

impl ParamId {
    pub const ALL: [Self; 4] = [Self::Drive, Self::Tone, Self::Level, Self::Model];

    pub const fn range(self) -> ParamRange {
        match self {
            Self::Drive => DRIVE_RANGE,
            Self::Tone => TONE_RANGE,
            Self::Level => LEVEL_RANGE,
            Self::Model => MODEL_RANGE,
        }
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drive => write!(f, "Drive"),
            Self::Tone => write!(f, "Tone"),
            Self::Level => write!(f, "Level"),
            Self::Model => write!(f, "Model"),
        }
    }
}

/// Value range of a control with an optional skew towards one end.
///
/// `skew` is the exponent applied to the normalized position; a value of 1.0
/// is linear. [`ParamRange::with_midpoint`] picks the exponent so that half
/// knob travel lands on the given value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub skew: f32,
}

pub const DRIVE_RANGE: ParamRange = ParamRange::linear(0.0, 1.0, 0.7);
pub const TONE_RANGE: ParamRange = ParamRange {
    min: 0.0,
    max: 1.0,
    default: 0.5,
    // ln(0.5) / ln(0.8)
    skew: 3.106_284,
};
pub const LEVEL_RANGE: ParamRange = ParamRange::linear(0.0, 1.0, 0.7);
pub const MODEL_RANGE: ParamRange = ParamRange::linear(0.0, 1.0, 0.0);

impl ParamRange {
    pub const fn linear(min: f32, max: f32, default: f32) -> Self {
        Self {
            min,
            max,
            default,
            skew: 1.0,
        }
    }

    pub fn with_midpoint(min: f32, max: f32, default: f32, mid: f32) -> Self {
        let skew = 0.5f32.ln() / ((mid - min) / (max - min)).ln();
        Self {
            min,
            max,
            default,
            skew,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    /// Knob position in `0..=1` to value.
    pub fn from_normalized(&self, position: f32) -> f32 {
        let position = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        let shaped = if self.skew == 1.0 {
            position
        } else {
            position.powf(1.0 / self.skew)
        };
        (self.max - self.min).mul_add(shaped, self.min)
    }

    /// Value to knob position in `0..=1`.
    pub fn to_normalized(&self, value: f32) -> f32 {
        let proportion = (self.clamp(value) - self.min) / (self.max - self.min);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }
}

/// Control values at one instant, as read by the coefficient derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub drive: f32,
    pub tone: f32,
    pub level: f32,
    pub model: CircuitModel,
    /// Store generation the values were read at.
    #[serde(skip)]
    pub generation: u64,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            drive: DRIVE_RANGE.default,
            tone: TONE_RANGE.default,
            level: LEVEL_RANGE.default,
            model: CircuitModel::default(),
            generation: 0,
        }
    }
}

/// Lock-free parameter storage.
///
/// Continuous controls are kept as `f32` bit patterns in atomics. Every write
/// bumps `generation` after the value is stored, so a reader that sees a new
/// generation also sees the value that caused it.
#[derive(Debug)]
pub struct ParameterStore {
    drive: AtomicU32,
    tone: AtomicU32,
    level: AtomicU32,
    model: AtomicU8,
    generation: AtomicU64,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ControlSnapshot::default())
    }
}

impl ParameterStore {
    pub fn new(initial: ControlSnapshot) -> Self {
        Self {
            drive: AtomicU32::new(DRIVE_RANGE.clamp(initial.drive).to_bits()),
            tone: AtomicU32::new(TONE_RANGE.clamp(initial.tone).to_bits()),
            level: AtomicU32::new(LEVEL_RANGE.clamp(initial.level).to_bits()),
            model: AtomicU8::new(initial.model.index()),
            generation: AtomicU64::new(0),
        }
    }

    fn slot(&self, id: ParamId) -> Option<&AtomicU32> {
        match id {
            ParamId::Drive => Some(&self.drive),
            ParamId::Tone => Some(&self.tone),
            ParamId::Level => Some(&self.level),
            ParamId::Model => None,
        }
    }

    pub fn get_value(&self, id: ParamId) -> f32 {
        match self.slot(id) {
            Some(slot) => f32::from_bits(slot.load(Ordering::Relaxed)),
            None => f32::from(self.model.load(Ordering::Relaxed)),
        }
    }

    /// Stores `value` clamped to the parameter's range. The model selector
    /// rounds to the nearest variant.
    pub fn set_value(&self, id: ParamId, value: f32) {
        let value = id.range().clamp(value);
        match self.slot(id) {
            Some(slot) => slot.store(value.to_bits(), Ordering::Relaxed),
            None => {
                let model = if value >= 0.5 {
                    CircuitModel::Ts808
                } else {
                    CircuitModel::Ts9
                };
                self.model.store(model.index(), Ordering::Relaxed);
            }
        }
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn set_normalized(&self, id: ParamId, position: f32) {
        self.set_value(id, id.range().from_normalized(position));
    }

    pub fn model(&self) -> CircuitModel {
        CircuitModel::from_index(self.model.load(Ordering::Relaxed))
    }

    pub fn set_model(&self, model: CircuitModel) {
        self.set_value(ParamId::Model, f32::from(model.index()));
    }

    pub fn level(&self) -> f32 {
        self.get_value(ParamId::Level)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Reads every control. The generation is loaded first, so the snapshot
    /// can only be older than its values, never newer.
    pub fn snapshot(&self) -> ControlSnapshot {
        let generation = self.generation();
        ControlSnapshot {
            drive: self.get_value(ParamId::Drive),
            tone: self.get_value(ParamId::Tone),
            level: self.get_value(ParamId::Level),
            model: self.model(),
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        for id in ParamId::ALL {
            let r = id.range();
            assert!(r.default >= r.min && r.default <= r.max, "{id}");
        }

        let store = ParameterStore::default();
        assert_eq!(store.get_value(ParamId::Drive), 0.7);
        assert_eq!(store.get_value(ParamId::Tone), 0.5);
        assert_eq!(store.get_value(ParamId::Level), 0.7);
        assert_eq!(store.model(), CircuitModel::Ts9);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn writes_clamp_and_bump_generation() {
        let store = ParameterStore::default();

        store.set_value(ParamId::Drive, 3.0);
        assert_eq!(store.get_value(ParamId::Drive), 1.0);
        store.set_value(ParamId::Level, -1.0);
        assert_eq!(store.get_value(ParamId::Level), 0.0);
        store.set_value(ParamId::Tone, f32::NAN);
        assert_eq!(store.get_value(ParamId::Tone), TONE_RANGE.default);

        assert_eq!(store.generation(), 3);
    }

    #[test]
    fn model_selector_rounds_to_a_variant() {
        let store = ParameterStore::default();
        store.set_value(ParamId::Model, 0.7);
        assert_eq!(store.model(), CircuitModel::Ts808);
        assert_eq!(store.get_value(ParamId::Model), 1.0);

        store.set_model(CircuitModel::Ts9);
        assert_eq!(store.get_value(ParamId::Model), 0.0);
    }

    #[test]
    fn tone_skew_puts_half_travel_at_point_eight() {
        let computed = ParamRange::with_midpoint(0.0, 1.0, 0.5, 0.8);
        assert!((computed.skew - TONE_RANGE.skew).abs() < 1e-4);

        assert!((TONE_RANGE.from_normalized(0.5) - 0.8).abs() < 1e-4);
        assert_eq!(TONE_RANGE.from_normalized(0.0), 0.0);
        assert_eq!(TONE_RANGE.from_normalized(1.0), 1.0);

        for &value in &[0.0, 0.1, 0.5, 0.8, 1.0] {
            let back = TONE_RANGE.from_normalized(TONE_RANGE.to_normalized(value));
            assert!((back - value).abs() < 1e-5, "{value} -> {back}");
        }
    }

    #[test]
    fn set_normalized_goes_through_the_range() {
        let store = ParameterStore::default();
        store.set_normalized(ParamId::Tone, 0.5);
        assert!((store.get_value(ParamId::Tone) - 0.8).abs() < 1e-4);
        store.set_normalized(ParamId::Drive, 0.25);
        assert_eq!(store.get_value(ParamId::Drive), 0.25);
    }

    #[test]
    fn snapshot_carries_generation() {
        let store = ParameterStore::default();
        store.set_value(ParamId::Drive, 0.1);
        store.set_model(CircuitModel::Ts808);

        let snap = store.snapshot();
        assert_eq!(snap.drive, 0.1);
        assert_eq!(snap.model, CircuitModel::Ts808);
        assert_eq!(snap.generation, 2);
    }
}
