//! Per-slot attribute values.

use serde::{Deserialize, Serialize};

/// Base and final value stored in one attribute slot.
///
/// `final_value` is always the result of combining `base` with the slot's
/// modifier stack. Only the engine writes it, as the result of a recompute.
///
/// # Examples
///
/// ```rust
/// use zzattr::AttributeValues;
///
/// let values = AttributeValues::new(10.0);
/// assert_eq!(values.base(), 10.0);
/// assert_eq!(values.final_value(), 10.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeValues {
    base: f32,
    final_value: f32,
}

impl AttributeValues {
    /// Create values with the given base; the final value starts equal to it.
    pub fn new(base: f32) -> Self {
        Self {
            base,
            final_value: base,
        }
    }

    /// The base value.
    pub fn base(&self) -> f32 {
        self.base
    }

    /// The final value after modifiers.
    pub fn final_value(&self) -> f32 {
        self.final_value
    }

    pub(crate) fn set_base(&mut self, base: f32) {
        self.base = base;
    }

    /// Store a recomputed final value, returning whether it changed.
    ///
    /// Compares bit patterns so a NaN result still settles.
    pub(crate) fn store_final(&mut self, value: f32) -> bool {
        let changed = self.final_value.to_bits() != value.to_bits();
        self.final_value = value;
        changed
    }
}
