//! Attribute breakdown module.
//!
//! Contains the `AttributeBreakdown` type, a read-only explanation of how an
//! attribute's final value was reached, for debugging and tooling.

use crate::kind::AttributeRef;
use serde::{Deserialize, Serialize};

/// Step-by-step account of one attribute's final value.
///
/// # Examples
///
/// ```rust
/// use zzattr::{AttributeChanger, AttributeKind, AttributeRef, Modifier};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// enum Stat { Strength }
///
/// impl AttributeKind for Stat {
///     const ALL: &'static [Self] = &[Stat::Strength];
///     fn index(self) -> usize { self as usize }
/// }
///
/// let mut changer = AttributeChanger::<Stat>::new();
/// let hp = AttributeRef::new(changer.create_owner_with(|_| 100.0), Stat::Strength);
/// changer.add_modifier(hp, Modifier::AddFlat(50.0)).unwrap();
/// changer.add_modifier(hp, Modifier::Multiply(1.5)).unwrap();
///
/// let breakdown = changer.breakdown(hp).unwrap();
/// assert_eq!(breakdown.final_value, 225.0);
/// assert_eq!(breakdown.contributions[0], ("+50".to_string(), 150.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeBreakdown<K> {
    /// The attribute described.
    pub reference: AttributeRef<K>,

    /// Base value before modifiers.
    pub base: f32,

    /// The stored final value.
    pub final_value: f32,

    /// `(modifier description, running value after it)` in stack order.
    pub contributions: Vec<(String, f32)>,
}

impl<K> AttributeBreakdown<K> {
    /// Create a breakdown with no contributions yet.
    pub fn new(reference: AttributeRef<K>, base: f32, final_value: f32) -> Self {
        Self {
            reference,
            base,
            final_value,
            contributions: Vec::new(),
        }
    }

    /// Append one modifier's step.
    pub fn add_contribution(&mut self, description: impl Into<String>, value: f32) {
        self.contributions.push((description.into(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;
    use crate::kind::OwnerId;

    #[test]
    fn test_breakdown_keeps_order() {
        let r = AttributeRef::new(OwnerId::new(0, 0), Stat::Intelligence);
        let mut breakdown = AttributeBreakdown::new(r, 10.0, 30.0);
        breakdown.add_contribution("+5", 15.0);
        breakdown.add_contribution("×2", 30.0);

        assert_eq!(breakdown.contributions.len(), 2);
        assert_eq!(breakdown.contributions[0].0, "+5");
        assert_eq!(breakdown.contributions[1].1, 30.0);
    }

    #[test]
    fn test_breakdown_serializes() {
        let r = AttributeRef::new(OwnerId::new(1, 2), Stat::Strength);
        let breakdown = AttributeBreakdown::new(r, 1.0, 1.0);
        let json = serde_json::to_string(&breakdown).unwrap();
        let back: AttributeBreakdown<Stat> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, breakdown);
    }
}
