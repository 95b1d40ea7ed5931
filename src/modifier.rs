//! Modifiers and modifier stacks.
//!
//! A modifier contributes to an attribute's final value. Some kinds carry a
//! reference to another attribute slot and read its current final value;
//! these are the ones that create dependency edges. A `ModifierStack` holds
//! the modifiers of one slot in insertion order and reduces them, together
//! with the base value, into the final value.

use crate::kind::{AttributeKind, AttributeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable handle of a modifier inside one stack.
///
/// Handles are issued per stack and never reused, so a stale handle can
/// never remove a newer modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModifierHandle(pub(crate) u32);

impl ModifierHandle {
    /// The raw handle value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod#{}", self.0)
    }
}

/// A single contribution to an attribute's final value.
///
/// The set of kinds is closed; adding one means adding a variant and its arm
/// in [`ModifierStack::combine`].
///
/// # Examples
///
/// ```rust
/// use zzattr::Modifier;
///
/// let flat: Modifier<u8> = Modifier::AddFlat(5.0);
/// assert!(flat.dependency().is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Modifier<K> {
    /// Adds a literal amount.
    AddFlat(f32),
    /// Adds `scalar` times the final value of another attribute.
    AddFromAttribute { source: AttributeRef<K>, scalar: f32 },
    /// Multiplies the running total accumulated by the modifiers before it.
    Multiply(f32),
}

impl<K: Copy> Modifier<K> {
    /// The attribute this modifier reads, if any.
    pub fn dependency(&self) -> Option<AttributeRef<K>> {
        match self {
            Modifier::AddFromAttribute { source, .. } => Some(*source),
            Modifier::AddFlat(_) | Modifier::Multiply(_) => None,
        }
    }
}

impl<K: AttributeKind> Modifier<K> {
    /// Add the full final value of `source`.
    pub fn from_attribute(source: AttributeRef<K>) -> Self {
        Modifier::AddFromAttribute { source, scalar: 1.0 }
    }

    /// Add `scalar` times the final value of `source`.
    pub fn scaled_from_attribute(source: AttributeRef<K>, scalar: f32) -> Self {
        Modifier::AddFromAttribute { source, scalar }
    }

    /// Human-readable description used in breakdowns.
    pub fn description(&self) -> String {
        match self {
            Modifier::AddFlat(amount) => format!("{:+}", amount),
            Modifier::AddFromAttribute { source, scalar } => format!("+{} × {}", scalar, source),
            Modifier::Multiply(factor) => format!("×{}", factor),
        }
    }
}

/// Ordered modifiers attached to one attribute slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierStack<K> {
    entries: Vec<(ModifierHandle, Modifier<K>)>,
    next_handle: u32,
}

impl<K> Default for ModifierStack<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 0,
        }
    }
}

impl<K: AttributeKind> ModifierStack<K> {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a modifier and return its handle.
    pub fn push(&mut self, modifier: Modifier<K>) -> ModifierHandle {
        let handle = ModifierHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, modifier));
        handle
    }

    /// Remove the modifier with `handle`, preserving the order of the rest.
    pub fn remove(&mut self, handle: ModifierHandle) -> Option<Modifier<K>> {
        let pos = self.entries.iter().position(|(h, _)| *h == handle)?;
        Some(self.entries.remove(pos).1)
    }

    /// Look up a modifier by handle.
    pub fn get(&self, handle: ModifierHandle) -> Option<&Modifier<K>> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, m)| m)
    }

    /// Iterate `(handle, modifier)` pairs in stack order.
    pub fn iter(&self) -> impl Iterator<Item = (ModifierHandle, &Modifier<K>)> {
        self.entries.iter().map(|(h, m)| (*h, m))
    }

    /// Handles of every modifier that reads `source`.
    pub fn handles_reading(&self, source: AttributeRef<K>) -> Vec<ModifierHandle> {
        self.entries
            .iter()
            .filter(|(_, m)| m.dependency() == Some(source))
            .map(|(h, _)| *h)
            .collect()
    }

    /// Whether every handle is unique and below the next one to be issued.
    ///
    /// Always true for a stack built through [`push`](Self::push); checked
    /// when a stack comes from outside, e.g. a deserialized snapshot.
    pub(crate) fn handles_consistent(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .all(|(h, _)| h.0 < self.next_handle && seen.insert(*h))
    }

    /// Number of modifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds no modifiers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reduce `base` and the stack into a final value.
    ///
    /// `read` supplies the current final value of referenced attributes; a
    /// reference it cannot resolve contributes nothing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattr::{AttributeKind, Modifier, ModifierStack};
    ///
    /// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    /// enum Stat { Strength }
    ///
    /// impl AttributeKind for Stat {
    ///     const ALL: &'static [Self] = &[Stat::Strength];
    ///     fn index(self) -> usize { self as usize }
    /// }
    ///
    /// let mut stack = ModifierStack::<Stat>::new();
    /// stack.push(Modifier::AddFlat(5.0));
    /// stack.push(Modifier::Multiply(2.0));
    /// stack.push(Modifier::AddFlat(1.0));
    ///
    /// // (10 + 5) * 2 + 1
    /// assert_eq!(stack.combine(10.0, |_| None), 31.0);
    /// ```
    pub fn combine<F>(&self, base: f32, mut read: F) -> f32
    where
        F: FnMut(AttributeRef<K>) -> Option<f32>,
    {
        self.entries
            .iter()
            .fold(base, |total, (_, modifier)| apply(total, modifier, &mut read))
    }

    /// Like [`combine`](Self::combine), recording the running value after
    /// each modifier.
    pub fn combine_traced<F>(&self, base: f32, mut read: F) -> (f32, Vec<(String, f32)>)
    where
        F: FnMut(AttributeRef<K>) -> Option<f32>,
    {
        let mut steps = Vec::with_capacity(self.entries.len());
        let mut total = base;
        for (_, modifier) in &self.entries {
            total = apply(total, modifier, &mut read);
            steps.push((modifier.description(), total));
        }
        (total, steps)
    }
}

fn apply<K, F>(total: f32, modifier: &Modifier<K>, read: &mut F) -> f32
where
    K: AttributeKind,
    F: FnMut(AttributeRef<K>) -> Option<f32>,
{
    match modifier {
        Modifier::AddFlat(amount) => total + amount,
        Modifier::AddFromAttribute { source, scalar } => {
            total + scalar * read(*source).unwrap_or(0.0)
        }
        Modifier::Multiply(factor) => total * factor,
    }
}
