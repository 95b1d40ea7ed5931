//! Attribute addressing module.
//!
//! Provides the `AttributeKind` trait implemented by the host's closed
//! enumeration of attribute kinds, the generational `OwnerId`, and the
//! `AttributeRef` that addresses exactly one attribute slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A closed enumeration of attribute kinds (e.g. Strength, Dexterity).
///
/// The engine never names kinds itself; the host supplies them. Every owner
/// gets one slot per entry of [`AttributeKind::ALL`], and `index()` must map
/// each kind to its position in `ALL`.
///
/// # Examples
///
/// ```rust
/// use zzattr::AttributeKind;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// enum Stat {
///     Strength,
///     Dexterity,
/// }
///
/// impl AttributeKind for Stat {
///     const ALL: &'static [Self] = &[Stat::Strength, Stat::Dexterity];
///
///     fn index(self) -> usize {
///         self as usize
///     }
/// }
///
/// assert_eq!(Stat::Dexterity.index(), 1);
/// assert_eq!(Stat::count(), 2);
/// ```
pub trait AttributeKind: Copy + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every kind, in slot order.
    const ALL: &'static [Self];

    /// Position of this kind in [`AttributeKind::ALL`].
    fn index(self) -> usize;

    /// Number of attribute slots per owner.
    fn count() -> usize {
        Self::ALL.len()
    }
}

/// Generational identifier of an attribute owner.
///
/// The index addresses an arena entry; the generation detects use after the
/// owner was destroyed and its entry reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId {
    index: u32,
    generation: u32,
}

impl OwnerId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena index of this owner.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the arena entry this id was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Reference to one attribute slot: an owner plus an attribute kind.
///
/// Immutable once created. It becomes invalid the moment its owner is
/// destroyed; every lookup through it then fails with `UnknownReference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeRef<K> {
    /// The owner holding the slot.
    pub owner: OwnerId,
    /// The attribute kind within the owner.
    pub kind: K,
}

impl<K: AttributeKind> AttributeRef<K> {
    /// Create a reference to `kind` on `owner`.
    pub fn new(owner: OwnerId, kind: K) -> Self {
        Self { owner, kind }
    }

    /// All slot references of an owner, in kind order.
    pub fn all_of(owner: OwnerId) -> impl Iterator<Item = AttributeRef<K>> {
        K::ALL.iter().map(move |&kind| AttributeRef { owner, kind })
    }
}

impl<K: AttributeKind> fmt::Display for AttributeRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:?}", self.owner, self.kind)
    }
}
