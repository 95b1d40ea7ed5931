//! Attribute store module.
//!
//! A generational arena of owners. Each live owner holds one slot per
//! attribute kind; a slot carries the values and the modifier stack of that
//! attribute. References are checked against the entry generation so a
//! destroyed owner can never be read through a stale `AttributeRef`.

use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::ModifierStack;
use crate::values::AttributeValues;

/// One attribute slot: values plus modifier stack.
#[derive(Debug, Clone)]
pub struct AttributeSlot<K> {
    pub(crate) values: AttributeValues,
    pub(crate) stack: ModifierStack<K>,
}

impl<K: AttributeKind> AttributeSlot<K> {
    pub(crate) fn new(base: f32) -> Self {
        Self::with_stack(base, ModifierStack::new())
    }

    pub(crate) fn with_stack(base: f32, stack: ModifierStack<K>) -> Self {
        Self {
            values: AttributeValues::new(base),
            stack,
        }
    }

    /// The slot's values.
    pub fn values(&self) -> AttributeValues {
        self.values
    }

    /// The slot's modifier stack.
    pub fn stack(&self) -> &ModifierStack<K> {
        &self.stack
    }
}

#[derive(Debug)]
struct OwnerEntry<K> {
    generation: u32,
    slots: Option<Vec<AttributeSlot<K>>>,
}

/// Generational arena of attribute owners.
#[derive(Debug)]
pub struct AttributeStore<K> {
    entries: Vec<OwnerEntry<K>>,
    free: Vec<u32>,
    live: usize,
    epoch: u64,
}

impl<K> Default for AttributeStore<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
            epoch: 0,
        }
    }
}

impl<K: AttributeKind> AttributeStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural epoch; bumped whenever an owner is inserted or removed.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of live owners.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the store holds no owners.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocate an owner whose slots start at `base_for(kind)`.
    ///
    /// Reuses a freed arena entry if one exists; the id then carries that
    /// entry's bumped generation, so references to the previous occupant
    /// stay invalid.
    ///
    /// # Arguments
    ///
    /// * `base_for` - Initial base value per attribute kind
    ///
    /// # Returns
    ///
    /// The id of the new owner.
    pub fn insert_owner<F>(&mut self, mut base_for: F) -> OwnerId
    where
        F: FnMut(K) -> f32,
    {
        let slots = K::ALL.iter().map(|&k| AttributeSlot::new(base_for(k))).collect();
        self.epoch += 1;
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.slots = Some(slots);
                OwnerId::new(index, entry.generation)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(OwnerEntry {
                    generation: 0,
                    slots: Some(slots),
                });
                OwnerId::new(index, 0)
            }
        }
    }

    /// Create an empty store whose arena entries carry the given generations.
    ///
    /// Every entry starts free, so the next owner allocated at index `i` is
    /// issued generation `generations[i]` and never collides with an id
    /// handed out before the generations were recorded.
    pub(crate) fn with_generations(generations: &[u32]) -> Self {
        let entries = generations
            .iter()
            .map(|&generation| OwnerEntry {
                generation,
                slots: None,
            })
            .collect();
        Self {
            entries,
            free: (0..generations.len() as u32).rev().collect(),
            ..Self::default()
        }
    }

    /// Current generation of every arena entry, live or free, by index.
    pub(crate) fn generations(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.generation).collect()
    }

    /// Re-create an owner under a previously issued id.
    ///
    /// Returns `false` if the id's arena entry is occupied.
    pub(crate) fn insert_owner_at(&mut self, owner: OwnerId, slots: Vec<AttributeSlot<K>>) -> bool {
        let index = owner.index() as usize;
        while self.entries.len() <= index {
            self.free.push(self.entries.len() as u32);
            self.entries.push(OwnerEntry {
                generation: 0,
                slots: None,
            });
        }
        let entry = &mut self.entries[index];
        if entry.slots.is_some() {
            return false;
        }
        entry.generation = owner.generation();
        entry.slots = Some(slots);
        self.free.retain(|&i| i != owner.index());
        self.live += 1;
        self.epoch += 1;
        true
    }

    /// Reclaim an owner's slots and bump the entry's generation.
    ///
    /// # Returns
    ///
    /// * `Some(slots)` if the owner was live
    /// * `None` if it never existed or was already removed
    pub fn remove_owner(&mut self, owner: OwnerId) -> Option<Vec<AttributeSlot<K>>> {
        let entry = self.entries.get_mut(owner.index() as usize)?;
        if entry.generation != owner.generation() {
            return None;
        }
        let slots = entry.slots.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(owner.index());
        self.live -= 1;
        self.epoch += 1;
        Some(slots)
    }

    /// Whether `owner` is live.
    pub fn contains(&self, owner: OwnerId) -> bool {
        self.owner_slots(owner).is_some()
    }

    /// Ids of all live owners, in arena order.
    pub fn owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.slots
                .as_ref()
                .map(|_| OwnerId::new(i as u32, e.generation))
        })
    }

    /// Slot behind `reference`, if its owner is live.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattr::store::AttributeStore;
    /// use zzattr::{AttributeKind, AttributeRef};
    ///
    /// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    /// enum Stat { Strength }
    ///
    /// impl AttributeKind for Stat {
    ///     const ALL: &'static [Self] = &[Stat::Strength];
    ///     fn index(self) -> usize { self as usize }
    /// }
    ///
    /// let mut store = AttributeStore::<Stat>::new();
    /// let owner = store.insert_owner(|_| 4.0);
    /// let r = AttributeRef::new(owner, Stat::Strength);
    ///
    /// assert_eq!(store.slot(r).map(|s| s.values().base()), Some(4.0));
    /// store.remove_owner(owner);
    /// assert!(store.slot(r).is_none());
    /// ```
    pub fn slot(&self, reference: AttributeRef<K>) -> Option<&AttributeSlot<K>> {
        self.owner_slots(reference.owner)?
            .get(reference.kind.index())
    }

    pub(crate) fn slot_mut(&mut self, reference: AttributeRef<K>) -> Option<&mut AttributeSlot<K>> {
        let entry = self.entries.get_mut(reference.owner.index() as usize)?;
        if entry.generation != reference.owner.generation() {
            return None;
        }
        entry.slots.as_mut()?.get_mut(reference.kind.index())
    }

    /// Slot lookup that skips the generation check.
    ///
    /// Only valid for references already validated in the current epoch.
    pub(crate) fn slot_unchecked(&self, owner_index: u32, kind: K) -> Option<&AttributeSlot<K>> {
        self.entries
            .get(owner_index as usize)?
            .slots
            .as_ref()?
            .get(kind.index())
    }

    /// Current final value behind `reference`.
    pub fn final_value(&self, reference: AttributeRef<K>) -> Option<f32> {
        self.slot(reference).map(|s| s.values.final_value())
    }

    fn owner_slots(&self, owner: OwnerId) -> Option<&Vec<AttributeSlot<K>>> {
        let entry = self.entries.get(owner.index() as usize)?;
        if entry.generation != owner.generation() {
            return None;
        }
        entry.slots.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;

    #[test]
    fn test_insert_allocates_every_kind() {
        let mut store = AttributeStore::<Stat>::new();
        let owner = store.insert_owner(|k| k.index() as f32 * 10.0);

        for &kind in Stat::ALL {
            let slot = store.slot(AttributeRef::new(owner, kind)).unwrap();
            assert_eq!(slot.values().base(), kind.index() as f32 * 10.0);
            assert_eq!(slot.values().final_value(), slot.values().base());
            assert!(slot.stack().is_empty());
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_removed_owner_is_unreachable() {
        let mut store = AttributeStore::<Stat>::new();
        let owner = store.insert_owner(|_| 1.0);
        let r = AttributeRef::new(owner, Stat::Strength);

        assert!(store.remove_owner(owner).is_some());
        assert!(store.slot(r).is_none());
        assert!(store.remove_owner(owner).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reused_index_gets_new_generation() {
        let mut store = AttributeStore::<Stat>::new();
        let first = store.insert_owner(|_| 1.0);
        store.remove_owner(first);
        let second = store.insert_owner(|_| 2.0);

        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(!store.contains(first));
        assert_eq!(
            store.final_value(AttributeRef::new(second, Stat::Dexterity)),
            Some(2.0)
        );
    }

    #[test]
    fn test_epoch_tracks_structure() {
        let mut store = AttributeStore::<Stat>::new();
        let e0 = store.epoch();
        let owner = store.insert_owner(|_| 0.0);
        let e1 = store.epoch();
        assert!(e1 > e0);

        store.slot_mut(AttributeRef::new(owner, Stat::Strength))
            .unwrap()
            .values
            .set_base(3.0);
        assert_eq!(store.epoch(), e1);

        store.remove_owner(owner);
        assert!(store.epoch() > e1);
    }

    #[test]
    fn test_recorded_generations_survive_rebuild() {
        let mut store = AttributeStore::<Stat>::new();
        let a = store.insert_owner(|_| 0.0);
        let b = store.insert_owner(|_| 0.0);
        store.remove_owner(b);

        let mut rebuilt = AttributeStore::<Stat>::with_generations(&store.generations());
        assert!(rebuilt.insert_owner_at(a, vec![AttributeSlot::new(0.0); 3]));
        let reissued = rebuilt.insert_owner(|_| 0.0);

        assert_eq!(reissued.index(), b.index());
        assert_ne!(reissued, b);
        assert!(!rebuilt.contains(b));
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_owners_lists_live_only() {
        let mut store = AttributeStore::<Stat>::new();
        let a = store.insert_owner(|_| 0.0);
        let b = store.insert_owner(|_| 0.0);
        store.remove_owner(a);
        let owners: Vec<_> = store.owners().collect();
        assert_eq!(owners, vec![b]);
    }
}
