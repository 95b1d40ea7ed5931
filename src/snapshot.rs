//! Snapshot module.
//!
//! Serializable captures of every live owner: base values and modifier
//! stacks. Final values and the dependency registry are derived data and are
//! rebuilt on restore.

use crate::changer::AttributeChanger;
use crate::config::EngineConfig;
use crate::error::AttributeError;
use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::{ModifierHandle, ModifierStack};
use crate::observers::DependencyRegistry;
use crate::store::{AttributeSlot, AttributeStore};
use crate::values::AttributeValues;
use serde::{Deserialize, Serialize};

/// One attribute slot in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSnapshot<K> {
    pub kind: K,
    pub values: AttributeValues,
    pub modifiers: ModifierStack<K>,
}

/// One owner in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSnapshot<K> {
    pub owner: OwnerId,
    pub slots: Vec<SlotSnapshot<K>>,
}

/// Capture of all owners of an [`AttributeChanger`].
///
/// # Examples
///
/// ```rust
/// use zzattr::{AttributeChanger, AttributeKind, AttributeRef, EngineConfig, Modifier};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// enum Stat { Strength }
///
/// impl AttributeKind for Stat {
///     const ALL: &'static [Self] = &[Stat::Strength];
///     fn index(self) -> usize { self as usize }
/// }
///
/// let mut changer = AttributeChanger::<Stat>::new();
/// let a = AttributeRef::new(changer.create_owner_with(|_| 1.0), Stat::Strength);
/// let b = AttributeRef::new(changer.create_owner_with(|_| 2.0), Stat::Strength);
/// changer.add_modifier(a, Modifier::from_attribute(b)).unwrap();
///
/// let json = serde_json::to_string(&changer.snapshot()).unwrap();
/// let restored = AttributeChanger::restore(
///     EngineConfig::default(),
///     serde_json::from_str(&json).unwrap(),
/// )
/// .unwrap();
///
/// assert_eq!(restored.get_value(a).unwrap(), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot<K> {
    pub owners: Vec<OwnerSnapshot<K>>,
    /// Generation of every arena entry, by index, including free ones.
    #[serde(default)]
    pub generations: Vec<u32>,
}

impl<K: AttributeKind> AttributeChanger<K> {
    /// Capture every live owner.
    pub fn snapshot(&self) -> AttributeSnapshot<K> {
        let owners = self
            .store()
            .owners()
            .map(|owner| OwnerSnapshot {
                owner,
                slots: AttributeRef::<K>::all_of(owner)
                    .filter_map(|r| {
                        self.store().slot(r).map(|slot| SlotSnapshot {
                            kind: r.kind,
                            values: slot.values(),
                            modifiers: slot.stack().clone(),
                        })
                    })
                    .collect(),
            })
            .collect();
        AttributeSnapshot {
            owners,
            generations: self.store().generations(),
        }
    }

    /// Rebuild a changer from a snapshot.
    ///
    /// Owner ids, arena generations and modifier handles are preserved, so
    /// references to owners destroyed before the snapshot stay invalid.
    /// Modifiers reading an owner absent from the snapshot are dropped.
    ///
    /// # Errors
    ///
    /// * `InvalidSnapshot` if an owner appears twice, disagrees with the
    ///   recorded generation of its arena entry, or a stack holds duplicate
    ///   handles or handles its counter has not issued yet
    /// * `CycleRejected` if the modifiers form a dependency cycle
    pub fn restore(
        config: EngineConfig,
        snapshot: AttributeSnapshot<K>,
    ) -> Result<Self, AttributeError<K>> {
        config.validate::<K>()?;
        let mut store = AttributeStore::with_generations(&snapshot.generations);

        for owner in snapshot.owners {
            let recorded = snapshot.generations.get(owner.owner.index() as usize);
            if recorded.is_some_and(|&g| g != owner.owner.generation()) {
                return Err(AttributeError::InvalidSnapshot(format!(
                    "owner {} does not match its arena generation",
                    owner.owner
                )));
            }

            let mut slots: Vec<AttributeSlot<K>> = K::ALL
                .iter()
                .map(|_| AttributeSlot::new(config.default_base_value))
                .collect();
            for slot in owner.slots {
                if !slot.modifiers.handles_consistent() {
                    return Err(AttributeError::InvalidSnapshot(format!(
                        "inconsistent modifier handles on {}",
                        AttributeRef::new(owner.owner, slot.kind)
                    )));
                }
                slots[slot.kind.index()] = AttributeSlot::with_stack(slot.values.base(), slot.modifiers);
            }
            if !store.insert_owner_at(owner.owner, slots) {
                return Err(AttributeError::InvalidSnapshot(format!(
                    "owner {} appears twice",
                    owner.owner
                )));
            }
        }

        let owners: Vec<OwnerId> = store.owners().collect();
        let mut edges: Vec<(AttributeRef<K>, AttributeRef<K>, ModifierHandle)> = Vec::new();
        for &owner in &owners {
            for target in AttributeRef::<K>::all_of(owner) {
                let Some(slot) = store.slot_mut(target) else {
                    continue;
                };
                let dangling: Vec<ModifierHandle> = slot
                    .stack
                    .iter()
                    .filter(|(_, m)| m.dependency().is_some_and(|src| !owners.contains(&src.owner)))
                    .map(|(h, _)| h)
                    .collect();
                for handle in dangling {
                    tracing::debug!(%target, %handle, "dropping modifier with dangling reference");
                    slot.stack.remove(handle);
                }
                edges.extend(
                    slot.stack
                        .iter()
                        .filter_map(|(h, m)| m.dependency().map(|src| (src, target, h))),
                );
            }
        }

        let mut registry = DependencyRegistry::new();
        for (source, dependent, handle) in edges {
            if registry.would_create_cycle(dependent, source) {
                return Err(AttributeError::CycleRejected {
                    dependency: source,
                    dependent,
                });
            }
            registry.register_edge(source, dependent, handle);
        }

        let mut changer = AttributeChanger::from_parts(store, registry, config);
        for owner in owners {
            for reference in AttributeRef::all_of(owner) {
                changer.update(reference)?;
            }
        }
        tracing::debug!(owners = changer.owner_count(), "attribute snapshot restored");
        Ok(changer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;
    use crate::modifier::Modifier;

    fn str_of(owner: OwnerId) -> AttributeRef<Stat> {
        AttributeRef::new(owner, Stat::Strength)
    }

    #[test]
    fn test_restore_rebuilds_values_and_registry() {
        let mut changer = AttributeChanger::<Stat>::new();
        let a = str_of(changer.create_owner_with(|_| 10.0));
        let b = str_of(changer.create_owner_with(|_| 10.0));
        changer.add_modifier(a, Modifier::from_attribute(b)).unwrap();
        let handle = changer.add_modifier(a, Modifier::AddFlat(2.0)).unwrap();

        let json = serde_json::to_string(&changer.snapshot()).unwrap();
        let snapshot: AttributeSnapshot<Stat> = serde_json::from_str(&json).unwrap();
        let mut restored = AttributeChanger::restore(EngineConfig::default(), snapshot).unwrap();

        assert_eq!(restored.get_value(a).unwrap(), 22.0);
        assert_eq!(restored.registry().observers_of(b).len(), 1);

        restored.add_base_value(b, 1.0).unwrap();
        assert_eq!(restored.get_value(a).unwrap(), 23.0);

        // Handles survive the round trip.
        restored.remove_modifier(a, handle).unwrap();
        assert_eq!(restored.get_value(a).unwrap(), 21.0);
    }

    #[test]
    fn test_restore_preserves_generations() {
        let mut changer = AttributeChanger::<Stat>::new();
        let first = changer.create_owner();
        changer.destroy_owner(first).unwrap();
        let second = changer.create_owner();

        let restored = AttributeChanger::restore(EngineConfig::default(), changer.snapshot()).unwrap();
        assert!(restored.contains_owner(second));
        assert!(!restored.contains_owner(first));
    }

    #[test]
    fn test_restore_drops_dangling_modifiers() {
        let mut changer = AttributeChanger::<Stat>::new();
        let a = str_of(changer.create_owner_with(|_| 10.0));
        let b = str_of(changer.create_owner_with(|_| 10.0));
        changer.add_modifier(a, Modifier::from_attribute(b)).unwrap();

        let mut snapshot = changer.snapshot();
        snapshot.owners.retain(|o| o.owner == a.owner);

        let restored = AttributeChanger::restore(EngineConfig::default(), snapshot).unwrap();
        assert_eq!(restored.get_value(a).unwrap(), 10.0);
        assert!(restored.modifiers(a).unwrap().is_empty());
    }

    #[test]
    fn test_restore_keeps_destroyed_refs_invalid() {
        let mut changer = AttributeChanger::<Stat>::new();
        changer.create_owner_with(|_| 1.0);
        let gone = str_of(changer.create_owner_with(|_| 2.0));
        changer.destroy_owner(gone.owner).unwrap();

        let json = serde_json::to_string(&changer.snapshot()).unwrap();
        let mut restored =
            AttributeChanger::<Stat>::restore(EngineConfig::default(), serde_json::from_str(&json).unwrap())
                .unwrap();
        let reissued = restored.create_owner_with(|_| 99.0);

        assert_eq!(reissued.index(), gone.owner.index());
        assert_ne!(reissued, gone.owner);
        assert_eq!(
            restored.get_value(gone).unwrap_err(),
            AttributeError::UnknownReference(gone)
        );
    }

    #[test]
    fn test_restore_rejects_rewound_handle_counter() {
        let mut changer = AttributeChanger::<Stat>::new();
        let a = str_of(changer.create_owner());
        changer.add_modifier(a, Modifier::AddFlat(1.0)).unwrap();

        let mut value = serde_json::to_value(changer.snapshot()).unwrap();
        value["owners"][0]["slots"][0]["modifiers"]["next_handle"] = serde_json::json!(0);
        let snapshot: AttributeSnapshot<Stat> = serde_json::from_value(value).unwrap();

        let err = AttributeChanger::restore(EngineConfig::default(), snapshot).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_restore_rejects_generation_mismatch() {
        let mut changer = AttributeChanger::<Stat>::new();
        changer.create_owner();
        let mut snapshot = changer.snapshot();
        snapshot.generations[0] = 3;

        let err = AttributeChanger::restore(EngineConfig::default(), snapshot).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_restore_rejects_duplicate_owner() {
        let mut changer = AttributeChanger::<Stat>::new();
        changer.create_owner();
        let mut snapshot = changer.snapshot();
        snapshot.owners.push(snapshot.owners[0].clone());

        let err = AttributeChanger::restore(EngineConfig::default(), snapshot).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidSnapshot(_)));
    }
}
