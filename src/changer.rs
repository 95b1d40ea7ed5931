//! Attribute changer module.
//!
//! Provides the `AttributeChanger` type, the only component that reads or
//! writes the attribute store and the dependency registry. Every mutation
//! recomputes the affected slot and cascades the change to its dependents
//! before returning, so a public read never observes a stale final value.

use crate::breakdown::AttributeBreakdown;
use crate::command::AttributeCommand;
use crate::config::EngineConfig;
use crate::error::AttributeError;
use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::{Modifier, ModifierHandle, ModifierStack};
use crate::observers::DependencyRegistry;
use crate::processor::CommandOutcome;
use crate::store::{AttributeSlot, AttributeStore};
use crate::values::AttributeValues;
use std::collections::HashSet;

/// A reference validated against the store's current structure.
///
/// Reading through it skips the generation check until an owner is added or
/// removed, after which it transparently revalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRef<K> {
    reference: AttributeRef<K>,
    epoch: u64,
}

impl<K: AttributeKind> ResolvedRef<K> {
    /// The underlying reference.
    pub fn reference(&self) -> AttributeRef<K> {
        self.reference
    }
}

/// Facade over the attribute store, modifier stacks and dependency registry.
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
/// let a = AttributeRef::new(changer.create_owner_with(|_| 10.0), Stat::Strength);
/// let b = AttributeRef::new(changer.create_owner_with(|_| 10.0), Stat::Strength);
///
/// changer.add_modifier(a, Modifier::from_attribute(b)).unwrap();
/// changer.add_base_value(b, 5.0).unwrap();
///
/// assert_eq!(changer.get_value(a).unwrap(), 25.0);
/// ```
#[derive(Debug)]
pub struct AttributeChanger<K: AttributeKind> {
    store: AttributeStore<K>,
    registry: DependencyRegistry<K>,
    config: EngineConfig,
}

impl<K: AttributeKind> Default for AttributeChanger<K> {
    fn default() -> Self {
        Self {
            store: AttributeStore::new(),
            registry: DependencyRegistry::new(),
            config: EngineConfig::default(),
        }
    }
}

impl<K: AttributeKind> AttributeChanger<K> {
    /// Create an empty changer with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty changer with a validated configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self, AttributeError<K>> {
        config.validate::<K>()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of the store.
    pub fn store(&self) -> &AttributeStore<K> {
        &self.store
    }

    /// Read-only view of the dependency registry.
    pub fn registry(&self) -> &DependencyRegistry<K> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Owner lifecycle
    // ------------------------------------------------------------------

    /// Register an owner whose slots start at the configured default base.
    pub fn create_owner(&mut self) -> OwnerId {
        let base = self.config.default_base_value;
        self.create_owner_with(|_| base)
    }

    /// Register an owner with a per-kind initial base value.
    pub fn create_owner_with<F>(&mut self, base_for: F) -> OwnerId
    where
        F: FnMut(K) -> f32,
    {
        let owner = self.store.insert_owner(base_for);
        tracing::debug!(%owner, "attribute owner created");
        owner
    }

    /// Destroy an owner.
    ///
    /// Runs the destruction notification first (a no-op if a
    /// `NotifyDestruction` command already ran), then detaches the owner's
    /// own modifiers from the registry, and only then reclaims its slots.
    ///
    /// # Errors
    ///
    /// `UnknownOwner` if `owner` is not live.
    pub fn destroy_owner(&mut self, owner: OwnerId) -> Result<(), AttributeError<K>> {
        if !self.store.contains(owner) {
            return Err(AttributeError::UnknownOwner(owner));
        }
        self.notify_destruction(owner)?;

        for reference in AttributeRef::all_of(owner) {
            let outbound: Vec<(ModifierHandle, AttributeRef<K>)> = self
                .slot(reference)?
                .stack
                .iter()
                .filter_map(|(h, m)| m.dependency().map(|src| (h, src)))
                .collect();
            for (handle, source) in outbound {
                self.registry.unregister_edge(source, reference, handle);
            }
        }

        self.store.remove_owner(owner);
        tracing::debug!(%owner, "attribute owner destroyed");
        Ok(())
    }

    /// Whether `owner` is live.
    pub fn contains_owner(&self, owner: OwnerId) -> bool {
        self.store.contains(owner)
    }

    /// Number of live owners.
    pub fn owner_count(&self) -> usize {
        self.store.len()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Final value of an attribute.
    ///
    /// Always up to date: every mutation cascades before it returns.
    ///
    /// # Errors
    ///
    /// `UnknownReference` if the owner was never created or was destroyed.
    pub fn get_value(&self, reference: AttributeRef<K>) -> Result<f32, AttributeError<K>> {
        Ok(self.slot(reference)?.values.final_value())
    }

    /// Base value of an attribute.
    pub fn get_base_value(&self, reference: AttributeRef<K>) -> Result<f32, AttributeError<K>> {
        Ok(self.slot(reference)?.values.base())
    }

    /// Base and final value of an attribute.
    pub fn values(&self, reference: AttributeRef<K>) -> Result<AttributeValues, AttributeError<K>> {
        Ok(self.slot(reference)?.values)
    }

    /// The modifier stack of an attribute.
    pub fn modifiers(
        &self,
        reference: AttributeRef<K>,
    ) -> Result<&ModifierStack<K>, AttributeError<K>> {
        Ok(&self.slot(reference)?.stack)
    }

    /// Validate `reference` once for repeated cheap reads.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzattr::{AttributeChanger, AttributeKind, AttributeRef};
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
    /// let r = AttributeRef::new(changer.create_owner_with(|_| 7.0), Stat::Strength);
    /// let resolved = changer.resolve(r).unwrap();
    ///
    /// changer.add_base_value(r, 1.0).unwrap();
    /// assert_eq!(changer.value_of(&resolved).unwrap(), 8.0);
    /// ```
    pub fn resolve(&self, reference: AttributeRef<K>) -> Result<ResolvedRef<K>, AttributeError<K>> {
        self.slot(reference)?;
        Ok(ResolvedRef {
            reference,
            epoch: self.store.epoch(),
        })
    }

    /// Final value through a resolved reference.
    pub fn value_of(&self, resolved: &ResolvedRef<K>) -> Result<f32, AttributeError<K>> {
        if resolved.epoch == self.store.epoch() {
            let r = resolved.reference;
            if let Some(slot) = self.store.slot_unchecked(r.owner.index(), r.kind) {
                return Ok(slot.values.final_value());
            }
        }
        self.get_value(resolved.reference)
    }

    /// Per-modifier breakdown of an attribute's final value.
    pub fn breakdown(
        &self,
        reference: AttributeRef<K>,
    ) -> Result<AttributeBreakdown<K>, AttributeError<K>> {
        let slot = self.slot(reference)?;
        let base = slot.values.base();
        let (_, steps) = slot
            .stack
            .combine_traced(base, |src| self.store.final_value(src));
        let mut breakdown = AttributeBreakdown::new(reference, base, slot.values.final_value());
        for (description, value) in steps {
            breakdown.add_contribution(description, value);
        }
        Ok(breakdown)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Overwrite an attribute's base value and cascade the change.
    pub fn set_base_value(
        &mut self,
        reference: AttributeRef<K>,
        value: f32,
    ) -> Result<(), AttributeError<K>> {
        self.slot_mut(reference)?.values.set_base(value);
        self.update(reference)
    }

    /// Add `delta` to an attribute's base value and cascade the change.
    pub fn add_base_value(
        &mut self,
        reference: AttributeRef<K>,
        delta: f32,
    ) -> Result<(), AttributeError<K>> {
        let values = &mut self.slot_mut(reference)?.values;
        values.set_base(values.base() + delta);
        self.update(reference)
    }

    /// Insert a modifier into `target`'s stack.
    ///
    /// A modifier that reads another attribute is registered as an observer
    /// of it. `target` is recomputed and the change cascaded before this
    /// returns.
    ///
    /// # Arguments
    ///
    /// * `target` - The attribute whose stack receives the modifier
    /// * `modifier` - The modifier, appended at the end of the stack
    ///
    /// # Returns
    ///
    /// The handle that removes the modifier again.
    ///
    /// # Errors
    ///
    /// * `UnknownReference` if `target` or the modifier's source is unknown
    /// * `CycleRejected` if the source already depends on `target`
    ///
    /// Both leave the graph unchanged.
    pub fn add_modifier(
        &mut self,
        target: AttributeRef<K>,
        modifier: Modifier<K>,
    ) -> Result<ModifierHandle, AttributeError<K>> {
        self.slot(target)?;
        let dependency = modifier.dependency();
        if let Some(source) = dependency {
            self.slot(source)?;
            if self.registry.would_create_cycle(target, source) {
                tracing::debug!(%target, %source, "modifier rejected: dependency cycle");
                return Err(AttributeError::CycleRejected {
                    dependency: source,
                    dependent: target,
                });
            }
        }

        let handle = self.slot_mut(target)?.stack.push(modifier);
        if let Some(source) = dependency {
            self.registry.register_edge(source, target, handle);
        }
        tracing::debug!(%target, %handle, "modifier added");
        self.update(target)?;
        Ok(handle)
    }

    /// Remove a modifier from `target`'s stack, returning it.
    pub fn remove_modifier(
        &mut self,
        target: AttributeRef<K>,
        handle: ModifierHandle,
    ) -> Result<Modifier<K>, AttributeError<K>> {
        let modifier = self
            .slot_mut(target)?
            .stack
            .remove(handle)
            .ok_or(AttributeError::UnknownModifier { target, handle })?;
        if let Some(source) = modifier.dependency() {
            self.registry.unregister_edge(source, target, handle);
        }
        tracing::debug!(%target, %handle, "modifier removed");
        self.update(target)?;
        Ok(modifier)
    }

    /// Purge every modifier that reads any attribute of `owner`.
    ///
    /// Detaches the owner's attributes from the registry, removes the
    /// referencing modifiers from their stacks and cascades the resulting
    /// changes. Returns the number of modifiers removed. Safe to repeat.
    pub fn notify_destruction(&mut self, owner: OwnerId) -> Result<usize, AttributeError<K>> {
        let mut touched: Vec<AttributeRef<K>> = Vec::new();
        let mut removed = 0;

        for source in AttributeRef::<K>::all_of(owner) {
            for observer in self.registry.take_observers(source) {
                if let Some(slot) = self.store.slot_mut(observer.dependent) {
                    if slot.stack.remove(observer.handle).is_some() {
                        removed += 1;
                    }
                }
                if observer.dependent.owner != owner && !touched.contains(&observer.dependent) {
                    touched.push(observer.dependent);
                }
            }
        }

        for dependent in touched {
            if self.store.slot(dependent).is_some() {
                self.update(dependent)?;
            }
        }
        if self.store.contains(owner) {
            for reference in AttributeRef::all_of(owner) {
                self.update(reference)?;
            }
        }

        tracing::debug!(%owner, removed, "destruction notified");
        Ok(removed)
    }

    /// Apply one deferred command.
    pub fn apply_command(
        &mut self,
        command: AttributeCommand<K>,
    ) -> Result<CommandOutcome<K>, AttributeError<K>> {
        match command {
            AttributeCommand::AddModifier { target, modifier } => {
                let handle = self.add_modifier(target, modifier)?;
                Ok(CommandOutcome::ModifierAdded { target, handle })
            }
            AttributeCommand::RemoveModifier { target, handle } => {
                self.remove_modifier(target, handle)?;
                Ok(CommandOutcome::ModifierRemoved { target, handle })
            }
            AttributeCommand::NotifyDestruction { owner } => {
                let removed = self.notify_destruction(owner)?;
                Ok(CommandOutcome::DestructionNotified { owner, removed })
            }
        }
    }

    // ------------------------------------------------------------------
    // Recompute & cascade
    // ------------------------------------------------------------------

    /// Recompute `reference` and, if it changed, everything downstream.
    pub(crate) fn update(&mut self, reference: AttributeRef<K>) -> Result<(), AttributeError<K>> {
        if self.recompute(reference)? {
            self.propagate(reference)?;
        }
        Ok(())
    }

    /// Recompute one slot's final value. Returns whether it changed.
    fn recompute(&mut self, reference: AttributeRef<K>) -> Result<bool, AttributeError<K>> {
        let slot = self.slot(reference)?;
        let value = slot
            .stack
            .combine(slot.values.base(), |src| self.store.final_value(src));
        Ok(self.slot_mut(reference)?.values.store_final(value))
    }

    /// Cascade a change of `source` to everything downstream of it.
    ///
    /// Dependents are visited once each in topological order, so every slot
    /// reads sources that are already settled. A slot is only recomputed if
    /// one of its sources changed in this pass. Fails before touching any
    /// dependent if the longest downstream path exceeds the configured depth.
    fn propagate(&mut self, source: AttributeRef<K>) -> Result<(), AttributeError<K>> {
        let order = self.registry.cascade_order(source);
        let limit = self.config.max_propagation_depth;
        if let Some(&(at, depth)) = order.iter().find(|(_, depth)| *depth > limit) {
            tracing::error!(%source, %at, depth, "propagation depth exceeded");
            return Err(AttributeError::PropagationDepthExceeded { at, depth });
        }

        let mut changed: HashSet<AttributeRef<K>> = HashSet::new();
        changed.insert(source);
        for (dependent, depth) in order {
            let stale = self
                .registry
                .sources_of(dependent)
                .iter()
                .any(|s| changed.contains(s));
            if stale && self.recompute(dependent)? {
                tracing::trace!(%source, %dependent, depth, "cascade");
                changed.insert(dependent);
            }
        }
        Ok(())
    }

    fn slot(&self, reference: AttributeRef<K>) -> Result<&AttributeSlot<K>, AttributeError<K>> {
        self.store
            .slot(reference)
            .ok_or(AttributeError::UnknownReference(reference))
    }

    fn slot_mut(
        &mut self,
        reference: AttributeRef<K>,
    ) -> Result<&mut AttributeSlot<K>, AttributeError<K>> {
        self.store
            .slot_mut(reference)
            .ok_or(AttributeError::UnknownReference(reference))
    }

    pub(crate) fn from_parts(
        store: AttributeStore<K>,
        registry: DependencyRegistry<K>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }
}
