//! Dependency registry module.
//!
//! The reverse-edge index of the attribute graph. For every source slot it
//! records the observers: `(dependent, handle)` pairs meaning "the modifier
//! `handle` on `dependent` reads this slot". A parallel directed graph of
//! slot-to-slot edges (weighted by how many modifiers realize each edge) is
//! used to reject edges that would close a cycle.

use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::ModifierHandle;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, DfsPostOrder};
use petgraph::Direction;
use std::collections::HashMap;

/// A dependent modifier registered against a source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Observer<K> {
    /// The slot whose stack holds the modifier.
    pub dependent: AttributeRef<K>,
    /// The modifier within the dependent's stack.
    pub handle: ModifierHandle,
}

/// Reverse-edge index of the attribute dependency graph.
///
/// Edges in the graph point from a source to its dependents, the direction
/// changes propagate in.
///
/// # Examples
///
/// ```rust
/// use zzattr::observers::DependencyRegistry;
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
/// let a = AttributeRef::new(changer.create_owner(), Stat::Strength);
/// let b = AttributeRef::new(changer.create_owner(), Stat::Strength);
///
/// changer.add_modifier(a, Modifier::from_attribute(b)).unwrap();
///
/// let registry: &DependencyRegistry<Stat> = changer.registry();
/// assert_eq!(registry.observers_of(b).len(), 1);
/// // b reading a would close the loop
/// assert!(registry.would_create_cycle(b, a));
/// ```
#[derive(Debug)]
pub struct DependencyRegistry<K: AttributeKind> {
    observers: HashMap<AttributeRef<K>, Vec<Observer<K>>>,
    graph: DiGraphMap<AttributeRef<K>, u32>,
}

impl<K: AttributeKind> Default for DependencyRegistry<K> {
    fn default() -> Self {
        Self {
            observers: HashMap::new(),
            graph: DiGraphMap::new(),
        }
    }
}

impl<K: AttributeKind> DependencyRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent`'s modifier `handle` reads `source`.
    ///
    /// Several modifiers on the same dependent may read the same source; the
    /// graph edge is kept until the last of them is unregistered.
    /// Callers check [`would_create_cycle`](Self::would_create_cycle) first.
    ///
    /// # Arguments
    ///
    /// * `source` - The slot being read
    /// * `dependent` - The slot whose stack holds the reading modifier
    /// * `handle` - The modifier within `dependent`'s stack
    pub fn register_edge(
        &mut self,
        source: AttributeRef<K>,
        dependent: AttributeRef<K>,
        handle: ModifierHandle,
    ) {
        self.observers
            .entry(source)
            .or_default()
            .push(Observer { dependent, handle });

        match self.graph.edge_weight_mut(source, dependent) {
            Some(count) => *count += 1,
            None => {
                self.graph.add_edge(source, dependent, 1);
            }
        }
    }

    /// Remove the observer entry of `dependent`'s modifier `handle` on `source`.
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed, `false` if none was registered.
    pub fn unregister_edge(
        &mut self,
        source: AttributeRef<K>,
        dependent: AttributeRef<K>,
        handle: ModifierHandle,
    ) -> bool {
        let Some(list) = self.observers.get_mut(&source) else {
            return false;
        };
        let Some(pos) = list
            .iter()
            .position(|o| o.dependent == dependent && o.handle == handle)
        else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.observers.remove(&source);
        }
        self.release_edge(source, dependent);
        true
    }

    /// Detach every observer of `source`, returning them.
    ///
    /// This is the source-side half of owner destruction.
    pub fn take_observers(&mut self, source: AttributeRef<K>) -> Vec<Observer<K>> {
        let taken = self.observers.remove(&source).unwrap_or_default();
        for observer in &taken {
            self.release_edge(source, observer.dependent);
        }
        self.prune(source);
        taken
    }

    /// Observers registered against `source`, in registration order.
    ///
    /// Returns an empty slice for a slot nobody reads.
    pub fn observers_of(&self, source: AttributeRef<K>) -> &[Observer<K>] {
        self.observers
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any observer entry still points at or from `owner`.
    pub fn touches_owner(&self, owner: OwnerId) -> bool {
        self.graph.nodes().any(|n| n.owner == owner)
    }

    /// Whether making `dependent` read `source` would close a cycle.
    ///
    /// A cycle forms when `source` already (transitively) depends on
    /// `dependent`, i.e. when `source` is reachable from `dependent` by
    /// following propagation edges. Self-references always cycle.
    ///
    /// # Arguments
    ///
    /// * `dependent` - The slot that would gain the modifier
    /// * `source` - The slot the modifier would read
    ///
    /// # Returns
    ///
    /// `true` if the edge must be rejected.
    pub fn would_create_cycle(&self, dependent: AttributeRef<K>, source: AttributeRef<K>) -> bool {
        if dependent == source {
            return true;
        }
        if !self.graph.contains_node(dependent) || !self.graph.contains_node(source) {
            return false;
        }
        let mut dfs = Dfs::new(&self.graph, dependent);
        while let Some(node) = dfs.next(&self.graph) {
            if node == source {
                return true;
            }
        }
        false
    }

    /// Every slot downstream of `source`, in topological order.
    ///
    /// Each entry pairs a slot with the length of the longest path leading
    /// to it from `source`. Every slot appears once and after all of its
    /// own sources that are themselves downstream of `source`, so a single
    /// pass in this order recomputes each slot exactly once. The walk only
    /// visits the reachable part of the graph.
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
    /// let root = AttributeRef::new(changer.create_owner(), Stat::Strength);
    /// let mid = AttributeRef::new(changer.create_owner(), Stat::Strength);
    /// let leaf = AttributeRef::new(changer.create_owner(), Stat::Strength);
    ///
    /// changer.add_modifier(mid, Modifier::from_attribute(root)).unwrap();
    /// changer.add_modifier(leaf, Modifier::from_attribute(mid)).unwrap();
    /// changer.add_modifier(leaf, Modifier::from_attribute(root)).unwrap();
    ///
    /// let order = changer.registry().cascade_order(root);
    /// assert_eq!(order, vec![(mid, 1), (leaf, 2)]);
    /// ```
    pub fn cascade_order(&self, source: AttributeRef<K>) -> Vec<(AttributeRef<K>, usize)> {
        if !self.graph.contains_node(source) {
            return Vec::new();
        }

        // Reverse post-order of a DFS over a DAG is a topological order.
        let mut order = Vec::new();
        let mut dfs = DfsPostOrder::new(&self.graph, source);
        while let Some(node) = dfs.next(&self.graph) {
            order.push(node);
        }
        order.reverse();

        let mut depths: HashMap<AttributeRef<K>, usize> = HashMap::with_capacity(order.len());
        depths.insert(source, 0);
        for &node in &order {
            let depth = depths.get(&node).copied().unwrap_or(0);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let longest = depths.entry(next).or_insert(0);
                *longest = (*longest).max(depth + 1);
            }
        }

        order
            .into_iter()
            .filter(|&node| node != source)
            .map(|node| (node, depths.get(&node).copied().unwrap_or(0)))
            .collect()
    }

    /// Slots that `dependent` reads, one entry per distinct source.
    pub fn sources_of(&self, dependent: AttributeRef<K>) -> Vec<AttributeRef<K>> {
        if !self.graph.contains_node(dependent) {
            return Vec::new();
        }
        self.graph
            .neighbors_directed(dependent, Direction::Incoming)
            .collect()
    }

    /// Total number of observer entries.
    pub fn edge_count(&self) -> usize {
        self.observers.values().map(Vec::len).sum()
    }

    fn release_edge(&mut self, source: AttributeRef<K>, dependent: AttributeRef<K>) {
        let remove = match self.graph.edge_weight_mut(source, dependent) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if remove {
            self.graph.remove_edge(source, dependent);
            self.prune(source);
            self.prune(dependent);
        }
    }

    fn prune(&mut self, node: AttributeRef<K>) {
        if self.graph.contains_node(node)
            && self.graph.neighbors_directed(node, Direction::Incoming).next().is_none()
            && self.graph.neighbors_directed(node, Direction::Outgoing).next().is_none()
        {
            self.graph.remove_node(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;

    fn slot(i: u32) -> AttributeRef<Stat> {
        AttributeRef::new(OwnerId::new(i, 0), Stat::Strength)
    }

    fn handle(n: u32) -> ModifierHandle {
        ModifierHandle(n)
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = DependencyRegistry::new();
        let (a, b) = (slot(0), slot(1));

        registry.register_edge(b, a, handle(0));
        assert_eq!(registry.observers_of(b).len(), 1);
        assert_eq!(registry.sources_of(a), vec![b]);

        assert!(registry.unregister_edge(b, a, handle(0)));
        assert!(!registry.unregister_edge(b, a, handle(0)));
        assert!(registry.observers_of(b).is_empty());
        assert!(registry.sources_of(a).is_empty());
        assert!(!registry.touches_owner(a.owner));
    }

    #[test]
    fn test_parallel_edges_are_counted() {
        let mut registry = DependencyRegistry::new();
        let (a, b) = (slot(0), slot(1));

        registry.register_edge(b, a, handle(0));
        registry.register_edge(b, a, handle(1));
        assert_eq!(registry.edge_count(), 2);

        registry.unregister_edge(b, a, handle(0));
        assert!(registry.would_create_cycle(b, a));

        registry.unregister_edge(b, a, handle(1));
        assert!(!registry.would_create_cycle(b, a));
    }

    #[test]
    fn test_cycle_detection_direct_and_transitive() {
        let mut registry = DependencyRegistry::new();
        let (a, b, c) = (slot(0), slot(1), slot(2));

        // a reads b, b reads c
        registry.register_edge(b, a, handle(0));
        registry.register_edge(c, b, handle(0));

        assert!(registry.would_create_cycle(b, a));
        assert!(registry.would_create_cycle(c, a));
        assert!(!registry.would_create_cycle(a, c));
        assert!(registry.would_create_cycle(a, a));
    }

    #[test]
    fn test_unrelated_slots_never_cycle() {
        let registry = DependencyRegistry::<Stat>::new();
        assert!(!registry.would_create_cycle(slot(0), slot(1)));
    }

    #[test]
    fn test_cascade_order_visits_lattice_once() {
        let mut registry = DependencyRegistry::new();
        let root = slot(0);
        let mut previous = vec![root];
        let mut next_index = 1;
        let mut all = Vec::new();

        // Every slot of a layer reads every slot of the layer before.
        for _ in 0..24 {
            let layer = vec![slot(next_index), slot(next_index + 1)];
            next_index += 2;
            for &dependent in &layer {
                for (n, &source) in previous.iter().enumerate() {
                    registry.register_edge(source, dependent, handle(n as u32));
                }
            }
            all.extend(layer.iter().copied());
            previous = layer;
        }

        let order = registry.cascade_order(root);
        assert_eq!(order.len(), all.len());

        let position: HashMap<_, _> = order.iter().enumerate().map(|(i, (n, _))| (*n, i)).collect();
        assert_eq!(position.len(), all.len());
        for &node in &all {
            for source in registry.sources_of(node) {
                if source != root {
                    assert!(position[&source] < position[&node]);
                }
            }
        }
        assert_eq!(order.last().map(|(_, depth)| *depth), Some(24));
    }

    #[test]
    fn test_cascade_order_of_unread_slot_is_empty() {
        let mut registry = DependencyRegistry::new();
        let (a, b) = (slot(0), slot(1));
        registry.register_edge(b, a, handle(0));

        assert!(registry.cascade_order(a).is_empty());
        assert!(registry.cascade_order(slot(7)).is_empty());
        assert_eq!(registry.cascade_order(b), vec![(a, 1)]);
    }

    #[test]
    fn test_take_observers_detaches_source() {
        let mut registry = DependencyRegistry::new();
        let (a, b, c) = (slot(0), slot(1), slot(2));

        registry.register_edge(c, a, handle(0));
        registry.register_edge(c, b, handle(0));

        let taken = registry.take_observers(c);
        assert_eq!(taken.len(), 2);
        assert_eq!(registry.edge_count(), 0);
        assert!(!registry.touches_owner(c.owner));
    }
}
