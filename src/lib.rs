//! # zzattr - Derived Attribute Engine with Cross-Owner Dependencies
//!
//! A runtime engine for derived numeric attributes that provides:
//! - **Per-owner attribute slots** holding a base and a final value
//! - **Modifier stacks** reduced into the final value in insertion order
//! - **Cross-owner dependencies**: a modifier may read another owner's attribute
//! - **Immediate cascades**: a change is propagated to every dependent before
//!   the mutating call returns
//! - **Deferred commands**: graph restructuring is batched by concurrent
//!   producers and applied at a single synchronization point
//! - **Destruction safety**: no modifier ever outlives the owner it reads
//!
//! ## Core Concepts
//!
//! ```text
//! [producers] → CommandBatch → CommandQueue → process_all → AttributeChanger
//!                                                            ├─ AttributeStore
//!                                                            └─ DependencyRegistry
//! ```
//!
//! 1. **Attribute kinds** are a closed enumeration supplied by the host
//!    through the [`AttributeKind`] trait
//! 2. **Base values** change directly through the [`AttributeChanger`]
//! 3. **Modifiers** are added and removed either directly or via
//!    [`AttributeCommand`]s grouped into [`CommandBatch`]es
//! 4. **Cycles are rejected** when a modifier is added, never resolved
//!
//! ## Example
//!
//! ```rust
//! use zzattr::*;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
//! enum Stat {
//!     Strength,
//!     Dexterity,
//! }
//!
//! impl AttributeKind for Stat {
//!     const ALL: &'static [Self] = &[Stat::Strength, Stat::Dexterity];
//!     fn index(self) -> usize {
//!         self as usize
//!     }
//! }
//!
//! let mut changer = AttributeChanger::<Stat>::new();
//! let a = changer.create_owner_with(|_| 10.0);
//! let b = changer.create_owner_with(|_| 10.0);
//! let a_str = AttributeRef::new(a, Stat::Strength);
//! let b_str = AttributeRef::new(b, Stat::Strength);
//!
//! // Producers append commands; the processor applies them later.
//! let queue = CommandQueue::new();
//! let mut batch = queue.create_batch();
//! batch.add_modifier(a_str, Modifier::from_attribute(b_str)).unwrap();
//! queue.submit(batch);
//! changer.process_all(&queue).unwrap();
//!
//! changer.add_base_value(b_str, 5.0).unwrap();
//! assert_eq!(changer.get_value(a_str).unwrap(), 25.0);
//! ```
//!
//! ## Modules
//!
//! - [`kind`] - Attribute kinds, owner ids and attribute references
//! - [`values`] - Base and final values of a slot
//! - [`modifier`] - Modifiers, stacks and the combination algebra
//! - [`store`] - Generational arena of owners
//! - [`observers`] - Reverse dependency registry and cycle rejection
//! - [`command`] - Deferred commands, batches and the queue
//! - [`processor`] - Batch processing and reports
//! - [`changer`] - The `AttributeChanger` facade
//! - [`breakdown`] - Per-modifier value breakdowns
//! - [`snapshot`] - Serializable snapshots
//! - [`config`] - Engine configuration
//! - [`error`] - Error types

pub mod breakdown;
pub mod changer;
pub mod command;
pub mod config;
pub mod error;
pub mod kind;
pub mod modifier;
pub mod observers;
pub mod processor;
pub mod snapshot;
pub mod store;
pub mod values;

// Re-export main types for convenience
pub use breakdown::AttributeBreakdown;
pub use changer::{AttributeChanger, ResolvedRef};
pub use command::{AttributeCommand, BatchSequence, BatchState, CommandBatch, CommandQueue};
pub use config::EngineConfig;
pub use error::AttributeError;
pub use kind::{AttributeKind, AttributeRef, OwnerId};
pub use modifier::{Modifier, ModifierHandle, ModifierStack};
pub use processor::{CommandFailure, CommandOutcome, ProcessAborted, ProcessReport};
pub use snapshot::AttributeSnapshot;
pub use values::AttributeValues;
