//! Core identifier types and layout constants.
//!
//! This module defines the **numeric vocabulary** shared by every part of the
//! store: entity slot indices, generation counters, component type ids, and
//! archetype ids. Keeping these as small, copyable aliases makes intent
//! explicit at API boundaries without paying for newtype ceremony in hot
//! paths.
//!
//! ## Identifier model
//!
//! - `EntityId`: densely reused slot index handed out by the shared
//!   allocator. Never unique on its own; always paired with a generation.
//! - `Generation`: reuse counter for one entity slot. A handle whose
//!   generation does not match the live occupant is stale.
//! - `EntityTypeId`: caller-defined classification of an entity (agent kind,
//!   prefab id, …). The store only uses it for per-type population counters
//!   and query filtering.
//! - `ComponentTypeId`: index of a component type's bit in an archetype
//!   signature.
//! - `ArchetypeId`: creation-order index of an archetype. Stable for the
//!   lifetime of the store; archetypes are created lazily and never destroyed.

/// Densely reused entity slot index.
pub type EntityId = u32;

/// Caller-defined entity classification id.
pub type EntityTypeId = u32;

/// Reuse counter for an entity slot; detects stale handles.
pub type Generation = u32;

/// Bit index of a component type within a signature.
pub type ComponentTypeId = u32;

/// Creation-order identifier of an archetype. Stable once assigned.
pub type ArchetypeId = u32;

/// Monotonic counter of structural mutations, used for fail-fast iteration.
pub type StructuralVersion = u64;

/// Number of bits per signature word.
pub const WORD_BITS: usize = 64;

/// The archetype holding entities with no components. Created with every
/// store and always present in the sorted registry.
pub const EMPTY_ARCHETYPE: ArchetypeId = 0;
