//! # Archetype Store
//!
//! Storage core of an Entity-Component-System runtime: entities are
//! partitioned into archetypes by their exact component-type signature,
//! stored densely for cache-friendly iteration, and mutated through
//! validating bind/unbind operations that migrate entities between
//! archetypes as their composition changes.
//!
//! ## Design Goals
//! - Archetype-based dense storage, swap-remove everywhere
//! - Generation-checked entity handles that detect staleness by value
//! - Fail-fast queries instead of locked or inconsistent iteration
//! - Deferred mutation through two buffer flavors: an ordered replay log
//!   and an isolated sub-store merged wholesale on flush
//!
//! The crate is an in-process data structure library; there is no wire
//! format and no I/O surface. Logging goes through the `log` facade.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::manager::EcsManager;

pub use engine::entity::{
    Entity,
    EntityAllocator,
    EntityLocation,
};

pub use engine::signature::Signature;

pub use engine::component::{
    ComponentData,
    ComponentKey,
    ComponentNode,
};

pub use engine::query::{
    AnyEntity,
    EntityCursor,
    EntityFilter,
    RequiredComponents,
};

pub use engine::commands::{
    BatchDisposition,
    CommandBuffer,
    ComponentRef,
};

pub use engine::staging::NewEntityBuffer;

pub use engine::error::{
    CapacityError,
    EcsError,
    EcsResult,
};

pub use engine::types::{
    ArchetypeId,
    ComponentTypeId,
    EntityId,
    EntityTypeId,
    Generation,
    StructuralVersion,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used store types.
///
/// Import with:
/// ```rust
/// use ecs_store::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AnyEntity,
        BatchDisposition,
        CommandBuffer,
        ComponentData,
        ComponentKey,
        ComponentRef,
        EcsError,
        EcsManager,
        EcsResult,
        Entity,
        EntityAllocator,
        EntityFilter,
        NewEntityBuffer,
        RequiredComponents,
        Signature,
    };
}
