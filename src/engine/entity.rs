//! Entity handles and the shared id allocator.
//!
//! An [`Entity`] is a value, not a reference: a densely reused slot id, a
//! caller-defined entity type, and a generation counting how often the slot
//! has been reused. Equality requires all three fields to match, so a handle
//! kept across a remove-and-reuse cycle compares unequal to the new occupant.
//!
//! ## The one shared structure
//!
//! [`EntityAllocator`] owns the id-reuse bitmap and the per-slot generation
//! counters behind a single mutex. It is the only state shared between a
//! manager and its deferred buffers; everything else in the store is
//! single-writer. Sharing the allocator is what lets independent buffers on
//! different threads create entities concurrently without ever colliding on
//! an id.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::signature::Signature;
use crate::engine::types::{ArchetypeId, EntityId, EntityTypeId, Generation};


/// Immutable, generation-checked entity handle.
///
/// ## Semantics
/// * `id` is densely reused; it is only meaningful together with
///   `generation`.
/// * Full-value equality (derived) is the liveness comparison: a store's
///   current occupant of a slot either equals a handle exactly or the handle
///   is stale.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entity {
    id: EntityId,
    entity_type: EntityTypeId,
    generation: Generation,
}

impl Entity {
    #[inline]
    pub(crate) fn new(id: EntityId, entity_type: EntityTypeId, generation: Generation) -> Self {
        Self { id, entity_type, generation }
    }

    /// Slot index of this handle.
    #[inline]
    pub fn id(self) -> EntityId {
        self.id
    }

    /// Caller-defined entity type.
    #[inline]
    pub fn entity_type(self) -> EntityTypeId {
        self.entity_type
    }

    /// Reuse count of the slot at the time this handle was created.
    #[inline]
    pub fn generation(self) -> Generation {
        self.generation
    }
}

/// An entity's position inside the store: which archetype holds it and at
/// which dense slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Owning archetype.
    pub archetype: ArchetypeId,
    /// Index into the archetype's dense arrays.
    pub slot: usize,
}

struct AllocatorInner {
    /// Id-reuse bitmap: bit `i` set means slot `i` is currently allocated.
    used: Signature,
    /// Per-slot reuse counters, grown on demand.
    generations: Vec<Generation>,
}

/// Shared entity id allocator and generation tracker.
///
/// ## Concurrency
/// All state lives behind one mutex; allocate and release are each a single
/// short critical section. The allocator is handed to the manager and every
/// buffer as an [`Arc`], making it the process-wide source of unique ids.
///
/// ## Semantics
/// * `allocate` picks the lowest free slot and bumps its generation, so a
///   freshly created entity at a reused slot carries `prior generation + 1`.
/// * `release` only clears the bitmap bit; the generation is kept until the
///   next allocation of that slot.

pub struct EntityAllocator {
    inner: Mutex<AllocatorInner>,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AllocatorInner {
                used: Signature::new(),
                generations: Vec::new(),
            }),
        }
    }

    /// Creates an allocator wrapped for sharing between a manager and its
    /// buffers.
    #[inline]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Allocates the lowest free id and returns the entity handle occupying
    /// it, with the slot's generation bumped.
    pub fn allocate(&self, entity_type: EntityTypeId) -> Entity {
        let mut inner = self.inner.lock();

        let id = inner.used.next_clear_bit(0);
        inner.used.set(id);

        if inner.generations.len() <= id {
            inner.generations.resize(id + 1, 0);
        }
        inner.generations[id] = inner.generations[id].wrapping_add(1);

        Entity::new(id as EntityId, entity_type, inner.generations[id])
    }

    /// Returns an id to the free pool. The generation stays until the slot
    /// is allocated again.
    pub fn release(&self, id: EntityId) {
        let mut inner = self.inner.lock();
        inner.used.clear(id as usize);
    }

    /// Returns `true` if `id` is currently allocated.
    pub fn is_allocated(&self, id: EntityId) -> bool {
        self.inner.lock().used.has(id as usize)
    }

    /// Current generation of a slot; zero for never-allocated slots.
    pub fn generation_of(&self, id: EntityId) -> Generation {
        self.inner
            .lock()
            .generations
            .get(id as usize)
            .copied()
            .unwrap_or(0)
    }
}
