//! Predicate-driven entity queries.
//!
//! Queries scan the sorted archetype registry, admit archetypes whose
//! signature and live entity types pass an [`EntityFilter`], and then yield
//! individual entities whose type passes the filter. The filter receives a
//! **defensive copy** of each archetype signature, so a filter implementation
//! cannot corrupt store state.
//!
//! ## Fail-fast, not isolated
//!
//! Iteration does not block mutation; it detects it. An [`EntityCursor`]
//! captures the store's structural version at creation and re-checks it on
//! every step: any mismatch produces [`EcsError::ConcurrentMutation`] instead
//! of inconsistent results. The cursor is detached from the store (`next`
//! borrows the manager per call) so callers *can* interleave
//! mutation with iteration and get the failure instead of a borrow error.
//! Cursors are restartable per call, never resumable across a mutation.

use crate::engine::entity::Entity;
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::manager::EcsManager;
use crate::engine::signature::Signature;
use crate::engine::types::{EntityTypeId, StructuralVersion};


/// Caller-supplied query predicate.
///
/// `matches_component_types` receives a copy of the archetype signature and
/// decides whether the archetype participates at all;
/// `matches_entity_type` then filters individual entities.

pub trait EntityFilter {
    /// Archetype-level admission over a copy of its component signature.
    fn matches_component_types(&self, signature: Signature) -> bool;

    /// Per-entity admission by entity type.
    fn matches_entity_type(&self, entity_type: EntityTypeId) -> bool;
}

/// Filter admitting every entity. Useful for whole-store sweeps.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyEntity;

impl EntityFilter for AnyEntity {
    #[inline]
    fn matches_component_types(&self, _signature: Signature) -> bool {
        true
    }

    #[inline]
    fn matches_entity_type(&self, _entity_type: EntityTypeId) -> bool {
        true
    }
}

/// Filter requiring a set of component types to be present, with no
/// entity-type restriction.
#[derive(Clone, Debug, Default)]
pub struct RequiredComponents {
    required: Signature,
}

impl RequiredComponents {
    /// Builds a filter from required component type bits.
    pub fn new(required: Signature) -> Self {
        Self { required }
    }

    /// Convenience constructor from a list of component type ids.
    pub fn of(types: &[usize]) -> Self {
        Self {
            required: Signature::from_bits(types),
        }
    }
}

impl EntityFilter for RequiredComponents {
    #[inline]
    fn matches_component_types(&self, signature: Signature) -> bool {
        self.required.is_subset_of(&signature)
    }

    #[inline]
    fn matches_entity_type(&self, _entity_type: EntityTypeId) -> bool {
        true
    }
}

/// Lazy, fail-fast traversal of the entities admitted by a filter.
///
/// ## Usage
/// ```ignore
/// let mut cursor = manager.entities(RequiredComponents::of(&[POSITION]));
/// while let Some(entity) = cursor.next(&manager) {
///     let entity = entity?;
///     // ...
/// }
/// ```
///
/// ## Semantics
/// * Traverses archetypes in registry (signature) order, entities in dense
///   slot order.
/// * The first step after any structural mutation fails with
///   `ConcurrentMutation` and exhausts the cursor.

pub struct EntityCursor<F: EntityFilter> {
    filter: F,
    version: StructuralVersion,
    position: usize,
    slot: usize,
    finished: bool,
}

impl<F: EntityFilter> EntityCursor<F> {
    pub(crate) fn new(filter: F, version: StructuralVersion) -> Self {
        Self {
            filter,
            version,
            position: 0,
            slot: 0,
            finished: false,
        }
    }

    /// Advances to the next admitted entity.
    ///
    /// ## Errors
    /// `ConcurrentMutation` if the store's structural version no longer
    /// matches the one captured at cursor creation. The cursor is exhausted
    /// afterwards.
    pub fn next(&mut self, manager: &EcsManager) -> Option<EcsResult<Entity>> {
        if self.finished {
            return None;
        }

        let current = manager.structural_version();
        if current != self.version {
            self.finished = true;
            return Some(Err(EcsError::ConcurrentMutation {
                started_at: self.version,
                current,
            }));
        }

        loop {
            let Some(archetype) = manager.archetype_in_registry_order(self.position) else {
                self.finished = true;
                return None;
            };

            // Admission is evaluated once per archetype, on entry.
            if self.slot == 0 && !archetype.is_valid(&self.filter) {
                self.position += 1;
                continue;
            }

            match archetype.entity_at(self.slot) {
                None => {
                    self.position += 1;
                    self.slot = 0;
                }
                Some(entity) => {
                    self.slot += 1;
                    if self.filter.matches_entity_type(entity.entity_type()) {
                        return Some(Ok(entity));
                    }
                }
            }
        }
    }

    /// Drains the cursor into a vector.
    pub fn collect(mut self, manager: &EcsManager) -> EcsResult<Vec<Entity>> {
        let mut entities = Vec::new();
        while let Some(entity) = self.next(manager) {
            entities.push(entity?);
        }
        Ok(entities)
    }
}
