//! Dense archetype buckets.
//!
//! An [`Archetype`] holds every entity sharing one exact component-type
//! signature. Storage is dense and parallel: one entity array, one list-head
//! column per component type in the signature, and a per-entity-type
//! population counter. All removal is swap-remove, performed in lockstep
//! across every column so slot indices stay aligned.
//!
//! ## Invariants
//! * Every column has exactly `entities.len()` cells.
//! * An entity in `entities` has chain heads only for types set in the
//!   signature, and the union of its non-empty chains equals the signature.
//! * The displaced entity reported by a swap-remove must be re-indexed by
//!   the owning store; the archetype has no access to the global tables.
//!
//! ## Registry helpers
//! Stores keep their archetypes in creation order (stable ids) plus a
//! registry vector sorted by the size-insensitive signature order.
//! [`find_or_create`] performs the binary search/insert both the manager and
//! the new-entities buffer rely on.

use std::collections::HashMap;

use crate::engine::component::{ComponentArena, ComponentKey};
use crate::engine::entity::Entity;
use crate::engine::query::EntityFilter;
use crate::engine::signature::Signature;
use crate::engine::types::{ArchetypeId, ComponentTypeId, EntityTypeId};


/// Outcome of a lockstep swap-remove.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SwapRemoval {
    /// The entity taken out of the archetype.
    pub removed: Entity,
    /// The previously-last entity now occupying the vacated slot, if the
    /// removed entity was not last.
    pub displaced: Option<Entity>,
}

/// Outcome of moving one entity (and its chain heads) to another archetype.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Migration {
    /// The entity that moved.
    pub moved: Entity,
    /// Its dense slot in the destination archetype.
    pub new_slot: usize,
    /// Entity displaced into the vacated source slot, if any.
    pub displaced: Option<Entity>,
}

/// Bucket of entities sharing one exact component signature.
pub struct Archetype {
    signature: Signature,
    entities: Vec<Entity>,
    columns: HashMap<ComponentTypeId, Vec<Option<ComponentKey>>>,
    populations: Vec<u32>,
}

impl Archetype {
    /// Creates an empty archetype for `signature`, with one head column per
    /// set bit.
    pub fn new(signature: Signature) -> Self {
        let columns = signature
            .iter_ones()
            .map(|bit| (bit as ComponentTypeId, Vec::new()))
            .collect();

        Self {
            signature,
            entities: Vec::new(),
            columns,
            populations: Vec::new(),
        }
    }

    /// The component-type signature identifying this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of entities in the bucket.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the bucket holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity at a dense slot.
    #[inline]
    pub fn entity_at(&self, slot: usize) -> Option<Entity> {
        self.entities.get(slot).copied()
    }

    /// Live count of entities of a given type.
    #[inline]
    pub fn population(&self, entity_type: EntityTypeId) -> u32 {
        self.populations.get(entity_type as usize).copied().unwrap_or(0)
    }

    /// Appends an entity, extending every column with an empty chain.
    /// Returns the new dense slot.
    pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
        let slot = self.entities.len();
        self.entities.push(entity);
        for column in self.columns.values_mut() {
            column.push(None);
        }

        let type_index = entity.entity_type() as usize;
        if self.populations.len() <= type_index {
            self.populations.resize(type_index + 1, 0);
        }
        self.populations[type_index] += 1;

        slot
    }

    /// Chain head for `(slot, type)`, if the type is in the signature and
    /// the chain is non-empty.
    #[inline]
    pub(crate) fn head(&self, slot: usize, type_id: ComponentTypeId) -> Option<ComponentKey> {
        self.columns.get(&type_id).and_then(|column| column.get(slot).copied().flatten())
    }

    /// Overwrites the chain head for `(slot, type)`. The column must exist.
    pub(crate) fn set_head(&mut self, slot: usize, type_id: ComponentTypeId, head: Option<ComponentKey>) {
        if let Some(cell) = self.columns.get_mut(&type_id).and_then(|column| column.get_mut(slot)) {
            *cell = head;
        } else {
            debug_assert!(false, "set_head on missing column {type_id} or slot {slot}");
        }
    }

    /// Appends a component to the tail of its `(slot, type)` chain and marks
    /// it bound.
    ///
    /// ## Invariants
    /// * The node must be unbound and its type present in the signature.
    /// * Appending at the tail preserves bind order, so the chain head is
    ///   always the earliest-bound surviving component of that type.
    pub(crate) fn add_component(&mut self, slot: usize, key: ComponentKey, arena: &mut ComponentArena) {
        let Some(node) = arena.get_mut(key) else {
            debug_assert!(false, "add_component with dangling key {key:?}");
            return;
        };
        let type_id = node.type_id();
        node.set_next(None);
        node.set_bound(true);

        match self.head(slot, type_id) {
            None => self.set_head(slot, type_id, Some(key)),
            Some(head) => {
                let mut tail = head;
                while let Some(next) = arena.get(tail).and_then(|node| node.next()) {
                    tail = next;
                }
                if let Some(tail_node) = arena.get_mut(tail) {
                    tail_node.set_next(Some(key));
                }
            }
        }
    }

    /// Splices a component out of its `(slot, type)` chain and clears its
    /// bound flag and link.
    ///
    /// The caller guarantees the component is on the chain; the archetype
    /// performs no existence check beyond a debug assertion.
    pub(crate) fn remove_component(&mut self, slot: usize, key: ComponentKey, arena: &mut ComponentArena) {
        let Some(type_id) = arena.get(key).map(|node| node.type_id()) else {
            debug_assert!(false, "remove_component with dangling key {key:?}");
            return;
        };
        let successor = arena.get(key).and_then(|node| node.next());

        match self.head(slot, type_id) {
            Some(head) if head == key => {
                self.set_head(slot, type_id, successor);
            }
            Some(head) => {
                let mut cursor = head;
                loop {
                    let next = arena.get(cursor).and_then(|node| node.next());
                    match next {
                        Some(next) if next == key => {
                            if let Some(pred) = arena.get_mut(cursor) {
                                pred.set_next(successor);
                            }
                            break;
                        }
                        Some(next) => cursor = next,
                        None => {
                            debug_assert!(false, "component {key:?} not on its chain");
                            break;
                        }
                    }
                }
            }
            None => debug_assert!(false, "remove_component on empty chain"),
        }

        if let Some(node) = arena.get_mut(key) {
            node.set_next(None);
            node.set_bound(false);
        }
    }

    /// Swap-removes the entity at `slot` from every parallel array.
    ///
    /// The owning store must re-index the displaced entity (if any) and has
    /// already detached or migrated the removed entity's chains.
    pub(crate) fn swap_remove_entity(&mut self, slot: usize) -> SwapRemoval {
        let removed = self.entities.swap_remove(slot);
        for column in self.columns.values_mut() {
            column.swap_remove(slot);
        }

        let type_index = removed.entity_type() as usize;
        if let Some(count) = self.populations.get_mut(type_index) {
            *count = count.saturating_sub(1);
        }

        SwapRemoval {
            removed,
            displaced: self.entities.get(slot).copied(),
        }
    }

    /// Moves the entity at `slot`, with all its chain heads, into `dest`.
    ///
    /// Columns absent from `dest` must already hold an empty chain at `slot`
    /// (an unbind vacates the chain before migrating); columns present only
    /// in `dest` start empty.
    pub(crate) fn move_entity_to(&mut self, slot: usize, dest: &mut Archetype) -> Migration {
        let moved = self.entities[slot];
        let new_slot = dest.push_entity(moved);

        for (&type_id, column) in &self.columns {
            let head = column[slot];
            match dest.columns.get_mut(&type_id) {
                Some(dest_column) => dest_column[new_slot] = head,
                None => debug_assert!(
                    head.is_none(),
                    "migrating a live chain of type {type_id} into an archetype without it"
                ),
            }
        }

        let removal = self.swap_remove_entity(slot);
        Migration {
            moved,
            new_slot,
            displaced: removal.displaced,
        }
    }

    /// Appends all of `other`'s entities and chain heads onto `self`,
    /// reporting each entity's new slot through `on_moved`.
    ///
    /// Only used when flushing a new-entities buffer, after the buffer's
    /// chain keys have been remapped into the destination arena. Both
    /// archetypes must have value-equal signatures.
    pub(crate) fn merge(&mut self, other: &mut Archetype, mut on_moved: impl FnMut(Entity, usize)) {
        debug_assert!(self.signature.eq_ignoring_size(&other.signature));

        for source_slot in 0..other.entities.len() {
            let entity = other.entities[source_slot];
            let slot = self.push_entity(entity);
            for (&type_id, column) in &other.columns {
                if let Some(dest_column) = self.columns.get_mut(&type_id) {
                    dest_column[slot] = column[source_slot];
                }
            }
            on_moved(entity, slot);
        }

        other.entities.clear();
        for column in other.columns.values_mut() {
            column.clear();
        }
        other.populations.clear();
    }

    /// Rewrites every chain head through a key remap table. Used when a
    /// buffer's arena is migrated into the manager's arena.
    pub(crate) fn remap_keys(&mut self, map: &HashMap<ComponentKey, ComponentKey>) {
        for column in self.columns.values_mut() {
            for cell in column.iter_mut() {
                if let Some(key) = *cell {
                    debug_assert!(map.contains_key(&key));
                    *cell = map.get(&key).copied();
                }
            }
        }
    }

    /// Query admission test: the filter must accept the component signature
    /// (a defensive copy) **and** at least one entity type with live
    /// population.
    pub fn is_valid<F: EntityFilter + ?Sized>(&self, filter: &F) -> bool {
        if !filter.matches_component_types(self.signature.clone()) {
            return false;
        }
        self.populations
            .iter()
            .enumerate()
            .any(|(entity_type, &count)| {
                count > 0 && filter.matches_entity_type(entity_type as EntityTypeId)
            })
    }
}

/// Binary-searches `registry` (sorted by size-insensitive signature order)
/// for `signature`, lazily creating the archetype on a miss.
///
/// Archetype ids are creation-order indices into `archetypes` and stay
/// stable; only the registry vector shifts on insert.
pub(crate) fn find_or_create(
    archetypes: &mut Vec<Archetype>,
    registry: &mut Vec<ArchetypeId>,
    signature: Signature,
) -> ArchetypeId {
    let probe = registry.binary_search_by(|&id| {
        archetypes[id as usize].signature().cmp_ignoring_size(&signature)
    });

    match probe {
        Ok(position) => registry[position],
        Err(position) => {
            let id = archetypes.len() as ArchetypeId;
            archetypes.push(Archetype::new(signature));
            registry.insert(position, id);
            id
        }
    }
}

/// Returns mutable references to two distinct archetypes.
///
/// ## Panics
/// Panics if `a == b`.
pub(crate) fn archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    assert!(a != b);

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let (head, tail) = archetypes.split_at_mut(high as usize);

    let left = &mut head[low as usize];
    let right = &mut tail[0];

    if a < b { (left, right) } else { (right, left) }
}
