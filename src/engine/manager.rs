//! The root entity/component store.
//!
//! [`EcsManager`] owns everything except the shared id allocator: the
//! component arena, the archetypes (creation-order ids, plus a registry
//! vector kept sorted by size-insensitive signature order for O(log A)
//! lookup), and the global index tables mapping entity ids to their live
//! handle and `(archetype, slot)` location.
//!
//! ## Structural mutation
//!
//! Every operation that changes which entities exist, where they live, or
//! what is attached to them bumps a structural version counter. Query
//! cursors capture the counter at creation and fail fast on any mismatch.
//!
//! ## Bind/unbind mechanics
//!
//! Attaching or detaching a component recomputes the owner's target
//! signature by setting/clearing one bit in a copy of the current archetype
//! signature. If the signature changes, the entity migrates between
//! archetypes with a lockstep swap-remove move (lazily creating the target
//! archetype); otherwise only the per-slot component chain is spliced.
//! Multi-component variants validate every component first and then apply;
//! a failed validation mutates nothing.
//!
//! ## Concurrency
//!
//! The manager is single-writer. Only the id allocator is shared (with
//! deferred buffers, possibly on other threads); all other state must be
//! mutated from the thread that owns the manager.

use std::sync::Arc;

use log::{debug, trace};

use crate::engine::archetype::{archetype_pair_mut, find_or_create, Archetype};
use crate::engine::commands::CommandBuffer;
use crate::engine::component::{ComponentArena, ComponentKey, ComponentNode, ComponentData};
use crate::engine::entity::{Entity, EntityAllocator, EntityLocation};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::query::{EntityCursor, EntityFilter};
use crate::engine::signature::Signature;
use crate::engine::staging::NewEntityBuffer;
use crate::engine::types::{
    ArchetypeId, ComponentTypeId, EntityId, EntityTypeId, StructuralVersion, EMPTY_ARCHETYPE,
};


/// Root store: id lifecycle, archetype registry, component arena, and the
/// global entity index.
///
/// ## Invariants
/// * `registry` is sorted by `Signature::cmp_ignoring_size` and always
///   contains the empty-signature archetype.
/// * For every live entity, `locations[id]` names the archetype and dense
///   slot actually holding it.
/// * An entity's archetype signature equals the union of its bound
///   components' type bits.

pub struct EcsManager {
    pub(crate) shared: Arc<EntityAllocator>,
    pub(crate) components: ComponentArena,
    pub(crate) archetypes: Vec<Archetype>,
    pub(crate) registry: Vec<ArchetypeId>,
    pub(crate) live: Vec<Option<Entity>>,
    pub(crate) locations: Vec<Option<EntityLocation>>,
    pub(crate) version: StructuralVersion,
}

impl EcsManager {
    /// Creates a store rooted at the empty-signature archetype, drawing ids
    /// from `shared`.
    pub fn new(shared: Arc<EntityAllocator>) -> Self {
        Self {
            shared,
            components: ComponentArena::new(),
            archetypes: vec![Archetype::new(Signature::new())],
            registry: vec![EMPTY_ARCHETYPE],
            live: Vec::new(),
            locations: Vec::new(),
            version: 0,
        }
    }

    /// The shared allocator this store draws entity ids from.
    #[inline]
    pub fn allocator(&self) -> &Arc<EntityAllocator> {
        &self.shared
    }

    /// Monotonic count of structural mutations. Captured by query cursors.
    #[inline]
    pub fn structural_version(&self) -> StructuralVersion {
        self.version
    }

    /// Number of archetypes created so far (the empty one included).
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Archetype by stable id.
    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    /// Archetype at a position of the sorted registry walk.
    #[inline]
    pub(crate) fn archetype_in_registry_order(&self, position: usize) -> Option<&Archetype> {
        self.registry
            .get(position)
            .and_then(|&id| self.archetypes.get(id as usize))
    }

    // ── Entity lifecycle ───────────────────────────────────────────────

    /// Creates an entity of the given type in the empty-signature archetype.
    ///
    /// The id is the lowest free slot of the shared allocator and carries
    /// that slot's generation bumped by one.
    pub fn create_entity(&mut self, entity_type: EntityTypeId) -> Entity {
        let entity = self.shared.allocate(entity_type);
        self.install_entity(entity);
        trace!("created entity {entity:?}");
        entity
    }

    /// Places an already-allocated entity into the empty archetype and the
    /// index tables. Used by entity creation and by buffer replay.
    pub(crate) fn install_entity(&mut self, entity: Entity) {
        let index = entity.id() as usize;
        debug_assert!(self.live.get(index).copied().flatten().is_none());

        let slot = self.archetypes[EMPTY_ARCHETYPE as usize].push_entity(entity);
        self.ensure_index(index);
        self.live[index] = Some(entity);
        self.locations[index] = Some(EntityLocation {
            archetype: EMPTY_ARCHETYPE,
            slot,
        });
        self.version += 1;
    }

    /// Removes an entity: destructs and unbinds every attached component,
    /// swap-removes the entity from its archetype, and frees the id for
    /// reuse.
    ///
    /// ## Errors
    /// `DeadEntity` if `entity` is not the current live occupant of its id.
    pub fn remove_entity(&mut self, entity: Entity) -> EcsResult<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        let index = entity.id() as usize;
        let Some(location) = self.locations.get(index).copied().flatten() else {
            return Err(EcsError::DeadEntity(entity));
        };

        // Destruct fires once per component; the nodes then leave the arena
        // for good, since a dead owner can never rebind them.
        let archetype = &mut self.archetypes[location.archetype as usize];
        let types: Vec<ComponentTypeId> = archetype
            .signature()
            .iter_ones()
            .map(|bit| bit as ComponentTypeId)
            .collect();

        for type_id in types {
            let mut cursor = archetype.head(location.slot, type_id);
            while let Some(key) = cursor {
                cursor = self.components.get(key).and_then(|node| node.next());
                match self.components.take(key) {
                    Some(mut node) => node.run_destruct(),
                    None => debug_assert!(false, "dangling chain key {key:?}"),
                }
            }
        }

        let removal = archetype.swap_remove_entity(location.slot);
        debug_assert!(removal.removed == entity);
        if let Some(displaced) = removal.displaced {
            self.locations[displaced.id() as usize] = Some(location);
        }

        self.live[index] = None;
        self.locations[index] = None;
        self.shared.release(entity.id());
        self.version += 1;
        debug!("removed entity {entity:?}");
        Ok(())
    }

    /// Returns `true` iff `entity` is the current live occupant of its id,
    /// compared by full value (id, type, generation).
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.live.get(entity.id() as usize).copied().flatten() == Some(entity)
    }

    /// The live entity occupying an id slot, if any.
    #[inline]
    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.live.get(id as usize).copied().flatten()
    }

    /// Where an entity currently lives. `None` for stale handles.
    pub fn location_of(&self, entity: Entity) -> Option<EntityLocation> {
        if !self.is_alive(entity) {
            return None;
        }
        self.locations.get(entity.id() as usize).copied().flatten()
    }

    /// Id of the archetype currently holding an entity.
    #[inline]
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeId> {
        self.location_of(entity).map(|location| location.archetype)
    }

    // ── Components ─────────────────────────────────────────────────────

    /// Stores a new, unbound component owned by `entity` and returns its
    /// key. The node is inert until [`Self::bind`] attaches it.
    pub fn create_component<T: ComponentData>(
        &mut self,
        owner: Entity,
        type_id: ComponentTypeId,
        label: impl Into<String>,
        payload: T,
    ) -> ComponentKey {
        self.components
            .insert(ComponentNode::new(owner, type_id, label.into(), Box::new(payload)))
    }

    /// Resolves a component key.
    #[inline]
    pub fn component(&self, key: ComponentKey) -> Option<&ComponentNode> {
        self.components.get(key)
    }

    /// Mutable component resolution.
    #[inline]
    pub fn component_mut(&mut self, key: ComponentKey) -> Option<&mut ComponentNode> {
        self.components.get_mut(key)
    }

    /// Attaches a component to its owner, migrating the owner to the
    /// archetype with the component's type bit set if it is the first of its
    /// type.
    ///
    /// ## Errors
    /// * `UnknownComponent`: key does not resolve.
    /// * `AlreadyBound`: component is already attached.
    /// * `DeadEntity`: owner is not live.
    pub fn bind(&mut self, key: ComponentKey) -> EcsResult<()> {
        self.validate_bind(key)?;
        self.apply_bind(key);
        self.version += 1;
        Ok(())
    }

    /// Detaches a component, migrating the owner to the archetype without
    /// the type bit when the last component of that type leaves.
    ///
    /// ## Errors
    /// * `UnknownComponent`: key does not resolve.
    /// * `AlreadyUnbound`: component is not attached.
    /// * `DeadEntity`: owner is not live.
    pub fn unbind(&mut self, key: ComponentKey) -> EcsResult<()> {
        self.validate_unbind(key)?;
        self.apply_unbind(key);
        self.version += 1;
        Ok(())
    }

    /// Binds several components of one owner atomically: every component is
    /// validated before any is attached.
    ///
    /// ## Errors
    /// `InvalidArgument` on an empty slice or duplicate keys,
    /// `OwnerMismatch` if the components disagree on their owner, plus the
    /// per-component errors of [`Self::bind`]. On error nothing is mutated.
    pub fn bind_many(&mut self, keys: &[ComponentKey]) -> EcsResult<()> {
        let expected = self.validate_many(keys, Self::validate_bind)?;
        for &key in keys {
            self.apply_bind(key);
        }
        self.version += 1;
        trace!("bound {} components of {expected:?}", keys.len());
        Ok(())
    }

    /// Unbinds several components of one owner atomically. Same error
    /// contract as [`Self::bind_many`].
    pub fn unbind_many(&mut self, keys: &[ComponentKey]) -> EcsResult<()> {
        let expected = self.validate_many(keys, Self::validate_unbind)?;
        for &key in keys {
            self.apply_unbind(key);
        }
        self.version += 1;
        trace!("unbound {} components of {expected:?}", keys.len());
        Ok(())
    }

    /// First-bound component of a type on an entity (the chain head).
    pub fn get_component(&self, entity: Entity, type_id: ComponentTypeId) -> Option<ComponentKey> {
        let location = self.location_of(entity)?;
        self.archetypes[location.archetype as usize].head(location.slot, type_id)
    }

    /// Component of a type on an entity carrying a specific label.
    pub fn get_component_labeled(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
        label: &str,
    ) -> Option<ComponentKey> {
        let mut cursor = self.get_component(entity, type_id);
        while let Some(key) = cursor {
            let node = self.components.get(key)?;
            if node.label() == label {
                return Some(key);
            }
            cursor = node.next();
        }
        None
    }

    /// All components of a type on an entity, in bind order.
    pub fn components_of(&self, entity: Entity, type_id: ComponentTypeId) -> Vec<ComponentKey> {
        let mut keys = Vec::new();
        let mut cursor = self.get_component(entity, type_id);
        while let Some(key) = cursor {
            keys.push(key);
            cursor = self.components.get(key).and_then(|node| node.next());
        }
        keys
    }

    /// Returns `true` if the entity has at least one component of the type.
    #[inline]
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.get_component(entity, type_id).is_some()
    }

    /// Number of components of a type attached to an entity.
    pub fn component_count(&self, entity: Entity, type_id: ComponentTypeId) -> usize {
        let mut count = 0;
        let mut cursor = self.get_component(entity, type_id);
        while let Some(key) = cursor {
            count += 1;
            cursor = self.components.get(key).and_then(|node| node.next());
        }
        count
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Starts a lazy, fail-fast traversal of the entities admitted by
    /// `filter`. See [`EntityCursor`] for semantics.
    pub fn entities<F: EntityFilter>(&self, filter: F) -> EntityCursor<F> {
        EntityCursor::new(filter, self.version)
    }

    /// Push-style query: invokes `action` for every admitted entity.
    ///
    /// ## Errors
    /// `ConcurrentMutation` if the store is structurally mutated while the
    /// traversal runs.
    pub fn for_each<F: EntityFilter>(
        &self,
        filter: F,
        mut action: impl FnMut(Entity),
    ) -> EcsResult<()> {
        let mut cursor = self.entities(filter);
        while let Some(entity) = cursor.next(self) {
            action(entity?);
        }
        Ok(())
    }

    /// Collects every admitted entity into a vector.
    pub fn collect_entities<F: EntityFilter>(&self, filter: F) -> EcsResult<Vec<Entity>> {
        self.entities(filter).collect(self)
    }

    // ── Buffers ────────────────────────────────────────────────────────

    /// Creates a command buffer drawing ids from this store's allocator.
    pub fn create_command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(Arc::clone(&self.shared))
    }

    /// Creates an isolated new-entities buffer drawing ids from this
    /// store's allocator.
    pub fn create_new_entities_buffer(&self) -> NewEntityBuffer {
        NewEntityBuffer::new(Arc::clone(&self.shared))
    }

    // ── Internals ──────────────────────────────────────────────────────

    pub(crate) fn ensure_index(&mut self, index: usize) {
        if self.live.len() <= index {
            self.live.resize(index + 1, None);
            self.locations.resize(index + 1, None);
        }
    }

    fn validate_bind(&self, key: ComponentKey) -> EcsResult<Entity> {
        let node = self.components.get(key).ok_or(EcsError::UnknownComponent(key))?;
        if node.is_bound() {
            return Err(EcsError::AlreadyBound(key));
        }
        let owner = node.owner();
        if !self.is_alive(owner) {
            return Err(EcsError::DeadEntity(owner));
        }
        Ok(owner)
    }

    fn validate_unbind(&self, key: ComponentKey) -> EcsResult<Entity> {
        let node = self.components.get(key).ok_or(EcsError::UnknownComponent(key))?;
        if !node.is_bound() {
            return Err(EcsError::AlreadyUnbound(key));
        }
        let owner = node.owner();
        if !self.is_alive(owner) {
            return Err(EcsError::DeadEntity(owner));
        }
        Ok(owner)
    }

    /// Shared validation of the multi-component entry points: non-empty, no
    /// duplicate keys, one owner, every component individually valid.
    fn validate_many(
        &self,
        keys: &[ComponentKey],
        validate: impl Fn(&Self, ComponentKey) -> EcsResult<Entity>,
    ) -> EcsResult<Entity> {
        if keys.is_empty() {
            return Err(EcsError::InvalidArgument("empty component slice"));
        }

        let expected = validate(self, keys[0])?;
        for (position, &key) in keys.iter().enumerate().skip(1) {
            if keys[..position].contains(&key) {
                return Err(EcsError::InvalidArgument("duplicate component key in batch"));
            }
            let owner = validate(self, key)?;
            if owner != expected {
                return Err(EcsError::OwnerMismatch {
                    expected,
                    actual: owner,
                });
            }
        }
        Ok(expected)
    }

    pub(crate) fn find_or_create_archetype(&mut self, signature: Signature) -> ArchetypeId {
        find_or_create(&mut self.archetypes, &mut self.registry, signature)
    }

    /// Attaches a pre-validated component, migrating its owner if this is
    /// the first component of its type.
    fn apply_bind(&mut self, key: ComponentKey) {
        let Some(node) = self.components.get(key) else {
            debug_assert!(false, "apply_bind on dangling key {key:?}");
            return;
        };
        let owner = node.owner();
        let type_id = node.type_id();
        let Some(location) = self.locations.get(owner.id() as usize).copied().flatten() else {
            debug_assert!(false, "apply_bind on unlocated owner {owner:?}");
            return;
        };

        let source = location.archetype;
        if self.archetypes[source as usize].signature().has(type_id as usize) {
            // Owner already has this type; splice only, no migration.
            self.archetypes[source as usize].add_component(location.slot, key, &mut self.components);
            return;
        }

        let mut target = self.archetypes[source as usize].signature().clone();
        target.set(type_id as usize);
        let destination = self.find_or_create_archetype(target);

        let (source_archetype, destination_archetype) =
            archetype_pair_mut(&mut self.archetypes, source, destination);
        let migration = source_archetype.move_entity_to(location.slot, destination_archetype);
        debug_assert!(migration.moved == owner);

        self.locations[owner.id() as usize] = Some(EntityLocation {
            archetype: destination,
            slot: migration.new_slot,
        });
        if let Some(displaced) = migration.displaced {
            self.locations[displaced.id() as usize] = Some(location);
        }

        self.archetypes[destination as usize].add_component(
            migration.new_slot,
            key,
            &mut self.components,
        );
        trace!("entity {owner:?} migrated to archetype {destination} (bind type {type_id})");
    }

    /// Detaches a pre-validated component, migrating its owner if the last
    /// component of that type left.
    fn apply_unbind(&mut self, key: ComponentKey) {
        let Some(node) = self.components.get(key) else {
            debug_assert!(false, "apply_unbind on dangling key {key:?}");
            return;
        };
        let owner = node.owner();
        let type_id = node.type_id();
        let Some(location) = self.locations.get(owner.id() as usize).copied().flatten() else {
            debug_assert!(false, "apply_unbind on unlocated owner {owner:?}");
            return;
        };

        let source = location.archetype;
        self.archetypes[source as usize].remove_component(location.slot, key, &mut self.components);

        if self.archetypes[source as usize]
            .head(location.slot, type_id)
            .is_some()
        {
            // Other components of this type remain; signature is unchanged.
            return;
        }

        let mut target = self.archetypes[source as usize].signature().clone();
        target.clear(type_id as usize);
        let destination = self.find_or_create_archetype(target);

        let (source_archetype, destination_archetype) =
            archetype_pair_mut(&mut self.archetypes, source, destination);
        let migration = source_archetype.move_entity_to(location.slot, destination_archetype);
        debug_assert!(migration.moved == owner);

        self.locations[owner.id() as usize] = Some(EntityLocation {
            archetype: destination,
            slot: migration.new_slot,
        });
        if let Some(displaced) = migration.displaced {
            self.locations[displaced.id() as usize] = Some(location);
        }
        trace!("entity {owner:?} migrated to archetype {destination} (unbind type {type_id})");
    }
}
