//! Isolated staging store merged wholesale into the manager on flush.
//!
//! A [`NewEntityBuffer`] is a manager-shaped sub-store: its own component
//! arena, its own archetype registry rooted at the empty signature, its own
//! index tables. The only thing it shares with the manager (and sibling
//! buffers) is the id allocator, so entities built here never collide with
//! anything else and can be prepared off to the side, possibly on another
//! thread.
//!
//! Because the buffer holds a sparse sample of the global id space, its
//! index tables are hash maps rather than the manager's dense vectors.
//!
//! ## Flush
//!
//! [`EcsManager::flush_new_entities`] consumes the buffer by value. Its
//! component nodes move into the manager's arena with chain links remapped,
//! and the two sorted archetype registries are walked in lockstep
//! (merge-join by size-insensitive signature order): value-equal archetypes
//! merge, unmatched buffer archetypes become new manager archetypes at the
//! probe position.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::engine::archetype::{archetype_pair_mut, find_or_create, Archetype};
use crate::engine::component::{ComponentArena, ComponentData, ComponentKey, ComponentNode};
use crate::engine::entity::{Entity, EntityAllocator, EntityLocation};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::manager::EcsManager;
use crate::engine::signature::Signature;
use crate::engine::types::{ArchetypeId, ComponentTypeId, EntityId, EntityTypeId, EMPTY_ARCHETYPE};


/// Self-contained entity/component store whose contents are destined for a
/// manager.
///
/// ## Invariants
/// * Every entity referenced by an operation must have been created through
///   this buffer; anything else fails with `ForeignEntity`.
/// * Shares only the id allocator with the outside world.

pub struct NewEntityBuffer {
    shared: Arc<EntityAllocator>,
    components: ComponentArena,
    archetypes: Vec<Archetype>,
    registry: Vec<ArchetypeId>,
    /// Ids ever allocated through this buffer; distinguishes a dead local
    /// entity from a foreign one.
    spawned: Signature,
    live: HashMap<EntityId, Entity>,
    locations: HashMap<EntityId, EntityLocation>,
}

impl NewEntityBuffer {
    pub(crate) fn new(shared: Arc<EntityAllocator>) -> Self {
        Self {
            shared,
            components: ComponentArena::new(),
            archetypes: vec![Archetype::new(Signature::new())],
            registry: vec![EMPTY_ARCHETYPE],
            spawned: Signature::new(),
            live: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Number of live entities staged in the buffer.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no entity is staged.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Creates a staged entity in the buffer's empty-signature archetype.
    /// The id comes from the shared allocator and is globally unique.
    pub fn create_entity(&mut self, entity_type: EntityTypeId) -> Entity {
        let entity = self.shared.allocate(entity_type);
        self.spawned.set(entity.id() as usize);

        let slot = self.archetypes[EMPTY_ARCHETYPE as usize].push_entity(entity);
        self.live.insert(entity.id(), entity);
        self.locations.insert(
            entity.id(),
            EntityLocation {
                archetype: EMPTY_ARCHETYPE,
                slot,
            },
        );
        entity
    }

    /// Removes a staged entity, destructing its components and returning
    /// its id to the shared pool.
    ///
    /// ## Errors
    /// `ForeignEntity` if the entity was not created through this buffer,
    /// `DeadEntity` if it was but has already been removed.
    pub fn remove_entity(&mut self, entity: Entity) -> EcsResult<()> {
        self.check_local(entity)?;
        let Some(location) = self.locations.get(&entity.id()).copied() else {
            return Err(EcsError::DeadEntity(entity));
        };

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
            self.locations.insert(displaced.id(), location);
        }

        self.live.remove(&entity.id());
        self.locations.remove(&entity.id());
        self.shared.release(entity.id());
        Ok(())
    }

    /// Returns `true` iff `entity` is currently staged in this buffer.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.live.get(&entity.id()) == Some(&entity)
    }

    /// Stores a new, unbound component owned by a staged entity.
    ///
    /// ## Errors
    /// `ForeignEntity` / `DeadEntity` if the owner is not staged here.
    pub fn create_component<T: ComponentData>(
        &mut self,
        owner: Entity,
        type_id: ComponentTypeId,
        label: impl Into<String>,
        payload: T,
    ) -> EcsResult<ComponentKey> {
        self.check_local(owner)?;
        if !self.is_alive(owner) {
            return Err(EcsError::DeadEntity(owner));
        }
        Ok(self
            .components
            .insert(ComponentNode::new(owner, type_id, label.into(), Box::new(payload))))
    }

    /// Resolves a buffer-local component key.
    #[inline]
    pub fn component(&self, key: ComponentKey) -> Option<&ComponentNode> {
        self.components.get(key)
    }

    /// Mutable buffer-local component resolution.
    #[inline]
    pub fn component_mut(&mut self, key: ComponentKey) -> Option<&mut ComponentNode> {
        self.components.get_mut(key)
    }

    /// Attaches a staged component to its staged owner. Same migration
    /// mechanics and error contract as the manager's bind, plus
    /// `ForeignEntity` for owners from outside the buffer.
    pub fn bind(&mut self, key: ComponentKey) -> EcsResult<()> {
        let node = self.components.get(key).ok_or(EcsError::UnknownComponent(key))?;
        if node.is_bound() {
            return Err(EcsError::AlreadyBound(key));
        }
        let owner = node.owner();
        self.check_local(owner)?;
        if !self.is_alive(owner) {
            return Err(EcsError::DeadEntity(owner));
        }
        self.apply_bind(key);
        Ok(())
    }

    /// Detaches a staged component. Same contract as the manager's unbind,
    /// plus `ForeignEntity` for owners from outside the buffer.
    pub fn unbind(&mut self, key: ComponentKey) -> EcsResult<()> {
        let node = self.components.get(key).ok_or(EcsError::UnknownComponent(key))?;
        if !node.is_bound() {
            return Err(EcsError::AlreadyUnbound(key));
        }
        let owner = node.owner();
        self.check_local(owner)?;
        if !self.is_alive(owner) {
            return Err(EcsError::DeadEntity(owner));
        }
        self.apply_unbind(key);
        Ok(())
    }

    /// First-bound component of a type on a staged entity.
    pub fn get_component(&self, entity: Entity, type_id: ComponentTypeId) -> Option<ComponentKey> {
        if !self.is_alive(entity) {
            return None;
        }
        let location = self.locations.get(&entity.id()).copied()?;
        self.archetypes[location.archetype as usize].head(location.slot, type_id)
    }

    /// Returns `true` if the staged entity has a component of the type.
    #[inline]
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.get_component(entity, type_id).is_some()
    }

    /// Number of same-type components on a staged entity.
    pub fn component_count(&self, entity: Entity, type_id: ComponentTypeId) -> usize {
        let mut count = 0;
        let mut cursor = self.get_component(entity, type_id);
        while let Some(key) = cursor {
            count += 1;
            cursor = self.components.get(key).and_then(|node| node.next());
        }
        count
    }

    fn check_local(&self, entity: Entity) -> EcsResult<()> {
        if self.spawned.has(entity.id() as usize) {
            Ok(())
        } else {
            Err(EcsError::ForeignEntity(entity))
        }
    }

    fn apply_bind(&mut self, key: ComponentKey) {
        let Some(node) = self.components.get(key) else {
            debug_assert!(false, "apply_bind on dangling key {key:?}");
            return;
        };
        let owner = node.owner();
        let type_id = node.type_id();
        let Some(location) = self.locations.get(&owner.id()).copied() else {
            debug_assert!(false, "apply_bind on unlocated owner {owner:?}");
            return;
        };

        let source = location.archetype;
        if self.archetypes[source as usize].signature().has(type_id as usize) {
            self.archetypes[source as usize].add_component(location.slot, key, &mut self.components);
            return;
        }

        let mut target = self.archetypes[source as usize].signature().clone();
        target.set(type_id as usize);
        let destination = find_or_create(&mut self.archetypes, &mut self.registry, target);

        let (source_archetype, destination_archetype) =
            archetype_pair_mut(&mut self.archetypes, source, destination);
        let migration = source_archetype.move_entity_to(location.slot, destination_archetype);
        debug_assert!(migration.moved == owner);

        self.locations.insert(
            owner.id(),
            EntityLocation {
                archetype: destination,
                slot: migration.new_slot,
            },
        );
        if let Some(displaced) = migration.displaced {
            self.locations.insert(displaced.id(), location);
        }

        self.archetypes[destination as usize].add_component(
            migration.new_slot,
            key,
            &mut self.components,
        );
    }

    fn apply_unbind(&mut self, key: ComponentKey) {
        let Some(node) = self.components.get(key) else {
            debug_assert!(false, "apply_unbind on dangling key {key:?}");
            return;
        };
        let owner = node.owner();
        let type_id = node.type_id();
        let Some(location) = self.locations.get(&owner.id()).copied() else {
            debug_assert!(false, "apply_unbind on unlocated owner {owner:?}");
            return;
        };

        let source = location.archetype;
        self.archetypes[source as usize].remove_component(location.slot, key, &mut self.components);

        if self.archetypes[source as usize]
            .head(location.slot, type_id)
            .is_some()
        {
            return;
        }

        let mut target = self.archetypes[source as usize].signature().clone();
        target.clear(type_id as usize);
        let destination = find_or_create(&mut self.archetypes, &mut self.registry, target);

        let (source_archetype, destination_archetype) =
            archetype_pair_mut(&mut self.archetypes, source, destination);
        let migration = source_archetype.move_entity_to(location.slot, destination_archetype);
        debug_assert!(migration.moved == owner);

        self.locations.insert(
            owner.id(),
            EntityLocation {
                archetype: destination,
                slot: migration.new_slot,
            },
        );
        if let Some(displaced) = migration.displaced {
            self.locations.insert(displaced.id(), location);
        }
    }
}

impl EcsManager {
    /// Merges a staged buffer into this store, consuming it.
    ///
    /// Component nodes migrate into the manager's arena (chain links
    /// remapped), then the buffer's sorted registry is merge-joined against
    /// the manager's: value-equal archetypes merge, new signatures get a
    /// lazily created archetype. Buffer entities keep their handles; only
    /// their locations change.
    pub fn flush_new_entities(&mut self, buffer: NewEntityBuffer) {
        let NewEntityBuffer {
            shared,
            mut components,
            mut archetypes,
            registry,
            live,
            ..
        } = buffer;
        debug_assert!(Arc::ptr_eq(&shared, &self.shared));

        let staged_entities = live.len();

        // Move the arena across, remembering old keys and old links so the
        // chains can be rewritten once the remap table is complete.
        let mut remap: HashMap<ComponentKey, ComponentKey> = HashMap::new();
        let mut links: Vec<(ComponentKey, Option<ComponentKey>)> = Vec::new();
        for (old_key, node) in components.drain() {
            let old_next = node.next();
            let new_key = self.components.insert(node);
            remap.insert(old_key, new_key);
            links.push((new_key, old_next));
        }
        for (new_key, old_next) in links {
            if let Some(node) = self.components.get_mut(new_key) {
                node.set_next(old_next.and_then(|key| remap.get(&key).copied()));
            }
        }
        for archetype in &mut archetypes {
            archetype.remap_keys(&remap);
        }

        // Lockstep walk of the two sorted registries. The buffer registry is
        // ascending, so the manager-side probe position never rewinds.
        let mut position = 0;
        for buffer_id in registry {
            let bucket = &mut archetypes[buffer_id as usize];
            if bucket.is_empty() {
                continue;
            }

            let destination = loop {
                let Some(&candidate) = self.registry.get(position) else {
                    break self.append_archetype_at(position, bucket.signature().clone());
                };
                match self.archetypes[candidate as usize]
                    .signature()
                    .cmp_ignoring_size(bucket.signature())
                {
                    std::cmp::Ordering::Less => position += 1,
                    std::cmp::Ordering::Equal => break candidate,
                    std::cmp::Ordering::Greater => {
                        break self.append_archetype_at(position, bucket.signature().clone());
                    }
                }
            };

            let mut moves: Vec<(Entity, usize)> = Vec::new();
            self.archetypes[destination as usize]
                .merge(bucket, |entity, slot| moves.push((entity, slot)));
            for (entity, slot) in moves {
                let index = entity.id() as usize;
                self.ensure_index(index);
                self.live[index] = Some(entity);
                self.locations[index] = Some(EntityLocation {
                    archetype: destination,
                    slot,
                });
            }
        }

        self.version += 1;
        debug!(
            "flushed new-entities buffer: {staged_entities} entities, {} components",
            remap.len()
        );
    }

    /// Creates an archetype for a signature known to be absent, splicing its
    /// id into the sorted registry at `position`.
    fn append_archetype_at(&mut self, position: usize, signature: Signature) -> ArchetypeId {
        let id = self.archetypes.len() as ArchetypeId;
        self.archetypes.push(Archetype::new(signature));
        self.registry.insert(position, id);
        id
    }
}
