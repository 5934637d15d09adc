use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ecs_store::engine::types::EMPTY_ARCHETYPE;
use ecs_store::{
    ComponentData, ComponentTypeId, EcsError, EcsManager, Entity, EntityAllocator,
};

const AGENT: u32 = 0;
const HEALTH: ComponentTypeId = 5;
const POSITION: ComponentTypeId = 9;

#[derive(Clone, Copy)]
struct Health(pub f32);
impl ComponentData for Health {}

#[derive(Clone, Copy)]
struct Position(pub f32, pub f32);
impl ComponentData for Position {}

struct Tracked {
    hits: Arc<AtomicUsize>,
}

impl ComponentData for Tracked {
    fn destruct(&mut self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

fn new_manager() -> EcsManager {
    EcsManager::new(EntityAllocator::shared())
}

/// The archetype signature of a live entity must equal the union of its
/// bound components' type bits.
fn assert_signature_matches(manager: &EcsManager, entity: Entity, types: &[ComponentTypeId]) {
    let archetype = manager
        .archetype(manager.archetype_of(entity).unwrap())
        .unwrap();
    let mut bits: Vec<usize> = archetype.signature().iter_ones().collect();
    bits.sort_unstable();
    let mut expected: Vec<usize> = types.iter().map(|&t| t as usize).collect();
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(bits, expected);
}

#[test]
fn created_entities_are_alive_until_removed() {
    let mut manager = new_manager();
    let a = manager.create_entity(AGENT);
    let b = manager.create_entity(AGENT);

    assert!(manager.is_alive(a));
    assert!(manager.is_alive(b));
    assert_ne!(a, b);
    assert_eq!(manager.get_entity(a.id()), Some(a));

    manager.remove_entity(a).unwrap();
    assert!(!manager.is_alive(a));
    assert_eq!(manager.get_entity(a.id()), None);
    assert!(manager.is_alive(b));

    assert_eq!(
        manager.remove_entity(a),
        Err(EcsError::DeadEntity(a)),
        "double removal must fail"
    );
}

#[test]
fn id_reuse_bumps_generation_and_invalidates_stale_handles() {
    let mut manager = new_manager();
    let first = manager.create_entity(AGENT);
    manager.remove_entity(first).unwrap();

    let second = manager.create_entity(AGENT);
    assert_eq!(second.id(), first.id(), "lowest free id is reused");
    assert_eq!(second.generation(), first.generation() + 1);

    assert!(manager.is_alive(second));
    assert!(!manager.is_alive(first), "stale handle must not pass");
    assert!(manager.remove_entity(first).is_err());
}

#[test]
fn entities_start_in_the_empty_archetype() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    assert_eq!(manager.archetype_of(entity), Some(EMPTY_ARCHETYPE));
    assert_signature_matches(&manager, entity, &[]);
}

#[test]
fn bind_migrates_and_unbind_round_trips() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let origin = manager.archetype_of(entity).unwrap();

    let key = manager.create_component(entity, HEALTH, "", Health(10.0));
    assert!(!manager.component(key).unwrap().is_bound());

    manager.bind(key).unwrap();
    let bound_archetype = manager.archetype_of(entity).unwrap();
    assert_ne!(bound_archetype, origin);
    assert!(manager.component(key).unwrap().is_bound());
    assert_signature_matches(&manager, entity, &[HEALTH]);

    manager.unbind(key).unwrap();
    assert_eq!(manager.archetype_of(entity), Some(origin));
    assert!(!manager.component(key).unwrap().is_bound());
    assert_signature_matches(&manager, entity, &[]);

    // The slot reported for the entity still holds it.
    let location = manager.location_of(entity).unwrap();
    let archetype = manager.archetype(location.archetype).unwrap();
    assert_eq!(archetype.entity_at(location.slot), Some(entity));
}

#[test]
fn rebinding_after_round_trip_works() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let key = manager.create_component(entity, HEALTH, "", Health(1.0));

    manager.bind(key).unwrap();
    manager.unbind(key).unwrap();
    manager.bind(key).unwrap();
    assert_signature_matches(&manager, entity, &[HEALTH]);
}

#[test]
fn double_bind_and_double_unbind_fail() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let key = manager.create_component(entity, HEALTH, "", Health(1.0));

    manager.bind(key).unwrap();
    assert_eq!(manager.bind(key), Err(EcsError::AlreadyBound(key)));

    manager.unbind(key).unwrap();
    assert_eq!(manager.unbind(key), Err(EcsError::AlreadyUnbound(key)));
}

#[test]
fn binding_same_type_twice_does_not_migrate() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);

    let first = manager.create_component(entity, HEALTH, "", Health(1.0));
    manager.bind(first).unwrap();
    let archetype = manager.archetype_of(entity).unwrap();

    let second = manager.create_component(entity, HEALTH, "b", Health(2.0));
    manager.bind(second).unwrap();
    assert_eq!(manager.archetype_of(entity), Some(archetype));
    assert_eq!(manager.component_count(entity, HEALTH), 2);
}

#[test]
fn chain_scenario_first_bound_stays_head() {
    let mut manager = new_manager();
    let e1 = manager.create_entity(AGENT);
    assert_eq!(manager.archetype_of(e1), Some(EMPTY_ARCHETYPE));

    let c1 = manager.create_component(e1, HEALTH, "", Health(1.0));
    manager.bind(c1).unwrap();
    let with_health = manager.archetype_of(e1).unwrap();
    assert_ne!(with_health, EMPTY_ARCHETYPE);
    assert_eq!(manager.get_component(e1, HEALTH), Some(c1));

    let c2 = manager.create_component(e1, HEALTH, "b", Health(2.0));
    manager.bind(c2).unwrap();
    assert_eq!(manager.archetype_of(e1), Some(with_health));
    assert_eq!(manager.get_component(e1, HEALTH), Some(c1));
    assert_eq!(manager.get_component_labeled(e1, HEALTH, "b"), Some(c2));
    assert_eq!(manager.component_count(e1, HEALTH), 2);

    manager.unbind(c1).unwrap();
    assert_eq!(
        manager.archetype_of(e1),
        Some(with_health),
        "a type-5 component remains, so no migration"
    );
    assert_eq!(manager.component_count(e1, HEALTH), 1);
    assert_eq!(manager.get_component(e1, HEALTH), Some(c2));

    manager.unbind(c2).unwrap();
    assert_eq!(manager.archetype_of(e1), Some(EMPTY_ARCHETYPE));
    assert!(!manager.has_component(e1, HEALTH));
}

#[test]
fn components_of_preserves_bind_order() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let keys: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|label| manager.create_component(entity, HEALTH, *label, Health(0.0)))
        .collect();
    for &key in &keys {
        manager.bind(key).unwrap();
    }
    assert_eq!(manager.components_of(entity, HEALTH), keys);
}

#[test]
fn payload_downcast_round_trip() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let key = manager.create_component(entity, POSITION, "", Position(1.0, 2.0));
    manager.bind(key).unwrap();

    let node = manager.component(key).unwrap();
    let position = node.data::<Position>().unwrap();
    assert_eq!(position.0, 1.0);
    assert!(node.data::<Health>().is_none());

    manager
        .component_mut(key)
        .unwrap()
        .data_mut::<Position>()
        .unwrap()
        .1 = 7.0;
    assert_eq!(manager.component(key).unwrap().data::<Position>().unwrap().1, 7.0);
}

#[test]
fn swap_remove_reindexes_surviving_entities() {
    let mut manager = new_manager();
    let entities: Vec<Entity> = (0..4).map(|_| manager.create_entity(AGENT)).collect();
    let keys: Vec<_> = entities
        .iter()
        .map(|&e| manager.create_component(e, HEALTH, "", Health(0.0)))
        .collect();
    for &key in &keys {
        manager.bind(key).unwrap();
    }

    // Remove from the middle so the dense tail entity gets displaced.
    manager.remove_entity(entities[1]).unwrap();

    for &survivor in [entities[0], entities[2], entities[3]].iter() {
        let location = manager.location_of(survivor).unwrap();
        let archetype = manager.archetype(location.archetype).unwrap();
        assert_eq!(archetype.entity_at(location.slot), Some(survivor));
        assert!(manager.has_component(survivor, HEALTH));
    }
}

#[test]
fn removal_destructs_each_component_exactly_once() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let hits = Arc::new(AtomicUsize::new(0));

    let a = manager.create_component(entity, HEALTH, "a", Tracked { hits: Arc::clone(&hits) });
    let b = manager.create_component(entity, HEALTH, "b", Tracked { hits: Arc::clone(&hits) });
    manager.bind_many(&[a, b]).unwrap();

    manager.remove_entity(entity).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // The nodes are gone; a dead owner could never rebind them.
    assert!(manager.component(a).is_none());
    assert!(manager.component(b).is_none());
}

#[test]
fn multi_bind_is_all_or_nothing() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let other = manager.create_entity(AGENT);

    let mine = manager.create_component(entity, HEALTH, "", Health(0.0));
    let theirs = manager.create_component(other, POSITION, "", Position(0.0, 0.0));

    let result = manager.bind_many(&[mine, theirs]);
    assert!(matches!(result, Err(EcsError::OwnerMismatch { .. })));
    assert!(!manager.component(mine).unwrap().is_bound());
    assert!(!manager.component(theirs).unwrap().is_bound());
    assert_eq!(manager.archetype_of(entity), Some(EMPTY_ARCHETYPE));

    assert!(matches!(
        manager.bind_many(&[]),
        Err(EcsError::InvalidArgument(_))
    ));
    assert!(matches!(
        manager.bind_many(&[mine, mine]),
        Err(EcsError::InvalidArgument(_))
    ));

    // A valid batch over two types lands in one combined archetype.
    let position = manager.create_component(entity, POSITION, "", Position(0.0, 0.0));
    manager.bind_many(&[mine, position]).unwrap();
    assert_signature_matches(&manager, entity, &[HEALTH, POSITION]);

    manager.unbind_many(&[mine, position]).unwrap();
    assert_eq!(manager.archetype_of(entity), Some(EMPTY_ARCHETYPE));
}

#[test]
fn binding_to_a_dead_owner_fails() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let key = manager.create_component(entity, HEALTH, "", Health(0.0));
    manager.remove_entity(entity).unwrap();

    // The node was never bound, so it survives the removal; its owner does
    // not, and that is what the bind checks.
    assert_eq!(manager.bind(key), Err(EcsError::DeadEntity(entity)));

    // Even after the id is reused, the stale owner handle keeps failing.
    let reborn = manager.create_entity(AGENT);
    assert_eq!(reborn.id(), entity.id());
    assert_eq!(manager.bind(key), Err(EcsError::DeadEntity(entity)));
}

#[test]
fn archetypes_are_created_lazily_and_reused() {
    let mut manager = new_manager();
    assert_eq!(manager.archetype_count(), 1);

    let a = manager.create_entity(AGENT);
    let b = manager.create_entity(AGENT);
    let ka = manager.create_component(a, HEALTH, "", Health(0.0));
    let kb = manager.create_component(b, HEALTH, "", Health(0.0));

    manager.bind(ka).unwrap();
    assert_eq!(manager.archetype_count(), 2);
    manager.bind(kb).unwrap();
    assert_eq!(manager.archetype_count(), 2, "same signature reuses the archetype");
    assert_eq!(manager.archetype_of(a), manager.archetype_of(b));
}
