use ecs_store::{
    AnyEntity, BatchDisposition, ComponentData, ComponentTypeId, EcsError, EcsManager,
    EntityAllocator, EntityTypeId,
};

const AGENT: EntityTypeId = 0;
const CASH: ComponentTypeId = 2;
const STOCK: ComponentTypeId = 7;

#[derive(Clone, Copy)]
struct Cash(pub f32);
impl ComponentData for Cash {}

#[derive(Clone, Copy)]
struct Stock(pub u32);
impl ComponentData for Stock {}

fn new_manager() -> EcsManager {
    EcsManager::new(EntityAllocator::shared())
}

fn swallow(_: &EcsError) -> BatchDisposition {
    BatchDisposition::Continue
}

// ── Command buffer ─────────────────────────────────────────────────────

#[test]
fn command_buffer_has_no_effect_until_flushed() {
    let mut manager = new_manager();
    let existing = manager.create_entity(AGENT);

    let mut buffer = manager.create_command_buffer();
    let queued = buffer.create_entity(AGENT);
    let cash = buffer.create_component(queued, CASH, "", Cash(5.0));
    buffer.bind(cash);

    // The id is reserved so siblings cannot collide with it, but the
    // manager itself is untouched.
    assert_ne!(queued.id(), existing.id());
    assert!(!manager.is_alive(queued));
    assert_eq!(manager.collect_entities(AnyEntity).unwrap().len(), 1);

    manager.flush_commands(buffer, swallow).unwrap();
    assert!(manager.is_alive(queued));
    assert!(manager.has_component(queued, CASH));
    assert_eq!(manager.collect_entities(AnyEntity).unwrap().len(), 2);
}

#[test]
fn queued_create_bind_remove_frees_the_id() {
    let mut manager = new_manager();

    let mut buffer = manager.create_command_buffer();
    let e2 = buffer.create_entity(AGENT);
    let c = buffer.create_component(e2, CASH, "", Cash(1.0));
    buffer.bind(c);
    buffer.remove_entity(e2);

    manager.flush_commands(buffer, swallow).unwrap();
    assert!(!manager.is_alive(e2));
    assert!(!manager.allocator().is_allocated(e2.id()));

    let reused = manager.create_entity(AGENT);
    assert_eq!(reused.id(), e2.id());
    assert_eq!(reused.generation(), e2.generation() + 1);
}

#[test]
fn replaying_the_same_operations_matches_direct_mutation() {
    // Direct path.
    let mut direct = new_manager();
    let d = direct.create_entity(AGENT);
    let dk = direct.create_component(d, CASH, "", Cash(3.0));
    direct.bind(dk).unwrap();

    // Deferred path, same operations in the same order.
    let mut deferred = new_manager();
    let mut buffer = deferred.create_command_buffer();
    let q = buffer.create_entity(AGENT);
    let qk = buffer.create_component(q, CASH, "", Cash(3.0));
    buffer.bind(qk);
    deferred.flush_commands(buffer, swallow).unwrap();

    assert_eq!(d.id(), q.id());
    assert!(deferred.is_alive(q));
    assert_eq!(
        direct.component_count(d, CASH),
        deferred.component_count(q, CASH)
    );
    let direct_sig: Vec<usize> = direct
        .archetype(direct.archetype_of(d).unwrap())
        .unwrap()
        .signature()
        .iter_ones()
        .collect();
    let deferred_sig: Vec<usize> = deferred
        .archetype(deferred.archetype_of(q).unwrap())
        .unwrap()
        .signature()
        .iter_ones()
        .collect();
    assert_eq!(direct_sig, deferred_sig);
}

#[test]
fn live_component_references_replay_against_manager_state() {
    let mut manager = new_manager();
    let entity = manager.create_entity(AGENT);
    let key = manager.create_component(entity, CASH, "", Cash(2.0));
    manager.bind(key).unwrap();

    let mut buffer = manager.create_command_buffer();
    buffer.unbind(ecs_store::ComponentRef::Live(key));
    manager.flush_commands(buffer, swallow).unwrap();
    assert!(!manager.component(key).unwrap().is_bound());
    assert!(!manager.has_component(entity, CASH));
}

#[test]
fn continue_disposition_skips_the_failed_entry_only() {
    let mut manager = new_manager();
    let dead = manager.create_entity(AGENT);
    manager.remove_entity(dead).unwrap();

    let mut buffer = manager.create_command_buffer();
    let good = buffer.create_entity(AGENT);
    let bad_component = buffer.create_component(dead, CASH, "", Cash(0.0));
    buffer.bind(bad_component);
    let good_component = buffer.create_component(good, STOCK, "", Stock(9));
    buffer.bind(good_component);

    let mut failures = Vec::new();
    manager
        .flush_commands(buffer, |error| {
            failures.push(error.clone());
            BatchDisposition::Continue
        })
        .unwrap();

    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], EcsError::DeadEntity(_)));
    assert!(manager.is_alive(good));
    assert!(manager.has_component(good, STOCK));
}

#[test]
fn abort_rolls_back_buffer_allocations() {
    let mut manager = new_manager();
    let stale = manager.create_entity(AGENT);
    manager.remove_entity(stale).unwrap();

    // Queue order: spawn, failing bind, spawn. The abort fires mid-replay,
    // so one entity was installed and one never was.
    let mut buffer = manager.create_command_buffer();
    let installed = buffer.create_entity(AGENT);
    let doomed = buffer.create_component(stale, CASH, "", Cash(0.0));
    buffer.bind(doomed);
    let never_installed = buffer.create_entity(AGENT);

    let result = manager.flush_commands(buffer, |_| BatchDisposition::Abort);
    assert_eq!(result, Err(EcsError::BatchAborted));

    assert!(!manager.is_alive(installed));
    assert!(!manager.is_alive(never_installed));
    assert!(!manager.allocator().is_allocated(installed.id()));
    assert!(!manager.allocator().is_allocated(never_installed.id()));
}

// ── New-entities buffer ────────────────────────────────────────────────

#[test]
fn staged_entities_are_invisible_until_flush() {
    let mut manager = new_manager();
    let mut buffer = manager.create_new_entities_buffer();

    let staged = buffer.create_entity(AGENT);
    assert!(buffer.is_alive(staged));
    assert!(!manager.is_alive(staged));
    assert!(manager.collect_entities(AnyEntity).unwrap().is_empty());

    // The id is reserved globally, so manager-side creation skips it.
    let direct = manager.create_entity(AGENT);
    assert_ne!(direct.id(), staged.id());

    manager.flush_new_entities(buffer);
    assert!(manager.is_alive(staged));
    assert_eq!(manager.collect_entities(AnyEntity).unwrap().len(), 2);
}

#[test]
fn buffer_rejects_foreign_entities() {
    let mut manager = new_manager();
    let outsider = manager.create_entity(AGENT);

    let mut buffer = manager.create_new_entities_buffer();
    assert_eq!(
        buffer
            .create_component(outsider, CASH, "", Cash(0.0))
            .unwrap_err(),
        EcsError::ForeignEntity(outsider)
    );
    assert_eq!(
        buffer.remove_entity(outsider),
        Err(EcsError::ForeignEntity(outsider))
    );
}

#[test]
fn buffer_distinguishes_dead_local_from_foreign() {
    let manager = new_manager();
    let mut buffer = manager.create_new_entities_buffer();

    let staged = buffer.create_entity(AGENT);
    buffer.remove_entity(staged).unwrap();
    assert_eq!(
        buffer.remove_entity(staged),
        Err(EcsError::DeadEntity(staged))
    );
    assert!(!manager.allocator().is_allocated(staged.id()));
}

#[test]
fn staged_bind_unbind_mirror_manager_semantics() {
    let manager = new_manager();
    let mut buffer = manager.create_new_entities_buffer();

    let staged = buffer.create_entity(AGENT);
    let a = buffer.create_component(staged, CASH, "a", Cash(1.0)).unwrap();
    let b = buffer.create_component(staged, CASH, "b", Cash(2.0)).unwrap();

    buffer.bind(a).unwrap();
    buffer.bind(b).unwrap();
    assert_eq!(buffer.component_count(staged, CASH), 2);
    assert_eq!(buffer.get_component(staged, CASH), Some(a));
    assert_eq!(buffer.bind(a), Err(EcsError::AlreadyBound(a)));

    buffer.unbind(a).unwrap();
    assert_eq!(buffer.component_count(staged, CASH), 1);
    assert_eq!(buffer.get_component(staged, CASH), Some(b));
    assert_eq!(buffer.unbind(a), Err(EcsError::AlreadyUnbound(a)));
}

#[test]
fn flush_merges_into_matching_archetypes() {
    let mut manager = new_manager();

    // A manager-side resident of the {CASH} archetype.
    let resident = manager.create_entity(AGENT);
    let resident_cash = manager.create_component(resident, CASH, "", Cash(10.0));
    manager.bind(resident_cash).unwrap();

    let mut buffer = manager.create_new_entities_buffer();
    let cash_only = buffer.create_entity(AGENT);
    let key = buffer.create_component(cash_only, CASH, "", Cash(20.0)).unwrap();
    buffer.bind(key).unwrap();

    let novel = buffer.create_entity(AGENT);
    let cash = buffer.create_component(novel, CASH, "", Cash(1.0)).unwrap();
    let stock = buffer.create_component(novel, STOCK, "", Stock(3)).unwrap();
    buffer.bind(cash).unwrap();
    buffer.bind(stock).unwrap();

    let archetypes_before = manager.archetype_count();
    manager.flush_new_entities(buffer);

    // Value-equal signature merged, novel signature created.
    assert_eq!(
        manager.archetype_of(cash_only),
        manager.archetype_of(resident)
    );
    assert_eq!(manager.archetype_count(), archetypes_before + 1);

    assert!(manager.is_alive(cash_only) && manager.is_alive(novel));
    assert!(manager.has_component(novel, CASH) && manager.has_component(novel, STOCK));

    // Payloads and chains survived the arena migration.
    let merged_key = manager.get_component(cash_only, CASH).unwrap();
    let node = manager.component(merged_key).unwrap();
    assert_eq!(node.data::<Cash>().unwrap().0, 20.0);
    assert_eq!(node.owner(), cash_only);
}

#[test]
fn flush_preserves_chain_order_across_key_remap() {
    let mut manager = new_manager();
    let mut buffer = manager.create_new_entities_buffer();

    let staged = buffer.create_entity(AGENT);
    let first = buffer.create_component(staged, CASH, "first", Cash(1.0)).unwrap();
    let second = buffer.create_component(staged, CASH, "second", Cash(2.0)).unwrap();
    buffer.bind(first).unwrap();
    buffer.bind(second).unwrap();

    manager.flush_new_entities(buffer);

    assert_eq!(manager.component_count(staged, CASH), 2);
    let head = manager.get_component(staged, CASH).unwrap();
    assert_eq!(manager.component(head).unwrap().label(), "first");
    let labeled = manager.get_component_labeled(staged, CASH, "second").unwrap();
    assert_eq!(manager.component(labeled).unwrap().data::<Cash>().unwrap().0, 2.0);
}

#[test]
fn flush_is_a_structural_mutation() {
    let mut manager = new_manager();
    let resident = manager.create_entity(AGENT);
    let mut buffer = manager.create_new_entities_buffer();
    let _staged = buffer.create_entity(AGENT);

    let mut cursor = manager.entities(AnyEntity);
    assert_eq!(cursor.next(&manager).unwrap().unwrap(), resident);

    manager.flush_new_entities(buffer);
    assert!(matches!(
        cursor.next(&manager),
        Some(Err(EcsError::ConcurrentMutation { .. }))
    ));
}
