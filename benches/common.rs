#![allow(dead_code)]

use ecs_store::{ComponentData, ComponentTypeId, EcsManager, EntityAllocator};

pub const AGENTS_SMALL: usize = 1_000;
pub const AGENTS_MED: usize = 10_000;
pub const AGENTS_LARGE: usize = 100_000;

pub const AGENT: u32 = 0;
pub const POSITION: ComponentTypeId = 0;
pub const WEALTH: ComponentTypeId = 1;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl ComponentData for Position {}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

impl ComponentData for Wealth {}

pub fn make_store() -> EcsManager {
    EcsManager::new(EntityAllocator::shared())
}

/// Fills a store with `count` agents carrying a position and a wealth
/// component each.
pub fn populate(manager: &mut EcsManager, count: usize) {
    for _ in 0..count {
        let agent = manager.create_entity(AGENT);
        let position = manager.create_component(agent, POSITION, "", Position { x: 0.0, y: 0.0 });
        let wealth = manager.create_component(agent, WEALTH, "", Wealth { value: 100.0 });
        manager
            .bind_many(&[position, wealth])
            .expect("bind failed in benchmark setup");
    }
}
