//! Ordered replay log of deferred store mutations.
//!
//! A [`CommandBuffer`] records intents without validating them. Entity ids
//! are drawn from the shared allocator at enqueue time, so callers can hold
//! real handles (and build components against them) before anything touches
//! the manager. Components queued through the buffer are parked as detached
//! nodes and only enter the manager's arena during replay.
//!
//! ## Flush semantics
//!
//! Replay is strictly FIFO and runs the manager's normal validation for
//! every entry. Each failure is handed to a caller-supplied handler; on
//! [`BatchDisposition::Continue`] the entry is skipped, on
//! [`BatchDisposition::Abort`] replay stops, the buffer's entity ids are
//! rolled back, and the flush returns [`EcsError::BatchAborted`].

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::engine::component::{ComponentData, ComponentKey, ComponentNode};
use crate::engine::entity::{Entity, EntityAllocator};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::manager::EcsManager;
use crate::engine::types::{ComponentTypeId, EntityTypeId};


/// Handler verdict for one failed queued operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BatchDisposition {
    /// Swallow the error and replay the next entry.
    Continue,
    /// Stop the flush and roll back the buffer's entity allocations.
    Abort,
}

/// Reference to a component from inside a command buffer.
///
/// `Live` wraps a key the manager already issued; `Queued` names a detached
/// node parked in the buffer, installed into the manager's arena at replay.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ComponentRef {
    /// Key of a component already stored in the manager's arena.
    Live(ComponentKey),
    /// Index of a node parked in the buffer, not yet in any arena.
    Queued(u32),
}

enum EcsCommand {
    Spawn { entity: Entity },
    Despawn { entity: Entity },
    Bind { component: ComponentRef },
    Unbind { component: ComponentRef },
    BindMany { components: Vec<ComponentRef> },
    UnbindMany { components: Vec<ComponentRef> },
}

/// FIFO queue of deferred mutations against a manager.
///
/// ## Invariants
/// * Recording validates nothing; every check happens at flush.
/// * Until [`EcsManager::flush_commands`] runs, the buffer has zero
///   observable effect on the manager beyond the ids it reserved in the
///   shared allocator.

pub struct CommandBuffer {
    shared: Arc<EntityAllocator>,
    queue: Vec<EcsCommand>,
    pending: Vec<Option<ComponentNode>>,
    allocated: Vec<Entity>,
}

impl CommandBuffer {
    pub(crate) fn new(shared: Arc<EntityAllocator>) -> Self {
        Self {
            shared,
            queue: Vec::new(),
            pending: Vec::new(),
            allocated: Vec::new(),
        }
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Reserves a real entity id from the shared allocator and queues its
    /// installation. The handle is valid as a value immediately; the entity
    /// becomes live only at flush.
    pub fn create_entity(&mut self, entity_type: EntityTypeId) -> Entity {
        let entity = self.shared.allocate(entity_type);
        self.allocated.push(entity);
        self.queue.push(EcsCommand::Spawn { entity });
        entity
    }

    /// Queues an entity removal. The target may be a manager entity or one
    /// created through this buffer.
    pub fn remove_entity(&mut self, entity: Entity) {
        self.queue.push(EcsCommand::Despawn { entity });
    }

    /// Parks a detached component node for `owner` and returns a reference
    /// usable in queued bind/unbind operations.
    pub fn create_component<T: ComponentData>(
        &mut self,
        owner: Entity,
        type_id: ComponentTypeId,
        label: impl Into<String>,
        payload: T,
    ) -> ComponentRef {
        let slot = self.pending.len() as u32;
        self.pending.push(Some(ComponentNode::new(
            owner,
            type_id,
            label.into(),
            Box::new(payload),
        )));
        ComponentRef::Queued(slot)
    }

    /// Queues a single-component bind.
    pub fn bind(&mut self, component: ComponentRef) {
        self.queue.push(EcsCommand::Bind { component });
    }

    /// Queues a single-component unbind.
    pub fn unbind(&mut self, component: ComponentRef) {
        self.queue.push(EcsCommand::Unbind { component });
    }

    /// Queues an all-or-nothing multi-component bind.
    pub fn bind_many(&mut self, components: Vec<ComponentRef>) {
        self.queue.push(EcsCommand::BindMany { components });
    }

    /// Queues an all-or-nothing multi-component unbind.
    pub fn unbind_many(&mut self, components: Vec<ComponentRef>) {
        self.queue.push(EcsCommand::UnbindMany { components });
    }
}

impl EcsManager {
    /// Replays a command buffer against this store in FIFO order.
    ///
    /// Every entry passes through the manager's validating entry points.
    /// Failures go to `handler`; `Continue` skips the entry, `Abort` stops
    /// the flush, rolls back the buffer's entity allocations (removing
    /// entities it installed, releasing ids it never installed), and
    /// returns `BatchAborted`.
    pub fn flush_commands(
        &mut self,
        buffer: CommandBuffer,
        mut handler: impl FnMut(&EcsError) -> BatchDisposition,
    ) -> EcsResult<()> {
        let CommandBuffer {
            shared,
            queue,
            mut pending,
            allocated,
        } = buffer;
        debug_assert!(Arc::ptr_eq(&shared, &self.shared));

        let replayed = queue.len();
        let mut installed: HashMap<u32, ComponentKey> = HashMap::new();

        for command in queue {
            if let Err(error) = self.replay(command, &mut pending, &mut installed) {
                if handler(&error) == BatchDisposition::Abort {
                    debug!("command flush aborted on {error}");
                    self.roll_back(&allocated);
                    return Err(EcsError::BatchAborted);
                }
            }
        }
        debug!("replayed {replayed} queued commands");
        Ok(())
    }

    fn replay(
        &mut self,
        command: EcsCommand,
        pending: &mut [Option<ComponentNode>],
        installed: &mut HashMap<u32, ComponentKey>,
    ) -> EcsResult<()> {
        match command {
            EcsCommand::Spawn { entity } => {
                if self.get_entity(entity.id()).is_some() {
                    return Err(EcsError::InvalidArgument("queued entity id is already live"));
                }
                self.install_entity(entity);
                Ok(())
            }
            EcsCommand::Despawn { entity } => self.remove_entity(entity),
            EcsCommand::Bind { component } => {
                let key = self.resolve(component, pending, installed)?;
                self.bind(key)
            }
            EcsCommand::Unbind { component } => {
                let key = self.resolve(component, pending, installed)?;
                self.unbind(key)
            }
            EcsCommand::BindMany { components } => {
                let keys = self.resolve_all(&components, pending, installed)?;
                self.bind_many(&keys)
            }
            EcsCommand::UnbindMany { components } => {
                let keys = self.resolve_all(&components, pending, installed)?;
                self.unbind_many(&keys)
            }
        }
    }

    /// Maps a buffer-side component reference to a manager arena key,
    /// installing a queued node on first use.
    fn resolve(
        &mut self,
        component: ComponentRef,
        pending: &mut [Option<ComponentNode>],
        installed: &mut HashMap<u32, ComponentKey>,
    ) -> EcsResult<ComponentKey> {
        match component {
            ComponentRef::Live(key) => Ok(key),
            ComponentRef::Queued(slot) => {
                if let Some(&key) = installed.get(&slot) {
                    return Ok(key);
                }
                let node = pending
                    .get_mut(slot as usize)
                    .and_then(Option::take)
                    .ok_or(EcsError::InvalidArgument("unresolved queued component"))?;
                let key = self.components.insert(node);
                installed.insert(slot, key);
                Ok(key)
            }
        }
    }

    fn resolve_all(
        &mut self,
        components: &[ComponentRef],
        pending: &mut [Option<ComponentNode>],
        installed: &mut HashMap<u32, ComponentKey>,
    ) -> EcsResult<Vec<ComponentKey>> {
        components
            .iter()
            .map(|&component| self.resolve(component, pending, installed))
            .collect()
    }

    /// Unwinds an aborted flush: entities the buffer installed are removed,
    /// ids it reserved but never installed are released. Ids already freed
    /// by a replayed despawn (or reallocated since) are left alone, which
    /// the generation check detects.
    fn roll_back(&mut self, allocated: &[Entity]) {
        for &entity in allocated.iter().rev() {
            if self.is_alive(entity) {
                let _ = self.remove_entity(entity);
            } else if self.get_entity(entity.id()).is_none()
                && self.shared.is_allocated(entity.id())
                && self.shared.generation_of(entity.id()) == entity.generation()
            {
                self.shared.release(entity.id());
            }
        }
    }
}
