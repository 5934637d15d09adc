//! Component payloads, nodes, and the component arena.
//!
//! The store is agnostic to what a component contains: payloads are
//! type-erased behind [`ComponentData`] and only the structural fields
//! (owner, type id, label, bound flag, chain link) are interpreted here.
//!
//! ## Chains as arena links
//!
//! Several components of the same type may be attached to one entity,
//! disambiguated by label. They form a singly linked chain per
//! `(entity slot, component type)`: the archetype column holds the index of
//! the chain head and every node holds the index of its successor. Nodes
//! live in a [`ComponentArena`] and are addressed by [`ComponentKey`], so
//! chain splicing is plain index surgery with no pointer ownership puzzles.
//!
//! ## Ownership
//!
//! Each store owns its own arena: the manager has one, every new-entities
//! buffer has one, and a command buffer parks detached nodes until replay.
//! Arenas are never shared between stores; flushing a buffer migrates its
//! nodes into the manager's arena and rewrites the chain links.

use std::any::Any;

use crate::engine::entity::Entity;
use crate::engine::types::ComponentTypeId;


/// Type-erased component payload.
///
/// ## The destruct hook
/// `destruct` fires exactly once, immediately before the component is
/// unbound while its owning entity is being removed. The default is a no-op.

pub trait ComponentData: Any + Send {
    /// Invoked once when the owning entity is removed, before unbinding.
    fn destruct(&mut self) {}
}

/// Handle to a component node inside one store's arena.
///
/// Keys are only meaningful against the arena that issued them; flushing a
/// buffer invalidates the buffer's keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentKey(pub(crate) u32);

/// One stored component: structural fields plus the opaque payload.
///
/// ## Invariants
/// * `owner`, `type_id`, and `label` are fixed at construction.
/// * `bound` is `false` until a bind attaches the node; unbinding (or owner
///   removal) clears it together with `next`.
/// * `next` links same-type siblings of one entity slot, in bind order.

pub struct ComponentNode {
    type_id: ComponentTypeId,
    owner: Entity,
    label: String,
    bound: bool,
    next: Option<ComponentKey>,
    payload: Box<dyn ComponentData>,
}

impl ComponentNode {
    pub(crate) fn new(
        owner: Entity,
        type_id: ComponentTypeId,
        label: String,
        payload: Box<dyn ComponentData>,
    ) -> Self {
        Self {
            type_id,
            owner,
            label,
            bound: false,
            next: None,
            payload,
        }
    }

    /// Component type id; fixed at construction.
    #[inline]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Owning entity; fixed at construction.
    #[inline]
    pub fn owner(&self) -> Entity {
        self.owner
    }

    /// Label distinguishing same-type siblings. Empty by default.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` while the component is attached to its owner.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Successor in the same-type chain, if any.
    #[inline]
    pub fn next(&self) -> Option<ComponentKey> {
        self.next
    }

    /// Downcasts the payload to a concrete type.
    #[inline]
    pub fn data<T: ComponentData>(&self) -> Option<&T> {
        (self.payload.as_ref() as &dyn Any).downcast_ref::<T>()
    }

    /// Mutable payload downcast.
    #[inline]
    pub fn data_mut<T: ComponentData>(&mut self) -> Option<&mut T> {
        (self.payload.as_mut() as &mut dyn Any).downcast_mut::<T>()
    }

    #[inline]
    pub(crate) fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: Option<ComponentKey>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn run_destruct(&mut self) {
        self.payload.destruct();
    }
}

/// Slot arena of component nodes with free-list reuse.
///
/// ## Invariants
/// * A key issued by `insert` stays valid until `take` removes the node.
/// * Freed slots are reused in LIFO order.

#[derive(Default)]
pub struct ComponentArena {
    nodes: Vec<Option<ComponentNode>>,
    free: Vec<u32>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node and returns its key.
    pub fn insert(&mut self, node: ComponentNode) -> ComponentKey {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                ComponentKey(slot)
            }
            None => {
                self.nodes.push(Some(node));
                ComponentKey((self.nodes.len() - 1) as u32)
            }
        }
    }

    /// Resolves a key to its node.
    #[inline]
    pub fn get(&self, key: ComponentKey) -> Option<&ComponentNode> {
        self.nodes.get(key.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Mutable node resolution.
    #[inline]
    pub fn get_mut(&mut self, key: ComponentKey) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(key.0 as usize).and_then(|slot| slot.as_mut())
    }

    /// Removes a node, freeing its slot for reuse.
    pub fn take(&mut self, key: ComponentKey) -> Option<ComponentNode> {
        let node = self.nodes.get_mut(key.0 as usize).and_then(|slot| slot.take());
        if node.is_some() {
            self.free.push(key.0);
        }
        node
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns `true` if no node is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains every node out of the arena, yielding `(key, node)` pairs.
    ///
    /// Used when flushing a buffer: the nodes move into the manager's arena
    /// and the yielded keys feed the remap table.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (ComponentKey, ComponentNode)> + '_ {
        self.free.clear();
        self.nodes
            .drain(..)
            .enumerate()
            .filter_map(|(slot, node)| node.map(|node| (ComponentKey(slot as u32), node)))
    }
}
