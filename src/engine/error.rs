//! Error types for the entity/component store.
//!
//! This module declares the failure vocabulary of the storage core. Every
//! error is synchronous and immediate; nothing is retried, queued, or
//! deferred. Low-level operations return small, dedicated error types (e.g.
//! [`CapacityError`]) which convert via `From` into the aggregate
//! [`EcsError`] so callers can use `?` throughout.
//!
//! ## Goals
//! * **Specificity:** each variant models a single failure mode (stale entity
//!   handle, double bind, owner mismatch, …).
//! * **Actionability:** structured fields (offending entity, component key,
//!   required vs. available capacity) make failures diagnosable without
//!   reproducing them.
//! * **Ergonomics:** everything implements [`std::error::Error`] and
//!   [`fmt::Display`].
//!
//! ## Display vs. Debug
//! * `Display` is a short, single-line operator message.
//! * `Debug` (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::component::ComponentKey;
use crate::engine::entity::Entity;
use crate::engine::types::StructuralVersion;


/// Convenience alias for results produced by the store.
pub type EcsResult<T> = Result<T, EcsError>;

/// Returned when a signature operation's output target is too small to hold
/// the result.
///
/// ### Fields
/// * `required`: minimum bit capacity the operation needed in the output.
/// * `capacity`: the output signature's actual bit capacity.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Minimum bit capacity the operation required.
    pub required: usize,

    /// Bit capacity the output signature actually had.
    pub capacity: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signature output capacity too small ({} bits required; capacity {})",
            self.required, self.capacity
        )
    }
}

impl std::error::Error for CapacityError {}

/// Aggregate error for store operations.
///
/// Every failing operation on the manager or one of the deferred buffers
/// resolves to one of these variants. Multi-component operations validate
/// fully before mutating, so observing an `Err` means no partial state was
/// left behind.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Malformed input, such as an empty component slice.
    InvalidArgument(&'static str),

    /// The operation targeted an entity that is not the current live
    /// occupant of its id slot (removed, or a stale generation).
    DeadEntity(Entity),

    /// A bind was applied to a component that is already bound.
    AlreadyBound(ComponentKey),

    /// An unbind was applied to a component that is not bound.
    AlreadyUnbound(ComponentKey),

    /// A multi-component operation mixed components of different owners.
    OwnerMismatch {
        /// Owner of the first component in the batch.
        expected: Entity,
        /// The mismatched owner that was encountered.
        actual: Entity,
    },

    /// A new-entities buffer operation referenced an entity that was not
    /// created through that buffer.
    ForeignEntity(Entity),

    /// A component key did not resolve to a node in the store's arena.
    UnknownComponent(ComponentKey),

    /// A signature operation's output had insufficient capacity.
    Capacity(CapacityError),

    /// A query cursor observed a structural mutation performed after the
    /// cursor was created.
    ConcurrentMutation {
        /// Structural version captured when the cursor was created.
        started_at: StructuralVersion,
        /// Structural version observed at the failing step.
        current: StructuralVersion,
    },

    /// A command-buffer flush was stopped by its error handler.
    BatchAborted,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            EcsError::DeadEntity(entity) => {
                write!(f, "stale or dead entity reference: {entity:?}")
            }
            EcsError::AlreadyBound(key) => {
                write!(f, "component {key:?} is already bound")
            }
            EcsError::AlreadyUnbound(key) => {
                write!(f, "component {key:?} is not bound")
            }
            EcsError::OwnerMismatch { expected, actual } => write!(
                f,
                "components belong to different owners (expected {expected:?}, found {actual:?})"
            ),
            EcsError::ForeignEntity(entity) => {
                write!(f, "entity {entity:?} was not created through this buffer")
            }
            EcsError::UnknownComponent(key) => {
                write!(f, "component key {key:?} does not resolve to a stored component")
            }
            EcsError::Capacity(e) => write!(f, "{e}"),
            EcsError::ConcurrentMutation { started_at, current } => write!(
                f,
                "store mutated during iteration (version {started_at} at start, {current} now)"
            ),
            EcsError::BatchAborted => f.write_str("command batch aborted by error handler"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<CapacityError> for EcsError {
    fn from(e: CapacityError) -> Self {
        EcsError::Capacity(e)
    }
}
