//! # Engine Module
//!
//! Internal implementation of the archetype store.
//!
//! This module contains all core building blocks:
//! - Bit-signatures and the sorted archetype registry
//! - Entity handles and the shared id allocator
//! - Component nodes, chains, and the arena
//! - The root store and its query cursors
//! - The two deferred-mutation buffers
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod signature;
pub mod entity;
pub mod component;
pub mod archetype;
pub mod query;
pub mod manager;
pub mod commands;
pub mod staging;
