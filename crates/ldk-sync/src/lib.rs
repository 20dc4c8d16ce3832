//! Synchronization engine between the durable local store, the capture
//! agent on the far side of the message bus, and the snapshot the UI reads.
//!
//! Control flow: a UI mutation writes through [`SyncEngine`] into the
//! durable store and then refreshes the snapshot directly; independently,
//! the [`listener`] watches store events and foreign bus notifications and
//! debounces them into refreshes. Only `refresh` ever replaces the
//! snapshot, and always wholesale.

pub mod bridge;
pub mod engine;
pub mod listener;

use thiserror::Error;

pub use bridge::{CaptureBridge, MessageBus, DEFAULT_SNAPSHOT_TIMEOUT};
pub use engine::SyncEngine;
pub use listener::{spawn_change_listener, ListenerConfig};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] ldk_storage::StorageError),
}
