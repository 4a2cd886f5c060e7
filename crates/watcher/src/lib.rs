//! Key change watching for keywatch
//!
//! This crate provides the change watcher lifecycle:
//! - Opening the target key and allocating the wait events at construction
//! - One-shot change notifications, re-armed after every firing
//! - A dedicated worker thread blocked on the notification (no polling)
//! - Start/stop from the owning thread, serialized against the callback

pub mod change;
pub mod error;
pub mod handler;
pub mod state;

// Re-exports
pub use change::ChangeWatcher;
pub use error::WatchError;
pub use handler::ChangeHandler;
pub use state::WatchState;

pub use keywatch_core::{NotifyFilter, RootKey, WatchTarget};
