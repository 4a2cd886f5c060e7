//! Registry-style key store primitives for keywatch
//!
//! This crate provides:
//! - `ResourceGuard`, the move-only owner for native handles
//! - Watch target description (root scope, path, subtree flag, filter mask)
//! - The `KeyStore` trait the change watcher is written against
//! - A typed value reader over any store
//! - An in-memory store, and the Windows registry on Windows

pub mod error;
pub mod guard;
pub mod memory;
pub mod reader;
pub mod store;
pub mod target;
pub mod value;

#[cfg(windows)]
pub mod windows;

// Re-exports
pub use error::{Result, StoreError};
pub use guard::{RawHandle, ResourceGuard};
pub use memory::{MemoryEvent, MemoryKey, MemoryStore};
pub use reader::KeyReader;
pub use store::{guard_event, guard_key, Access, KeyStore};
pub use target::{NotifyFilter, RootKey, WatchTarget};
pub use value::{Value, ValueKind};

#[cfg(windows)]
pub use windows::WindowsStore;
