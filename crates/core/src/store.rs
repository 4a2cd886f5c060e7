//! The key store the watcher is written against
//!
//! A `KeyStore` supplies the native primitives: opening keys, reading and
//! writing values, auto-reset wait events, and the one-shot change
//! notification. Handles are raw values; callers that hold them for any
//! length of time wrap them with `guard_key` / `guard_event`.

use crate::error::Result;
use crate::guard::{RawHandle, ResourceGuard};
use crate::target::{NotifyFilter, RootKey};
use crate::value::Value;
use std::sync::Arc;

/// Access requested when opening a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Query values and request change notifications
    Read,
    /// Set and delete values
    Write,
    /// Read and write
    All,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::All)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::All)
    }
}

/// Hierarchical key-value store with one-shot change notification
pub trait KeyStore: Send + Sync + 'static {
    /// Opened key handle
    type Key: RawHandle + Send + Sync;
    /// Auto-reset wait event handle
    type Event: RawHandle + Send + Sync;

    /// Open an existing key
    fn open_key(&self, root: RootKey, path: &str, access: Access) -> Result<Self::Key>;

    /// Open a key with full access, creating it and any missing parents
    fn create_key(&self, root: RootKey, path: &str) -> Result<Self::Key>;

    fn close_key(&self, key: Self::Key);

    /// Read a named value; `Ok(None)` if it does not exist
    fn query_value(&self, key: Self::Key, name: &str) -> Result<Option<Value>>;

    fn set_value(&self, key: Self::Key, name: &str, value: &Value) -> Result<()>;

    fn delete_value(&self, key: Self::Key, name: &str) -> Result<()>;

    /// Create an auto-reset event, initially not signaled
    fn create_event(&self) -> Result<Self::Event>;

    fn close_event(&self, event: Self::Event);

    fn set_event(&self, event: Self::Event) -> Result<()>;

    fn reset_event(&self, event: Self::Event) -> Result<()>;

    /// Arm a one-shot change notification
    ///
    /// `event` is signaled once, the first time a change matching `filter`
    /// happens on the key (or below it, with `watch_subtree`). After it fires
    /// the key must be armed again to keep observing.
    fn notify_change(
        &self,
        key: Self::Key,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: Self::Event,
    ) -> Result<()>;

    /// Block without timeout until one of `events` is signaled
    ///
    /// Returns the index of the event that woke the caller and consumes its
    /// signal. When several are signaled the lowest index wins.
    fn wait_any(&self, events: &[Self::Event]) -> Result<usize>;
}

/// Wrap an opened key so it is closed through `store` exactly once
pub fn guard_key<S: KeyStore>(store: &Arc<S>, key: S::Key) -> ResourceGuard<S::Key> {
    let store = Arc::clone(store);
    ResourceGuard::new(key, move |key| store.close_key(key))
}

/// Wrap an event so it is closed through `store` exactly once
pub fn guard_event<S: KeyStore>(store: &Arc<S>, event: S::Event) -> ResourceGuard<S::Event> {
    let store = Arc::clone(store);
    ResourceGuard::new(event, move |event| store.close_event(event))
}
