//! In-process key store
//!
//! `MemoryStore` behaves like the registry closely enough to drive the change
//! watcher on any platform: case-insensitive key paths under fixed roots,
//! typed values, auto-reset events, and one-shot change notifications that
//! fire once and must be re-armed.
//!
//! Which filter bit each mutation raises:
//! - value set or deleted: `LAST_SET` on the key
//! - subkey created or deleted: `NAME` on the parent
//! - key deleted: every arm on the key or below it, whatever its filter

use crate::error::{Result, StoreError};
use crate::guard::RawHandle;
use crate::store::{Access, KeyStore};
use crate::target::{normalize_key_path, NotifyFilter, RootKey};
use crate::value::Value;
use crossbeam_channel::{bounded, Receiver, Select, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Key handle issued by `MemoryStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryKey(u64);

impl RawHandle for MemoryKey {
    const INVALID: Self = MemoryKey(0);
}

/// Event handle issued by `MemoryStore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryEvent(u64);

impl RawHandle for MemoryEvent {
    const INVALID: Self = MemoryEvent(0);
}

/// Root plus lower-cased normalized path
type KeyId = (RootKey, String);

#[derive(Default)]
struct KeyNode {
    values: BTreeMap<String, Value>,
}

struct OpenKey {
    id: KeyId,
    access: Access,
    deleted: bool,
}

/// One-slot channel: a queued token means "signaled"
struct EventSlot {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl EventSlot {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    fn signal(&self) {
        // Full means already signaled
        let _ = self.tx.try_send(());
    }

    fn reset(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

struct Arm {
    handle: u64,
    id: KeyId,
    subtree: bool,
    filter: NotifyFilter,
    event: u64,
}

#[derive(Default)]
struct Registry {
    keys: BTreeMap<KeyId, KeyNode>,
    handles: HashMap<u64, OpenKey>,
    events: HashMap<u64, EventSlot>,
    arms: Vec<Arm>,
}

impl Registry {
    fn exists(&self, id: &KeyId) -> bool {
        id.1.is_empty() || self.keys.contains_key(id)
    }

    fn open_key(&self, key: MemoryKey) -> Result<&OpenKey> {
        let open = self.handles.get(&key.0).ok_or(StoreError::InvalidHandle)?;
        if open.deleted {
            return Err(StoreError::KeyDeleted);
        }
        Ok(open)
    }

    fn readable(&self, key: MemoryKey) -> Result<KeyId> {
        let open = self.open_key(key)?;
        if !open.access.can_read() {
            return Err(StoreError::AccessDenied);
        }
        Ok(open.id.clone())
    }

    fn writable(&self, key: MemoryKey) -> Result<KeyId> {
        let open = self.open_key(key)?;
        if !open.access.can_write() {
            return Err(StoreError::AccessDenied);
        }
        Ok(open.id.clone())
    }

    fn signal(&self, event: u64) {
        if let Some(slot) = self.events.get(&event) {
            slot.signal();
        }
    }

    /// Fire and disarm every arm matching a `kind` change at `id`
    fn fire(&mut self, id: &KeyId, kind: NotifyFilter) {
        let mut fired = Vec::new();
        self.arms.retain(|arm| {
            let watches = arm.id == *id || (arm.subtree && arm.id.0 == id.0 && is_within(&id.1, &arm.id.1));
            if watches && arm.filter.contains(kind) {
                fired.push(arm.event);
                false
            } else {
                true
            }
        });
        for event in fired {
            trace!(root = %id.0, path = %id.1, ?kind, event, "Change notification fired");
            self.signal(event);
        }
    }

    /// Fire and disarm every arm on `id` or below it
    fn fire_deleted(&mut self, id: &KeyId) {
        let mut fired = Vec::new();
        self.arms.retain(|arm| {
            if arm.id.0 == id.0 && is_within(&arm.id.1, &id.1) {
                fired.push(arm.event);
                false
            } else {
                true
            }
        });
        for event in fired {
            trace!(root = %id.0, path = %id.1, event, "Deleted key notification fired");
            self.signal(event);
        }
    }
}

/// True if `path` is `ancestor` or lies below it
fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'\\')
}

/// Parent path, `None` for the root itself
fn parent_of(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('\\').map(|(parent, _)| parent).unwrap_or(""))
}

fn key_id(root: RootKey, path: &str) -> KeyId {
    (root, normalize_key_path(path).to_lowercase())
}

fn display_path(root: RootKey, path: &str) -> String {
    let path = normalize_key_path(path);
    if path.is_empty() {
        root.to_string()
    } else {
        format!("{}\\{}", root, path)
    }
}

/// Registry-like store kept entirely in memory
pub struct MemoryStore {
    registry: Mutex<Registry>,
    next_handle: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Delete a key and everything below it
    ///
    /// Open handles to deleted keys stay valid for closing but every other
    /// operation on them reports `KeyDeleted`.
    pub fn delete_key(&self, root: RootKey, path: &str) -> Result<()> {
        let id = key_id(root, path);
        if id.1.is_empty() {
            return Err(StoreError::InvalidParameter("cannot delete a root key"));
        }

        let mut registry = self.registry.lock();
        if !registry.exists(&id) {
            return Err(StoreError::NotFound { path: display_path(root, path) });
        }

        registry.keys.retain(|other, _| !(other.0 == id.0 && is_within(&other.1, &id.1)));
        for open in registry.handles.values_mut() {
            if open.id.0 == id.0 && is_within(&open.id.1, &id.1) {
                open.deleted = true;
            }
        }
        registry.fire_deleted(&id);

        if let Some(parent) = parent_of(&id.1) {
            let parent = (root, parent.to_string());
            registry.fire(&parent, NotifyFilter::NAME);
        }
        Ok(())
    }

    pub fn key_exists(&self, root: RootKey, path: &str) -> bool {
        self.registry.lock().exists(&key_id(root, path))
    }

    /// Number of notifications armed on exactly this key and not yet fired
    pub fn armed_count(&self, root: RootKey, path: &str) -> usize {
        let id = key_id(root, path);
        self.registry.lock().arms.iter().filter(|arm| arm.id == id).count()
    }

    /// Number of key handles not yet closed
    pub fn open_handle_count(&self) -> usize {
        self.registry.lock().handles.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryStore {
    type Key = MemoryKey;
    type Event = MemoryEvent;

    fn open_key(&self, root: RootKey, path: &str, access: Access) -> Result<MemoryKey> {
        let id = key_id(root, path);
        let mut registry = self.registry.lock();
        if !registry.exists(&id) {
            return Err(StoreError::NotFound { path: display_path(root, path) });
        }

        let handle = self.allocate();
        registry.handles.insert(handle, OpenKey { id, access, deleted: false });
        Ok(MemoryKey(handle))
    }

    fn create_key(&self, root: RootKey, path: &str) -> Result<MemoryKey> {
        let id = key_id(root, path);
        let mut registry = self.registry.lock();

        let mut prefix = String::new();
        for component in id.1.split('\\').filter(|c| !c.is_empty()) {
            let parent = (root, prefix.clone());
            if !prefix.is_empty() {
                prefix.push('\\');
            }
            prefix.push_str(component);

            let current = (root, prefix.clone());
            if !registry.keys.contains_key(&current) {
                registry.keys.insert(current, KeyNode::default());
                registry.fire(&parent, NotifyFilter::NAME);
            }
        }

        let handle = self.allocate();
        registry.handles.insert(handle, OpenKey { id, access: Access::All, deleted: false });
        Ok(MemoryKey(handle))
    }

    fn close_key(&self, key: MemoryKey) {
        let mut registry = self.registry.lock();
        if registry.handles.remove(&key.0).is_none() {
            return;
        }

        // Closing a watched handle signals its pending notifications
        let mut fired = Vec::new();
        registry.arms.retain(|arm| {
            if arm.handle == key.0 {
                fired.push(arm.event);
                false
            } else {
                true
            }
        });
        for event in fired {
            registry.signal(event);
        }
    }

    fn query_value(&self, key: MemoryKey, name: &str) -> Result<Option<Value>> {
        let registry = self.registry.lock();
        let id = registry.readable(key)?;
        Ok(registry
            .keys
            .get(&id)
            .and_then(|node| node.values.get(&name.to_lowercase()))
            .cloned())
    }

    fn set_value(&self, key: MemoryKey, name: &str, value: &Value) -> Result<()> {
        let mut registry = self.registry.lock();
        let id = registry.writable(key)?;
        registry
            .keys
            .entry(id.clone())
            .or_default()
            .values
            .insert(name.to_lowercase(), value.clone());
        registry.fire(&id, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn delete_value(&self, key: MemoryKey, name: &str) -> Result<()> {
        let mut registry = self.registry.lock();
        let id = registry.writable(key)?;
        let removed = registry
            .keys
            .get_mut(&id)
            .and_then(|node| node.values.remove(&name.to_lowercase()));
        if removed.is_none() {
            return Err(StoreError::NotFound { path: name.to_string() });
        }
        registry.fire(&id, NotifyFilter::LAST_SET);
        Ok(())
    }

    fn create_event(&self) -> Result<MemoryEvent> {
        let handle = self.allocate();
        self.registry.lock().events.insert(handle, EventSlot::new());
        Ok(MemoryEvent(handle))
    }

    fn close_event(&self, event: MemoryEvent) {
        self.registry.lock().events.remove(&event.0);
    }

    fn set_event(&self, event: MemoryEvent) -> Result<()> {
        let registry = self.registry.lock();
        let slot = registry.events.get(&event.0).ok_or(StoreError::InvalidHandle)?;
        slot.signal();
        Ok(())
    }

    fn reset_event(&self, event: MemoryEvent) -> Result<()> {
        let registry = self.registry.lock();
        let slot = registry.events.get(&event.0).ok_or(StoreError::InvalidHandle)?;
        slot.reset();
        Ok(())
    }

    fn notify_change(
        &self,
        key: MemoryKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: MemoryEvent,
    ) -> Result<()> {
        if filter.is_empty() {
            return Err(StoreError::InvalidParameter("empty notify filter"));
        }

        let mut registry = self.registry.lock();
        let id = registry.readable(key)?;
        if !registry.events.contains_key(&event.0) {
            return Err(StoreError::InvalidHandle);
        }

        registry.arms.retain(|arm| !(arm.handle == key.0 && arm.event == event.0));
        registry.arms.push(Arm {
            handle: key.0,
            id,
            subtree: watch_subtree,
            filter,
            event: event.0,
        });
        Ok(())
    }

    fn wait_any(&self, events: &[MemoryEvent]) -> Result<usize> {
        if events.is_empty() {
            return Err(StoreError::InvalidParameter("no events to wait on"));
        }

        let slots: Vec<(Sender<()>, Receiver<()>)> = {
            let registry = self.registry.lock();
            events
                .iter()
                .map(|event| {
                    registry
                        .events
                        .get(&event.0)
                        .map(|slot| (slot.tx.clone(), slot.rx.clone()))
                        .ok_or(StoreError::InvalidHandle)
                })
                .collect::<Result<_>>()?
        };

        if let Some(index) = slots.iter().position(|(_, rx)| rx.try_recv().is_ok()) {
            return Ok(index);
        }

        let mut select = Select::new();
        for (_, rx) in &slots {
            select.recv(rx);
        }
        let oper = select.select();
        let index = oper.index();
        if oper.recv(&slots[index].1).is_err() {
            return Err(StoreError::InvalidHandle);
        }

        // A lower index that became ready meanwhile takes precedence
        if let Some(lower) = slots[..index].iter().position(|(_, rx)| rx.try_recv().is_ok()) {
            let _ = slots[index].0.try_send(());
            return Ok(lower);
        }
        Ok(index)
    }
}
