//! Shared fixtures for watcher integration tests

use crossbeam_channel::{unbounded, Receiver, Sender};
use keywatch_core::{
    Access, KeyReader, KeyStore, MemoryEvent, MemoryKey, MemoryStore, NotifyFilter, Result,
    RootKey, StoreError, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use watcher::ChangeHandler;

pub const ROOT: RootKey = RootKey::LocalMachine;
pub const PATH: &str = "SOFTWARE\\Keywatch\\Test";
pub const VALUE: &str = "X";

/// How long to wait for something that should happen
pub const EXPECT: Duration = Duration::from_secs(5);
/// How long to wait before concluding something did not happen
pub const QUIET: Duration = Duration::from_millis(150);

/// A memory store with the test key created and a writer handle on it
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub writer: MemoryKey,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let writer = store.create_key(ROOT, PATH).unwrap();
        Self { store, writer }
    }

    pub fn write(&self, value: u32) {
        self.store.set_value(self.writer, VALUE, &Value::from(value)).unwrap();
    }

    /// Block until the watcher has (re-)armed its notification
    pub fn wait_armed(&self) {
        wait_until(|| self.store.armed_count(ROOT, PATH) > 0);
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.store.close_key(self.writer);
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + EXPECT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached within {:?}", EXPECT);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Handler that re-reads `X` on every change and reports what it saw
pub struct ValueProbe {
    reader: KeyReader<MemoryStore>,
    tx: Sender<Option<u32>>,
}

impl ValueProbe {
    pub fn new(store: &Arc<MemoryStore>) -> (Self, Receiver<Option<u32>>) {
        let (tx, rx) = unbounded();
        let reader = KeyReader::open_new(Arc::clone(store), ROOT, PATH).unwrap();
        (Self { reader, tx }, rx)
    }
}

impl ChangeHandler for ValueProbe {
    fn on_changed(&mut self) {
        let _ = self.tx.send(self.reader.read_u32(VALUE));
    }
}

/// Memory store whose first `n` waits fail before any event is consumed
pub struct FailingWaits {
    inner: Arc<MemoryStore>,
    failures_left: AtomicUsize,
}

impl FailingWaits {
    pub fn new(inner: &Arc<MemoryStore>, failures: usize) -> Self {
        Self {
            inner: Arc::clone(inner),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn failures_left(&self) -> usize {
        self.failures_left.load(Ordering::SeqCst)
    }
}

impl KeyStore for FailingWaits {
    type Key = MemoryKey;
    type Event = MemoryEvent;

    fn open_key(&self, root: RootKey, path: &str, access: Access) -> Result<MemoryKey> {
        self.inner.open_key(root, path, access)
    }

    fn create_key(&self, root: RootKey, path: &str) -> Result<MemoryKey> {
        self.inner.create_key(root, path)
    }

    fn close_key(&self, key: MemoryKey) {
        self.inner.close_key(key)
    }

    fn query_value(&self, key: MemoryKey, name: &str) -> Result<Option<Value>> {
        self.inner.query_value(key, name)
    }

    fn set_value(&self, key: MemoryKey, name: &str, value: &Value) -> Result<()> {
        self.inner.set_value(key, name, value)
    }

    fn delete_value(&self, key: MemoryKey, name: &str) -> Result<()> {
        self.inner.delete_value(key, name)
    }

    fn create_event(&self) -> Result<MemoryEvent> {
        self.inner.create_event()
    }

    fn close_event(&self, event: MemoryEvent) {
        self.inner.close_event(event)
    }

    fn set_event(&self, event: MemoryEvent) -> Result<()> {
        self.inner.set_event(event)
    }

    fn reset_event(&self, event: MemoryEvent) -> Result<()> {
        self.inner.reset_event(event)
    }

    fn notify_change(
        &self,
        key: MemoryKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: MemoryEvent,
    ) -> Result<()> {
        self.inner.notify_change(key, watch_subtree, filter, event)
    }

    fn wait_any(&self, events: &[MemoryEvent]) -> Result<usize> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Os { op: "WaitForMultipleObjects", code: 6 });
        }
        self.inner.wait_any(events)
    }
}
