//! The change watcher state machine
//!
//! A `ChangeWatcher` owns the opened target key and two auto-reset events:
//! the notification event the store signals on a change, and a cancellation
//! event only `stop` signals. The worker waits on both with no timeout, with
//! cancellation first so it wins when both are ready:
//!
//! ```text
//! loop {
//!     wait_any([cancel, notify])
//!       cancel -> exit
//!       notify -> lock; exit if cancel requested; on_changed(); unlock
//!                 re-arm; exit on failure
//! }
//! acknowledge exit (condvar)
//! ```
//!
//! `start`, `stop` and the callback share one mutex. `stop` records the
//! cancellation request under that mutex before signaling, and the worker
//! re-checks it under the same mutex before calling the handler, so no
//! callback begins once `stop` has started. `stop` then waits for the
//! worker's acknowledgement on a condvar, which releases the mutex and lets a
//! callback already past the check finish first.
//!
//! A re-arm failure inside the worker ends the session without telling the
//! owner: the failure is logged and the state still reads `Running`. This is
//! the weakest point of the design; nothing outside the log shows that the
//! watcher has gone deaf.

use crate::error::WatchError;
use crate::handler::ChangeHandler;
use crate::state::WatchState;
use keywatch_core::{guard_event, guard_key, Access, KeyStore, ResourceGuard, StoreError, WatchTarget};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Index of the cancellation event in the worker's wait set
const CANCEL: usize = 0;
/// Index of the change notification event in the worker's wait set
const NOTIFY: usize = 1;

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Cancelled,
    ArmFailed,
    Panicked,
}

struct Shared {
    state: WatchState,
    cancel_requested: bool,
    worker: Option<JoinHandle<()>>,
    worker_done: bool,
    last_exit: Option<WorkerExit>,
    handler: Box<dyn ChangeHandler>,
}

struct Inner<S: KeyStore> {
    store: Arc<S>,
    target: WatchTarget,
    key: ResourceGuard<S::Key>,
    notify_event: ResourceGuard<S::Event>,
    cancel_event: ResourceGuard<S::Event>,
    init_error: Option<StoreError>,
    shared: Mutex<Shared>,
    acknowledged: Condvar,
}

type Resources<S> = (
    ResourceGuard<<S as KeyStore>::Key>,
    ResourceGuard<<S as KeyStore>::Event>,
    ResourceGuard<<S as KeyStore>::Event>,
);

/// Watches one key and calls a handler for every change
///
/// Dropping the watcher stops it.
pub struct ChangeWatcher<S: KeyStore> {
    inner: Arc<Inner<S>>,
}

impl<S: KeyStore> ChangeWatcher<S> {
    /// Open the target key and allocate the wait events
    ///
    /// Never fails outright: if the key cannot be opened or an event cannot
    /// be created, the watcher stays `Uninitialized` for good and `start`
    /// always returns `false`. Check `is_initialized` before relying on it.
    pub fn new<H: ChangeHandler>(store: Arc<S>, target: WatchTarget, handler: H) -> Self {
        let resources = Self::open_resources(&store, &target);
        if let Err(e) = &resources {
            warn!(key = %target, error = %e, "Failed to initialize change watcher");
        }
        Self::assemble(store, target, Box::new(handler), resources)
    }

    /// Like `new`, but reports initialization failure as an error
    pub fn try_new<H: ChangeHandler>(store: Arc<S>, target: WatchTarget, handler: H) -> Result<Self, WatchError> {
        let resources = Self::open_resources(&store, &target).map_err(WatchError::Initialization)?;
        Ok(Self::assemble(store, target, Box::new(handler), Ok(resources)))
    }

    fn open_resources(store: &Arc<S>, target: &WatchTarget) -> Result<Resources<S>, StoreError> {
        let key = store.open_key(target.root(), target.path(), Access::Read)?;
        let key = guard_key(store, key);
        let notify_event = guard_event(store, store.create_event()?);
        let cancel_event = guard_event(store, store.create_event()?);
        Ok((key, notify_event, cancel_event))
    }

    fn assemble(
        store: Arc<S>,
        target: WatchTarget,
        handler: Box<dyn ChangeHandler>,
        resources: Result<Resources<S>, StoreError>,
    ) -> Self {
        let (key, notify_event, cancel_event, init_error, state) = match resources {
            Ok((key, notify_event, cancel_event)) => (key, notify_event, cancel_event, None, WatchState::Ready),
            Err(e) => (
                ResourceGuard::invalid(),
                ResourceGuard::invalid(),
                ResourceGuard::invalid(),
                Some(e),
                WatchState::Uninitialized,
            ),
        };

        debug!(key = %target, %state, "Change watcher created");

        Self {
            inner: Arc::new(Inner {
                store,
                target,
                key,
                notify_event,
                cancel_event,
                init_error,
                shared: Mutex::new(Shared {
                    state,
                    cancel_requested: false,
                    worker: None,
                    worker_done: true,
                    last_exit: None,
                    handler,
                }),
                acknowledged: Condvar::new(),
            }),
        }
    }

    /// Arm the notification and spawn the worker
    ///
    /// Returns `false` if the watcher is uninitialized, if arming fails, or
    /// while a timed-out `stop_timeout` is still pending.
    ///
    /// Calling `start` on a running watcher returns `true` and leaves the
    /// existing worker alone: the watcher is running, which is what the
    /// caller asked for. There is never more than one worker.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();

        match shared.state {
            WatchState::Uninitialized => {
                debug!(key = %inner.target, "Start refused: watcher is not initialized");
                return false;
            }
            WatchState::Running => return true,
            WatchState::Stopping => {
                debug!(key = %inner.target, "Start refused: previous stop not acknowledged");
                return false;
            }
            WatchState::Ready | WatchState::Stopped => {}
        }

        if let Err(e) = inner.arm_fresh() {
            warn!(key = %inner.target, error = %e, "Failed to start change watcher");
            return false;
        }

        shared.cancel_requested = false;
        shared.worker_done = false;
        shared.last_exit = None;

        let worker = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name("keywatch-worker".to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => shared.worker = Some(handle),
            Err(e) => {
                warn!(key = %inner.target, error = %e, "Failed to spawn watcher thread");
                shared.worker_done = true;
                return false;
            }
        }

        shared.state = WatchState::Running;
        debug!(key = %inner.target, "Change watcher started");
        true
    }

    /// Cancel the worker and wait until it has exited
    ///
    /// A no-op unless the watcher is running (or a `stop_timeout` timed out).
    /// Waits without bound; a handler that never returns blocks `stop`.
    pub fn stop(&self) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();
        if !inner.request_cancel(&mut shared) {
            return;
        }

        while !shared.worker_done {
            inner.acknowledged.wait(&mut shared);
        }
        inner.finish_stop(&mut shared);
    }

    /// Like `stop`, but gives up after `timeout`
    ///
    /// The deadline covers both taking the lock (a running handler holds it)
    /// and the worker's acknowledgement. If the lock was never taken nothing
    /// changes. If cancellation was requested but not acknowledged, the
    /// watcher stays `Stopping` and keeps the worker's join handle: a later
    /// `stop` (or dropping the watcher) completes the join. The key and
    /// events outlive the worker either way.
    pub fn stop_timeout(&self, timeout: Duration) -> Result<(), WatchError> {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let Some(mut shared) = inner.shared.try_lock_until(deadline) else {
            warn!(key = %inner.target, ?timeout, "Change handler held the watcher lock past the stop deadline");
            return Err(WatchError::StopTimeout(timeout));
        };
        if !inner.request_cancel(&mut shared) {
            return Ok(());
        }

        while !shared.worker_done {
            if inner.acknowledged.wait_until(&mut shared, deadline).timed_out() && !shared.worker_done {
                warn!(key = %inner.target, ?timeout, "Watcher worker did not acknowledge stop in time");
                return Err(WatchError::StopTimeout(timeout));
            }
        }
        inner.finish_stop(&mut shared);
        Ok(())
    }

    pub fn state(&self) -> WatchState {
        self.inner.shared.lock().state
    }

    /// False if construction failed
    pub fn is_initialized(&self) -> bool {
        self.inner.init_error.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WatchState::Running
    }

    /// Why construction failed, if it did
    pub fn init_error(&self) -> Option<&StoreError> {
        self.inner.init_error.as_ref()
    }

    pub fn target(&self) -> &WatchTarget {
        &self.inner.target
    }
}

impl<S: KeyStore> Drop for ChangeWatcher<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: KeyStore> Inner<S> {
    /// Arm the one-shot notification on the target key
    fn arm(&self) -> Result<(), StoreError> {
        self.store.notify_change(
            self.key.get(),
            self.target.is_subtree(),
            self.target.notify_filter(),
            self.notify_event.get(),
        )
    }

    /// Clear stale signals from a previous session, then arm
    fn arm_fresh(&self) -> Result<(), WatchError> {
        self.store.reset_event(self.cancel_event.get()).map_err(WatchError::Arm)?;
        self.store.reset_event(self.notify_event.get()).map_err(WatchError::Arm)?;
        self.arm().map_err(WatchError::Arm)
    }

    /// Mark cancellation and wake the worker
    ///
    /// Returns false if there is no worker to wait for.
    fn request_cancel(&self, shared: &mut Shared) -> bool {
        if !shared.state.has_worker() {
            return false;
        }
        if shared.state == WatchState::Stopping {
            return true;
        }

        shared.state = WatchState::Stopping;
        shared.cancel_requested = true;

        if let Err(e) = self.store.set_event(self.cancel_event.get()) {
            // The worker also checks the flag after a notify wakeup
            warn!(key = %self.target, error = %e, "Failed to signal cancellation event");
            if let Err(e) = self.store.set_event(self.notify_event.get()) {
                error!(key = %self.target, error = %e, "Failed to wake watcher worker");
            }
        }
        true
    }

    fn finish_stop(&self, shared: &mut Shared) {
        if let Some(handle) = shared.worker.take() {
            if handle.join().is_err() {
                warn!(key = %self.target, "Watcher worker panicked");
            }
        }
        shared.state = WatchState::Stopped;
        debug!(key = %self.target, exit = ?shared.last_exit, "Change watcher stopped");
    }

    fn run(self: Arc<Self>) {
        let mut ack = Acknowledge {
            inner: &*self,
            exit: WorkerExit::Panicked,
        };
        ack.exit = self.watch_loop();
    }

    fn watch_loop(&self) -> WorkerExit {
        let events = [self.cancel_event.get(), self.notify_event.get()];

        loop {
            match self.store.wait_any(&events) {
                Ok(CANCEL) => return WorkerExit::Cancelled,
                Ok(NOTIFY) => {}
                Ok(index) => {
                    warn!(key = %self.target, index, "Unexpected wait index, ignoring wakeup");
                    continue;
                }
                Err(e) => {
                    let e = WatchError::Wait(e);
                    warn!(key = %self.target, error = %e, "Spurious wakeup");
                    continue;
                }
            }

            trace!(key = %self.target, "Change notification received");
            {
                let mut shared = self.shared.lock();
                if shared.cancel_requested {
                    return WorkerExit::Cancelled;
                }
                shared.handler.on_changed();
            }

            if let Err(e) = self.arm() {
                let e = WatchError::Arm(e);
                error!(key = %self.target, error = %e, "Re-arm failed, watcher no longer observing changes");
                return WorkerExit::ArmFailed;
            }
        }
    }
}

/// Reports worker exit to `stop`, including when the handler panics
struct Acknowledge<'a, S: KeyStore> {
    inner: &'a Inner<S>,
    exit: WorkerExit,
}

impl<S: KeyStore> Drop for Acknowledge<'_, S> {
    fn drop(&mut self) {
        let mut shared = self.inner.shared.lock();
        shared.worker_done = true;
        shared.last_exit = Some(self.exit);
        self.inner.acknowledged.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywatch_core::{MemoryStore, NotifyFilter, RootKey, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PATH: &str = "Software\\Keywatch\\Unit";

    fn store_with_key() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let key = store.create_key(RootKey::CurrentUser, PATH).unwrap();
        store.close_key(key);
        store
    }

    fn target() -> WatchTarget {
        WatchTarget::new(RootKey::CurrentUser, PATH)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_lifecycle_states() {
        let store = store_with_key();
        let watcher = ChangeWatcher::new(Arc::clone(&store), target(), || {});
        assert_eq!(watcher.state(), WatchState::Ready);

        assert!(watcher.start());
        assert_eq!(watcher.state(), WatchState::Running);
        assert_eq!(store.armed_count(RootKey::CurrentUser, PATH), 1);

        watcher.stop();
        assert_eq!(watcher.state(), WatchState::Stopped);
        assert!(watcher.inner.shared.lock().worker.is_none());
    }

    #[test]
    fn test_double_start_keeps_single_worker() {
        let store = store_with_key();
        let watcher = ChangeWatcher::new(Arc::clone(&store), target(), || {});
        assert!(watcher.start());
        let first = watcher.inner.shared.lock().worker.as_ref().map(|h| h.thread().id());

        assert!(watcher.start());
        let second = watcher.inner.shared.lock().worker.as_ref().map(|h| h.thread().id());
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(store.armed_count(RootKey::CurrentUser, PATH), 1);
    }

    #[test]
    fn test_resources_released_on_drop() {
        let store = store_with_key();
        let watcher = ChangeWatcher::new(Arc::clone(&store), target(), || {});
        assert!(watcher.start());
        assert_eq!(store.open_handle_count(), 1);

        drop(watcher);
        assert_eq!(store.open_handle_count(), 0);
    }

    #[test]
    fn test_failed_init_keeps_error() {
        let store = Arc::new(MemoryStore::new());
        let watcher = ChangeWatcher::new(store, target(), || {});
        assert_eq!(watcher.state(), WatchState::Uninitialized);
        assert!(matches!(watcher.init_error(), Some(StoreError::NotFound { .. })));
        assert!(!watcher.inner.key.is_valid());
        assert!(!watcher.inner.notify_event.is_valid());
    }

    #[test]
    fn test_try_new_reports_initialization_error() {
        let store = Arc::new(MemoryStore::new());
        let result = ChangeWatcher::try_new(store, target(), || {});
        assert!(matches!(result, Err(WatchError::Initialization(StoreError::NotFound { .. }))));
    }

    #[test]
    fn test_stale_cancel_signal_cleared_on_restart() {
        let store = store_with_key();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = ChangeWatcher::new(Arc::clone(&store), target(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(watcher.start());
        watcher.stop();

        // Leftover cancellation signal must not end the next session early
        store.set_event(watcher.inner.cancel_event.get()).unwrap();
        assert!(watcher.start());

        let writer = store.open_key(RootKey::CurrentUser, PATH, Access::Write).unwrap();
        store.set_value(writer, "x", &Value::from(1u32)).unwrap();
        wait_for(|| calls.load(Ordering::SeqCst) == 1);
        assert!(watcher.is_running());
    }

    #[test]
    fn test_worker_exit_reason_recorded() {
        let store = store_with_key();
        let watcher = ChangeWatcher::new(Arc::clone(&store), target(), || {});
        assert!(watcher.start());
        watcher.stop();
        assert_eq!(watcher.inner.shared.lock().last_exit, Some(WorkerExit::Cancelled));
    }

    #[test]
    fn test_panicking_handler_still_acknowledges_stop() {
        let store = store_with_key();
        struct Panics;

        impl ChangeHandler for Panics {
            fn on_changed(&mut self) {
                panic!("handler failure");
            }
        }

        let watcher = ChangeWatcher::new(Arc::clone(&store), target().filter(NotifyFilter::LAST_SET), Panics);
        assert!(watcher.start());

        let writer = store.open_key(RootKey::CurrentUser, PATH, Access::Write).unwrap();
        store.set_value(writer, "x", &Value::from(1u32)).unwrap();
        wait_for(|| watcher.inner.shared.lock().worker_done);

        watcher.stop();
        assert_eq!(watcher.state(), WatchState::Stopped);
        assert_eq!(watcher.inner.shared.lock().last_exit, Some(WorkerExit::Panicked));
    }
}
