//! Watcher lifecycle states

use std::fmt;

/// Where a `ChangeWatcher` is in its lifecycle
///
/// ```text
/// Uninitialized            (construction failed, terminal)
/// Ready ──start──▶ Running ──stop──▶ Stopping ──ack──▶ Stopped
///                     ▲                                   │
///                     └──────────────start────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Uninitialized,
    Ready,
    Running,
    /// Cancellation signaled, worker acknowledgement outstanding
    Stopping,
    Stopped,
}

impl WatchState {
    /// Whether a worker thread may exist in this state
    pub fn has_worker(self) -> bool {
        matches!(self, WatchState::Running | WatchState::Stopping)
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchState::Uninitialized => "uninitialized",
            WatchState::Ready => "ready",
            WatchState::Running => "running",
            WatchState::Stopping => "stopping",
            WatchState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
