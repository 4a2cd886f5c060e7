//! Watcher error taxonomy

use keywatch_core::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failures of the change watcher
///
/// Only `Initialization` and `StopTimeout` ever reach a caller as values.
/// `Arm` becomes a `false` from `start`, or ends a running session silently
/// when re-arming fails in the worker. `Wait` is logged and the worker keeps
/// waiting.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Opening the key or allocating an event failed
    #[error("failed to initialize watcher: {0}")]
    Initialization(#[source] StoreError),

    /// Arming the change notification failed
    #[error("failed to arm change notification: {0}")]
    Arm(#[source] StoreError),

    /// The blocking wait returned something other than a signal
    #[error("unexpected wait result: {0}")]
    Wait(#[source] StoreError),

    /// The worker did not acknowledge cancellation in time
    #[error("worker did not acknowledge stop within {0:?}")]
    StopTimeout(Duration),
}
