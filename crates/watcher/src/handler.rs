//! The per-change hook

/// Application logic run once per detected change
///
/// `on_changed` runs on the watcher's worker thread while the watcher's lock
/// is held, so it never overlaps `start` or `stop`. It should re-read
/// whatever state it cares about and return promptly. Calling `start` or
/// `stop` on the same watcher from inside it deadlocks.
pub trait ChangeHandler: Send + 'static {
    fn on_changed(&mut self);
}

impl<F> ChangeHandler for F
where
    F: FnMut() + Send + 'static,
{
    fn on_changed(&mut self) {
        self()
    }
}
