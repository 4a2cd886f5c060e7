//! Handler that reports how a DWORD value moved on every change

use crate::config::TargetConfig;
use keywatch_core::{KeyReader, KeyStore, RootKey};
use owo_colors::OwoColorize;
use std::fmt;
use std::sync::Arc;
use watcher::ChangeHandler;

/// What one change looked like from the value's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Changed { from: u32, to: u32 },
    /// The key or the value is gone, or holds something other than a DWORD
    Unreadable,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Changed { from, to } => write!(f, "changed from {} to {}", from, to),
            Observation::Unreadable => f.write_str("cannot read the value"),
        }
    }
}

/// Re-reads one value after each change and remembers the last good read
///
/// The key is reopened on every read so a deleted and recreated key is
/// picked up again.
pub struct ValueListener<S: KeyStore> {
    reader: KeyReader<S>,
    root: RootKey,
    path: String,
    value: String,
    last: u32,
}

impl<S: KeyStore> ValueListener<S> {
    /// Take the current value as the baseline, 0 if it cannot be read
    pub fn new(store: Arc<S>, target: &TargetConfig) -> Self {
        let mut listener = Self {
            reader: KeyReader::new(store),
            root: target.root,
            path: target.path.clone(),
            value: target.value.clone(),
            last: 0,
        };
        listener.last = listener.read().unwrap_or(0);
        listener
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    fn read(&mut self) -> Option<u32> {
        if let Err(e) = self.reader.open(self.root, &self.path) {
            tracing::debug!(root = %self.root, path = %self.path, error = %e, "Failed to open key");
            return None;
        }
        let value = self.reader.read_u32(&self.value);
        self.reader.close();
        value
    }

    pub fn observe(&mut self) -> Observation {
        match self.read() {
            Some(to) => {
                let from = std::mem::replace(&mut self.last, to);
                Observation::Changed { from, to }
            }
            None => Observation::Unreadable,
        }
    }
}

impl<S: KeyStore> ChangeHandler for ValueListener<S> {
    fn on_changed(&mut self) {
        match self.observe() {
            observation @ Observation::Changed { .. } => {
                println!("{} {}", "✓".green(), observation);
            }
            observation @ Observation::Unreadable => {
                println!("{} {}", "✗".red(), observation.yellow());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywatch_core::{MemoryStore, Value};

    fn target() -> TargetConfig {
        TargetConfig {
            root: RootKey::CurrentUser,
            path: "Software\\Keywatch\\Listener".to_string(),
            ..TargetConfig::default()
        }
    }

    #[test]
    fn test_baseline_and_changes() {
        let store = Arc::new(MemoryStore::new());
        let config = target();
        let key = store.create_key(config.root, &config.path).unwrap();
        store.set_value(key, &config.value, &Value::from(7u32)).unwrap();

        let mut listener = ValueListener::new(Arc::clone(&store), &config);
        assert_eq!(listener.last(), 7);

        store.set_value(key, &config.value, &Value::from(8u32)).unwrap();
        assert_eq!(listener.observe(), Observation::Changed { from: 7, to: 8 });
        assert_eq!(listener.observe().to_string(), "changed from 8 to 8");

        store.close_key(key);
        assert_eq!(store.open_handle_count(), 0);
    }

    #[test]
    fn test_missing_value_is_unreadable() {
        let store = Arc::new(MemoryStore::new());
        let config = target();

        let mut listener = ValueListener::new(Arc::clone(&store), &config);
        assert_eq!(listener.last(), 0);
        assert_eq!(listener.observe(), Observation::Unreadable);

        let key = store.create_key(config.root, &config.path).unwrap();
        store.set_value(key, &config.value, &Value::from("text")).unwrap();
        assert_eq!(listener.observe(), Observation::Unreadable);
        assert_eq!(listener.observe().to_string(), "cannot read the value");

        store.set_value(key, &config.value, &Value::from(3u32)).unwrap();
        assert_eq!(listener.observe(), Observation::Changed { from: 0, to: 3 });
        store.close_key(key);
    }

    #[test]
    fn test_recreated_key_is_read_again() {
        let store = Arc::new(MemoryStore::new());
        let config = target();
        let key = store.create_key(config.root, &config.path).unwrap();
        store.set_value(key, &config.value, &Value::from(1u32)).unwrap();
        store.close_key(key);

        let mut listener = ValueListener::new(Arc::clone(&store), &config);
        store.delete_key(config.root, &config.path).unwrap();
        assert_eq!(listener.observe(), Observation::Unreadable);

        let key = store.create_key(config.root, &config.path).unwrap();
        store.set_value(key, &config.value, &Value::from(2u32)).unwrap();
        assert_eq!(listener.observe(), Observation::Changed { from: 1, to: 2 });
        store.close_key(key);
    }
}
