//! Typed reads from one opened key
//!
//! Change handlers use a `KeyReader` to re-query the values they care about.
//! Reads never fail loudly: a closed reader, a missing value, a value of
//! another type and a store error all read as `None`.

use crate::error::Result;
use crate::guard::ResourceGuard;
use crate::store::{guard_key, Access, KeyStore};
use crate::target::RootKey;
use crate::value::{Value, ValueKind};
use std::sync::Arc;
use tracing::debug;

/// Reader over one key of a store
pub struct KeyReader<S: KeyStore> {
    store: Arc<S>,
    key: ResourceGuard<S::Key>,
}

impl<S: KeyStore> KeyReader<S> {
    /// A reader with no key open
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            key: ResourceGuard::invalid(),
        }
    }

    /// Open `root\path` for reading, closing any key opened before
    pub fn open(&mut self, root: RootKey, path: &str) -> Result<()> {
        self.close();
        let key = self.store.open_key(root, path, Access::Read)?;
        self.key = guard_key(&self.store, key);
        Ok(())
    }

    /// Shorthand for `new` followed by `open`
    pub fn open_new(store: Arc<S>, root: RootKey, path: &str) -> Result<Self> {
        let mut reader = Self::new(store);
        reader.open(root, path)?;
        Ok(reader)
    }

    pub fn close(&mut self) {
        self.key = ResourceGuard::invalid();
    }

    pub fn is_open(&self) -> bool {
        self.key.is_valid()
    }

    /// Read a REG_SZ value
    pub fn read_string(&self, name: &str) -> Option<String> {
        self.typed(name, ValueKind::String)?.as_str().map(str::to_owned)
    }

    /// Read a REG_DWORD value
    pub fn read_u32(&self, name: &str) -> Option<u32> {
        self.typed(name, ValueKind::U32)?.as_u32()
    }

    /// Read a REG_QWORD value
    pub fn read_u64(&self, name: &str) -> Option<u64> {
        self.typed(name, ValueKind::U64)?.as_u64()
    }

    /// Read a REG_BINARY value
    pub fn read_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.typed(name, ValueKind::Binary)?.as_bytes().map(<[u8]>::to_vec)
    }

    fn typed(&self, name: &str, expected: ValueKind) -> Option<Value> {
        let value = self.query(name)?;
        if value.kind() != expected {
            debug!(value = name, ?expected, found = ?value.kind(), data = %value, "Value has another type");
            return None;
        }
        Some(value)
    }

    fn query(&self, name: &str) -> Option<Value> {
        if !self.key.is_valid() {
            return None;
        }
        match self.store.query_value(self.key.get(), name) {
            Ok(value) => value,
            Err(e) => {
                debug!(value = name, error = %e, "Failed to read value");
                None
            }
        }
    }
}
