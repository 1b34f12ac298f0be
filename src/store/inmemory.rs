//! In-memory deterministic host store.
//!
//! Stands in for the real host in tests and in the CLI. One mutex guards the
//! whole keyspace, so commands execute strictly one after another, the same
//! serialized order a single-threaded host gives.
//!
//! # Limitations
//!
//! - No persistence, replication, or expiry
//! - Foreign values carry only their kind, not their contents

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::AccessMode;
use super::HostStore;
use super::HostStoreError;
use super::KeyAccess;
use super::KeyType;
use super::ValueKind;
use crate::constants::DEFAULT_MAX_NAME_SIZE;

/// A value held by [`DeterministicHostStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Byte string.
    String(Vec<u8>),
    /// Value of another kind.
    Foreign(ValueKind),
}

/// In-memory implementation of [`HostStore`].
///
/// ```
/// use tokenbucket::store::AccessMode;
/// use tokenbucket::store::DeterministicHostStore;
/// use tokenbucket::store::HostStore;
///
/// let store = DeterministicHostStore::new();
/// store.execute("k", AccessMode::ReadWrite, |key| key.replace(b"v".to_vec())).unwrap().unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug)]
pub struct DeterministicHostStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    max_key_size: u32,
}

impl Default for DeterministicHostStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_key_size: DEFAULT_MAX_NAME_SIZE,
        }
    }
}

impl DeterministicHostStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty store that rejects keys longer than `max_key_size` bytes.
    pub fn with_max_key_size(max_key_size: u32) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            max_key_size,
        })
    }

    /// Plant a non-string value at `key`.
    pub fn insert_foreign(&self, key: impl Into<String>, kind: ValueKind) {
        self.entries.lock().insert(key.into(), StoredValue::Foreign(kind));
    }

    /// Plant raw string bytes at `key`, bypassing any encoding.
    pub fn insert_raw(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.lock().insert(key.into(), StoredValue::String(bytes.into()));
    }

    /// Snapshot of the value at `key`.
    pub fn get(&self, key: &str) -> Option<StoredValue> {
        self.entries.lock().get(key).cloned()
    }

    /// Remove `key`; true if something was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn validate_key(&self, key: &str) -> Result<(), HostStoreError> {
        if key.is_empty() {
            return Err(HostStoreError::EmptyKey);
        }
        if key.len() > self.max_key_size as usize {
            return Err(HostStoreError::KeyTooLarge {
                size: key.len(),
                max: self.max_key_size,
            });
        }
        Ok(())
    }
}

impl HostStore for DeterministicHostStore {
    fn execute<R, F>(&self, key: &str, mode: AccessMode, op: F) -> Result<R, HostStoreError>
    where
        F: FnOnce(&mut dyn KeyAccess) -> R,
    {
        self.validate_key(key)?;
        let mut entries = self.entries.lock();
        let mut handle = MemoryKey {
            key,
            mode,
            entries: &mut *entries,
        };
        Ok(op(&mut handle))
    }
}

/// Key handle over the locked map.
struct MemoryKey<'a> {
    key: &'a str,
    mode: AccessMode,
    entries: &'a mut HashMap<String, StoredValue>,
}

impl MemoryKey<'_> {
    fn ensure_writable(&self) -> Result<(), HostStoreError> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::Read => Err(HostStoreError::ReadOnly {
                key: self.key.to_string(),
            }),
        }
    }
}

impl KeyAccess for MemoryKey<'_> {
    fn key(&self) -> &str {
        self.key
    }

    fn key_type(&self) -> KeyType {
        match self.entries.get(self.key) {
            None => KeyType::Empty,
            Some(StoredValue::String(_)) => KeyType::String,
            Some(StoredValue::Foreign(kind)) => KeyType::Foreign(*kind),
        }
    }

    fn read(&self) -> Option<&[u8]> {
        match self.entries.get(self.key) {
            Some(StoredValue::String(bytes)) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    fn write_in_place(&mut self) -> Result<Option<&mut [u8]>, HostStoreError> {
        self.ensure_writable()?;
        Ok(match self.entries.get_mut(self.key) {
            Some(StoredValue::String(bytes)) => Some(bytes.as_mut_slice()),
            _ => None,
        })
    }

    fn replace(&mut self, bytes: Vec<u8>) -> Result<(), HostStoreError> {
        self.ensure_writable()?;
        self.entries.insert(self.key.to_string(), StoredValue::String(bytes));
        Ok(())
    }
}
