//! Seam to the host key-value store.
//!
//! The engine never owns bucket bytes; the host does. What the engine needs from
//! the host is small:
//!
//! - a byte string value per key,
//! - exclusive access to one key for the duration of one command,
//! - the ability to read and overwrite those bytes in place.
//!
//! [`HostStore::execute`] is that contract. Everything the closure does through
//! [`KeyAccess`] happens inside one atomic unit; no other command touching the
//! same key can interleave with it.

mod inmemory;

pub use inmemory::DeterministicHostStore;
pub use inmemory::StoredValue;
use thiserror::Error;

/// How a command intends to touch its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read only; mutation through [`KeyAccess`] fails.
    Read,
    /// Read and write.
    ReadWrite,
}

/// Kind of value held by a non-string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    List,
    Hash,
    Set,
    SortedSet,
    Stream,
    Module,
}

/// What currently lives at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Nothing is stored.
    Empty,
    /// A plain byte string.
    String,
    /// Some other kind of value the engine cannot interpret.
    Foreign(ValueKind),
}

/// Errors raised by the host store itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostStoreError {
    #[error("key cannot be empty")]
    EmptyKey,
    #[error("key size {size} exceeds maximum of {max} bytes")]
    KeyTooLarge { size: usize, max: u32 },
    #[error("key '{key}' was opened read-only")]
    ReadOnly { key: String },
    #[error("operation failed: {reason}")]
    Failed { reason: String },
}

/// Access to one key, valid for the duration of a single [`HostStore::execute`] call.
pub trait KeyAccess {
    /// Key this handle was opened on.
    fn key(&self) -> &str;

    /// Type of the current value.
    fn key_type(&self) -> KeyType;

    /// Raw bytes of a string value; `None` for empty or foreign keys.
    fn read(&self) -> Option<&[u8]>;

    /// Mutable raw bytes of an existing string value.
    ///
    /// `Ok(None)` when the key is empty or not a string.
    fn write_in_place(&mut self) -> Result<Option<&mut [u8]>, HostStoreError>;

    /// Store `bytes` as a string value, replacing any previous string value.
    fn replace(&mut self, bytes: Vec<u8>) -> Result<(), HostStoreError>;
}

/// A host store that can run a closure with exclusive access to a key.
pub trait HostStore: Send + Sync {
    /// Run `op` as one atomic unit against `key`.
    ///
    /// Fails before `op` runs when the key itself is unacceptable to the host.
    fn execute<R, F>(&self, key: &str, mode: AccessMode, op: F) -> Result<R, HostStoreError>
    where
        F: FnOnce(&mut dyn KeyAccess) -> R;
}

impl<T: HostStore + ?Sized> HostStore for std::sync::Arc<T> {
    fn execute<R, F>(&self, key: &str, mode: AccessMode, op: F) -> Result<R, HostStoreError>
    where
        F: FnOnce(&mut dyn KeyAccess) -> R,
    {
        (**self).execute(key, mode, op)
    }
}
