//! Atomic token bucket rate limiting over a host key-value store.
//!
//! Each bucket lives under one key as a fixed-width binary record. Three
//! commands operate on it:
//!
//! - `tokenbucket.set name capacity rate [initial_tokens]` creates or replaces a bucket
//! - `tokenbucket.info name` returns the stored fields
//! - `tokenbucket.get name requested` lazily refills, then grants all or nothing
//!
//! Refill is computed on access from the wall clock: `rate` tokens per whole
//! elapsed second, capped at capacity. There is no background timer.
//!
//! # Layout
//!
//! - [`codec`]: record encoding and decoding
//! - [`pure`]: refill and consume arithmetic with no I/O
//! - [`store`]: the host store seam plus an in-memory implementation
//! - [`engine`]: the three operations, each one atomic unit against the store
//! - [`commands`]: argument parsing, the registration table, and replies
//! - [`config`]: TOML and environment configuration
//!
//! # Example
//!
//! ```
//! use tokenbucket::DeterministicHostStore;
//! use tokenbucket::Reply;
//! use tokenbucket::TokenBucketEngine;
//! use tokenbucket::dispatch;
//!
//! let engine = TokenBucketEngine::new(DeterministicHostStore::new());
//! assert_eq!(dispatch(&engine, &["tokenbucket.set", "api", "10", "1", "10"]), Reply::ok());
//! assert_eq!(dispatch(&engine, &["tokenbucket.get", "api", "4"]), Reply::Integer(4));
//! ```

pub mod codec;
pub mod commands;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod pure;
pub mod store;

pub use codec::RecordCodec;
pub use codec::RecordFormat;
pub use codec::TokenBucket;
pub use commands::COMMAND_TABLE;
pub use commands::CommandFlags;
pub use commands::CommandSpec;
pub use commands::Reply;
pub use commands::dispatch;
pub use commands::lookup;
pub use config::ConfigError;
pub use config::EngineConfig;
pub use engine::BucketOperations;
pub use engine::TokenBucketEngine;
pub use error::Argument;
pub use error::BucketError;
pub use error::ErrorCategory;
pub use pure::RefillPolicy;
pub use store::AccessMode;
pub use store::DeterministicHostStore;
pub use store::HostStore;
pub use store::HostStoreError;
pub use store::KeyAccess;
pub use store::KeyType;
pub use store::ValueKind;
pub use tokenbucket_time::SystemTimeProvider;
pub use tokenbucket_time::TimeProvider;
