//! Fixed limits and names for the token bucket module.
//!
//! Every bound here is a compile-time constant so that no request can make the
//! engine allocate or loop without limit.

/// Name the module registers under; every command is prefixed with it.
pub const MODULE_NAME: &str = "tokenbucket";

/// Module API version reported to the host.
pub const MODULE_VERSION: u32 = 1;

/// Width of each encoded record field in bytes.
pub const FIELD_WIDTH: usize = 8;

/// Number of fields in a bucket record.
pub const FIELD_COUNT: usize = 4;

/// Length of a record without a version prefix.
pub const LEGACY_RECORD_LEN: usize = FIELD_WIDTH * FIELD_COUNT;

/// Length of a record carrying a one-byte version prefix.
pub const VERSIONED_RECORD_LEN: usize = LEGACY_RECORD_LEN + 1;

/// Only record version currently understood by the versioned format.
pub const RECORD_VERSION_0: u8 = 0;

/// Default maximum bucket name size in bytes.
pub const DEFAULT_MAX_NAME_SIZE: u32 = 1024;

/// Hard ceiling for the configurable bucket name size (1 MB).
pub const MAX_NAME_SIZE_CEILING: u32 = 1024 * 1024;

/// Maximum number of arguments any command accepts, command name included.
pub const MAX_COMMAND_ARGS: usize = 5;

// Compile-time relationships between the layout constants.
const _: () = assert!(LEGACY_RECORD_LEN == 32);
const _: () = assert!(VERSIONED_RECORD_LEN == LEGACY_RECORD_LEN + 1);
const _: () = assert!(DEFAULT_MAX_NAME_SIZE <= MAX_NAME_SIZE_CEILING);
