//! Token bucket engine.
//!
//! Three operations against a bucket stored in a [`HostStore`]:
//!
//! - [`TokenBucketEngine::initialize`]: create or replace a bucket
//! - [`TokenBucketEngine::inspect`]: read the stored fields verbatim
//! - [`TokenBucketEngine::consume`]: lazily refill, then take tokens all-or-nothing
//!
//! Each operation runs its whole read-decode-compute-encode-write sequence inside
//! a single [`HostStore::execute`] call. The engine itself holds no locks and never
//! retries; correctness under concurrent callers rests on the host running one
//! command per key at a time.

use std::sync::Arc;

use snafu::ResultExt;
use snafu::ensure;
use tokenbucket_time::SystemTimeProvider;
use tokenbucket_time::TimeProvider;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::codec::RecordCodec;
use crate::codec::TokenBucket;
use crate::config::EngineConfig;
use crate::error::Argument;
use crate::error::BucketError;
use crate::error::ClockRegressionSnafu;
use crate::error::InvalidArgumentSnafu;
use crate::error::MalformedRecordSnafu;
use crate::error::NotFoundSnafu;
use crate::error::TypeConflictSnafu;
use crate::pure::ConsumeDecision;
use crate::pure::RefillPolicy;
use crate::pure::apply_consume;
use crate::store::AccessMode;
use crate::store::HostStore;
use crate::store::KeyAccess;
use crate::store::KeyType;

/// Token bucket operations over a host store.
pub struct TokenBucketEngine<S: HostStore + ?Sized, T: TimeProvider = SystemTimeProvider> {
    store: Arc<S>,
    clock: T,
    codec: RecordCodec,
    refill_policy: RefillPolicy,
}

impl<S: HostStore + ?Sized> TokenBucketEngine<S, SystemTimeProvider> {
    /// Engine on the system clock with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemTimeProvider)
    }
}

impl<S: HostStore + ?Sized, T: TimeProvider> TokenBucketEngine<S, T> {
    /// Engine on an explicit clock with default configuration.
    pub fn with_clock(store: Arc<S>, clock: T) -> Self {
        Self::from_config(store, clock, &EngineConfig::default())
    }

    /// Engine on an explicit clock and configuration.
    pub fn from_config(store: Arc<S>, clock: T, config: &EngineConfig) -> Self {
        Self {
            store,
            clock,
            codec: RecordCodec::new(config.record_format),
            refill_policy: config.refill_policy,
        }
    }

    /// Store the engine operates on.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create or fully replace the bucket `name`.
    ///
    /// `initial_tokens` defaults to 0. Arguments are validated before the
    /// store is touched.
    pub fn initialize(
        &self,
        name: &str,
        capacity: i64,
        rate: i64,
        initial_tokens: Option<i64>,
    ) -> Result<(), BucketError> {
        let max_permits = non_negative(Argument::Capacity, capacity)?;
        let rate = non_negative(Argument::Rate, rate)?;
        let curr_permits = match initial_tokens {
            Some(initial) => {
                let initial = non_negative(Argument::InitialTokens, initial)?;
                ensure!(
                    initial <= max_permits,
                    InvalidArgumentSnafu {
                        argument: Argument::InitialTokens,
                        reason: format!("{initial} exceeds capacity {max_permits}"),
                    }
                );
                initial
            }
            None => 0,
        };

        self.store.execute(name, AccessMode::ReadWrite, |key| -> Result<(), BucketError> {
            match key.key_type() {
                KeyType::Empty | KeyType::String => {}
                KeyType::Foreign(kind) => {
                    return TypeConflictSnafu {
                        name,
                        found: format!("{kind:?}").to_lowercase(),
                    }
                    .fail();
                }
            }

            let bucket = TokenBucket {
                update_time: self.clock.now_unix_ms(),
                max_permits,
                curr_permits,
                rate,
            };
            key.replace(self.codec.encode(&bucket))?;
            info!(
                bucket = %name,
                capacity = max_permits,
                rate,
                initial = curr_permits,
                "token bucket initialized"
            );
            Ok(())
        })?
    }

    /// Stored fields of bucket `name`, without projecting refill.
    pub fn inspect(&self, name: &str) -> Result<TokenBucket, BucketError> {
        self.store.execute(name, AccessMode::Read, |key| self.load(key))?
    }

    /// Take `requested` tokens from bucket `name`.
    ///
    /// Returns `requested` if the bucket, after lazy refill, holds at least
    /// that many, and 0 otherwise. The refilled state is written back in both
    /// cases; on clock regression nothing is written.
    pub fn consume(&self, name: &str, requested: i64) -> Result<u64, BucketError> {
        let requested = non_negative(Argument::Requested, requested)?;

        self.store.execute(name, AccessMode::ReadWrite, |key| -> Result<u64, BucketError> {
            let stored = self.load(key)?;
            let now_ms = self.clock.now_unix_ms();

            let Some(outcome) = apply_consume(&stored, requested, now_ms, self.refill_policy) else {
                warn!(
                    bucket = %name,
                    now_ms,
                    update_time_ms = stored.update_time,
                    "clock regression; refusing to consume"
                );
                return ClockRegressionSnafu {
                    name,
                    now_ms,
                    update_time_ms: stored.update_time,
                }
                .fail();
            };

            let written_in_place = match key.write_in_place()? {
                Some(buf) => self.codec.encode_into(&outcome.bucket, buf).is_ok(),
                None => false,
            };
            if !written_in_place {
                key.replace(self.codec.encode(&outcome.bucket))?;
            }

            match outcome.decision {
                ConsumeDecision::Granted { granted, remaining } => {
                    debug!(bucket = %name, granted, remaining, "tokens granted");
                }
                ConsumeDecision::Denied { available } => {
                    debug!(bucket = %name, requested, available, "tokens denied");
                }
            }
            Ok(outcome.decision.granted())
        })?
    }

    /// Decode the bucket under `key`, enforcing type and length.
    fn load(&self, key: &dyn KeyAccess) -> Result<TokenBucket, BucketError> {
        let name = key.key().to_string();
        match key.key_type() {
            KeyType::String => {}
            KeyType::Empty => return NotFoundSnafu { name }.fail(),
            KeyType::Foreign(kind) => {
                return TypeConflictSnafu {
                    name,
                    found: format!("{kind:?}").to_lowercase(),
                }
                .fail();
            }
        }
        let bytes = key.read().unwrap_or_default();
        self.codec.decode(bytes).context(MalformedRecordSnafu { name })
    }
}

/// Object-safe view of the three bucket operations.
///
/// Command handlers take `&dyn BucketOperations` so the registration table
/// can hold plain function pointers regardless of store and clock types.
pub trait BucketOperations {
    /// See [`TokenBucketEngine::initialize`].
    fn initialize(&self, name: &str, capacity: i64, rate: i64, initial_tokens: Option<i64>)
    -> Result<(), BucketError>;

    /// See [`TokenBucketEngine::inspect`].
    fn inspect(&self, name: &str) -> Result<TokenBucket, BucketError>;

    /// See [`TokenBucketEngine::consume`].
    fn consume(&self, name: &str, requested: i64) -> Result<u64, BucketError>;
}

impl<S: HostStore + ?Sized, T: TimeProvider> BucketOperations for TokenBucketEngine<S, T> {
    fn initialize(
        &self,
        name: &str,
        capacity: i64,
        rate: i64,
        initial_tokens: Option<i64>,
    ) -> Result<(), BucketError> {
        TokenBucketEngine::initialize(self, name, capacity, rate, initial_tokens)
    }

    fn inspect(&self, name: &str) -> Result<TokenBucket, BucketError> {
        TokenBucketEngine::inspect(self, name)
    }

    fn consume(&self, name: &str, requested: i64) -> Result<u64, BucketError> {
        TokenBucketEngine::consume(self, name, requested)
    }
}

fn non_negative(argument: Argument, value: i64) -> Result<u64, BucketError> {
    u64::try_from(value).map_err(|_| BucketError::InvalidArgument {
        argument,
        reason: format!("must be non-negative, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use tokenbucket_time::SimulatedTimeProvider;

    use super::*;
    use crate::codec::RecordFormat;
    use crate::error::ErrorCategory;
    use crate::store::DeterministicHostStore;
    use crate::store::StoredValue;
    use crate::store::ValueKind;

    const T0: u64 = 1_700_000_000_000;

    fn engine() -> (TokenBucketEngine<DeterministicHostStore, SimulatedTimeProvider>, SimulatedTimeProvider) {
        let clock = SimulatedTimeProvider::new(T0);
        (TokenBucketEngine::with_clock(DeterministicHostStore::new(), clock.clone()), clock)
    }

    #[test]
    fn test_initialize_then_inspect() {
        let (engine, _) = engine();
        engine.initialize("b1", 10, 2, Some(4)).unwrap();
        assert_eq!(
            engine.inspect("b1").unwrap(),
            TokenBucket {
                update_time: T0,
                max_permits: 10,
                curr_permits: 4,
                rate: 2,
            }
        );
    }

    #[test]
    fn test_initialize_defaults_to_empty_bucket() {
        let (engine, _) = engine();
        engine.initialize("b1", 10, 2, None).unwrap();
        assert_eq!(engine.inspect("b1").unwrap().curr_permits, 0);
    }

    #[test]
    fn test_initialize_validates_before_writing() {
        let (engine, _) = engine();
        for (capacity, rate, initial, argument) in [
            (-1, 1, None, Argument::Capacity),
            (10, -1, None, Argument::Rate),
            (10, 1, Some(-1), Argument::InitialTokens),
            (10, 1, Some(11), Argument::InitialTokens),
        ] {
            match engine.initialize("b1", capacity, rate, initial) {
                Err(BucketError::InvalidArgument { argument: got, .. }) => assert_eq!(got, argument),
                other => panic!("expected InvalidArgument, got {other:?}"),
            }
        }
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_initialize_overwrites_string_but_not_foreign_values() {
        let (engine, _) = engine();
        engine.store().insert_raw("s", b"hello".to_vec());
        engine.initialize("s", 1, 1, None).unwrap();
        assert_eq!(engine.inspect("s").unwrap().max_permits, 1);

        engine.store().insert_foreign("h", ValueKind::Hash);
        let err = engine.initialize("h", 1, 1, None).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TypeConflict);
        assert_eq!(engine.store().get("h"), Some(StoredValue::Foreign(ValueKind::Hash)));
    }

    #[test]
    fn test_inspect_errors() {
        let (engine, _) = engine();
        assert_eq!(engine.inspect("nope").unwrap_err().category(), ErrorCategory::NotFound);

        engine.store().insert_foreign("l", ValueKind::List);
        assert_eq!(engine.inspect("l").unwrap_err().category(), ErrorCategory::TypeConflict);

        engine.store().insert_raw("short", vec![0u8; 8]);
        assert_eq!(engine.inspect("short").unwrap_err().category(), ErrorCategory::MalformedRecord);
    }

    #[test]
    fn test_inspect_does_not_project_refill() {
        let (engine, clock) = engine();
        engine.initialize("b1", 10, 5, None).unwrap();
        clock.advance_secs(60);
        assert_eq!(engine.inspect("b1").unwrap().curr_permits, 0);
    }

    #[test]
    fn test_consume_grants_all_or_nothing() {
        let (engine, clock) = engine();
        engine.initialize("b1", 10, 2, None).unwrap();
        assert_eq!(engine.consume("b1", 5).unwrap(), 0);

        clock.advance_secs(3);
        assert_eq!(engine.consume("b1", 5).unwrap(), 5);
        let state = engine.inspect("b1").unwrap();
        assert_eq!(state.curr_permits, 1);
        assert_eq!(state.update_time, T0 + 3_000);
    }

    #[test]
    fn test_consume_denial_persists_refill() {
        let (engine, clock) = engine();
        engine.initialize("b1", 10, 2, None).unwrap();
        clock.advance_ms(2_400);
        assert_eq!(engine.consume("b1", 5).unwrap(), 0);
        let state = engine.inspect("b1").unwrap();
        assert_eq!(state.curr_permits, 4);
        assert_eq!(state.update_time, T0 + 2_400);
    }

    #[test]
    fn test_consume_rejects_negative_before_lookup() {
        let (engine, _) = engine();
        let err = engine.consume("missing", -1).unwrap_err();
        assert_eq!(
            err,
            BucketError::InvalidArgument {
                argument: Argument::Requested,
                reason: "must be non-negative, got -1".into(),
            }
        );
    }

    #[test]
    fn test_consume_clock_regression_leaves_record_untouched() {
        let (engine, clock) = engine();
        engine.initialize("b1", 10, 1, Some(3)).unwrap();
        let before = engine.store().get("b1");

        clock.rewind_ms(1);
        let err = engine.consume("b1", 1).unwrap_err();
        assert_eq!(
            err,
            BucketError::ClockRegression {
                name: "b1".into(),
                now_ms: T0 - 1,
                update_time_ms: T0,
            }
        );
        assert_eq!(engine.store().get("b1"), before);
    }

    #[test]
    fn test_consume_malformed_record() {
        let (engine, _) = engine();
        engine.store().insert_raw("bad", vec![1u8; 31]);
        let err = engine.consume("bad", 1).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedRecord);
        assert_eq!(engine.store().get("bad"), Some(StoredValue::String(vec![1u8; 31])));
    }

    #[test]
    fn test_consume_foreign_value_is_type_conflict() {
        let (engine, _) = engine();
        engine.store().insert_foreign("h", ValueKind::Hash);
        let err = engine.consume("h", 1).unwrap_err();
        assert_eq!(
            err,
            BucketError::TypeConflict {
                name: "h".into(),
                found: "hash".into(),
            }
        );
        assert_eq!(engine.store().get("h"), Some(StoredValue::Foreign(ValueKind::Hash)));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let (engine, _) = engine();
        let err = engine.initialize("", 1, 1, None).unwrap_err();
        assert!(matches!(err, BucketError::InvalidArgument { argument: Argument::Name, .. }));
    }

    #[test]
    fn test_versioned_records() {
        let clock = SimulatedTimeProvider::new(T0);
        let config = EngineConfig {
            record_format: RecordFormat::Versioned,
            ..EngineConfig::default()
        };
        let engine = TokenBucketEngine::from_config(DeterministicHostStore::new(), clock.clone(), &config);
        engine.initialize("b1", 5, 1, Some(5)).unwrap();
        match engine.store().get("b1") {
            Some(StoredValue::String(bytes)) => {
                assert_eq!(bytes.len(), 33);
                assert_eq!(bytes[0], 0);
            }
            other => panic!("unexpected value {other:?}"),
        }
        assert_eq!(engine.consume("b1", 2).unwrap(), 2);
        assert_eq!(engine.inspect("b1").unwrap().curr_permits, 3);
    }

    #[test]
    fn test_carry_remainder_policy() {
        let clock = SimulatedTimeProvider::new(T0);
        let config = EngineConfig {
            refill_policy: RefillPolicy::CarryRemainder,
            ..EngineConfig::default()
        };
        let engine = TokenBucketEngine::from_config(DeterministicHostStore::new(), clock.clone(), &config);
        engine.initialize("b1", 10, 1, None).unwrap();
        for _ in 0..4 {
            clock.advance_ms(500);
            engine.consume("b1", 0).unwrap();
        }
        assert_eq!(engine.inspect("b1").unwrap().curr_permits, 2);
    }
}
