//! Pure token bucket arithmetic.
//!
//! Everything here is deterministic: time is passed in, nothing touches the
//! store. The engine is the imperative shell around these functions.
//!
//! All arithmetic is integer and saturating. Refill is counted in whole elapsed
//! seconds, so a bucket idle for 1999 ms accrues one second's worth of tokens.

use serde::Deserialize;
use serde::Serialize;
use tokenbucket_time::MILLIS_PER_SEC;

use crate::codec::TokenBucket;

/// How the stored timestamp moves after a consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillPolicy {
    /// Rebase to `now` on every consume; the sub-second remainder is dropped.
    #[default]
    Truncate,
    /// Advance by the whole seconds accrued so the remainder counts next time.
    /// Rebases to `now` when the refill saturated at capacity.
    CarryRemainder,
}

impl std::str::FromStr for RefillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "truncate" => Ok(RefillPolicy::Truncate),
            "carry_remainder" | "carry-remainder" => Ok(RefillPolicy::CarryRemainder),
            _ => Err(format!("invalid refill policy: {s}")),
        }
    }
}

/// Whole seconds between `last_update_ms` and `now_ms`.
///
/// `None` when `now_ms` precedes `last_update_ms`: the caller's clock has moved
/// backwards relative to whoever wrote the record.
#[inline]
pub fn elapsed_whole_seconds(last_update_ms: u64, now_ms: u64) -> Option<u64> {
    now_ms.checked_sub(last_update_ms).map(|elapsed_ms| elapsed_ms / MILLIS_PER_SEC)
}

/// Tokens available after `elapsed_secs` of refill, capped at `max_permits`.
#[inline]
pub fn replenished_permits(curr_permits: u64, elapsed_secs: u64, rate: u64, max_permits: u64) -> u64 {
    let accrued = elapsed_secs.saturating_mul(rate);
    let result = curr_permits.saturating_add(accrued).min(max_permits);
    debug_assert!(result <= max_permits, "replenished permits must not exceed capacity");
    result
}

/// Outcome of an all-or-nothing consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeDecision {
    /// The full request was granted.
    Granted {
        /// Tokens handed out.
        granted: u64,
        /// Tokens left in the bucket.
        remaining: u64,
    },
    /// Nothing was granted; the bucket keeps everything it had.
    Denied {
        /// Tokens available at the time of the request.
        available: u64,
    },
}

impl ConsumeDecision {
    /// Tokens handed to the caller: the request in full, or zero.
    #[inline]
    pub fn granted(&self) -> u64 {
        match self {
            ConsumeDecision::Granted { granted, .. } => *granted,
            ConsumeDecision::Denied { .. } => 0,
        }
    }

    /// Tokens left in the bucket afterwards.
    #[inline]
    pub fn remaining(&self) -> u64 {
        match self {
            ConsumeDecision::Granted { remaining, .. } => *remaining,
            ConsumeDecision::Denied { available } => *available,
        }
    }
}

/// Decide an all-or-nothing request against `available` tokens.
#[inline]
pub fn decide(available: u64, requested: u64) -> ConsumeDecision {
    if available >= requested {
        ConsumeDecision::Granted {
            granted: requested,
            remaining: available - requested,
        }
    } else {
        ConsumeDecision::Denied { available }
    }
}

/// Timestamp to store after a consume at `now_ms`.
///
/// Never earlier than `last_update_ms` and never later than `now_ms`.
#[inline]
pub fn next_update_time(
    policy: RefillPolicy,
    last_update_ms: u64,
    now_ms: u64,
    elapsed_secs: u64,
    saturated: bool,
) -> u64 {
    match policy {
        RefillPolicy::Truncate => now_ms,
        RefillPolicy::CarryRemainder if saturated => now_ms,
        RefillPolicy::CarryRemainder => {
            let advanced = last_update_ms.saturating_add(elapsed_secs.saturating_mul(MILLIS_PER_SEC));
            advanced.min(now_ms)
        }
    }
}

/// Result of applying a consume to a decoded bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// Bucket state to persist.
    pub bucket: TokenBucket,
    /// Grant decision.
    pub decision: ConsumeDecision,
}

/// Apply a consume of `requested` tokens at `now_ms`.
///
/// Returns `None` on clock regression, in which case nothing must be written.
pub fn apply_consume(
    bucket: &TokenBucket,
    requested: u64,
    now_ms: u64,
    policy: RefillPolicy,
) -> Option<ConsumeOutcome> {
    let elapsed_secs = elapsed_whole_seconds(bucket.update_time, now_ms)?;
    let uncapped = bucket.curr_permits.saturating_add(elapsed_secs.saturating_mul(bucket.rate));
    let available = replenished_permits(bucket.curr_permits, elapsed_secs, bucket.rate, bucket.max_permits);
    let decision = decide(available, requested);

    let next = TokenBucket {
        update_time: next_update_time(policy, bucket.update_time, now_ms, elapsed_secs, uncapped >= bucket.max_permits),
        max_permits: bucket.max_permits,
        curr_permits: decision.remaining(),
        rate: bucket.rate,
    };
    debug_assert!(next.curr_permits <= next.max_permits);
    debug_assert!(next.update_time >= bucket.update_time);
    Some(ConsumeOutcome { bucket: next, decision })
}
