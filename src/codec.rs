//! Fixed-width binary encoding of bucket records.
//!
//! A record is the four bucket fields as little-endian `u64`s in the order
//! `update_time, max_permits, curr_permits, rate`, with no padding. The byte
//! order is pinned rather than native so a record written on one host decodes
//! the same on another.
//!
//! [`RecordFormat::Versioned`] prepends a single version byte to the same body.
//! Contents are trusted: there is no checksum, so any string value of the right
//! length decodes to *some* bucket.

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;
use snafu::ensure;

use crate::constants::FIELD_WIDTH;
use crate::constants::LEGACY_RECORD_LEN;
use crate::constants::RECORD_VERSION_0;
use crate::constants::VERSIONED_RECORD_LEN;

/// Decoded state of one token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenBucket {
    /// Unix milliseconds at which `curr_permits` was last authoritative.
    pub update_time: u64,
    /// Capacity.
    pub max_permits: u64,
    /// Tokens available as of `update_time`.
    pub curr_permits: u64,
    /// Tokens added per whole elapsed second.
    pub rate: u64,
}

/// On-store layout of a bucket record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// Bare 32-byte body with no version marker.
    #[default]
    Legacy,
    /// Version byte followed by the 32-byte body.
    Versioned,
}

impl RecordFormat {
    /// Exact length of a record in this format.
    #[inline]
    pub const fn record_len(self) -> usize {
        match self {
            RecordFormat::Legacy => LEGACY_RECORD_LEN,
            RecordFormat::Versioned => VERSIONED_RECORD_LEN,
        }
    }

    /// Offset of the first field.
    #[inline]
    const fn body_offset(self) -> usize {
        match self {
            RecordFormat::Legacy => 0,
            RecordFormat::Versioned => 1,
        }
    }
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(RecordFormat::Legacy),
            "versioned" | "v0" => Ok(RecordFormat::Versioned),
            _ => Err(format!("invalid record format: {s}")),
        }
    }
}

/// Errors from decoding a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    /// The value is not exactly one record long.
    #[snafu(display("expected {expected} bytes, found {actual}"))]
    LengthMismatch {
        /// Length required by the configured format.
        expected: usize,
        /// Length of the stored value.
        actual: usize,
    },

    /// The version prefix names a layout this build does not know.
    #[snafu(display("unsupported record version {version}"))]
    UnsupportedVersion {
        /// Version byte found in the record.
        version: u8,
    },
}

/// Encodes and decodes bucket records in one configured format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordCodec {
    format: RecordFormat,
}

impl RecordCodec {
    /// Create a codec for `format`.
    pub const fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    /// Exact length of every record this codec produces or accepts.
    pub const fn record_len(&self) -> usize {
        self.format.record_len()
    }

    /// Encode `bucket` into a freshly allocated record.
    pub fn encode(&self, bucket: &TokenBucket) -> Vec<u8> {
        let mut out = vec![0u8; self.record_len()];
        self.write_record(bucket, &mut out);
        out
    }

    /// Encode `bucket` over an existing record buffer.
    ///
    /// Fails without touching `out` unless it is exactly [`Self::record_len`] bytes.
    pub fn encode_into(&self, bucket: &TokenBucket, out: &mut [u8]) -> Result<(), CodecError> {
        ensure!(
            out.len() == self.record_len(),
            LengthMismatchSnafu {
                expected: self.record_len(),
                actual: out.len(),
            }
        );
        self.write_record(bucket, out);
        Ok(())
    }

    fn write_record(&self, bucket: &TokenBucket, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.record_len());
        let offset = self.format.body_offset();
        if self.format == RecordFormat::Versioned {
            out[0] = RECORD_VERSION_0;
        }
        let fields = [bucket.update_time, bucket.max_permits, bucket.curr_permits, bucket.rate];
        for (chunk, field) in out[offset..].chunks_exact_mut(FIELD_WIDTH).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
    }

    /// Decode a stored record.
    pub fn decode(&self, bytes: &[u8]) -> Result<TokenBucket, CodecError> {
        ensure!(
            bytes.len() == self.record_len(),
            LengthMismatchSnafu {
                expected: self.record_len(),
                actual: bytes.len(),
            }
        );
        if self.format == RecordFormat::Versioned {
            ensure!(bytes[0] == RECORD_VERSION_0, UnsupportedVersionSnafu { version: bytes[0] });
        }

        let body = &bytes[self.format.body_offset()..];
        let mut fields = body.chunks_exact(FIELD_WIDTH).map(read_u64_le);
        Ok(TokenBucket {
            update_time: fields.next().unwrap_or(0),
            max_permits: fields.next().unwrap_or(0),
            curr_permits: fields.next().unwrap_or(0),
            rate: fields.next().unwrap_or(0),
        })
    }
}

#[inline]
fn read_u64_le(chunk: &[u8]) -> u64 {
    let mut buf = [0u8; FIELD_WIDTH];
    buf.copy_from_slice(chunk);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TokenBucket {
        TokenBucket {
            update_time: 1_700_000_000_123,
            max_permits: 10,
            curr_permits: 4,
            rate: 2,
        }
    }

    #[test]
    fn test_legacy_layout_is_little_endian_in_field_order() {
        let bytes = RecordCodec::new(RecordFormat::Legacy).encode(&sample());
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..8], &1_700_000_000_123u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &10u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &4u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &2u64.to_le_bytes());
    }

    #[test]
    fn test_versioned_layout_prefixes_version_zero() {
        let legacy = RecordCodec::new(RecordFormat::Legacy).encode(&sample());
        let versioned = RecordCodec::new(RecordFormat::Versioned).encode(&sample());
        assert_eq!(versioned.len(), 33);
        assert_eq!(versioned[0], RECORD_VERSION_0);
        assert_eq!(&versioned[1..], legacy.as_slice());
    }

    #[test]
    fn test_decode_reads_back_extreme_values() {
        let codec = RecordCodec::default();
        let bucket = TokenBucket {
            update_time: u64::MAX,
            max_permits: u64::MAX,
            curr_permits: 0,
            rate: u64::MAX,
        };
        assert_eq!(codec.decode(&codec.encode(&bucket)), Ok(bucket));
    }

    #[test]
    fn test_decode_rejects_short_and_long_values() {
        let codec = RecordCodec::default();
        assert_eq!(
            codec.decode(&[0u8; 31]),
            Err(CodecError::LengthMismatch { expected: 32, actual: 31 })
        );
        assert_eq!(
            codec.decode(&[0u8; 33]),
            Err(CodecError::LengthMismatch { expected: 32, actual: 33 })
        );
        assert_eq!(codec.decode(b""), Err(CodecError::LengthMismatch { expected: 32, actual: 0 }));
    }

    #[test]
    fn test_legacy_record_is_malformed_under_versioned_codec() {
        let legacy = RecordCodec::new(RecordFormat::Legacy).encode(&sample());
        let err = RecordCodec::new(RecordFormat::Versioned).decode(&legacy).unwrap_err();
        assert_eq!(err, CodecError::LengthMismatch { expected: 33, actual: 32 });
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let codec = RecordCodec::new(RecordFormat::Versioned);
        let mut bytes = codec.encode(&sample());
        bytes[0] = 7;
        assert_eq!(codec.decode(&bytes), Err(CodecError::UnsupportedVersion { version: 7 }));
    }

    #[test]
    fn test_same_length_garbage_decodes() {
        // No checksum: any 32-byte string is accepted.
        let bucket = RecordCodec::default().decode(&[0xFFu8; 32]).unwrap();
        assert_eq!(bucket.rate, u64::MAX);
    }

    #[test]
    fn test_encode_into_overwrites_in_place() {
        let codec = RecordCodec::default();
        let mut buf = codec.encode(&sample());
        let updated = TokenBucket {
            curr_permits: 9,
            ..sample()
        };
        codec.encode_into(&updated, &mut buf).unwrap();
        assert_eq!(codec.decode(&buf), Ok(updated));
    }

    #[test]
    fn test_encode_into_rejects_wrong_length_buffers() {
        let bucket = TokenBucket {
            update_time: 1,
            max_permits: 2,
            curr_permits: 3,
            rate: 4,
        };
        let mut short = [0u8; 16];
        assert_eq!(
            RecordCodec::default().encode_into(&bucket, &mut short),
            Err(CodecError::LengthMismatch { expected: 32, actual: 16 })
        );
        assert_eq!(short, [0u8; 16]);

        let mut empty: [u8; 0] = [];
        assert_eq!(
            RecordCodec::new(RecordFormat::Versioned).encode_into(&bucket, &mut empty),
            Err(CodecError::LengthMismatch { expected: 33, actual: 0 })
        );
    }

    #[test]
    fn test_record_format_parses() {
        assert_eq!("legacy".parse::<RecordFormat>(), Ok(RecordFormat::Legacy));
        assert_eq!("Versioned".parse::<RecordFormat>(), Ok(RecordFormat::Versioned));
        assert!("json".parse::<RecordFormat>().is_err());
    }
}
