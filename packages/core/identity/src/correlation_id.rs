use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{EPOCH_MS, MAX_SALT, MAX_SEQUENCE, SALT_BITS, SEQUENCE_BITS};

const BASE36_CHARS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier linking a call with its reply.
///
/// ```text
/// +-------------------------+--------------------+-----------------+
/// |        timestamp        |        salt        |     sequence    |
/// |         41 bits         |  13 bits : 0~8191  | 10 bit : 0~1023 |
/// +-------------------------+--------------------+-----------------+
/// ```
///
/// Rendered on the wire as lowercase base-36.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn compose(timestamp: u64, salt: u16, sequence: u64) -> Self {
        Self((timestamp << (SALT_BITS + SEQUENCE_BITS)) | (((salt & MAX_SALT) as u64) << SEQUENCE_BITS) | (sequence & MAX_SEQUENCE))
    }

    /// Milliseconds since [`EPOCH_MS`].
    pub fn timestamp(&self) -> u64 {
        self.0 >> (SALT_BITS + SEQUENCE_BITS)
    }

    /// Unix time in milliseconds at which the id was issued.
    pub fn unix_ms(&self) -> u64 {
        self.timestamp() + EPOCH_MS
    }

    pub fn salt(&self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) as u16) & MAX_SALT
    }

    pub fn sequence(&self) -> u64 {
        self.0 & MAX_SEQUENCE
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<CorrelationId> for u64 {
    fn from(value: CorrelationId) -> Self {
        value.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // u64::MAX needs 13 base-36 digits
        let mut buf = [0u8; 13];
        let mut pos = buf.len();
        let mut value = self.0;
        loop {
            pos -= 1;
            buf[pos] = BASE36_CHARS[(value % 36) as usize];
            value /= 36;
            if value == 0 {
                break;
            }
        }
        // only ascii digits and letters were written
        f.write_str(std::str::from_utf8(&buf[pos..]).map_err(|_| fmt::Error)?)
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("invalid correlation id {0:?}")]
pub struct ParseCorrelationIdError(pub String);

impl FromStr for CorrelationId {
    type Err = ParseCorrelationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with('+') {
            return Err(ParseCorrelationIdError(s.to_string()));
        }
        u64::from_str_radix(s, 36).map(Self).map_err(|_| ParseCorrelationIdError(s.to_string()))
    }
}
