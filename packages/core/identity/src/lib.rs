mod correlation_id;
mod generator;

pub use correlation_id::{CorrelationId, ParseCorrelationIdError};
pub use generator::UniqueIdGenerator;

/// 2019-01-01T00:00:00Z, origin of the embedded timestamp.
pub const EPOCH_MS: u64 = 1_546_300_800_000;

pub const TIMESTAMP_BITS: u32 = 41;
pub const SALT_BITS: u32 = 13;
pub const SEQUENCE_BITS: u32 = 10;

pub const MAX_SALT: u16 = (1 << SALT_BITS) - 1;
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
