use crate::model::Ms;

pub const MAX_UNITS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_UNIT: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_METHOD_LEN: usize = 64;
pub const MAX_TRANSACTION_ID_LEN: usize = 128;

/// Reject timestamps before the epoch or past 2100-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Longest bookable stay: one year of nights.
pub const MAX_STAY_MS: Ms = 366 * 86_400_000;

pub const ACCESS_CODE_LEN: usize = 6;
