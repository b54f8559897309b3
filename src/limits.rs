use crate::model::Ms;

/// 0001-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = -62_135_596_800_000;

/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_DESCRIPTION_LEN: usize = 4096;
