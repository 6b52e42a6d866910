use crate::model::Ms;

/// Earliest accepted timestamp (2000-01-01T00:00:00Z).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// Latest accepted timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_ID_LEN: usize = 128;
pub const MAX_ACTOR_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 512;
pub const MAX_NOTES_LEN: usize = 4096;

/// Hard ceiling on guests per reservation, independent of accommodation capacity.
pub const MAX_GUESTS: u32 = 64;

/// Attempts at drawing an unused reservation code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 8;

pub const MAX_RESERVATIONS: usize = 1_000_000;
