// A simple module to define the time types used in the project
//
// The functions in this module use SystemTime::now() which is NON-DETERMINISTIC
// and must never feed a consensus decision directly.
//
// SAFE USAGE:
// - Logging timestamps
// - Choosing the kernel search window of the local staker
// - Rejecting coinstakes too far in the future (with MAX_FUTURE_BLOCK_TIME buffer)
//
// Kernel validation itself only uses block and output timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Millis timestamps used to determine it using its type
pub type TimestampMillis = u64;

// Seconds timestamps used to determine it using its type
pub type TimestampSeconds = u64;

#[inline]
pub fn get_current_time() -> Duration {
    // A clock set before the epoch is treated as the epoch itself
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

// Return timestamp in milliseconds
// We cast it to u64 as we have plenty of time before it overflows
pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}
