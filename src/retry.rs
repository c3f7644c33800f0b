//! Bounded retry policy shared by the outbound HTTP clients
//!
//! Every remote call gets at most [`MAX_HTTP_ATTEMPTS`] tries; transient
//! failures wait attempt-number-cubed seconds between tries.

use std::time::Duration;

/// Total attempts per remote call, first try included
pub const MAX_HTTP_ATTEMPTS: u32 = 3;

/// Retry delay for the given 1-based attempt number
pub fn cubic_backoff(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt.pow(3)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_backoff_schedule() {
        assert_eq!(cubic_backoff(1), Duration::from_secs(1));
        assert_eq!(cubic_backoff(2), Duration::from_secs(8));
        assert_eq!(cubic_backoff(3), Duration::from_secs(27));
    }
}
