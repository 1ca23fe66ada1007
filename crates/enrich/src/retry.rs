//! Retry classification and backoff for external calls.

use std::time::Duration;

/// Bounded attempts per external call.
pub const MAX_ATTEMPTS: u32 = 3;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// `429`; carries a server-supplied retry delay when present.
    RateLimited(Option<Duration>),
    /// Transport timeout.
    Timeout,
    /// Generic `5xx`.
    Server,
    /// Connection-level failure (DNS, refused, reset).
    Transport,
}

/// Backoff schedule. Rate limiting backs off linearly by attempt number
/// (unless the server supplied a delay); timeouts and server errors back off
/// exponentially; bare transport failures retry after the base delay.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub rate_limit_step_secs: u64,
    pub transient_base_secs: u64,
}

impl Backoff {
    /// Schedule used by the contact/company clients.
    pub fn standard() -> Self {
        Self { rate_limit_step_secs: 10, transient_base_secs: 2 }
    }

    /// Schedule used by the research client (slower endpoint, longer waits).
    pub fn research() -> Self {
        Self { rate_limit_step_secs: 5, transient_base_secs: 5 }
    }

    /// Zero-delay schedule for tests.
    pub fn none() -> Self {
        Self { rate_limit_step_secs: 0, transient_base_secs: 0 }
    }

    /// Delay before retrying `attempt` (0-indexed).
    pub fn delay(&self, class: &FailureClass, attempt: u32) -> Duration {
        match class {
            FailureClass::RateLimited(Some(server_delay)) => *server_delay,
            FailureClass::RateLimited(None) => {
                Duration::from_secs(self.rate_limit_step_secs * (attempt as u64 + 1))
            }
            FailureClass::Timeout | FailureClass::Server => {
                Duration::from_secs(self.transient_base_secs * 2u64.pow(attempt))
            }
            FailureClass::Transport => Duration::from_secs(self.transient_base_secs),
        }
    }
}

/// Parse a `Retry-After` header value (seconds form only).
pub fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_backs_off_linearly() {
        let backoff = Backoff::standard();
        assert_eq!(
            backoff.delay(&FailureClass::RateLimited(None), 0),
            Duration::from_secs(10)
        );
        assert_eq!(
            backoff.delay(&FailureClass::RateLimited(None), 2),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn server_supplied_delay_wins() {
        let backoff = Backoff::standard();
        assert_eq!(
            backoff.delay(
                &FailureClass::RateLimited(Some(Duration::from_secs(7))),
                2
            ),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn timeouts_back_off_exponentially() {
        let backoff = Backoff::standard();
        assert_eq!(backoff.delay(&FailureClass::Timeout, 0), Duration::from_secs(2));
        assert_eq!(backoff.delay(&FailureClass::Timeout, 1), Duration::from_secs(4));
        assert_eq!(backoff.delay(&FailureClass::Timeout, 2), Duration::from_secs(8));
    }

    #[test]
    fn research_schedule_scales_from_five() {
        let backoff = Backoff::research();
        assert_eq!(backoff.delay(&FailureClass::Timeout, 1), Duration::from_secs(10));
        assert_eq!(
            backoff.delay(&FailureClass::RateLimited(None), 0),
            Duration::from_secs(5)
        );
    }
}
