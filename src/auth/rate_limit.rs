use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::auth::config::RESET_REQUEST_WINDOW_SECS;

/// Sliding-window throttle for password-reset requests, keyed by requester
/// address rather than target account so one source cannot spray requests
/// across many accounts.
///
/// Owned by `AuthState` and constructed once at startup; state is process
/// local and resets on restart. Callers pass `now` explicitly, which keeps
/// the window logic testable against a simulated clock.
#[derive(Debug)]
pub struct ResetRateLimiter {
    window: Duration,
    last_request: DashMap<IpAddr, DateTime<Utc>>,
}

impl ResetRateLimiter {
    pub fn new() -> Self {
        Self::with_window(Duration::seconds(RESET_REQUEST_WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_request: DashMap::new(),
        }
    }

    /// `Err(retry_after)` while `addr` is still inside its window. Does not
    /// start a window; only `record` does.
    pub fn check(&self, addr: IpAddr, now: DateTime<Utc>) -> Result<(), Duration> {
        if let Some(last) = self.last_request.get(&addr) {
            let elapsed = now - *last;
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }
        Ok(())
    }

    /// Start a window for `addr`. Called only after a reset request is
    /// actually accepted, so rejected requests never consume the window.
    pub fn record(&self, addr: IpAddr, now: DateTime<Utc>) {
        self.last_request.insert(addr, now);
    }

    /// Drop entries whose window already elapsed. Run periodically by the
    /// background sweeper.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.last_request.retain(|_, last| now - *last < self.window);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.last_request.len()
    }
}

impl Default for ResetRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
