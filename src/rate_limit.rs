use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;

// Rate limit record - tracks requests per client identity
#[derive(Debug, Clone, Copy)]
pub struct ClientRecord {
    pub count: u32,
    pub window_end: Instant,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Requests admitted in the current window, after this decision.
    pub count: u32,
    /// Time left until the client's window expires.
    pub retry_after: Duration,
}

/// Fixed-window request counter keyed by client identity.
///
/// Windows are anchored to each client's first request (or first request
/// after expiry) and reset lazily on the next request past `window_end`.
/// Records are never evicted, so memory grows with the number of distinct
/// identities seen over the process lifetime.
pub struct ClientTracker<C = SystemClock> {
    clients: DashMap<String, ClientRecord>,
    max_requests: u32,
    window: Duration,
    clock: C,
}

impl ClientTracker {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(max_requests, window, SystemClock)
    }
}

impl<C: Clock> ClientTracker<C> {
    pub fn with_clock(max_requests: u32, window: Duration, clock: C) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::Invalid(
                "rate limit max_requests must be positive".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ConfigError::Invalid(
                "rate limit time_window must be positive".to_string(),
            ));
        }

        Ok(Self {
            clients: DashMap::new(),
            max_requests,
            window,
            clock,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Number of identities with a retained record (expired ones included)
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).allowed
    }

    pub fn check(&self, identity: &str) -> Admission {
        let now = self.clock.now();

        // the entry guard holds the shard lock, so lookup + decision + increment is one unit
        let (admission, event) = match self.clients.entry(identity.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(ClientRecord {
                    count: 1,
                    window_end: now + self.window,
                });
                (self.admitted(1, self.window), "new client")
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();

                // window expired..? Reset it
                if record.window_end < now {
                    *record = ClientRecord {
                        count: 1,
                        window_end: now + self.window,
                    };
                    (self.admitted(1, self.window), "client window reset")
                } else {
                    let remaining = record.window_end.saturating_duration_since(now);

                    if record.count >= self.max_requests {
                        let denied = Admission {
                            allowed: false,
                            count: record.count,
                            retry_after: remaining,
                        };
                        (denied, "rate limit exceeded")
                    } else {
                        record.count += 1;
                        (self.admitted(record.count, remaining), "client allowed")
                    }
                }
            }
        };

        // shard lock is released by now; the middleware reports denials at info
        debug!(
            identity,
            count = admission.count,
            expires_in = ?admission.retry_after,
            "{}",
            event
        );
        admission
    }

    fn admitted(&self, count: u32, retry_after: Duration) -> Admission {
        Admission {
            allowed: true,
            count,
            retry_after,
        }
    }
}
