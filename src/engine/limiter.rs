use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use log::{debug, warn};
use crate::{Error, Result};

/// Quota settings for a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Operations allowed per client per window.
    pub points: u32,
    /// Length of the fixed window.
    pub window: Duration,
    /// Upper bound on distinct clients held in memory.
    pub max_tracked_clients: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            points: 10,
            window: Duration::from_secs(1),
            max_tracked_clients: 10_000,
        }
    }
}

/// What is left of a client's quota after an allowed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    consumed: u32,
    resets_at: Instant,
}

/// Fixed-window quota keyed by client identity.
///
/// State lives only in memory. The table never holds more than
/// `max_tracked_clients` entries: expired windows are pruned first, then the
/// window closest to resetting is evicted.
pub struct RateLimiter {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Consumes one point for `client_id`, or fails with [`Error::Denied`].
    pub fn consume(&self, client_id: &str) -> Result<RateLimitState> {
        self.consume_at(client_id, Instant::now())
    }

    pub(crate) fn consume_at(&self, client_id: &str, now: Instant) -> Result<RateLimitState> {
        let mut clients = self.clients.lock().map_err(|_| Error::Internal("rate limiter lock poisoned".to_string()))?;

        if !clients.contains_key(client_id) && clients.len() >= self.config.max_tracked_clients {
            make_room(&mut clients, self.config.max_tracked_clients, now);
        }

        let window = clients.entry(client_id.to_string()).or_insert(Window {
            consumed: 0,
            resets_at: now + self.config.window,
        });
        if window.resets_at <= now {
            window.consumed = 0;
            window.resets_at = now + self.config.window;
        }

        let reset_after = window.resets_at - now;
        if window.consumed >= self.config.points {
            warn!("Rate limit exceeded for {}", client_id);
            return Err(Error::Denied { retry_after: reset_after });
        }

        window.consumed += 1;
        let remaining = self.config.points - window.consumed;
        debug!("{} consumed a point, {} remaining", client_id, remaining);
        Ok(RateLimitState { remaining, reset_after })
    }

    /// Drops every client whose window has already elapsed.
    pub fn prune(&self) {
        if let Ok(mut clients) = self.clients.lock() {
            let now = Instant::now();
            clients.retain(|_, w| w.resets_at > now);
        }
    }

    /// Number of client identities currently held.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}

fn make_room(clients: &mut HashMap<String, Window>, max: usize, now: Instant) {
    clients.retain(|_, w| w.resets_at > now);
    if clients.len() >= max {
        // still full: evict the window that resets soonest
        let soonest = clients
            .iter()
            .min_by_key(|(_, w)| w.resets_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = soonest {
            clients.remove(&key);
        }
    }
}
