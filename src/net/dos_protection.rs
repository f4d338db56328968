use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::lobby::ParticipantId;
use crate::net::protocol::MAX_MESSAGE_SIZE;

/// Configuration for DoS protection
#[derive(Debug, Clone)]
pub struct DoSConfig {
    /// Maximum total concurrent connections
    pub max_connections_total: usize,
    /// Maximum messages per second per connection
    pub max_messages_per_second: u32,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Time window for rate limiting
    pub rate_limit_window: Duration,
    /// Rate-limit violations before the connection is dropped
    pub violations_before_disconnect: u32,
}

impl Default for DoSConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_messages_per_second: 120,
            max_message_size: MAX_MESSAGE_SIZE,
            rate_limit_window: Duration::from_secs(1),
            violations_before_disconnect: 5,
        }
    }
}

/// Tracks rate limiting for a single connection
#[derive(Debug)]
struct ConnectionRateLimit {
    message_count: u32,
    window_start: Instant,
    violations: u32,
}

impl ConnectionRateLimit {
    fn new() -> Self {
        Self {
            message_count: 0,
            window_start: Instant::now(),
            violations: 0,
        }
    }

    fn check_and_increment(&mut self, max_per_second: u32, window: Duration) -> bool {
        let now = Instant::now();

        if now.duration_since(self.window_start) >= window {
            self.window_start = now;
            self.message_count = 0;
        }

        self.message_count += 1;

        if self.message_count > max_per_second {
            self.violations += 1;
            false
        } else {
            true
        }
    }
}

/// Connection cap plus per-connection message limits
pub struct DoSProtection {
    config: DoSConfig,
    connection_rates: HashMap<ParticipantId, ConnectionRateLimit>,
}

impl DoSProtection {
    pub fn new(config: DoSConfig) -> Self {
        Self {
            config,
            connection_rates: HashMap::new(),
        }
    }

    /// Admit a new connection if under the global cap
    pub fn register_connection(&mut self, id: &ParticipantId) -> Result<(), DoSError> {
        if self.connection_rates.len() >= self.config.max_connections_total {
            return Err(DoSError::TooManyConnections);
        }
        self.connection_rates
            .insert(id.clone(), ConnectionRateLimit::new());
        Ok(())
    }

    pub fn unregister_connection(&mut self, id: &ParticipantId) {
        self.connection_rates.remove(id);
    }

    /// Check if a message from this connection is allowed
    pub fn check_message(&mut self, id: &ParticipantId, size: usize) -> Result<(), DoSError> {
        if size > self.config.max_message_size {
            return Err(DoSError::MessageTooLarge(size));
        }

        if !cfg!(feature = "dos_ratelimit") {
            return Ok(());
        }

        if let Some(rate) = self.connection_rates.get_mut(id) {
            if rate.violations >= self.config.violations_before_disconnect {
                return Err(DoSError::ViolationLimitExceeded);
            }

            if !rate.check_and_increment(
                self.config.max_messages_per_second,
                self.config.rate_limit_window,
            ) {
                return Err(DoSError::RateLimitExceeded);
            }
        }

        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connection_rates.len()
    }

    pub fn violation_count(&self, id: &ParticipantId) -> u32 {
        self.connection_rates
            .get(id)
            .map(|r| r.violations)
            .unwrap_or(0)
    }
}

impl Default for DoSProtection {
    fn default() -> Self {
        Self::new(DoSConfig::default())
    }
}

/// Errors from DoS protection checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DoSError {
    #[error("Too many total connections")]
    TooManyConnections,
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Too many violations, connection terminated")]
    ViolationLimitExceeded,
}
