//! Authority configuration

use std::time::Duration;

use crate::error::{AuthorityError, Result};

/// Default ticket lifetime
pub const DEFAULT_TICKET_TTL: Duration = Duration::from_secs(60 * 60);

/// Default window during which tickets signed by the previous key still verify
pub const DEFAULT_ROTATION_GRACE: Duration = Duration::ZERO;

/// Default deadline for every persistence or cache call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Cached tickets closer to expiry than this are re-signed instead of reused
pub const DEFAULT_CACHE_MIN_REMAINING: Duration = Duration::from_secs(30);

/// Default maximum number of cached tickets
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Tunables for issuance, validation and rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Lifetime of every issued ticket
    pub ticket_ttl: Duration,

    /// How long after a rotation tickets signed under the superseded key
    /// are still accepted. Zero means rotation invalidates them at once.
    pub rotation_grace: Duration,

    /// Deadline for each store, cache and lock acquisition
    pub store_timeout: Duration,

    /// Minimum remaining validity for a cached ticket to be reused
    pub cache_min_remaining: Duration,

    /// Maximum cached tickets
    pub cache_capacity: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            ticket_ttl: DEFAULT_TICKET_TTL,
            rotation_grace: DEFAULT_ROTATION_GRACE,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            cache_min_remaining: DEFAULT_CACHE_MIN_REMAINING,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AuthorityConfig {
    pub fn with_ticket_ttl(mut self, ttl: Duration) -> Self {
        self.ticket_ttl = ttl;
        self
    }

    pub fn with_rotation_grace(mut self, grace: Duration) -> Self {
        self.rotation_grace = grace;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_cache_min_remaining(mut self, remaining: Duration) -> Self {
        self.cache_min_remaining = remaining;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Reject settings the authority cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ticket_ttl < Duration::from_secs(1) {
            return Err(AuthorityError::Configuration(
                "ticket_ttl must be at least one second".into(),
            ));
        }
        if self.store_timeout.is_zero() {
            return Err(AuthorityError::Configuration(
                "store_timeout must be positive".into(),
            ));
        }
        chrono::Duration::from_std(self.ticket_ttl)
            .map_err(|e| AuthorityError::Configuration(format!("ticket_ttl: {}", e)))?;
        chrono::Duration::from_std(self.rotation_grace)
            .map_err(|e| AuthorityError::Configuration(format!("rotation_grace: {}", e)))?;
        Ok(())
    }

    /// Ticket lifetime as a chrono duration
    pub(crate) fn ticket_ttl_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.ticket_ttl)
            .map_err(|e| AuthorityError::Configuration(format!("ticket_ttl: {}", e)))
    }

    /// Rotation grace as a chrono duration
    pub(crate) fn rotation_grace_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.rotation_grace)
            .map_err(|e| AuthorityError::Configuration(format!("rotation_grace: {}", e)))
    }
}
