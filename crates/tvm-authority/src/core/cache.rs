//! Ticket cache
//!
//! Issued tickets are cached per `(source, target)` pair so repeated issue
//! calls can reuse a still-fresh ticket instead of signing again. The cache
//! is an optimization only: every failure here degrades to "miss" and never
//! reaches the caller.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;
use tvm_core::{ServiceId, Ticket};

/// Cache failures; callers log and carry on
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Key of a cached ticket
pub type TicketKey = (ServiceId, ServiceId);

/// Store of recently issued tickets
#[async_trait]
pub trait TicketCache: Send + Sync + Debug {
    /// Cached ticket for the pair, if still held
    async fn get(&self, key: TicketKey) -> Result<Option<Ticket>, CacheError>;

    /// Cache a ticket for at most `ttl`
    async fn set(&self, key: TicketKey, ticket: Ticket, ttl: Duration) -> Result<(), CacheError>;

    /// Drop the pair's cached ticket
    async fn invalidate(&self, key: TicketKey) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CachedTicket {
    ticket: Ticket,
    evict_at: Instant,
}

/// Evicts each entry when its ticket's remaining validity runs out
struct TicketExpiry;

impl moka::Expiry<TicketKey, CachedTicket> for TicketExpiry {
    fn expire_after_create(
        &self,
        _key: &TicketKey,
        value: &CachedTicket,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.evict_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &TicketKey,
        value: &CachedTicket,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.evict_at.saturating_duration_since(updated_at))
    }
}

/// In-process cache backed by [`moka::future::Cache`]
#[derive(Clone)]
pub struct MokaTicketCache {
    tickets: Cache<TicketKey, CachedTicket>,
}

impl MokaTicketCache {
    /// Create a cache holding at most `max_capacity` tickets
    pub fn new(max_capacity: u64) -> Self {
        let tickets = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(TicketExpiry)
            .build();
        Self { tickets }
    }
}

impl Debug for MokaTicketCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaTicketCache")
            .field("entries", &self.tickets.entry_count())
            .finish()
    }
}

#[async_trait]
impl TicketCache for MokaTicketCache {
    async fn get(&self, key: TicketKey) -> Result<Option<Ticket>, CacheError> {
        Ok(self.tickets.get(&key).await.map(|cached| cached.ticket))
    }

    async fn set(&self, key: TicketKey, ticket: Ticket, ttl: Duration) -> Result<(), CacheError> {
        let evict_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Unavailable(format!("ttl out of range: {:?}", ttl)))?;
        self.tickets.insert(key, CachedTicket { ticket, evict_at }).await;
        Ok(())
    }

    async fn invalidate(&self, key: TicketKey) -> Result<(), CacheError> {
        self.tickets.invalidate(&key).await;
        Ok(())
    }
}

/// Cache that never holds anything; every issue call signs afresh
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTicketCache;

#[async_trait]
impl TicketCache for NoopTicketCache {
    async fn get(&self, _key: TicketKey) -> Result<Option<Ticket>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: TicketKey, _ticket: Ticket, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _key: TicketKey) -> Result<(), CacheError> {
        Ok(())
    }
}
