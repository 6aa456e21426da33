//! Outbound ticket attachment
//!
//! Keeps one ticket per target service and re-requests it shortly before it
//! expires, so outgoing calls rarely wait on the authority.

use chrono::Utc;
use moka::future::Cache;
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use tvm_core::{ServiceId, TICKET_HEADER};

use crate::bridge::TicketSource;
use crate::error::{BridgeError, Result};
use crate::types::IssuedTicket;

/// Tickets with less validity than this are re-requested
pub const DEFAULT_REFRESH_BEFORE: Duration = Duration::from_secs(60);

/// Default maximum number of distinct targets held
pub const DEFAULT_TARGET_CAPACITY: u64 = 1_000;

/// Per-target ticket holder for one calling service
pub struct OutboundTickets {
    source_id: ServiceId,
    tickets: Arc<dyn TicketSource>,
    cache: Cache<ServiceId, IssuedTicket>,
    refresh_before: Duration,
}

impl OutboundTickets {
    pub fn new(source_id: ServiceId, tickets: Arc<dyn TicketSource>) -> Self {
        Self {
            source_id,
            tickets,
            cache: Cache::builder().max_capacity(DEFAULT_TARGET_CAPACITY).build(),
            refresh_before: DEFAULT_REFRESH_BEFORE,
        }
    }

    /// Re-request tickets once less than `refresh_before` validity remains
    pub fn with_refresh_before(mut self, refresh_before: Duration) -> Self {
        self.refresh_before = refresh_before;
        self
    }

    pub fn source_id(&self) -> ServiceId {
        self.source_id
    }

    /// Encoded ticket for calling `target`
    pub async fn ticket_for(&self, target: ServiceId) -> Result<String> {
        let now = Utc::now().timestamp();
        let threshold = i64::try_from(self.refresh_before.as_secs()).unwrap_or(i64::MAX);

        if let Some(held) = self.cache.get(&target).await {
            if held.remaining_secs(now) > threshold {
                return Ok(held.ticket);
            }
            debug!(source_id = %self.source_id, target_id = %target, "Refreshing ticket near expiry");
        }

        let issued = self.tickets.issue(self.source_id, target).await?;
        self.cache.insert(target, issued.clone()).await;
        Ok(issued.ticket)
    }

    /// Set the ticket header for a call to `target`
    pub async fn attach(&self, headers: &mut HeaderMap, target: ServiceId) -> Result<()> {
        let ticket = self.ticket_for(target).await?;
        let value = HeaderValue::from_str(&ticket)
            .map_err(|e| BridgeError::InvalidFormat(format!("ticket is not a valid header: {}", e)))?;
        headers.insert(TICKET_HEADER, value);
        Ok(())
    }

    /// Drop the held ticket, e.g. after the target rejected it
    pub async fn invalidate(&self, target: ServiceId) {
        self.cache.invalidate(&target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Issues numbered tickets valid for a fixed number of seconds
    struct CountingSource {
        issued: AtomicUsize,
        valid_for: i64,
    }

    impl CountingSource {
        fn new(valid_for: i64) -> Self {
            Self {
                issued: AtomicUsize::new(0),
                valid_for,
            }
        }

        fn count(&self) -> usize {
            self.issued.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TicketSource for CountingSource {
        async fn issue(&self, source: ServiceId, target: ServiceId) -> Result<IssuedTicket> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(IssuedTicket {
                ticket: format!("ticket-{}-{}-{}", source, target, n),
                expires_at: Utc::now().timestamp() + self.valid_for,
            })
        }
    }

    struct DenyingSource;

    #[async_trait]
    impl TicketSource for DenyingSource {
        async fn issue(&self, _source: ServiceId, _target: ServiceId) -> Result<IssuedTicket> {
            Err(BridgeError::AccessDenied("no grant".into()))
        }
    }

    #[tokio::test]
    async fn test_fresh_ticket_is_reused() {
        let source = Arc::new(CountingSource::new(3600));
        let outbound = OutboundTickets::new(ServiceId(1), source.clone());

        let first = outbound.ticket_for(ServiceId(2)).await.unwrap();
        let second = outbound.ticket_for(ServiceId(2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.count(), 1);

        // Separate targets get separate tickets
        let other = outbound.ticket_for(ServiceId(3)).await.unwrap();
        assert_ne!(first, other);
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn test_ticket_near_expiry_is_refreshed() {
        let source = Arc::new(CountingSource::new(30));
        let outbound = OutboundTickets::new(ServiceId(1), source.clone());

        let first = outbound.ticket_for(ServiceId(2)).await.unwrap();
        let second = outbound.ticket_for(ServiceId(2)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn test_attach_sets_header() {
        let source = Arc::new(CountingSource::new(3600));
        let outbound = OutboundTickets::new(ServiceId(1), source);

        let mut headers = HeaderMap::new();
        outbound.attach(&mut headers, ServiceId(2)).await.unwrap();
        assert_eq!(headers.get(TICKET_HEADER).unwrap(), "ticket-1-2-0");
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_ticket() {
        let source = Arc::new(CountingSource::new(3600));
        let outbound = OutboundTickets::new(ServiceId(1), source.clone());

        outbound.ticket_for(ServiceId(2)).await.unwrap();
        outbound.invalidate(ServiceId(2)).await;
        outbound.ticket_for(ServiceId(2)).await.unwrap();
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn test_denial_propagates() {
        let outbound = OutboundTickets::new(ServiceId(1), Arc::new(DenyingSource));

        let mut headers = HeaderMap::new();
        let err = outbound.attach(&mut headers, ServiceId(2)).await.unwrap_err();
        assert!(matches!(err, BridgeError::AccessDenied(_)));
        assert!(headers.get(TICKET_HEADER).is_none());
    }
}
