//! Ticket Authority
//!
//! Issues tickets for authorized `(source, target)` pairs and validates them.
//!
//! A ticket moves through Requested → Authorized → Signed → Valid → Expired.
//! Rejection is absorbing from Requested (no grant) or Authorized (unknown
//! source, bad signature, grant revoked in between).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use tvm_core::{Claims, PublicKey, ServiceId, Ticket};

use crate::config::AuthorityConfig;
use crate::core::cache::TicketCache;
use crate::error::{AuthorityError, Result};
use crate::keys::ServiceLocks;
use crate::registry::{AccessGraph, ServiceRegistry};
use crate::storage::Service;

/// Issues and validates service tickets
#[derive(Clone)]
pub struct TicketAuthority {
    registry: Arc<ServiceRegistry>,
    access: Arc<AccessGraph>,
    cache: Arc<dyn TicketCache>,
    locks: Arc<ServiceLocks>,
    config: AuthorityConfig,
}

impl TicketAuthority {
    /// Assemble the authority; fails on an unusable configuration
    pub fn new(
        registry: Arc<ServiceRegistry>,
        access: Arc<AccessGraph>,
        cache: Arc<dyn TicketCache>,
        locks: Arc<ServiceLocks>,
        config: AuthorityConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            access,
            cache,
            locks,
            config,
        })
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Issue a ticket authorizing `source` to call `target`
    pub async fn issue(&self, source: ServiceId, target: ServiceId) -> Result<Ticket> {
        self.issue_at(source, target, Utc::now()).await
    }

    /// Issue a ticket as of `now`
    pub async fn issue_at(
        &self,
        source: ServiceId,
        target: ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        debug!(source_id = %source, target_id = %target, "Ticket requested");

        if !self.access.has_access_at(source, target, now).await? {
            warn!(source_id = %source, target_id = %target, "Ticket rejected: no access grant");
            return Err(AuthorityError::AccessDenied {
                source_id: source,
                target_id: target,
            });
        }
        debug!(source_id = %source, target_id = %target, "Ticket authorized");

        let _guard = self.locks.shared(source, self.config.store_timeout).await?;
        let service = self.active_service(source).await?;

        if let Some(ticket) = self.reusable_ticket(&service, target, now).await {
            debug!(
                source_id = %source,
                target_id = %target,
                key_version = ticket.key_version,
                "Reusing cached ticket"
            );
            return Ok(ticket);
        }

        let claims = Claims::new(source, target, now, self.config.ticket_ttl_chrono()?)?;
        let ticket = Ticket::sign(
            claims,
            service.key_version,
            self.registry.key_manager().as_ref(),
            &service.private_key,
        )
        .map_err(|e| {
            warn!(source_id = %source, error = %e, "Ticket signing failed");
            AuthorityError::from(e)
        })?;

        info!(
            source_id = %source,
            target_id = %target,
            key_version = ticket.key_version,
            expires_at = ticket.claims.expires_at,
            "Issued ticket"
        );

        if let Some(ttl) = ticket.claims.remaining_at(now) {
            self.cache_store(source, target, ticket.clone(), ttl).await;
        }
        if let Err(e) = self.registry.touch(source, now).await {
            warn!(service_id = %source, error = %e, "Failed to record last access");
        }

        Ok(ticket)
    }

    /// Validate a ticket and return its claims
    pub async fn validate(&self, ticket: &Ticket) -> Result<Claims> {
        self.validate_at(ticket, Utc::now()).await
    }

    /// Decode a transported ticket and validate it
    pub async fn validate_encoded(&self, encoded: &str) -> Result<Claims> {
        let ticket = Ticket::decode(encoded).map_err(|e| {
            warn!(error = %e, "Ticket rejected: malformed");
            AuthorityError::from(e)
        })?;
        self.validate(&ticket).await
    }

    /// Validate a ticket as of `now`
    pub async fn validate_at(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<Claims> {
        let claims = ticket.claims;
        let source = claims.source_id;
        let target = claims.target_id;

        if claims.is_expired_at(now) {
            debug!(
                source_id = %source,
                target_id = %target,
                expires_at = claims.expires_at,
                "Ticket expired"
            );
            return Err(AuthorityError::TicketExpired);
        }

        let _guard = self.locks.shared(source, self.config.store_timeout).await?;
        let service = self.active_service(source).await?;

        let key = self.verification_key(&service, ticket.key_version, now).await?;
        let verified = key.map_or(false, |key| {
            ticket.verify(self.registry.key_manager().as_ref(), &key)
        });
        if !verified {
            warn!(
                source_id = %source,
                target_id = %target,
                key_version = ticket.key_version,
                current_key_version = service.key_version,
                "Ticket rejected: signature does not verify"
            );
            return Err(AuthorityError::InvalidSignature);
        }

        if !self.access.has_access_at(source, target, now).await? {
            warn!(source_id = %source, target_id = %target, "Ticket rejected: access revoked");
            return Err(AuthorityError::AccessDenied {
                source_id: source,
                target_id: target,
            });
        }

        debug!(source_id = %source, target_id = %target, "Ticket valid");
        Ok(claims)
    }

    /// Revoke a grant and drop any ticket cached for the pair
    pub async fn revoke_access(&self, source: ServiceId, target: ServiceId) -> Result<bool> {
        let removed = self.access.revoke(source, target).await?;
        self.cache_evict(source, target).await;
        Ok(removed)
    }

    async fn active_service(&self, id: ServiceId) -> Result<Service> {
        match self.registry.find(id).await? {
            Some(service) if service.active => Ok(service),
            Some(_) => {
                warn!(service_id = %id, "Rejected: service is inactive");
                Err(AuthorityError::ServiceNotFound(id))
            }
            None => {
                warn!(service_id = %id, "Rejected: unknown service");
                Err(AuthorityError::ServiceNotFound(id))
            }
        }
    }

    /// Key a ticket claiming `key_version` must verify under, if any
    ///
    /// The superseded key is only eligible for the version directly before
    /// the current one, and only within `rotation_grace` of the rotation.
    async fn verification_key(
        &self,
        service: &Service,
        key_version: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<PublicKey>> {
        if key_version == service.key_version {
            return Ok(Some(service.public_key.clone()));
        }
        if self.config.rotation_grace.is_zero()
            || key_version.checked_add(1) != Some(service.key_version)
        {
            return Ok(None);
        }

        let grace = self.config.rotation_grace_chrono()?;
        let previous = self
            .registry
            .latest_rotation(service.id)
            .await?
            .filter(|r| r.old_key_version == key_version && now <= r.rotated_at + grace)
            .map(|r| r.old_public_key);

        if previous.is_some() {
            debug!(
                service_id = %service.id,
                key_version,
                "Verifying with superseded key inside rotation grace"
            );
        }
        Ok(previous)
    }

    async fn reusable_ticket(
        &self,
        service: &Service,
        target: ServiceId,
        now: DateTime<Utc>,
    ) -> Option<Ticket> {
        let key = (service.id, target);
        let cached = match tokio::time::timeout(self.config.store_timeout, self.cache.get(key)).await
        {
            Ok(Ok(cached)) => cached?,
            Ok(Err(e)) => {
                warn!(source_id = %service.id, target_id = %target, error = %e, "Ticket cache read failed");
                return None;
            }
            Err(_) => {
                warn!(source_id = %service.id, target_id = %target, "Ticket cache read timed out");
                return None;
            }
        };

        let fresh = cached
            .claims
            .remaining_at(now)
            .map_or(false, |left| left >= self.config.cache_min_remaining);
        let usable = fresh
            && !cached.claims.is_expired_at(now)
            && cached.key_version == service.key_version
            && cached.source_id() == service.id
            && cached.target_id() == target;

        usable.then_some(cached)
    }

    async fn cache_store(&self, source: ServiceId, target: ServiceId, ticket: Ticket, ttl: Duration) {
        match tokio::time::timeout(self.config.store_timeout, self.cache.set((source, target), ticket, ttl))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(source_id = %source, target_id = %target, error = %e, "Ticket cache write failed");
            }
            Err(_) => {
                warn!(source_id = %source, target_id = %target, "Ticket cache write timed out");
            }
        }
    }

    async fn cache_evict(&self, source: ServiceId, target: ServiceId) {
        match tokio::time::timeout(self.config.store_timeout, self.cache.invalidate((source, target)))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(source_id = %source, target_id = %target, error = %e, "Ticket cache invalidation failed");
            }
            Err(_) => {
                warn!(source_id = %source, target_id = %target, "Ticket cache invalidation timed out");
            }
        }
    }
}
