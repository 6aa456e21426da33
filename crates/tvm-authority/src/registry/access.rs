//! Access Graph
//!
//! Directed grants between services. A grant `(source, target)` is the only
//! thing that authorizes `source` to obtain tickets for `target`; there is no
//! default allow. Granting and revoking are both idempotent, and only
//! registered services can be granted.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use tvm_core::ServiceId;

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::error::{bounded, AuthorityError, Result};
use crate::storage::{AccessGrant, GrantStore, ServiceStore};

/// Store-backed graph of access grants
pub struct AccessGraph {
    store: Arc<dyn GrantStore>,
    services: Arc<dyn ServiceStore>,
    timeout: Duration,
}

impl AccessGraph {
    /// Grants live in `store`; endpoints are checked against `services`
    pub fn new(store: Arc<dyn GrantStore>, services: Arc<dyn ServiceStore>) -> Self {
        Self {
            store,
            services,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Deadline applied to every store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow `source` to call `target` with no expiry
    pub async fn grant(&self, source: ServiceId, target: ServiceId) -> Result<AccessGrant> {
        self.grant_until(source, target, None).await
    }

    /// Allow `source` to call `target` until `expires_at`
    ///
    /// Re-granting an existing edge replaces its expiry. Both endpoints must
    /// be registered.
    pub async fn grant_until(
        &self,
        source: ServiceId,
        target: ServiceId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AccessGrant> {
        let now = Utc::now();
        if let Some(exp) = expires_at {
            if exp <= now {
                return Err(AuthorityError::InvalidInput(
                    "grant expiry must be in the future".into(),
                ));
            }
        }

        self.require_service(source).await?;
        self.require_service(target).await?;

        let grant = AccessGrant {
            source_id: source,
            target_id: target,
            created_at: now,
            expires_at,
        };
        bounded(self.timeout, "put_grant", self.store.put_grant(grant.clone())).await?;

        info!(
            source_id = %source,
            target_id = %target,
            expires_at = ?expires_at,
            "Granted access"
        );
        Ok(grant)
    }

    async fn require_service(&self, id: ServiceId) -> Result<()> {
        match bounded(self.timeout, "get_service", self.services.get_service(id)).await? {
            Some(_) => Ok(()),
            None => {
                warn!(service_id = %id, "Grant rejected: unknown service");
                Err(AuthorityError::ServiceNotFound(id))
            }
        }
    }

    /// Remove the edge; returns whether one existed
    pub async fn revoke(&self, source: ServiceId, target: ServiceId) -> Result<bool> {
        let removed = bounded(self.timeout, "delete_grant", self.store.delete_grant(source, target)).await?;
        if removed {
            info!(source_id = %source, target_id = %target, "Revoked access");
        } else {
            debug!(source_id = %source, target_id = %target, "Revoke of absent grant");
        }
        Ok(removed)
    }

    /// True if a live grant exists now
    pub async fn has_access(&self, source: ServiceId, target: ServiceId) -> Result<bool> {
        self.has_access_at(source, target, Utc::now()).await
    }

    /// True if a live grant exists at `now`; expired edges count as absent
    pub async fn has_access_at(
        &self,
        source: ServiceId,
        target: ServiceId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let grant = bounded(self.timeout, "get_grant", self.store.get_grant(source, target)).await?;
        Ok(grant.map_or(false, |g| g.is_live_at(now)))
    }

    /// Live outgoing grants of `source`
    pub async fn grants_from(&self, source: ServiceId) -> Result<Vec<AccessGrant>> {
        let now = Utc::now();
        let grants = bounded(self.timeout, "list_grants_from", self.store.list_grants_from(source)).await?;
        Ok(grants.into_iter().filter(|g| g.is_live_at(now)).collect())
    }
}
