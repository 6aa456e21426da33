//! Key Rotation Manager
//!
//! Replaces a service's key pair and records the change in the append-only
//! rotation log. The audit insert and the key swap happen in one store
//! transaction, guarded by a compare-and-swap on the key version, while the
//! service's exclusive lock keeps issue and validate out of the way.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tvm_core::ServiceId;

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::error::{AuthorityError, Result};
use crate::keys::ServiceLocks;
use crate::registry::ServiceRegistry;
use crate::storage::{KeyRotation, KeyRotationRecord};

/// Rotates service keys and exposes the rotation history
pub struct KeyRotationManager {
    registry: Arc<ServiceRegistry>,
    locks: Arc<ServiceLocks>,
    timeout: Duration,
}

impl KeyRotationManager {
    pub fn new(registry: Arc<ServiceRegistry>, locks: Arc<ServiceLocks>) -> Self {
        Self {
            registry,
            locks,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Deadline for acquiring the service's exclusive lock
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate a new key pair for a service and make it current
    ///
    /// Tickets signed under the previous key stop verifying once this
    /// returns, unless a rotation grace period is configured.
    pub async fn rotate(&self, id: ServiceId) -> Result<KeyRotationRecord> {
        let _guard = self.locks.exclusive(id, self.timeout).await?;

        let service = self.registry.get_by_id(id).await?;
        let new_key_pair = self.registry.key_manager().generate_key_pair().map_err(|e| {
            warn!(service_id = %id, error = %e, "Key generation failed during rotation");
            AuthorityError::Configuration(e.to_string())
        })?;

        let record = self
            .registry
            .apply_rotation(KeyRotation {
                service_id: id,
                expected_version: service.key_version,
                new_key_pair,
                rotated_at: Utc::now(),
            })
            .await?;

        info!(
            service_id = %id,
            old_key_version = record.old_key_version,
            new_key_version = record.new_key_version,
            "Rotated service key"
        );
        Ok(record)
    }

    /// Rotation history of a service, newest first
    pub async fn history(&self, id: ServiceId) -> Result<Vec<KeyRotationRecord>> {
        self.registry.get_by_id(id).await?;
        self.registry.rotations(id).await
    }

    /// Most recent rotation of a service, if any
    pub async fn latest(&self, id: ServiceId) -> Result<Option<KeyRotationRecord>> {
        self.registry.get_by_id(id).await?;
        self.registry.latest_rotation(id).await
    }
}
