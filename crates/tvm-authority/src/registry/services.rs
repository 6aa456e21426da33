//! Service Registry
//!
//! Durable registry of services and the key pairs the authority custodies
//! for them. Registration generates the key pair before the row is written;
//! the store's unique constraint decides name collisions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tvm_core::{KeyManager, PublicKey, ServiceId};

use crate::config::DEFAULT_STORE_TIMEOUT;
use crate::error::{bounded, AuthorityError, Result};
use crate::storage::{KeyRotation, KeyRotationRecord, NewService, Service, ServiceStore};

/// Longest accepted service name
pub const MAX_NAME_LEN: usize = 255;

/// Longest accepted service description
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Registry of services and their current keys
pub struct ServiceRegistry {
    store: Arc<dyn ServiceStore>,
    key_manager: Arc<dyn KeyManager>,
    timeout: Duration,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn ServiceStore>, key_manager: Arc<dyn KeyManager>) -> Self {
        Self {
            store,
            key_manager,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Deadline applied to every store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Key manager used for generation, signing and verification
    pub fn key_manager(&self) -> &Arc<dyn KeyManager> {
        &self.key_manager
    }

    /// Register a new service with a fresh key pair
    ///
    /// Not idempotent: a second registration under the same name fails with
    /// `NameExists` so two callers never share an identity.
    pub async fn register(&self, name: &str, description: &str) -> Result<Service> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthorityError::InvalidInput("service name cannot be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(AuthorityError::InvalidInput(format!(
                "service name too long (max {} chars)",
                MAX_NAME_LEN
            )));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(AuthorityError::InvalidInput(format!(
                "description too long (max {} chars)",
                MAX_DESCRIPTION_LEN
            )));
        }

        let key_pair = self.key_manager.generate_key_pair().map_err(|e| {
            warn!(name = %name, error = %e, "Key generation failed during registration");
            AuthorityError::Configuration(e.to_string())
        })?;

        let new = NewService {
            name: name.to_string(),
            description: description.to_string(),
            key_pair,
            created_at: Utc::now(),
        };

        let service = bounded(self.timeout, "insert_service", self.store.insert_service(new))
            .await
            .map_err(|e| {
                if matches!(e, AuthorityError::NameExists(_)) {
                    warn!(name = %name, "Registration rejected: name already taken");
                }
                e
            })?;

        info!(service_id = %service.id, name = %service.name, "Registered service");
        Ok(service)
    }

    /// Look up a service by id, active or not
    pub async fn find(&self, id: ServiceId) -> Result<Option<Service>> {
        bounded(self.timeout, "get_service", self.store.get_service(id)).await
    }

    /// Get a service by id
    pub async fn get_by_id(&self, id: ServiceId) -> Result<Service> {
        self.find(id)
            .await?
            .ok_or(AuthorityError::ServiceNotFound(id))
    }

    /// Get a service by name
    pub async fn get_by_name(&self, name: &str) -> Result<Service> {
        bounded(self.timeout, "get_service_by_name", self.store.get_service_by_name(name))
            .await?
            .ok_or_else(|| AuthorityError::NotFound(format!("service '{}'", name)))
    }

    /// Persist description, active flag and last access time
    pub async fn update(&self, service: &Service) -> Result<()> {
        let updated = bounded(self.timeout, "update_service", self.store.update_service(service)).await?;
        if !updated {
            return Err(AuthorityError::ServiceNotFound(service.id));
        }
        info!(service_id = %service.id, active = service.active, "Updated service");
        Ok(())
    }

    /// Current public key of a service
    pub async fn get_public_key(&self, id: ServiceId) -> Result<PublicKey> {
        Ok(self.get_by_id(id).await?.public_key)
    }

    /// Record that a ticket was issued for a service
    pub async fn touch(&self, id: ServiceId, at: DateTime<Utc>) -> Result<()> {
        bounded(self.timeout, "touch_service", self.store.touch_service(id, at)).await
    }

    /// All registered services
    pub async fn list(&self) -> Result<Vec<Service>> {
        bounded(self.timeout, "list_services", self.store.list_services()).await
    }

    /// Apply a prepared key rotation atomically
    pub(crate) async fn apply_rotation(&self, rotation: KeyRotation) -> Result<KeyRotationRecord> {
        let id = rotation.service_id;
        bounded(self.timeout, "rotate_key", self.store.rotate_key(rotation))
            .await
            .map_err(|e| match e {
                AuthorityError::NotFound(_) => AuthorityError::ServiceNotFound(id),
                other => other,
            })
    }

    /// Rotation history, newest first
    pub async fn rotations(&self, id: ServiceId) -> Result<Vec<KeyRotationRecord>> {
        bounded(self.timeout, "list_rotations", self.store.list_rotations(id)).await
    }

    /// Most recent rotation
    pub async fn latest_rotation(&self, id: ServiceId) -> Result<Option<KeyRotationRecord>> {
        bounded(self.timeout, "latest_rotation", self.store.latest_rotation(id)).await
    }
}
