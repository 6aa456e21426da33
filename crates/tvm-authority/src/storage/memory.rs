//! In-memory storage backend
//!
//! Default storage implementation using in-memory hashmaps behind a single
//! lock, which makes name uniqueness and key rotation atomic.
//! Suitable for development and single-instance deployments.
//! Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use tvm_core::ServiceId;

use super::{
    AccessGrant, GrantStore, KeyRotation, KeyRotationRecord, NewService, Service, ServiceStore,
    StorageError,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    services: HashMap<ServiceId, Service>,
    names: HashMap<String, ServiceId>,
    grants: HashMap<(ServiceId, ServiceId), AccessGrant>,
    rotations: Vec<KeyRotationRecord>,
}

/// In-memory store implementing both service and grant persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::Database("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    // =========================================================================
    // Services
    // =========================================================================

    async fn insert_service(&self, new: NewService) -> Result<Service, StorageError> {
        let mut state = self.write()?;
        if state.names.contains_key(&new.name) {
            return Err(StorageError::AlreadyExists(new.name));
        }

        state.next_id += 1;
        let id = ServiceId(state.next_id);
        let (public_key, private_key) = new.key_pair.into_parts();
        let service = Service {
            id,
            name: new.name,
            description: new.description,
            public_key,
            private_key,
            key_version: 1,
            active: true,
            created_at: new.created_at,
            last_access_at: None,
        };

        state.names.insert(service.name.clone(), id);
        state.services.insert(id, service.clone());
        info!(service_id = %id, name = %service.name, "Stored new service");
        Ok(service)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StorageError> {
        Ok(self.read()?.services.get(&id).cloned())
    }

    async fn get_service_by_name(&self, name: &str) -> Result<Option<Service>, StorageError> {
        let state = self.read()?;
        Ok(state
            .names
            .get(name)
            .and_then(|id| state.services.get(id))
            .cloned())
    }

    async fn update_service(&self, service: &Service) -> Result<bool, StorageError> {
        let mut state = self.write()?;
        match state.services.get_mut(&service.id) {
            Some(stored) => {
                stored.description = service.description.clone();
                stored.active = service.active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_service(&self, id: ServiceId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let stored = state
            .services
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("service {}", id)))?;
        stored.last_access_at = Some(at);
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<Service>, StorageError> {
        let state = self.read()?;
        let mut services: Vec<Service> = state.services.values().cloned().collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }

    // =========================================================================
    // Key Rotation
    // =========================================================================

    async fn rotate_key(&self, rotation: KeyRotation) -> Result<KeyRotationRecord, StorageError> {
        let mut state = self.write()?;
        let stored = state
            .services
            .get_mut(&rotation.service_id)
            .ok_or_else(|| StorageError::NotFound(format!("service {}", rotation.service_id)))?;

        if stored.key_version != rotation.expected_version {
            return Err(StorageError::Conflict(format!(
                "service {} key version is {}, expected {}",
                rotation.service_id, stored.key_version, rotation.expected_version
            )));
        }

        let (new_public, new_private) = rotation.new_key_pair.into_parts();
        let record = KeyRotationRecord {
            service_id: rotation.service_id,
            old_public_key: stored.public_key.clone(),
            new_public_key: new_public.clone(),
            old_key_version: stored.key_version,
            new_key_version: stored.key_version + 1,
            rotated_at: rotation.rotated_at,
        };

        stored.public_key = new_public;
        stored.private_key = new_private;
        stored.key_version = record.new_key_version;
        state.rotations.push(record.clone());

        Ok(record)
    }

    async fn list_rotations(&self, id: ServiceId) -> Result<Vec<KeyRotationRecord>, StorageError> {
        let state = self.read()?;
        let mut records: Vec<KeyRotationRecord> = state
            .rotations
            .iter()
            .filter(|r| r.service_id == id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.rotated_at
                .cmp(&a.rotated_at)
                .then(b.new_key_version.cmp(&a.new_key_version))
        });
        Ok(records)
    }

    async fn latest_rotation(&self, id: ServiceId) -> Result<Option<KeyRotationRecord>, StorageError> {
        Ok(self.list_rotations(id).await?.into_iter().next())
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn put_grant(&self, grant: AccessGrant) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state
            .grants
            .entry((grant.source_id, grant.target_id))
            .and_modify(|existing| existing.expires_at = grant.expires_at)
            .or_insert(grant);
        Ok(())
    }

    async fn delete_grant(&self, source: ServiceId, target: ServiceId) -> Result<bool, StorageError> {
        Ok(self.write()?.grants.remove(&(source, target)).is_some())
    }

    async fn get_grant(
        &self,
        source: ServiceId,
        target: ServiceId,
    ) -> Result<Option<AccessGrant>, StorageError> {
        Ok(self.read()?.grants.get(&(source, target)).cloned())
    }

    async fn list_grants_from(&self, source: ServiceId) -> Result<Vec<AccessGrant>, StorageError> {
        let state = self.read()?;
        let mut grants: Vec<AccessGrant> = state
            .grants
            .values()
            .filter(|g| g.source_id == source)
            .cloned()
            .collect();
        grants.sort_by_key(|g| g.target_id);
        Ok(grants)
    }
}
