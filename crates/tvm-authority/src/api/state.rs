//! Shared application state

use std::sync::Arc;

use tvm_core::{Ed25519KeyManager, KeyManager};

use crate::config::AuthorityConfig;
use crate::core::{MokaTicketCache, TicketAuthority, TicketCache};
use crate::error::Result;
use crate::keys::{KeyRotationManager, ServiceLocks};
use crate::registry::{AccessGraph, ServiceRegistry};
use crate::storage::{GrantStore, MemoryStore, ServiceStore};

/// Application state shared across handlers
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub access: Arc<AccessGraph>,
    pub authority: TicketAuthority,
    pub rotation: KeyRotationManager,
    pub config: AuthorityConfig,
}

impl AppState {
    /// Wire the components over the given collaborators
    ///
    /// All components share one lock table, so rotation excludes in-flight
    /// issue and validate for the same service.
    pub fn build(
        services: Arc<dyn ServiceStore>,
        grants: Arc<dyn GrantStore>,
        key_manager: Arc<dyn KeyManager>,
        cache: Arc<dyn TicketCache>,
        config: AuthorityConfig,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(
            ServiceRegistry::new(services.clone(), key_manager).with_timeout(config.store_timeout),
        );
        let access =
            Arc::new(AccessGraph::new(grants, services).with_timeout(config.store_timeout));
        let locks = Arc::new(ServiceLocks::new());

        let authority = TicketAuthority::new(
            registry.clone(),
            access.clone(),
            cache,
            locks.clone(),
            config.clone(),
        )?;
        let rotation =
            KeyRotationManager::new(registry.clone(), locks).with_timeout(config.store_timeout);

        Ok(Self {
            registry,
            access,
            authority,
            rotation,
            config,
        })
    }

    /// In-memory store, Ed25519 keys and a moka ticket cache
    pub fn in_memory(config: AuthorityConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MokaTicketCache::new(config.cache_capacity));
        Self::build(
            store.clone(),
            store,
            Arc::new(Ed25519KeyManager::new()),
            cache,
            config,
        )
    }
}
