//! Integration Tests for the TVM Authority
//!
//! These tests drive the wired components end to end:
//! - Issue and validate for granted and ungranted pairs
//! - Expiry, revocation and rotation invalidating tickets
//! - The rotation grace window
//! - Timeouts and cache failures from collaborators

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use tvm_authority::core::CacheError;
use tvm_authority::storage::AccessGrant;
use tvm_authority::{
    AppState, AuthorityConfig, AuthorityError, GrantStore, MemoryStore, NoopTicketCache,
    StorageError, TicketCache,
};
use tvm_core::{Ed25519KeyManager, ServiceId, Ticket};

// =============================================================================
// Test Helpers
// =============================================================================

fn state(config: AuthorityConfig) -> AppState {
    AppState::in_memory(config).expect("valid config")
}

/// Register `orders` (id 1) and `billing` (id 2)
async fn register_pair(state: &AppState) -> (ServiceId, ServiceId) {
    let a = state.registry.register("orders", "Order intake").await.unwrap();
    let b = state.registry.register("billing", "Billing API").await.unwrap();
    (a.id, b.id)
}

/// Grant store whose reads hang, to exercise deadlines
#[derive(Debug, Default)]
struct SlowGrantStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl GrantStore for SlowGrantStore {
    async fn put_grant(&self, grant: AccessGrant) -> Result<(), StorageError> {
        self.inner.put_grant(grant).await
    }

    async fn delete_grant(&self, source: ServiceId, target: ServiceId) -> Result<bool, StorageError> {
        self.inner.delete_grant(source, target).await
    }

    async fn get_grant(
        &self,
        source: ServiceId,
        target: ServiceId,
    ) -> Result<Option<AccessGrant>, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_grant(source, target).await
    }

    async fn list_grants_from(&self, source: ServiceId) -> Result<Vec<AccessGrant>, StorageError> {
        self.inner.list_grants_from(source).await
    }
}

/// Cache that fails every call
#[derive(Debug)]
struct BrokenCache;

#[async_trait]
impl TicketCache for BrokenCache {
    async fn get(&self, _key: (ServiceId, ServiceId)) -> Result<Option<Ticket>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(
        &self,
        _key: (ServiceId, ServiceId),
        _ticket: Ticket,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn invalidate(&self, _key: (ServiceId, ServiceId)) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

// =============================================================================
// Core Properties
// =============================================================================

#[tokio::test]
async fn test_granted_pair_issue_then_validate() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let ticket = state.authority.issue(a, b).await.unwrap();
    let claims = state.authority.validate(&ticket).await.unwrap();

    assert_eq!(claims.source_id, a);
    assert_eq!(claims.target_id, b);
}

#[tokio::test]
async fn test_ungranted_pair_gets_no_ticket() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    // Grants are directed
    let result = state.authority.issue(b, a).await;
    match result {
        Err(AuthorityError::AccessDenied {
            source_id,
            target_id,
        }) => {
            assert_eq!(source_id, b);
            assert_eq!(target_id, a);
        }
        other => panic!("expected AccessDenied, got {:?}", other.map(|t| t.claims)),
    }
}

#[tokio::test]
async fn test_expired_ticket_rejected_regardless_of_signature() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let mut ticket = state.authority.issue(a, b).await.unwrap();
    let after_expiry = ticket.claims.expires_at_time().unwrap() + ChronoDuration::seconds(1);

    assert!(matches!(
        state.authority.validate_at(&ticket, after_expiry).await,
        Err(AuthorityError::TicketExpired)
    ));

    ticket.signature = vec![0u8; 64];
    assert!(matches!(
        state.authority.validate_at(&ticket, after_expiry).await,
        Err(AuthorityError::TicketExpired)
    ));
}

#[tokio::test]
async fn test_revoke_after_issue_denies_validation() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let ticket = state.authority.issue(a, b).await.unwrap();
    state.authority.revoke_access(a, b).await.unwrap();

    assert!(matches!(
        state.authority.validate(&ticket).await,
        Err(AuthorityError::AccessDenied { .. })
    ));
}

#[tokio::test]
async fn test_rotation_invalidates_previous_tickets() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let old = state.authority.issue(a, b).await.unwrap();
    state.authority.validate(&old).await.unwrap();

    state.rotation.rotate(a).await.unwrap();

    assert!(matches!(
        state.authority.validate(&old).await,
        Err(AuthorityError::InvalidSignature)
    ));

    // Pretending the old ticket was signed with the new version does not help
    let mut relabelled = old.clone();
    relabelled.key_version = 2;
    assert!(matches!(
        state.authority.validate(&relabelled).await,
        Err(AuthorityError::InvalidSignature)
    ));

    let fresh = state.authority.issue(a, b).await.unwrap();
    assert_eq!(fresh.key_version, 2);
    state.authority.validate(&fresh).await.unwrap();
}

#[tokio::test]
async fn test_mutated_target_fails_validation() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    let c = state.registry.register("ledger", "").await.unwrap().id;
    state.access.grant(a, b).await.unwrap();
    state.access.grant(a, c).await.unwrap();

    let mut ticket = state.authority.issue(a, b).await.unwrap();
    ticket.claims.target_id = c;

    assert!(matches!(
        state.authority.validate(&ticket).await,
        Err(AuthorityError::InvalidSignature)
    ));
}

// =============================================================================
// Concrete Scenario
// =============================================================================

#[tokio::test]
async fn test_concrete_scenario() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    assert_eq!(a, ServiceId(1));
    assert_eq!(b, ServiceId(2));

    state.access.grant(a, b).await.unwrap();

    let ticket = state.authority.issue(a, b).await.unwrap();
    let ttl = state.config.ticket_ttl.as_secs() as i64;
    assert_eq!(ticket.claims.expires_at, ticket.claims.issued_at + ttl);

    let issued_at = ticket.claims.issued_at_time().unwrap();
    let claims = state
        .authority
        .validate_at(&ticket, issued_at + ChronoDuration::seconds(1))
        .await
        .unwrap();
    assert_eq!((claims.source_id, claims.target_id), (a, b));

    let expires_at = ticket.claims.expires_at_time().unwrap();
    assert!(matches!(
        state
            .authority
            .validate_at(&ticket, expires_at + ChronoDuration::seconds(1))
            .await,
        Err(AuthorityError::TicketExpired)
    ));

    state.authority.revoke_access(a, b).await.unwrap();
    assert!(matches!(
        state.authority.issue(a, b).await,
        Err(AuthorityError::AccessDenied { .. })
    ));
}

// =============================================================================
// Rotation Grace
// =============================================================================

#[tokio::test]
async fn test_previous_key_accepted_within_grace() {
    let state = state(AuthorityConfig::default().with_rotation_grace(Duration::from_secs(60)));
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let old = state.authority.issue(a, b).await.unwrap();
    let record = state.rotation.rotate(a).await.unwrap();

    state.authority.validate(&old).await.unwrap();

    let past_grace = record.rotated_at + ChronoDuration::seconds(61);
    assert!(matches!(
        state.authority.validate_at(&old, past_grace).await,
        Err(AuthorityError::InvalidSignature)
    ));
}

#[tokio::test]
async fn test_grace_covers_only_one_rotation() {
    let state = state(AuthorityConfig::default().with_rotation_grace(Duration::from_secs(60)));
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let old = state.authority.issue(a, b).await.unwrap();
    state.rotation.rotate(a).await.unwrap();
    state.rotation.rotate(a).await.unwrap();

    assert!(matches!(
        state.authority.validate(&old).await,
        Err(AuthorityError::InvalidSignature)
    ));
}

// =============================================================================
// Collaborator Failures
// =============================================================================

#[tokio::test]
async fn test_store_timeout_is_transient() {
    let store = Arc::new(MemoryStore::new());
    let grants = Arc::new(SlowGrantStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(500),
    });
    let state = AppState::build(
        store,
        grants,
        Arc::new(Ed25519KeyManager::new()),
        Arc::new(NoopTicketCache),
        AuthorityConfig::default().with_store_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let err = state.authority.issue(a, b).await.unwrap_err();
    assert!(matches!(err, AuthorityError::Transient(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cache_failures_do_not_fail_requests() {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::build(
        store.clone(),
        store,
        Arc::new(Ed25519KeyManager::new()),
        Arc::new(BrokenCache),
        AuthorityConfig::default(),
    )
    .unwrap();
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let ticket = state.authority.issue(a, b).await.unwrap();
    state.authority.validate(&ticket).await.unwrap();
    assert!(state.authority.revoke_access(a, b).await.unwrap());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_during_rotation() {
    let state = Arc::new(state(AuthorityConfig::default()));
    let (a, b) = register_pair(&state).await;
    state.access.grant(a, b).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..32 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            if i % 8 == 0 {
                state.rotation.rotate(a).await.map(|_| None)
            } else {
                state.authority.issue(a, b).await.map(Some)
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every rotation landed exactly once
    let service = state.registry.get_by_id(a).await.unwrap();
    assert_eq!(service.key_version, 5);
    assert_eq!(state.rotation.history(a).await.unwrap().len(), 4);

    // Tickets issued now use the final key
    let ticket = state.authority.issue(a, b).await.unwrap();
    assert_eq!(ticket.key_version, 5);
    state.authority.validate(&ticket).await.unwrap();
}

#[tokio::test]
async fn test_grant_expiry_is_honored() {
    let state = state(AuthorityConfig::default());
    let (a, b) = register_pair(&state).await;
    let expires = Utc::now() + ChronoDuration::minutes(10);
    state.access.grant_until(a, b, Some(expires)).await.unwrap();

    let ticket = state.authority.issue(a, b).await.unwrap();
    state.authority.validate(&ticket).await.unwrap();

    assert!(matches!(
        state.authority.validate_at(&ticket, expires).await,
        Err(AuthorityError::AccessDenied { .. })
    ));
    assert!(matches!(
        state.authority.issue_at(a, b, expires).await,
        Err(AuthorityError::AccessDenied { .. })
    ));
}
