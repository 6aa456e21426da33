//! Local ticket verification
//!
//! Verifies tickets in-process against the source service's public key,
//! fetched from the authority once and cached, so the hot path needs no
//! round trip.
//!
//! ## Staleness
//!
//! A local verifier only sees what the cached key tells it:
//! - a revoked grant goes unnoticed until the ticket expires
//! - after a rotation, tickets signed with the superseded key keep verifying
//!   until the cached key entry expires (`key_ttl`)
//! - a ticket claiming a newer key version triggers at most one refetch per
//!   `refetch_interval`, since the version on a ticket is unauthenticated
//!
//! Services that must observe revocation immediately should validate through
//! the authority (`TvmClient`) instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use tvm_core::{Claims, Ed25519KeyManager, ServiceId, Ticket};

use crate::bridge::{PublicKeySource, TicketValidator};
use crate::error::{BridgeError, Result};
use crate::types::ServiceKey;

/// Default lifetime of a cached public key
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of cached keys
pub const DEFAULT_KEY_CAPACITY: u64 = 1_000;

/// Default minimum spacing between fetches of one service's key
pub const DEFAULT_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// A fetched key and when it was fetched
#[derive(Debug)]
struct CachedKey {
    key: ServiceKey,
    fetched_at: Instant,
}

/// Verifies tickets against cached public keys
pub struct LocalVerifier {
    keys: Arc<dyn PublicKeySource>,
    key_cache: Cache<ServiceId, Arc<CachedKey>>,
    key_manager: Ed25519KeyManager,
    refetch_interval: Duration,
}

impl LocalVerifier {
    pub fn new(keys: Arc<dyn PublicKeySource>) -> Self {
        Self::with_key_ttl(keys, DEFAULT_KEY_TTL)
    }

    /// Bound how long a fetched key is trusted before refetching
    pub fn with_key_ttl(keys: Arc<dyn PublicKeySource>, key_ttl: Duration) -> Self {
        Self {
            keys,
            key_cache: Cache::builder()
                .time_to_live(key_ttl)
                .max_capacity(DEFAULT_KEY_CAPACITY)
                .build(),
            key_manager: Ed25519KeyManager::new(),
            refetch_interval: DEFAULT_REFETCH_INTERVAL,
        }
    }

    /// Minimum spacing between fetches of one service's key
    pub fn with_refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = interval;
        self
    }

    /// Service key, from cache when present
    async fn key_for(&self, service: ServiceId) -> Result<Arc<CachedKey>> {
        match self.key_cache.get(&service).await {
            Some(cached) => Ok(cached),
            None => self.fetch(service).await,
        }
    }

    /// Fetch a service key from the source and cache it
    async fn fetch(&self, service: ServiceId) -> Result<Arc<CachedKey>> {
        debug!(service_id = %service, "Fetching service public key");
        let key = self.keys.public_key(service).await?;
        if key.service_id != service {
            return Err(BridgeError::InvalidFormat(format!(
                "asked for key of service {}, got {}",
                service, key.service_id
            )));
        }

        let cached = Arc::new(CachedKey {
            key,
            fetched_at: Instant::now(),
        });
        self.key_cache.insert(service, cached.clone()).await;
        Ok(cached)
    }

    /// Drop a cached key so the next lookup refetches it
    pub async fn forget(&self, service: ServiceId) {
        self.key_cache.invalidate(&service).await;
    }

    /// Verify an encoded ticket as of `now`
    pub async fn verify_at(&self, encoded: &str, now: DateTime<Utc>) -> Result<Claims> {
        let ticket = Ticket::decode(encoded)?;
        let claims = ticket.claims;
        let source = claims.source_id;

        if claims.is_expired_at(now) {
            debug!(source_id = %source, expires_at = claims.expires_at, "Ticket expired");
            return Err(BridgeError::Expired);
        }

        let mut cached = self.key_for(source).await?;

        // Possibly signed after a rotation we have not seen yet
        if ticket.key_version > cached.key.key_version
            && cached.fetched_at.elapsed() >= self.refetch_interval
        {
            cached = self.fetch(source).await?;
        }
        let key = &cached.key;

        if key.key_version != ticket.key_version
            || !ticket.verify(&self.key_manager, &key.public_key)
        {
            warn!(
                source_id = %source,
                target_id = %claims.target_id,
                key_version = ticket.key_version,
                cached_key_version = key.key_version,
                "Ticket rejected: signature does not verify"
            );
            return Err(BridgeError::InvalidSignature);
        }

        Ok(claims)
    }
}

#[async_trait]
impl TicketValidator for LocalVerifier {
    async fn validate(&self, encoded: &str) -> Result<Claims> {
        self.verify_at(encoded, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tvm_core::{KeyManager, KeyPair};

    /// Key source backed by a map, counting fetches
    #[derive(Default)]
    struct FakeKeys {
        keys: Mutex<HashMap<ServiceId, ServiceKey>>,
        fetches: AtomicUsize,
    }

    impl FakeKeys {
        fn set(&self, service: ServiceId, pair: &KeyPair, version: u32) {
            self.keys.lock().unwrap().insert(
                service,
                ServiceKey {
                    service_id: service,
                    public_key: pair.public_key().clone(),
                    key_version: version,
                    algorithm: "Ed25519".into(),
                },
            );
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PublicKeySource for FakeKeys {
        async fn public_key(&self, service: ServiceId) -> Result<ServiceKey> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.keys
                .lock()
                .unwrap()
                .get(&service)
                .cloned()
                .ok_or_else(|| BridgeError::ServiceNotFound(service.to_string()))
        }
    }

    fn encoded(pair: &KeyPair, version: u32, source: i64, target: i64) -> String {
        let km = Ed25519KeyManager::new();
        let claims = tvm_core::Claims::new(
            ServiceId(source),
            ServiceId(target),
            Utc::now(),
            chrono::Duration::hours(1),
        )
        .unwrap();
        Ticket::sign(claims, version, &km, pair.private_key())
            .unwrap()
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_verifies_and_caches_key() {
        let km = Ed25519KeyManager::new();
        let pair = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &pair, 1);
        let verifier = LocalVerifier::new(keys.clone());

        let ticket = encoded(&pair, 1, 1, 2);
        let claims = verifier.validate(&ticket).await.unwrap();
        assert_eq!(claims.source_id, ServiceId(1));
        assert_eq!(claims.target_id, ServiceId(2));

        verifier.validate(&ticket).await.unwrap();
        assert_eq!(keys.fetches(), 1);
    }

    #[tokio::test]
    async fn test_expired_ticket() {
        let km = Ed25519KeyManager::new();
        let pair = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &pair, 1);
        let verifier = LocalVerifier::new(keys);

        let ticket = encoded(&pair, 1, 1, 2);
        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(matches!(
            verifier.verify_at(&ticket, later).await,
            Err(BridgeError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_foreign_key_rejected() {
        let km = Ed25519KeyManager::new();
        let real = km.generate_key_pair().unwrap();
        let attacker = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &real, 1);
        let verifier = LocalVerifier::new(keys);

        let forged = encoded(&attacker, 1, 1, 2);
        assert!(matches!(
            verifier.validate(&forged).await,
            Err(BridgeError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_newer_key_version_triggers_refetch() {
        let km = Ed25519KeyManager::new();
        let old = km.generate_key_pair().unwrap();
        let new = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &old, 1);
        let verifier = LocalVerifier::new(keys.clone()).with_refetch_interval(Duration::ZERO);

        verifier.validate(&encoded(&old, 1, 1, 2)).await.unwrap();

        // Authority rotates; the verifier still caches version 1
        keys.set(ServiceId(1), &new, 2);
        verifier.validate(&encoded(&new, 2, 1, 2)).await.unwrap();
        assert_eq!(keys.fetches(), 2);

        // Old-key tickets no longer verify once the new key is cached
        assert!(matches!(
            verifier.validate(&encoded(&old, 1, 1, 2)).await,
            Err(BridgeError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_claimed_newer_version_refetches_at_most_once_per_interval() {
        let km = Ed25519KeyManager::new();
        let real = km.generate_key_pair().unwrap();
        let attacker = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &real, 1);
        let verifier = LocalVerifier::new(keys.clone());

        for _ in 0..100 {
            assert!(matches!(
                verifier.validate(&encoded(&attacker, u32::MAX, 1, 2)).await,
                Err(BridgeError::InvalidSignature)
            ));
        }
        assert_eq!(keys.fetches(), 1);

        // The cached key still verifies genuine tickets
        verifier.validate(&encoded(&real, 1, 1, 2)).await.unwrap();
        assert_eq!(keys.fetches(), 1);
    }

    #[tokio::test]
    async fn test_refetch_keeps_authority_version() {
        let km = Ed25519KeyManager::new();
        let real = km.generate_key_pair().unwrap();
        let attacker = km.generate_key_pair().unwrap();
        let keys = Arc::new(FakeKeys::default());
        keys.set(ServiceId(1), &real, 1);
        let verifier = LocalVerifier::new(keys.clone()).with_refetch_interval(Duration::ZERO);

        assert!(verifier
            .validate(&encoded(&attacker, u32::MAX, 1, 2))
            .await
            .is_err());
        assert_eq!(keys.fetches(), 2);
        verifier.validate(&encoded(&real, 1, 1, 2)).await.unwrap();
        assert_eq!(keys.fetches(), 2);
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let km = Ed25519KeyManager::new();
        let pair = km.generate_key_pair().unwrap();
        let verifier = LocalVerifier::new(Arc::new(FakeKeys::default()));

        assert!(matches!(
            verifier.validate(&encoded(&pair, 1, 5, 2)).await,
            Err(BridgeError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_ticket() {
        let verifier = LocalVerifier::new(Arc::new(FakeKeys::default()));
        assert!(matches!(
            verifier.validate("%%%").await,
            Err(BridgeError::InvalidFormat(_))
        ));
    }
}
