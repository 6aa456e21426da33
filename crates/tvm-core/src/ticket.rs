//! Tickets and their canonical claim encoding
//!
//! A ticket asserts "service `source_id` may call service `target_id` until
//! `expires_at`". The signature covers `Claims::canonical_bytes()` only, and
//! that function is the single serializer shared by issuance and validation.
//!
//! ## Canonical layout
//!
//! ```text
//! "tvm-ticket-v1\0" | source_id (i64 BE) | target_id (i64 BE) | issued_at (i64 BE) | expires_at (i64 BE)
//! ```
//!
//! Every field is fixed-width and always present, so two different claim
//! tuples can never produce the same signed bytes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyManager, PrivateKey, PublicKey};
use crate::error::{CoreError, Result};
use crate::types::{ServiceId, SignatureAlgorithm};

/// Domain separation prefix for signed claim bytes
pub const TICKET_DOMAIN_TAG: &[u8] = b"tvm-ticket-v1\0";

/// Upper bound on the encoded ticket length accepted by `Ticket::decode`
pub const MAX_ENCODED_TICKET_LEN: usize = 2048;

/// The signed assertion carried by a ticket
///
/// Timestamps are unix seconds. Decoding rejects unknown or missing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    /// Calling service
    pub source_id: ServiceId,
    /// Service being called
    pub target_id: ServiceId,
    /// Issuance time (unix seconds)
    pub issued_at: i64,
    /// Expiry time (unix seconds)
    pub expires_at: i64,
}

impl Claims {
    /// Build claims valid for `ttl` starting at `issued_at`
    pub fn new(
        source_id: ServiceId,
        target_id: ServiceId,
        issued_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Self> {
        if ttl <= chrono::Duration::zero() {
            return Err(CoreError::InvalidClaims("ticket TTL must be positive".into()));
        }

        let issued = issued_at.timestamp();
        let claims = Self {
            source_id,
            target_id,
            issued_at: issued,
            expires_at: issued.saturating_add(ttl.num_seconds().max(1)),
        };
        claims.check()?;
        Ok(claims)
    }

    /// Deterministic byte encoding used for signing and verification
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TICKET_DOMAIN_TAG.len() + 32);
        out.extend_from_slice(TICKET_DOMAIN_TAG);
        out.extend_from_slice(&self.source_id.get().to_be_bytes());
        out.extend_from_slice(&self.target_id.get().to_be_bytes());
        out.extend_from_slice(&self.issued_at.to_be_bytes());
        out.extend_from_slice(&self.expires_at.to_be_bytes());
        out
    }

    /// Issuance time as a timestamp
    pub fn issued_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }

    /// Expiry time as a timestamp
    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// True once `now` is strictly past `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at
    }

    /// Validity left at `now`, or `None` if nothing remains
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let secs = self.expires_at.checked_sub(now.timestamp())?;
        if secs <= 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(secs as u64))
        }
    }

    fn check(&self) -> Result<()> {
        if self.expires_at <= self.issued_at {
            return Err(CoreError::InvalidClaims(format!(
                "expires_at ({}) must be after issued_at ({})",
                self.expires_at, self.issued_at
            )));
        }
        Ok(())
    }
}

/// A signed, immutable ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ticket {
    /// Signed claims
    pub claims: Claims,

    /// Version of the source's key that produced the signature
    ///
    /// Not covered by the signature: it only selects which key to try, and
    /// a wrong value simply fails verification.
    pub key_version: u32,

    /// Signature scheme
    pub algorithm: SignatureAlgorithm,

    /// Signature over `claims.canonical_bytes()`
    #[serde(with = "signature_encoding")]
    pub signature: Vec<u8>,
}

impl Ticket {
    /// Sign claims with the source service's private key
    pub fn sign<K: KeyManager + ?Sized>(
        claims: Claims,
        key_version: u32,
        key_manager: &K,
        private_key: &PrivateKey,
    ) -> Result<Self> {
        claims.check()?;
        let signature = key_manager.sign(&claims.canonical_bytes(), private_key)?;

        Ok(Self {
            claims,
            key_version,
            algorithm: key_manager.algorithm(),
            signature,
        })
    }

    /// Verify the signature against a public key
    ///
    /// Does not check expiry or authorization.
    pub fn verify<K: KeyManager + ?Sized>(&self, key_manager: &K, public_key: &PublicKey) -> bool {
        self.algorithm == key_manager.algorithm()
            && key_manager.verify(&self.claims.canonical_bytes(), &self.signature, public_key)
    }

    /// Calling service
    pub fn source_id(&self) -> ServiceId {
        self.claims.source_id
    }

    /// Service being called
    pub fn target_id(&self) -> ServiceId {
        self.claims.target_id
    }

    /// Encode for transport (base64url of the JSON form, no padding)
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a transported ticket, enforcing the fixed claim shape
    pub fn decode(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CoreError::MalformedTicket("empty ticket".into()));
        }
        if encoded.len() > MAX_ENCODED_TICKET_LEN {
            return Err(CoreError::MalformedTicket(format!(
                "ticket too long ({} bytes, max {})",
                encoded.len(),
                MAX_ENCODED_TICKET_LEN
            )));
        }

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CoreError::MalformedTicket(format!("invalid base64url: {}", e)))?;
        let ticket: Ticket = serde_json::from_slice(&json)?;
        ticket
            .claims
            .check()
            .map_err(|e| CoreError::MalformedTicket(e.to_string()))?;
        Ok(ticket)
    }
}

mod signature_encoding {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519KeyManager;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn claims(source: i64, target: i64) -> Claims {
        Claims::new(
            ServiceId(source),
            ServiceId(target),
            at(1_700_000_000),
            chrono::Duration::hours(1),
        )
        .unwrap()
    }

    #[test]
    fn test_claims_expiry_is_issued_plus_ttl() {
        let c = claims(1, 2);
        assert_eq!(c.issued_at, 1_700_000_000);
        assert_eq!(c.expires_at, 1_700_003_600);
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let result = Claims::new(ServiceId(1), ServiceId(2), at(0), chrono::Duration::zero());
        assert!(matches!(result, Err(CoreError::InvalidClaims(_))));
    }

    #[test]
    fn test_canonical_bytes_layout() {
        let c = claims(1, 2);
        let bytes = c.canonical_bytes();

        assert!(bytes.starts_with(TICKET_DOMAIN_TAG));
        assert_eq!(bytes.len(), TICKET_DOMAIN_TAG.len() + 32);

        let body = &bytes[TICKET_DOMAIN_TAG.len()..];
        assert_eq!(&body[0..8], &1i64.to_be_bytes());
        assert_eq!(&body[8..16], &2i64.to_be_bytes());
    }

    #[test]
    fn test_canonical_bytes_distinguish_direction() {
        assert_ne!(claims(1, 2).canonical_bytes(), claims(2, 1).canonical_bytes());
    }

    #[test]
    fn test_expiry_boundary() {
        let c = claims(1, 2);
        assert!(!c.is_expired_at(at(c.expires_at)));
        assert!(c.is_expired_at(at(c.expires_at + 1)));
        assert_eq!(c.remaining_at(at(c.expires_at)), None);
        assert_eq!(
            c.remaining_at(at(c.expires_at - 10)),
            Some(std::time::Duration::from_secs(10))
        );
    }

    #[test]
    fn test_sign_verify_and_tamper() {
        let km = Ed25519KeyManager::new();
        let kp = km.generate_key_pair().unwrap();

        let ticket = Ticket::sign(claims(1, 2), 1, &km, kp.private_key()).unwrap();
        assert!(ticket.verify(&km, kp.public_key()));

        let mut tampered = ticket.clone();
        tampered.claims.target_id = ServiceId(3);
        assert!(!tampered.verify(&km, kp.public_key()));

        let mut extended = ticket;
        extended.claims.expires_at += 3600;
        assert!(!extended.verify(&km, kp.public_key()));
    }

    #[test]
    fn test_encode_decode() {
        let km = Ed25519KeyManager::new();
        let kp = km.generate_key_pair().unwrap();
        let ticket = Ticket::sign(claims(5, 6), 3, &km, kp.private_key()).unwrap();

        let encoded = ticket.encode().unwrap();
        assert!(!encoded.contains('='));

        let decoded = Ticket::decode(&encoded).unwrap();
        assert_eq!(decoded, ticket);
        assert!(decoded.verify(&km, kp.public_key()));
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let json = serde_json::json!({
            "claims": {"source_id": 1, "target_id": 2, "issued_at": 10, "expires_at": 20, "admin": true},
            "key_version": 1,
            "algorithm": "Ed25519",
            "signature": "AAAA"
        });
        let encoded = URL_SAFE_NO_PAD.encode(json.to_string());
        assert!(matches!(Ticket::decode(&encoded), Err(CoreError::MalformedTicket(_))));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let json = serde_json::json!({
            "claims": {"source_id": 1, "target_id": 2, "expires_at": 20},
            "key_version": 1,
            "algorithm": "Ed25519",
            "signature": "AAAA"
        });
        let encoded = URL_SAFE_NO_PAD.encode(json.to_string());
        assert!(matches!(Ticket::decode(&encoded), Err(CoreError::MalformedTicket(_))));
    }

    #[test]
    fn test_decode_rejects_inverted_window() {
        let json = serde_json::json!({
            "claims": {"source_id": 1, "target_id": 2, "issued_at": 20, "expires_at": 10},
            "key_version": 1,
            "algorithm": "Ed25519",
            "signature": "AAAA"
        });
        let encoded = URL_SAFE_NO_PAD.encode(json.to_string());
        assert!(matches!(Ticket::decode(&encoded), Err(CoreError::MalformedTicket(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Ticket::decode("").is_err());
        assert!(Ticket::decode("not base64 !!").is_err());
        assert!(Ticket::decode(&"A".repeat(MAX_ENCODED_TICKET_LEN + 1)).is_err());
    }
}
