//! Cryptographic primitives for ticket signing
//!
//! The authority generates and custodies every service's key pair and signs
//! tickets on the service's behalf. Verifiers only ever need the public half.
//!
//! Key types:
//! - `KeyManager`: capability trait for generate / sign / verify
//! - `Ed25519KeyManager`: the system-wide implementation
//! - `PublicKey` / `PrivateKey`: opaque encoded key material
//! - `KeyPair`: a freshly generated public/private pair

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::types::SignatureAlgorithm;

/// Ed25519 public key length in bytes
pub const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 secret key length in bytes
pub const ED25519_PRIVATE_KEY_LEN: usize = 32;

/// Ed25519 signature length in bytes
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Capability interface for asymmetric key handling
///
/// Implementations must be deterministic and side-effect free in `verify`,
/// and must never log key material.
pub trait KeyManager: Send + Sync {
    /// Signature scheme produced by this manager
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Generate a new random key pair
    fn generate_key_pair(&self) -> Result<KeyPair>;

    /// Sign a payload with the given private key
    fn sign(&self, payload: &[u8], private_key: &PrivateKey) -> Result<Vec<u8>>;

    /// Verify a signature over a payload
    ///
    /// Malformed keys or signatures verify as `false`; callers never learn
    /// which check failed.
    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &PublicKey) -> bool;
}

/// Encoded public key bytes
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw encoded key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode from standard base64
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Ok(Self(STANDARD.decode(encoded)?))
    }

    /// Raw encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard base64 encoding, used on the wire
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("len", &self.0.len())
            .finish()
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PublicKey::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Encoded private key bytes, zeroed on drop
///
/// Deliberately not `Serialize`: private keys only move between the key
/// manager and the registry's storage.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<Vec<u8>>);

impl PrivateKey {
    /// Wrap raw encoded key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Raw encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey([redacted])")
    }
}

/// A freshly generated key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    /// Assemble a pair from its halves
    pub fn new(public_key: PublicKey, private_key: PrivateKey) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Private half
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Split into (public, private)
    pub fn into_parts(self) -> (PublicKey, PrivateKey) {
        (self.public_key, self.private_key)
    }
}

/// Ed25519 key manager backed by the OS random number generator
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519KeyManager;

impl Ed25519KeyManager {
    pub fn new() -> Self {
        Self
    }

    fn signing_key(private_key: &PrivateKey) -> Result<SigningKey> {
        let bytes: &[u8; ED25519_PRIVATE_KEY_LEN] =
            private_key.as_bytes().try_into().map_err(|_| {
                CoreError::InvalidKey(format!(
                    "expected {} byte Ed25519 secret key",
                    ED25519_PRIVATE_KEY_LEN
                ))
            })?;
        Ok(SigningKey::from_bytes(bytes))
    }

    fn verifying_key(public_key: &PublicKey) -> Option<VerifyingKey> {
        let bytes: &[u8; ED25519_PUBLIC_KEY_LEN] = public_key.as_bytes().try_into().ok()?;
        VerifyingKey::from_bytes(bytes).ok()
    }
}

impl KeyManager for Ed25519KeyManager {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn generate_key_pair(&self) -> Result<KeyPair> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        Ok(KeyPair::new(
            PublicKey::from_bytes(verifying_key.to_bytes().to_vec()),
            PrivateKey::from_bytes(signing_key.to_bytes().to_vec()),
        ))
    }

    fn sign(&self, payload: &[u8], private_key: &PrivateKey) -> Result<Vec<u8>> {
        let signing_key = Self::signing_key(private_key)?;
        Ok(signing_key.sign(payload).to_bytes().to_vec())
    }

    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &PublicKey) -> bool {
        let Some(verifying_key) = Self::verifying_key(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify_strict(payload, &signature).is_ok()
    }
}
