//! Inbound ticket checks
//!
//! A service accepts a call only if the presented ticket validates and was
//! issued for this service. A valid ticket for another audience is rejected.

use reqwest::header::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

use tvm_core::{Claims, ServiceId, TICKET_HEADER};

use crate::bridge::TicketValidator;
use crate::error::{BridgeError, Result};

/// Guards a service's inbound calls
pub struct InboundGuard {
    own_id: ServiceId,
    validator: Arc<dyn TicketValidator>,
}

impl InboundGuard {
    pub fn new(own_id: ServiceId, validator: Arc<dyn TicketValidator>) -> Self {
        Self { own_id, validator }
    }

    pub fn own_id(&self) -> ServiceId {
        self.own_id
    }

    /// Authorize a call from its request headers
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Claims> {
        let raw = headers.get(TICKET_HEADER).ok_or(BridgeError::MissingTicket)?;
        let encoded = raw
            .to_str()
            .map_err(|_| BridgeError::InvalidFormat("ticket header is not ASCII".into()))?;
        self.check(encoded).await
    }

    /// Authorize a call from an encoded ticket
    pub async fn check(&self, encoded: &str) -> Result<Claims> {
        let claims = self.validator.validate(encoded).await?;

        if claims.target_id != self.own_id {
            warn!(
                source_id = %claims.source_id,
                target_id = %claims.target_id,
                own_id = %self.own_id,
                "Ticket rejected: issued for another service"
            );
            return Err(BridgeError::WrongAudience {
                expected: self.own_id,
                actual: claims.target_id,
            });
        }

        debug!(source_id = %claims.source_id, "Inbound call authorized");
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::HeaderValue;

    /// Accepts `"<source>-><target>"` and nothing else
    struct FakeValidator;

    #[async_trait]
    impl TicketValidator for FakeValidator {
        async fn validate(&self, encoded: &str) -> Result<Claims> {
            let (source, target) = encoded
                .split_once("->")
                .ok_or(BridgeError::InvalidSignature)?;
            let parse = |s: &str| {
                s.parse::<ServiceId>()
                    .map_err(|_| BridgeError::InvalidSignature)
            };
            Ok(Claims {
                source_id: parse(source)?,
                target_id: parse(target)?,
                issued_at: 0,
                expires_at: 60,
            })
        }
    }

    fn guard(own: i64) -> InboundGuard {
        InboundGuard::new(ServiceId(own), Arc::new(FakeValidator))
    }

    #[tokio::test]
    async fn test_accepts_ticket_for_self() {
        let mut headers = HeaderMap::new();
        headers.insert(TICKET_HEADER, HeaderValue::from_static("1->2"));

        let claims = guard(2).authorize(&headers).await.unwrap();
        assert_eq!(claims.source_id, ServiceId(1));
    }

    #[tokio::test]
    async fn test_rejects_other_audience() {
        let err = guard(3).check("1->2").await.unwrap_err();
        match err {
            BridgeError::WrongAudience { expected, actual } => {
                assert_eq!(expected, ServiceId(3));
                assert_eq!(actual, ServiceId(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            guard(2).authorize(&headers).await,
            Err(BridgeError::MissingTicket)
        ));
    }

    #[tokio::test]
    async fn test_non_ascii_header() {
        let mut headers = HeaderMap::new();
        headers.insert(TICKET_HEADER, HeaderValue::from_bytes(b"\xfe\xff").unwrap());
        assert!(matches!(
            guard(2).authorize(&headers).await,
            Err(BridgeError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_validator_rejection_propagates() {
        assert!(matches!(
            guard(2).check("garbage").await,
            Err(BridgeError::InvalidSignature)
        ));
    }
}
