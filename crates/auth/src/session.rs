//! Session token issuing and verification (HS256 JWT).

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::blacklist::{Blacklist, BlacklistError};
use crate::claims::{SessionClaims, TokenRejection};

pub type SessionResult<T> = Result<T, SessionError>;

/// Claims owned by the session layer.
const RESERVED_CLAIMS: [&str; 2] = ["iat", "exp"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token: {0}")]
    InvalidToken(TokenRejection),

    #[error("token blacklisted")]
    TokenBlacklisted,

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("no blacklist configured")]
    BlacklistUnavailable,

    #[error(transparent)]
    Blacklist(#[from] BlacklistError),
}

impl SessionError {
    /// True for failures caused by the presented token itself (401-class).
    pub fn is_rejection(&self) -> bool {
        matches!(self, SessionError::InvalidToken(_) | SessionError::TokenBlacklisted)
    }
}

/// Session signing configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: Duration,
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

/// Issues and verifies signed session tokens carrying a `P` payload.
///
/// Verification consults the blacklist first when one is configured; without
/// one it is a purely local signature + expiry check.
pub struct SessionManager<P> {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    blacklist: Option<Arc<dyn Blacklist>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> SessionManager<P>
where
    P: Serialize + DeserializeOwned,
{
    pub fn new(config: SessionConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            ttl: config.ttl,
            blacklist: None,
            _payload: PhantomData,
        }
    }

    pub fn with_blacklist(mut self, blacklist: Arc<dyn Blacklist>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    pub fn blacklist(&self) -> Option<&Arc<dyn Blacklist>> {
        self.blacklist.as_ref()
    }

    /// Sign `payload` with the configured secret and TTL.
    ///
    /// Payloads carrying their own `iat` or `exp` are refused: the time
    /// claims are always set here.
    pub fn create_token(&self, payload: &P) -> SessionResult<String> {
        let fields =
            serde_json::to_value(payload).map_err(|e| SessionError::Signing(e.to_string()))?;
        if let Some(reserved) = RESERVED_CLAIMS
            .iter()
            .find(|claim| fields.get(*claim).is_some())
        {
            return Err(SessionError::Signing(format!(
                "payload must not set reserved claim `{reserved}`"
            )));
        }

        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| SessionError::Signing("session ttl out of range".to_string()))?;
        let claims = SessionClaims {
            payload,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Check the blacklist (if any), then the signature and expiry.
    pub async fn verify_token(&self, token: &str) -> SessionResult<P> {
        if let Some(blacklist) = &self.blacklist {
            if blacklist.contains(token).await? {
                debug!("rejected blacklisted token");
                return Err(SessionError::TokenBlacklisted);
            }
        }

        self.decode_token(token)
    }

    /// Signature + expiry check only.
    pub fn decode_token(&self, token: &str) -> SessionResult<P> {
        decode::<SessionClaims<P>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.payload)
            .map_err(|e| SessionError::InvalidToken(TokenRejection::from(&e)))
    }

    /// Add `token` to the blacklist so later verification rejects it.
    pub async fn revoke_token(&self, token: &str) -> SessionResult<()> {
        let blacklist = self
            .blacklist
            .as_ref()
            .ok_or(SessionError::BlacklistUnavailable)?;
        blacklist.insert(token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::InMemoryBlacklist;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestUser {
        username: String,
        role: String,
    }

    fn user() -> TestUser {
        TestUser {
            username: "ada".to_string(),
            role: "admin".to_string(),
        }
    }

    fn manager(ttl: Duration) -> SessionManager<TestUser> {
        SessionManager::new(SessionConfig::new("test-secret", ttl))
    }

    #[tokio::test]
    async fn token_round_trip_returns_payload() {
        let sessions = manager(Duration::minutes(10));
        let token = sessions.create_token(&user()).unwrap();

        assert_eq!(sessions.verify_token(&token).await.unwrap(), user());
    }

    #[tokio::test]
    async fn json_payload_round_trips_without_time_claims() {
        let sessions: SessionManager<serde_json::Value> =
            SessionManager::new(SessionConfig::new("test-secret", Duration::minutes(10)));
        let payload = json!({ "username": "ada", "roles": ["admin", "billing"] });

        let token = sessions.create_token(&payload).unwrap();
        assert_eq!(sessions.verify_token(&token).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn blacklisted_token_is_rejected_before_expiry() {
        let blacklist = Arc::new(InMemoryBlacklist::new());
        let sessions = manager(Duration::minutes(10)).with_blacklist(blacklist.clone());
        let token = sessions.create_token(&user()).unwrap();
        assert!(sessions.verify_token(&token).await.is_ok());

        sessions.revoke_token(&token).await.unwrap();

        assert_eq!(
            sessions.verify_token(&token).await.unwrap_err(),
            SessionError::TokenBlacklisted
        );
        // The signature itself is still valid.
        assert!(sessions.decode_token(&token).is_ok());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let sessions = manager(Duration::seconds(-30));
        let token = sessions.create_token(&user()).unwrap();

        assert_eq!(
            sessions.verify_token(&token).await.unwrap_err(),
            SessionError::InvalidToken(TokenRejection::Expired)
        );
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let other = SessionManager::<TestUser>::new(SessionConfig::new("other", Duration::minutes(10)));
        let token = other.create_token(&user()).unwrap();

        assert_eq!(
            manager(Duration::minutes(10)).verify_token(&token).await.unwrap_err(),
            SessionError::InvalidToken(TokenRejection::BadSignature)
        );
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let err = manager(Duration::minutes(10))
            .verify_token("not-a-token")
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidToken(TokenRejection::Malformed));
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn revoking_without_blacklist_fails() {
        let sessions = manager(Duration::minutes(10));
        let token = sessions.create_token(&user()).unwrap();

        assert_eq!(
            sessions.revoke_token(&token).await.unwrap_err(),
            SessionError::BlacklistUnavailable
        );
    }

    #[test]
    fn non_map_payload_cannot_be_signed() {
        let sessions: SessionManager<String> =
            SessionManager::new(SessionConfig::new("test-secret", Duration::minutes(10)));
        assert!(matches!(
            sessions.create_token(&"ada".to_string()),
            Err(SessionError::Signing(_))
        ));
    }

    #[test]
    fn payload_with_time_claims_cannot_be_signed() {
        let sessions: SessionManager<serde_json::Value> =
            SessionManager::new(SessionConfig::new("test-secret", Duration::minutes(10)));

        for payload in [
            json!({ "sub": "ada", "exp": 4102444800_i64 }),
            json!({ "sub": "ada", "iat": 0 }),
        ] {
            match sessions.create_token(&payload) {
                Err(SessionError::Signing(reason)) => assert!(reason.contains("reserved claim")),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }
}
