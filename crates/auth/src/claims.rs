use serde::{Deserialize, Serialize};

/// Signed token body: the caller's payload plus the registered time claims.
///
/// The payload is flattened into the top level of the token, so it must
/// serialize as a map (a struct or a JSON object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims<P> {
    #[serde(flatten)]
    pub payload: P,

    /// Issued-at (Unix seconds).
    pub iat: i64,

    /// Expiration (Unix seconds).
    pub exp: i64,
}

/// Why a token was rejected as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// No bearer token was presented.
    Missing,
    /// The token could not be decoded.
    Malformed,
    /// The signature does not match the configured secret.
    BadSignature,
    /// The token is past its expiry.
    Expired,
}

impl core::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            TokenRejection::Missing => "no token provided",
            TokenRejection::Malformed => "malformed token",
            TokenRejection::BadSignature => "bad signature",
            TokenRejection::Expired => "token expired",
        };
        f.write_str(reason)
    }
}

impl From<&jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: &jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::InvalidSignature => TokenRejection::BadSignature,
            _ => TokenRejection::Malformed,
        }
    }
}
