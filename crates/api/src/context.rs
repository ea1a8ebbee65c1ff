use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

/// Authenticated caller: the payload carried by a verified session token.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    claims: Arc<Value>,
}

impl Identity {
    pub fn new(claims: Value) -> Self {
        Self {
            claims: Arc::new(claims),
        }
    }

    pub fn claims(&self) -> &Value {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Roles from the `role` (string) and `roles` (array of strings) claims.
    pub fn roles(&self) -> Vec<&str> {
        let single = self.claim("role").and_then(Value::as_str);
        let many = self
            .claim("roles")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);

        single.into_iter().chain(many).collect()
    }

    /// Deserialize the claims into an application user type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.claims.as_ref())
    }
}

/// Correlation id attached to every request by the request-id middleware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn roles_from_both_claims() {
        let identity = Identity::new(json!({"role": "admin", "roles": ["auditor", 7]}));
        assert_eq!(identity.roles(), vec!["admin", "auditor"]);

        let none = Identity::new(json!({"sub": "ada"}));
        assert!(none.roles().is_empty());
    }

    #[test]
    fn parses_into_user_type() {
        #[derive(Deserialize)]
        struct User {
            username: String,
        }

        let identity = Identity::new(json!({"username": "ada", "role": "admin"}));
        assert_eq!(identity.parse::<User>().unwrap().username, "ada");
    }
}
