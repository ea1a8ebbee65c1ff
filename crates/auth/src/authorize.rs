//! Area/action/role access decisions.
//!
//! The policy table is populated once at startup from the rows of a policy
//! query and is read-only afterwards. Each row has string columns `area`,
//! `action` and `role`; a row whose action is [`AREA_WIDE`] grants the role
//! every action within the area.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use trellis_core::ResultSet;

use crate::Role;

/// Action name that grants a role every action of an area.
pub const AREA_WIDE: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessPolicyError {
    #[error("malformed policy row {index}: {reason}")]
    MalformedRow { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct PolicyRow {
    area: String,
    action: String,
    role: Role,
}

/// Mapping area -> action -> allowed roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    areas: HashMap<String, HashMap<String, HashSet<Role>>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `role` to perform `action` in `area`.
    pub fn grant(
        &mut self,
        area: impl Into<String>,
        action: impl Into<String>,
        role: impl Into<Role>,
    ) -> &mut Self {
        self.areas
            .entry(area.into())
            .or_default()
            .entry(action.into())
            .or_default()
            .insert(role.into());
        self
    }

    /// Parse policy rows. Any malformed row fails the whole parse.
    pub fn from_rows(rows: &ResultSet) -> Result<Self, AccessPolicyError> {
        let rows: Vec<PolicyRow> = rows.decode().map_err(|e| AccessPolicyError::MalformedRow {
            index: e.index,
            reason: e.source.to_string(),
        })?;

        let mut policy = Self::new();
        for row in rows {
            policy.grant(row.area, row.action, row.role);
        }
        Ok(policy)
    }

    pub fn areas(&self) -> impl Iterator<Item = &str> {
        self.areas.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

/// Evaluates access decisions against a loaded [`AccessPolicy`].
///
/// - No IO
/// - No panics
#[derive(Debug, Clone, Default)]
pub struct AccessController {
    policy: AccessPolicy,
}

impl AccessController {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    pub fn from_rows(rows: &ResultSet) -> Result<Self, AccessPolicyError> {
        AccessPolicy::from_rows(rows).map(Self::new)
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Whether `role` may perform `action` in `area`.
    ///
    /// Unknown areas are denied. A known area whose policy never mentions
    /// `action` (and has no area-wide grants) is a policy authoring error:
    /// it is logged and denied.
    pub fn check_access(&self, area: &str, action: &str, role: &str) -> bool {
        let Some(actions) = self.policy.areas.get(area) else {
            return false;
        };

        if actions.get(AREA_WIDE).is_some_and(|roles| roles.contains(role)) {
            return true;
        }

        match actions.get(action) {
            Some(roles) => roles.contains(role),
            None => {
                if !actions.contains_key(AREA_WIDE) {
                    error!(area, action, "access policy has no entry for action");
                }
                false
            }
        }
    }

    /// Whether any of `roles` may perform `action` in `area`.
    pub fn check_any<'a>(
        &self,
        area: &str,
        action: &str,
        roles: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        roles
            .into_iter()
            .any(|role| self.check_access(area, action, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use trellis_core::Row;

    fn rows(values: Vec<Value>) -> ResultSet {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => Row::new(),
            })
            .collect()
    }

    fn billing_policy() -> AccessController {
        let mut policy = AccessPolicy::new();
        policy
            .grant("billing", "read", "admin")
            .grant("billing", "read", "accountant")
            .grant("billing", "edit", "admin");
        AccessController::new(policy)
    }

    #[test]
    fn member_role_is_allowed() {
        let access = billing_policy();
        assert!(access.check_access("billing", "read", "admin"));
        assert!(access.check_access("billing", "read", "accountant"));
        assert!(!access.check_access("billing", "edit", "accountant"));
    }

    #[test]
    fn unknown_area_is_denied_without_error() {
        assert!(!billing_policy().check_access("payroll", "read", "admin"));
    }

    #[test]
    fn unpopulated_action_is_denied() {
        assert!(!billing_policy().check_access("billing", "delete", "admin"));
    }

    #[test]
    fn area_wide_grant_covers_every_action() {
        let mut policy = AccessPolicy::new();
        policy.grant("class1", AREA_WIDE, "admin").grant("class1", "read", "user");
        let access = AccessController::new(policy);

        assert!(access.check_access("class1", "edit", "admin"));
        assert!(access.check_access("class1", "read", "user"));
        assert!(!access.check_access("class1", "edit", "user"));
    }

    #[test]
    fn parses_policy_rows() {
        let access = AccessController::from_rows(&rows(vec![
            json!({ "area": "billing", "action": "read", "role": "admin" }),
            json!({ "area": "billing", "action": "read", "role": "user" }),
            json!({ "area": "reports", "action": "*", "role": "manager" }),
        ]))
        .unwrap();

        assert!(access.check_access("billing", "read", "user"));
        assert!(access.check_access("reports", "export", "manager"));
        assert!(!access.check_access("billing", "read", "manager"));
        assert!(access.check_any("billing", "read", ["guest", "admin"]));
    }

    #[test]
    fn malformed_row_fails_whole_parse() {
        let err = AccessPolicy::from_rows(&rows(vec![
            json!({ "area": "billing", "action": "read", "role": "admin" }),
            json!({ "area": "billing", "role": "admin" }),
        ]))
        .unwrap_err();

        assert!(matches!(err, AccessPolicyError::MalformedRow { index: 1, .. }));
    }
}
