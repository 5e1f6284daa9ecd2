//! Authentication and access control: tokens, password hashing, the identity attached to a
//! request, the two gate stages, and reconciliation of the declared access table.

mod access;
mod gate;
mod password;
mod reconcile;
mod token;

pub use access::{Authorize, PermissionTable};
pub use gate::Authenticate;
pub use password::{hash_password, verify_password};
pub use reconcile::{diff, reconcile, ConfirmPolicy, ConflictWarning, PermissionSnapshot};
pub use token::{Claims, TokenService};

use crate::relation::Record;
use serde_json::Value;
use std::collections::BTreeSet;

pub const PASSWORD_FIELD: &str = "password";
pub const ROLES_FIELD: &str = "roles";
pub const PASSWORD_CHANGED_AT_FIELD: &str = "passwordChangedAt";
pub const VERIFIED_FIELD: &str = "isVerified";

/// The authenticated actor of a request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub id: Value,
    pub roles: BTreeSet<String>,
    /// Identity record as stored, including sensitive fields.
    pub record: Record,
    pub claims: Claims,
}

impl Identity {
    pub fn from_record(id: Value, record: Record, claims: Claims) -> Self {
        Identity {
            id,
            roles: roles_of(&record),
            record,
            claims,
        }
    }

    pub fn has_any_role(&self, allowed: &BTreeSet<String>) -> bool {
        self.roles.iter().any(|r| allowed.contains(r))
    }
}

/// `roles` may be stored as an array or as a comma separated string.
pub fn roles_of(record: &Record) -> BTreeSet<String> {
    match record.get(ROLES_FIELD) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        _ => BTreeSet::new(),
    }
}

/// Stale when the credential was issued in an earlier second than the last password change.
pub(crate) fn issued_before_password_change(record: &Record, iat: i64) -> bool {
    let changed_at = match record.get(PASSWORD_CHANGED_AT_FIELD) {
        Some(Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|d| d.timestamp())
            .ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };
    changed_at.map(|t| iat < t).unwrap_or(false)
}

pub(crate) fn is_verified(record: &Record) -> bool {
    matches!(record.get(VERIFIED_FIELD), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn roles_from_array_or_string() {
        let a = roles_of(&record(json!({"roles": ["admin", "editor"]})));
        let b = roles_of(&record(json!({"roles": "admin, editor"})));
        assert_eq!(a, b);
        assert!(roles_of(&record(json!({}))).is_empty());
    }

    #[test]
    fn staleness_compares_whole_seconds() {
        let changed = record(json!({"passwordChangedAt": "2024-01-01T00:00:10.900Z"}));
        let at = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:10Z")
            .unwrap()
            .timestamp();
        assert!(issued_before_password_change(&changed, at - 1));
        assert!(!issued_before_password_change(&changed, at));
        assert!(!issued_before_password_change(&record(json!({})), 0));
    }
}
