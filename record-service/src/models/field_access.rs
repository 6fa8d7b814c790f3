//! Field ACL model: who may read, write, compare or discover a record field.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const PUBLIC_ROLE: &str = "_public";
pub const OWNER_ROLE: &str = "_owner";

/// Role a field access rule applies to.
///
/// Stored and transmitted as a plain string: `_public`, `_owner`, or the
/// name of any other role (including implicit ones such as
/// `_user_id:johndoe`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldUserRole {
    Public,
    Owner,
    Role(String),
}

impl FieldUserRole {
    pub fn matches<S: AsRef<str>>(&self, roles: &[S], is_owner: bool) -> bool {
        match self {
            FieldUserRole::Public => true,
            FieldUserRole::Owner => is_owner,
            FieldUserRole::Role(role) => roles.iter().any(|r| r.as_ref() == role),
        }
    }
}

impl From<String> for FieldUserRole {
    fn from(s: String) -> Self {
        match s.as_str() {
            PUBLIC_ROLE => FieldUserRole::Public,
            OWNER_ROLE => FieldUserRole::Owner,
            _ => FieldUserRole::Role(s),
        }
    }
}

impl From<&str> for FieldUserRole {
    fn from(s: &str) -> Self {
        FieldUserRole::from(s.to_string())
    }
}

impl From<FieldUserRole> for String {
    fn from(role: FieldUserRole) -> Self {
        match role {
            FieldUserRole::Public => PUBLIC_ROLE.to_string(),
            FieldUserRole::Owner => OWNER_ROLE.to_string(),
            FieldUserRole::Role(role) => role,
        }
    }
}

impl fmt::Display for FieldUserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldUserRole::Public => f.write_str(PUBLIC_ROLE),
            FieldUserRole::Owner => f.write_str(OWNER_ROLE),
            FieldUserRole::Role(role) => f.write_str(role),
        }
    }
}

/// One row of the field ACL table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccessRule {
    pub record_type: String,
    pub record_field: String,
    pub user_role: FieldUserRole,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub readable: bool,
    #[serde(default)]
    pub comparable: bool,
    #[serde(default)]
    pub discoverable: bool,
}

impl FieldAccessRule {
    pub fn access(&self) -> FieldAccess {
        FieldAccess {
            readable: self.readable,
            writable: self.writable,
            comparable: self.comparable,
            discoverable: self.discoverable,
        }
    }
}

/// Resolved capabilities of a principal on one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldAccess {
    pub readable: bool,
    pub writable: bool,
    pub comparable: bool,
    pub discoverable: bool,
}

impl FieldAccess {
    pub const NONE: FieldAccess = FieldAccess {
        readable: false,
        writable: false,
        comparable: false,
        discoverable: false,
    };

    pub const ALL: FieldAccess = FieldAccess {
        readable: true,
        writable: true,
        comparable: true,
        discoverable: true,
    };

    /// Most permissive of the two, capability by capability.
    pub fn union(self, other: FieldAccess) -> FieldAccess {
        FieldAccess {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
            comparable: self.comparable || other.comparable,
            discoverable: self.discoverable || other.discoverable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldAccessError {
    #[error("field '{field}' of '{record_type}' is not writable")]
    ForbiddenFieldWrite { record_type: String, field: String },

    #[error("field '{field}' of '{record_type}' cannot be used in a query")]
    ForbiddenFieldQuery { record_type: String, field: String },

    #[error("field access table rejected: {0}")]
    RuleTableReplaceFailed(String),
}
