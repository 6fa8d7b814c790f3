//! Domain model: predicates, identity attributes, principals, field ACL
//! rules and records.

pub mod auth_data;
pub mod auth_info;
pub mod field_access;
pub mod predicate;
pub mod principal;
pub mod record;

/// Field values of a record: a tagged JSON value per field. A missing key
/// and an explicit `null` are distinct.
pub type Data = serde_json::Map<String, serde_json::Value>;

pub use auth_data::{AuthData, NoSatisfiedIdentityGroup};
pub use auth_info::{AuthInfo, ProviderInfo};
pub use field_access::{FieldAccess, FieldAccessError, FieldAccessRule, FieldUserRole};
pub use predicate::{Expression, MalformedPredicate, Operator, Predicate, PredicateChild};
pub use principal::{AuthContext, Principal};
pub use record::Record;
