//! Services layer for the record service.
//!
//! Business logic for authentication, field access control, policy
//! evaluation and record storage, written against the store traits in
//! [`store`].

pub mod auth;
mod database;
pub mod error;
pub mod facl;
pub mod field_access;
pub mod filter;
pub mod identity;
mod jwt;
mod memory;
pub mod policy;
pub mod records;
pub mod store;

pub use auth::{AuthService, AuthSession};
pub use database::MongoDb;
pub use error::ServiceError;
pub use facl::{FieldAccessRegistry, FieldAccessTable};
pub use field_access::FieldAccessService;
pub use identity::{IdentityIndex, USER_RECORD_TYPE};
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use memory::MemoryStore;
pub use policy::{Decision, DenyReason, Policy};
pub use records::RecordService;
pub use store::{AuthInfoStore, FieldAccessStore, RecordStore};
