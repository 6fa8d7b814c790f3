//! Storage capabilities the services are written against.
//!
//! Both backends ([`MemoryStore`](super::MemoryStore) and
//! [`MongoDb`](super::MongoDb)) implement all three traits.

use async_trait::async_trait;

use crate::models::{AuthInfo, FieldAccessRule, Predicate, Record};
use crate::services::ServiceError;

/// Executes predicate queries over records of one type.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows of `record_type` matching `predicate`. The predicate is
    /// translated by the backend; malformed trees fail before any I/O.
    async fn query(
        &self,
        record_type: &str,
        predicate: &Predicate,
    ) -> Result<Vec<Record>, ServiceError>;

    async fn get(&self, record_type: &str, id: &str) -> Result<Option<Record>, ServiceError>;

    /// Insert or replace by id.
    async fn save(&self, record: &Record) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AuthInfoStore: Send + Sync {
    async fn get_auth_info(&self, id: &str) -> Result<Option<AuthInfo>, ServiceError>;

    /// Fails with `DuplicatedUser` if the id is taken.
    async fn create_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError>;

    /// Fails with `UserNotFound` if the id is unknown.
    async fn update_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError>;
}

/// Persistence for the field access table. The table is always written as
/// a whole.
#[async_trait]
pub trait FieldAccessStore: Send + Sync {
    async fn load_field_access(&self) -> Result<Vec<FieldAccessRule>, ServiceError>;

    async fn save_field_access(&self, rules: &[FieldAccessRule]) -> Result<(), ServiceError>;
}
