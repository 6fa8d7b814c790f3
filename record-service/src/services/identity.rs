//! Uniqueness of identity attributes across `user` records.
//!
//! Signup and any master-key write to a `user` record go through the same
//! lock and the same check, so two principals never share a satisfied key
//! group.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{AuthData, Data};
use crate::services::store::RecordStore;
use crate::services::ServiceError;

/// Record type holding each principal's identity attributes. The record id
/// equals the AuthInfo id.
pub const USER_RECORD_TYPE: &str = "user";

#[derive(Clone)]
pub struct IdentityIndex {
    records: Arc<dyn RecordStore>,
    record_keys: Vec<Vec<String>>,
    lock: Arc<Mutex<()>>,
}

impl IdentityIndex {
    pub fn new(records: Arc<dyn RecordStore>, record_keys: Vec<Vec<String>>) -> Self {
        Self {
            records,
            record_keys,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn record_keys(&self) -> &[Vec<String>] {
        &self.record_keys
    }

    pub fn auth_data(&self, data: Data) -> AuthData {
        AuthData::new(data, self.record_keys.clone())
    }

    pub fn all_keys(&self) -> BTreeSet<String> {
        self.auth_data(Data::new()).all_keys()
    }

    /// Held from the uniqueness check until the user record is written.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Identity fields of `data` with null values dropped, as stored on the
    /// user record.
    pub fn identity_fields(&self, data: &Data) -> Data {
        let keys = self.all_keys();
        data.iter()
            .filter(|(k, v)| keys.contains(*k) && !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Fails with `DuplicatedUser` when any key group satisfied by `data`
    /// already identifies a user other than `user_id`.
    pub async fn ensure_unique(&self, data: &Data, user_id: Option<&str>) -> Result<(), ServiceError> {
        let identity = self.identity_fields(data);
        for group in &self.record_keys {
            let Ok(predicate) = AuthData::new(identity.clone(), vec![group.clone()])
                .make_equal_predicate()
            else {
                continue;
            };
            let taken = self
                .records
                .query(USER_RECORD_TYPE, &predicate)
                .await?
                .into_iter()
                .any(|user| Some(user.id.as_str()) != user_id);
            if taken {
                tracing::info!(keys = ?group, "Identity already in use");
                return Err(ServiceError::DuplicatedUser);
            }
        }
        Ok(())
    }
}
