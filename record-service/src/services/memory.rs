//! In-process storage backend. Used for local runs and by the test suite.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{AuthInfo, FieldAccessRule, Predicate, Record};
use crate::services::store::{AuthInfoStore, FieldAccessStore, RecordStore};
use crate::services::ServiceError;

#[derive(Default)]
pub struct MemoryStore {
    // record_type -> id -> record
    records: RwLock<HashMap<String, HashMap<String, Record>>>,
    auth_infos: RwLock<HashMap<String, AuthInfo>>,
    field_access: RwLock<Vec<FieldAccessRule>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query(
        &self,
        record_type: &str,
        predicate: &Predicate,
    ) -> Result<Vec<Record>, ServiceError> {
        predicate.validate()?;

        let records = self.records.read().await;
        let Some(rows) = records.get(record_type) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for record in rows.values() {
            if predicate.evaluate(&record.row())? {
                matched.push(record.clone());
            }
        }
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn get(&self, record_type: &str, id: &str) -> Result<Option<Record>, ServiceError> {
        let records = self.records.read().await;
        Ok(records
            .get(record_type)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn save(&self, record: &Record) -> Result<(), ServiceError> {
        let mut records = self.records.write().await;
        records
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl AuthInfoStore for MemoryStore {
    async fn get_auth_info(&self, id: &str) -> Result<Option<AuthInfo>, ServiceError> {
        Ok(self.auth_infos.read().await.get(id).cloned())
    }

    async fn create_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError> {
        let mut auth_infos = self.auth_infos.write().await;
        if auth_infos.contains_key(&auth_info.id) {
            return Err(ServiceError::DuplicatedUser);
        }
        auth_infos.insert(auth_info.id.clone(), auth_info.clone());
        Ok(())
    }

    async fn update_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError> {
        let mut auth_infos = self.auth_infos.write().await;
        match auth_infos.get_mut(&auth_info.id) {
            Some(existing) => {
                *existing = auth_info.clone();
                Ok(())
            }
            None => Err(ServiceError::UserNotFound),
        }
    }
}

#[async_trait]
impl FieldAccessStore for MemoryStore {
    async fn load_field_access(&self) -> Result<Vec<FieldAccessRule>, ServiceError> {
        Ok(self.field_access.read().await.clone())
    }

    async fn save_field_access(&self, rules: &[FieldAccessRule]) -> Result<(), ServiceError> {
        *self.field_access.write().await = rules.to_vec();
        Ok(())
    }
}
