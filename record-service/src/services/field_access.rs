//! Loading and replacing the field access table.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{FieldAccessError, FieldAccessRule};
use crate::services::facl::{FieldAccessRegistry, FieldAccessTable};
use crate::services::store::FieldAccessStore;
use crate::services::ServiceError;

#[derive(Clone)]
pub struct FieldAccessService {
    store: Arc<dyn FieldAccessStore>,
    registry: Arc<FieldAccessRegistry>,
    // Persist and install happen as one step per update.
    update_lock: Arc<Mutex<()>>,
}

impl FieldAccessService {
    pub fn new(store: Arc<dyn FieldAccessStore>, registry: Arc<FieldAccessRegistry>) -> Self {
        Self {
            store,
            registry,
            update_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Install the persisted table. Called once at startup.
    pub async fn load(&self) -> Result<(), ServiceError> {
        let rules = self.store.load_field_access().await?;
        let count = rules.len();
        self.registry.replace_all(rules)?;
        tracing::info!(rules = count, "Field access table loaded");
        Ok(())
    }

    pub fn rules(&self) -> Vec<FieldAccessRule> {
        self.registry.rules()
    }

    /// Replace the whole table. Nothing changes unless the new table is
    /// valid and persisted.
    pub async fn update(&self, rules: Vec<FieldAccessRule>) -> Result<(), ServiceError> {
        let table = FieldAccessTable::build(rules)?;

        let _guard = self.update_lock.lock().await;
        if let Err(e) = self.store.save_field_access(table.rules()).await {
            tracing::error!(error = %e, "Failed to persist field access table");
            return Err(FieldAccessError::RuleTableReplaceFailed(e.to_string()).into());
        }

        let count = table.rules().len();
        self.registry.install(table);
        tracing::info!(rules = count, "Field access table replaced");
        Ok(())
    }
}
