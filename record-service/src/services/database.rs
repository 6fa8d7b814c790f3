use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReplaceOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::record::{ID_FIELD, OWNER_ID_FIELD};
use crate::models::{AuthInfo, FieldAccessRule, Predicate, Record};
use crate::services::filter::to_filter;
use crate::services::identity::USER_RECORD_TYPE;
use crate::services::store::{AuthInfoStore, FieldAccessStore, RecordStore};
use crate::services::ServiceError;

const AUTH_COLLECTION: &str = "_auth";
const FIELD_ACCESS_COLLECTION: &str = "_field_access";
const FIELD_ACCESS_DOCUMENT_ID: &str = "table";
const DUPLICATE_KEY: i32 = 11000;

/// The whole field access table lives in one document so that replacing it
/// is a single atomic write.
#[derive(Debug, Serialize, Deserialize)]
struct FieldAccessDocument {
    #[serde(rename = "_id")]
    id: String,
    rules: Vec<FieldAccessRule>,
}

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    /// Unique indexes backing identity uniqueness across instances. Each key
    /// group gets one compound index, partial on every field being present
    /// so users that skipped the group never collide.
    pub async fn initialize_indexes(&self, record_keys: &[Vec<String>]) -> Result<(), AppError> {
        let users = self.records(USER_RECORD_TYPE);
        for model in identity_index_models(record_keys) {
            users.create_index(model, None).await.map_err(|e| {
                tracing::error!("Failed to create identity index on {}: {}", USER_RECORD_TYPE, e);
                AppError::from(e)
            })?;
        }
        tracing::info!(
            groups = record_keys.len(),
            "Created identity indexes on {} collection",
            USER_RECORD_TYPE
        );
        Ok(())
    }

    fn records(&self, record_type: &str) -> Collection<Document> {
        self.db.collection(record_type)
    }

    fn auth_infos(&self) -> Collection<AuthInfo> {
        self.db.collection(AUTH_COLLECTION)
    }

    fn field_access(&self) -> Collection<FieldAccessDocument> {
        self.db.collection(FIELD_ACCESS_COLLECTION)
    }
}

fn record_to_document(record: &Record) -> Result<Document, ServiceError> {
    bson::to_document(&record.row())
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode record: {}", e)))
}

fn document_to_record(record_type: &str, document: Document) -> Result<Record, ServiceError> {
    let serde_json::Value::Object(mut data) = Bson::Document(document).into_relaxed_extjson()
    else {
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "Stored {} row is not a document",
            record_type
        )));
    };

    let id = match data.remove(ID_FIELD) {
        Some(serde_json::Value::String(id)) => id,
        other => {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "Stored {} row has invalid id: {:?}",
                record_type,
                other
            )))
        }
    };
    let owner_id = match data.remove(OWNER_ID_FIELD) {
        Some(serde_json::Value::String(owner)) => Some(owner),
        _ => None,
    };

    Ok(Record::with_id(id, record_type, owner_id, data))
}

fn identity_index_models(record_keys: &[Vec<String>]) -> Vec<IndexModel> {
    record_keys
        .iter()
        .filter(|group| !group.is_empty())
        .map(|group| {
            let mut keys = Document::new();
            let mut present = Document::new();
            for field in group {
                keys.insert(field.as_str(), 1);
                present.insert(field.as_str(), doc! { "$exists": true });
            }
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(format!("{}_identity_{}", USER_RECORD_TYPE, group.join("_")))
                        .unique(true)
                        .partial_filter_expression(present)
                        .build(),
                )
                .build()
        })
        .collect()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl RecordStore for MongoDb {
    async fn query(
        &self,
        record_type: &str,
        predicate: &Predicate,
    ) -> Result<Vec<Record>, ServiceError> {
        let filter = to_filter(predicate)?;
        tracing::debug!(record_type = %record_type, filter = %filter, "Querying records");

        let documents: Vec<Document> = self
            .records(record_type)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;

        documents
            .into_iter()
            .map(|document| document_to_record(record_type, document))
            .collect()
    }

    async fn get(&self, record_type: &str, id: &str) -> Result<Option<Record>, ServiceError> {
        self.records(record_type)
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(|document| document_to_record(record_type, document))
            .transpose()
    }

    async fn save(&self, record: &Record) -> Result<(), ServiceError> {
        let document = record_to_document(record)?;
        let result = self
            .records(&record.record_type)
            .replace_one(
                doc! { "_id": record.id.as_str() },
                document,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if record.record_type == USER_RECORD_TYPE && is_duplicate_key(&e) => {
                tracing::info!(user_id = %record.id, "Identity index rejected user record");
                Err(ServiceError::DuplicatedUser)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AuthInfoStore for MongoDb {
    async fn get_auth_info(&self, id: &str) -> Result<Option<AuthInfo>, ServiceError> {
        Ok(self.auth_infos().find_one(doc! { "_id": id }, None).await?)
    }

    async fn create_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError> {
        match self.auth_infos().insert_one(auth_info, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(ServiceError::DuplicatedUser),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_auth_info(&self, auth_info: &AuthInfo) -> Result<(), ServiceError> {
        let result = self
            .auth_infos()
            .replace_one(doc! { "_id": auth_info.id.as_str() }, auth_info, None)
            .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::UserNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FieldAccessStore for MongoDb {
    async fn load_field_access(&self) -> Result<Vec<FieldAccessRule>, ServiceError> {
        let stored = self
            .field_access()
            .find_one(doc! { "_id": FIELD_ACCESS_DOCUMENT_ID }, None)
            .await?;
        Ok(stored.map(|d| d.rules).unwrap_or_default())
    }

    async fn save_field_access(&self, rules: &[FieldAccessRule]) -> Result<(), ServiceError> {
        let document = FieldAccessDocument {
            id: FIELD_ACCESS_DOCUMENT_ID.to_string(),
            rules: rules.to_vec(),
        };
        self.field_access()
            .replace_one(
                doc! { "_id": FIELD_ACCESS_DOCUMENT_ID },
                document,
                ReplaceOptions::builder().upsert(true).build(),
            )
            .await?;
        tracing::info!(rules = rules.len(), "Persisted field access table");
        Ok(())
    }
}
