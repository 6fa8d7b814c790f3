//! Record save, query and discovery with field-level access control.
//!
//! Master-key callers skip field checks entirely. Everyone else goes
//! through the current field access table snapshot, and never reaches the
//! `user` records that back login.

use std::sync::Arc;

use crate::dtos::records::{DiscoverRecordsRequest, QueryRecordsRequest, SaveRecordRequest};
use crate::models::record::{is_valid_record_type, reserved_key, ID_FIELD, OWNER_ID_FIELD};
use crate::models::{AuthContext, Expression, FieldAccessError, Predicate, Record};
use crate::services::facl::{FieldAccessRegistry, FieldAccessTable};
use crate::services::identity::{IdentityIndex, USER_RECORD_TYPE};
use crate::services::store::RecordStore;
use crate::services::{DenyReason, ServiceError};

/// Types only the master key may read or write through this service.
const INTERNAL_RECORD_TYPES: &[&str] = &[USER_RECORD_TYPE];

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    field_access: Arc<FieldAccessRegistry>,
    identities: IdentityIndex,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        field_access: Arc<FieldAccessRegistry>,
        identities: IdentityIndex,
    ) -> Self {
        Self {
            store,
            field_access,
            identities,
        }
    }

    /// Create a record, or patch an existing one when `id` is given.
    pub async fn save(
        &self,
        ctx: &AuthContext,
        req: SaveRecordRequest,
    ) -> Result<Record, ServiceError> {
        check_record_type(&req.record_type)?;
        check_internal_type(ctx, &req.record_type)?;
        if let Some(key) = reserved_key(&req.data) {
            return Err(ServiceError::ValidationError(format!(
                "field '{}' is reserved",
                key
            )));
        }

        // Identity changes hold the signup lock from read to write.
        let identity_keys = self.identities.all_keys();
        let identity_guard = if req.record_type == USER_RECORD_TYPE
            && req.data.keys().any(|k| identity_keys.contains(k))
        {
            Some(self.identities.lock().await)
        } else {
            None
        };

        let existing = match &req.id {
            Some(id) => self.store.get(&req.record_type, id).await?,
            None => None,
        };
        let mut record = match existing {
            Some(record) => record,
            None => Record::with_id(
                req.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                req.record_type.clone(),
                ctx.principal_id().map(str::to_string),
                Default::default(),
            ),
        };

        let table = self.field_access.snapshot();
        match ctx.principal.as_ref().filter(|_| !ctx.master_key) {
            None if ctx.master_key => {}
            None => return Err(ServiceError::InvalidToken),
            Some(principal) => table.reject_unwritable_fields(
                &record.record_type,
                &req.data,
                &principal.acl_roles(),
                record.is_owned_by(Some(&principal.id)),
            )?,
        }

        record.data.extend(req.data);
        if identity_guard.is_some() {
            record
                .data
                .retain(|k, v| !(identity_keys.contains(k) && v.is_null()));
            self.identities
                .ensure_unique(&record.data, Some(&record.id))
                .await?;
        }
        self.store.save(&record).await?;
        tracing::info!(record_type = %record.record_type, record_id = %record.id, "Record saved");

        Ok(self.readable_view(ctx, &table, record))
    }

    pub async fn query(
        &self,
        ctx: &AuthContext,
        req: QueryRecordsRequest,
    ) -> Result<Vec<Record>, ServiceError> {
        check_record_type(&req.record_type)?;
        check_internal_type(ctx, &req.record_type)?;
        let predicate = req.predicate.unwrap_or_else(|| Predicate::and(vec![]));
        predicate.validate()?;

        let table = self.field_access.snapshot();
        let predicate = match ctx.principal.as_ref().filter(|_| !ctx.master_key) {
            None if ctx.master_key => predicate,
            None => return Err(ServiceError::InvalidToken),
            // Without rules only owners see anything, so restrict to owned rows.
            Some(principal) if !table.is_configured(&req.record_type) => {
                owned_by(predicate, &principal.id)
            }
            Some(principal) => {
                let fields = user_fields(predicate.key_paths());
                let roles = principal.acl_roles();
                let scope = grant_scope(|is_owner| {
                    table.validate_query_fields(&req.record_type, &fields, &roles, is_owner)
                })?;
                match scope {
                    GrantScope::AnyRecord => predicate,
                    GrantScope::OwnRecords => owned_by(predicate, &principal.id),
                }
            }
        };

        let records = self.store.query(&req.record_type, &predicate).await?;
        tracing::debug!(record_type = %req.record_type, count = records.len(), "Records queried");

        Ok(records
            .into_iter()
            .map(|record| self.readable_view(ctx, &table, record))
            .collect())
    }

    /// Look records up by exact attribute values. Every attribute must be
    /// discoverable for the caller.
    pub async fn discover(
        &self,
        ctx: &AuthContext,
        req: DiscoverRecordsRequest,
    ) -> Result<Vec<Record>, ServiceError> {
        check_record_type(&req.record_type)?;
        check_internal_type(ctx, &req.record_type)?;
        if req.attributes.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one attribute is required".to_string(),
            ));
        }
        if let Some(key) = reserved_key(&req.attributes) {
            return Err(ServiceError::ValidationError(format!(
                "field '{}' is reserved",
                key
            )));
        }

        let table = self.field_access.snapshot();
        let owner = match ctx.principal.as_ref().filter(|_| !ctx.master_key) {
            None if ctx.master_key => None,
            None => return Err(ServiceError::InvalidToken),
            Some(principal) => {
                let roles = principal.acl_roles();
                let scope = grant_scope(|is_owner| {
                    table.validate_discoverable_fields(
                        &req.record_type,
                        req.attributes.keys(),
                        &roles,
                        is_owner,
                    )
                })?;
                match scope {
                    GrantScope::AnyRecord => None,
                    GrantScope::OwnRecords => Some(principal.id.clone()),
                }
            }
        };

        let predicate = Predicate::and(
            req.attributes
                .into_iter()
                .map(|(key, value)| {
                    Predicate::equal(Expression::key_path(key), Expression::Literal(value))
                })
                .collect(),
        );
        let predicate = match owner {
            Some(owner) => owned_by(predicate, &owner),
            None => predicate,
        };

        let records = self.store.query(&req.record_type, &predicate).await?;
        Ok(records
            .into_iter()
            .map(|record| self.readable_view(ctx, &table, record))
            .collect())
    }

    fn readable_view(&self, ctx: &AuthContext, table: &FieldAccessTable, mut record: Record) -> Record {
        if ctx.master_key {
            return record;
        }
        let Some(principal) = &ctx.principal else {
            record.data.clear();
            return record;
        };
        let is_owner = record.is_owned_by(Some(&principal.id));
        record.data = table.filter_readable_fields(
            &record.record_type,
            &record.data,
            &principal.acl_roles(),
            is_owner,
        );
        record
    }
}

fn check_record_type(record_type: &str) -> Result<(), ServiceError> {
    if !is_valid_record_type(record_type) {
        return Err(ServiceError::ValidationError(format!(
            "invalid record type '{}'",
            record_type
        )));
    }
    Ok(())
}

fn check_internal_type(ctx: &AuthContext, record_type: &str) -> Result<(), ServiceError> {
    if !ctx.master_key && INTERNAL_RECORD_TYPES.contains(&record_type) {
        tracing::info!(record_type = %record_type, "Internal record type requires the master key");
        return Err(DenyReason::MasterKeyRequired.into());
    }
    Ok(())
}

/// Which records a field grant covers for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantScope {
    AnyRecord,
    OwnRecords,
}

/// Run a field check as a non-owner first. When only `_owner` rules grant
/// the fields, the call is still allowed but limited to the caller's own
/// records.
fn grant_scope(
    check: impl Fn(bool) -> Result<(), FieldAccessError>,
) -> Result<GrantScope, FieldAccessError> {
    match check(false) {
        Ok(()) => Ok(GrantScope::AnyRecord),
        Err(denied) => check(true)
            .map(|()| GrantScope::OwnRecords)
            .map_err(|_| denied),
    }
}

fn owned_by(predicate: Predicate, owner_id: &str) -> Predicate {
    Predicate::and(vec![
        predicate,
        Predicate::equal(
            Expression::key_path(OWNER_ID_FIELD),
            Expression::literal(owner_id),
        ),
    ])
}

/// Managed columns are always comparable.
fn user_fields(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    keys.into_iter()
        .filter(|k| k != ID_FIELD && k != OWNER_ID_FIELD)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Data, FieldAccessRule, Principal};
    use crate::services::MemoryStore;
    use serde_json::{json, Value};

    fn data(value: Value) -> Data {
        value.as_object().cloned().unwrap()
    }

    fn note_rules() -> Vec<FieldAccessRule> {
        serde_json::from_value(json!([
            {"record_type": "note", "record_field": "title", "user_role": "_owner",
             "readable": true, "writable": true, "comparable": true, "discoverable": true},
            {"record_type": "note", "record_field": "content", "user_role": "_owner",
             "readable": true, "writable": true},
            {"record_type": "note", "record_field": "title", "user_role": "_public",
             "readable": true, "comparable": true, "discoverable": true},
            {"record_type": "note", "record_field": "content", "user_role": "_user_id:bob",
             "readable": true},
            {"record_type": "note", "record_field": "tag", "user_role": "_owner",
             "readable": true, "writable": true, "comparable": true, "discoverable": true}
        ]))
        .unwrap()
    }

    fn service() -> RecordService {
        let registry = FieldAccessRegistry::default();
        registry.replace_all(note_rules()).unwrap();
        let store = Arc::new(MemoryStore::new());
        let identities = IdentityIndex::new(
            store.clone(),
            vec![vec!["username".to_string()], vec!["email".to_string()]],
        );
        RecordService::new(store, Arc::new(registry), identities)
    }

    fn user_req(id: Option<&str>, body: Value) -> SaveRecordRequest {
        SaveRecordRequest {
            record_type: USER_RECORD_TYPE.to_string(),
            id: id.map(str::to_string),
            data: data(body),
        }
    }

    fn user(id: &str) -> AuthContext {
        AuthContext::for_principal(Principal::new(id, vec![]))
    }

    fn save_req(id: Option<&str>, body: Value) -> SaveRecordRequest {
        SaveRecordRequest {
            record_type: "note".to_string(),
            id: id.map(str::to_string),
            data: data(body),
        }
    }

    #[tokio::test]
    async fn test_owner_writes_others_read_what_rules_allow() {
        let service = service();
        let saved = service
            .save(&user("alice"), save_req(None, json!({"title": "t", "content": "secret"})))
            .await
            .unwrap();
        assert_eq!(saved.owner_id.as_deref(), Some("alice"));
        assert_eq!(saved.data.len(), 2);

        let all = || QueryRecordsRequest {
            record_type: "note".to_string(),
            predicate: None,
        };

        let carol = service.query(&user("carol"), all()).await.unwrap();
        assert_eq!(carol[0].data, data(json!({"title": "t"})));

        let bob = service.query(&user("bob"), all()).await.unwrap();
        assert_eq!(bob[0].data, data(json!({"title": "t", "content": "secret"})));

        let master = service.query(&AuthContext::master(), all()).await.unwrap();
        assert_eq!(master[0].data.len(), 2);
    }

    #[tokio::test]
    async fn test_non_owner_cannot_patch() {
        let service = service();
        let saved = service
            .save(&user("alice"), save_req(None, json!({"title": "t"})))
            .await
            .unwrap();

        let err = service
            .save(&user("carol"), save_req(Some(&saved.id), json!({"title": "hijacked"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::FieldAccess(FieldAccessError::ForbiddenFieldWrite { .. })
        ));

        let patched = service
            .save(&AuthContext::master(), save_req(Some(&saved.id), json!({"content": "x"})))
            .await
            .unwrap();
        assert_eq!(patched.data, data(json!({"title": "t", "content": "x"})));
    }

    #[tokio::test]
    async fn test_query_on_non_comparable_field_is_forbidden() {
        let service = service();
        service
            .save(&user("alice"), save_req(None, json!({"title": "t", "content": "c"})))
            .await
            .unwrap();

        let by_content = Predicate::equal(Expression::key_path("content"), Expression::literal("c"));
        assert!(matches!(
            service
                .query(
                    &user("bob"),
                    QueryRecordsRequest {
                        record_type: "note".to_string(),
                        predicate: Some(by_content),
                    },
                )
                .await,
            Err(ServiceError::FieldAccess(_))
        ));

        let by_title = Predicate::equal(Expression::key_path("title"), Expression::literal("t"));
        let found = service
            .query(
                &user("bob"),
                QueryRecordsRequest {
                    record_type: "note".to_string(),
                    predicate: Some(by_title),
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_type_is_owner_only() {
        let service = service();
        service
            .save(
                &user("alice"),
                SaveRecordRequest {
                    record_type: "diary".to_string(),
                    id: None,
                    data: data(json!({"entry": "dear diary"})),
                },
            )
            .await
            .unwrap();

        let all = || QueryRecordsRequest {
            record_type: "diary".to_string(),
            predicate: None,
        };
        assert_eq!(service.query(&user("alice"), all()).await.unwrap().len(), 1);
        assert!(service.query(&user("bob"), all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discover_requires_discoverable_fields() {
        let service = service();
        service
            .save(&user("alice"), save_req(None, json!({"title": "t", "content": "c"})))
            .await
            .unwrap();

        let found = service
            .discover(
                &user("carol"),
                DiscoverRecordsRequest {
                    record_type: "note".to_string(),
                    attributes: data(json!({"title": "t"})),
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert!(service
            .discover(
                &user("carol"),
                DiscoverRecordsRequest {
                    record_type: "note".to_string(),
                    attributes: data(json!({"content": "c"})),
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reserved_fields_and_bad_types_rejected() {
        let service = service();
        assert!(matches!(
            service
                .save(&user("alice"), save_req(None, json!({"_owner_id": "mallory"})))
                .await,
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service
                .query(
                    &user("alice"),
                    QueryRecordsRequest {
                        record_type: "_auth".to_string(),
                        predicate: None,
                    },
                )
                .await,
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_only_comparable_field_is_scoped_to_own_records() {
        let service = service();
        for owner in ["alice", "bob"] {
            service
                .save(&user(owner), save_req(None, json!({"title": owner, "tag": "work"})))
                .await
                .unwrap();
        }
        let by_tag = || QueryRecordsRequest {
            record_type: "note".to_string(),
            predicate: Some(Predicate::equal(
                Expression::key_path("tag"),
                Expression::literal("work"),
            )),
        };

        let found = service.query(&user("alice"), by_tag()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner_id.as_deref(), Some("alice"));

        let discovered = service
            .discover(
                &user("bob"),
                DiscoverRecordsRequest {
                    record_type: "note".to_string(),
                    attributes: data(json!({"tag": "work"})),
                },
            )
            .await
            .unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].owner_id.as_deref(), Some("bob"));

        // Mixing in a field nobody may compare is still refused.
        let mixed = Predicate::and(vec![
            Predicate::equal(Expression::key_path("tag"), Expression::literal("work")),
            Predicate::equal(Expression::key_path("content"), Expression::literal("c")),
        ]);
        assert!(matches!(
            service
                .query(
                    &user("alice"),
                    QueryRecordsRequest {
                        record_type: "note".to_string(),
                        predicate: Some(mixed),
                    },
                )
                .await,
            Err(ServiceError::FieldAccess(_))
        ));
    }

    #[tokio::test]
    async fn test_user_records_require_master_key() {
        let service = service();
        let master = AuthContext::master();
        service
            .save(&master, user_req(Some("alice"), json!({"username": "alice"})))
            .await
            .unwrap();

        assert!(matches!(
            service
                .save(&user("bob"), user_req(Some("bob"), json!({"username": "alice"})))
                .await,
            Err(ServiceError::PermissionDenied(DenyReason::MasterKeyRequired))
        ));
        assert!(matches!(
            service
                .query(
                    &user("bob"),
                    QueryRecordsRequest {
                        record_type: USER_RECORD_TYPE.to_string(),
                        predicate: None,
                    },
                )
                .await,
            Err(ServiceError::PermissionDenied(DenyReason::MasterKeyRequired))
        ));
        assert!(matches!(
            service
                .discover(
                    &user("bob"),
                    DiscoverRecordsRequest {
                        record_type: USER_RECORD_TYPE.to_string(),
                        attributes: data(json!({"username": "alice"})),
                    },
                )
                .await,
            Err(ServiceError::PermissionDenied(DenyReason::MasterKeyRequired))
        ));
    }

    #[tokio::test]
    async fn test_master_key_identity_change_stays_unique() {
        let service = service();
        let master = AuthContext::master();
        for name in ["alice", "bob"] {
            service
                .save(&master, user_req(Some(name), json!({"username": name})))
                .await
                .unwrap();
        }

        assert!(matches!(
            service
                .save(&master, user_req(Some("bob"), json!({"username": "alice"})))
                .await,
            Err(ServiceError::DuplicatedUser)
        ));
        assert!(matches!(
            service
                .save(&master, user_req(None, json!({"username": "alice"})))
                .await,
            Err(ServiceError::DuplicatedUser)
        ));

        // Re-saving one's own name and clearing a key are fine.
        service
            .save(&master, user_req(Some("alice"), json!({"username": "alice", "email": "a@x"})))
            .await
            .unwrap();
        let cleared = service
            .save(&master, user_req(Some("alice"), json!({"email": null})))
            .await
            .unwrap();
        assert_eq!(cleared.data, data(json!({"username": "alice"})));
    }
}
