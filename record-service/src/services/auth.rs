//! Signup, login and credential management.
//!
//! Identity attributes live in a `user` record whose id equals the
//! AuthInfo id. Uniqueness is enforced by [`IdentityIndex`], which both
//! signup and master-key writes to `user` records go through.

use std::sync::Arc;

use crate::dtos::auth::{AssignRolesRequest, ChangePasswordRequest, LoginRequest, SignupRequest};
use crate::models::{AuthInfo, Data, Principal, Record};
use crate::services::identity::{IdentityIndex, USER_RECORD_TYPE};
use crate::services::store::{AuthInfoStore, RecordStore};
use crate::services::{JwtService, ServiceError, TokenResponse};
use crate::utils::Password;

/// Outcome of signup, login and password changes.
#[derive(Debug)]
pub struct AuthSession {
    pub auth_info: AuthInfo,
    pub token: TokenResponse,
    pub auth_data: Data,
}

#[derive(Clone)]
pub struct AuthService {
    auth_infos: Arc<dyn AuthInfoStore>,
    records: Arc<dyn RecordStore>,
    jwt: JwtService,
    identities: IdentityIndex,
}

impl AuthService {
    pub fn new(
        auth_infos: Arc<dyn AuthInfoStore>,
        records: Arc<dyn RecordStore>,
        jwt: JwtService,
        identities: IdentityIndex,
    ) -> Self {
        Self {
            auth_infos,
            records,
            jwt,
            identities,
        }
    }

    pub async fn signup(&self, req: SignupRequest) -> Result<AuthSession, ServiceError> {
        let auth_data = self.identities.auth_data(req.auth_data);

        let Some(password) = req.password else {
            if !auth_data.is_empty() {
                return Err(ServiceError::InvalidAuthData(
                    "password is required with auth data".to_string(),
                ));
            }
            return self.signup_anonymous().await;
        };

        if !auth_data.is_valid() {
            return Err(ServiceError::InvalidAuthData(format!(
                "auth data must use only {:?} and satisfy one key group",
                auth_data.all_keys()
            )));
        }
        let identity = self.identities.identity_fields(&auth_data.get_data());

        // Hash outside the lock; it is the slow part.
        let auth_info = AuthInfo::new(&Password::new(password))?;

        let _guard = self.identities.lock().await;
        self.identities.ensure_unique(&identity, None).await?;

        self.auth_infos.create_auth_info(&auth_info).await?;
        let record = Record::with_id(
            auth_info.id.clone(),
            USER_RECORD_TYPE,
            Some(auth_info.id.clone()),
            identity.clone(),
        );
        // A concurrent signup on another instance surfaces here as
        // DuplicatedUser through the storage unique index.
        self.records.save(&record).await?;

        tracing::info!(user_id = %auth_info.id, "User signed up");
        self.session(auth_info, identity)
    }

    async fn signup_anonymous(&self) -> Result<AuthSession, ServiceError> {
        let auth_info = AuthInfo::new_anonymous();
        self.auth_infos.create_auth_info(&auth_info).await?;
        let record = Record::with_id(
            auth_info.id.clone(),
            USER_RECORD_TYPE,
            Some(auth_info.id.clone()),
            Data::new(),
        );
        self.records.save(&record).await?;

        tracing::info!(user_id = %auth_info.id, "Anonymous user signed up");
        self.session(auth_info, Data::new())
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthSession, ServiceError> {
        let mut auth_data = self.identities.auth_data(req.auth_data);
        if !auth_data.is_valid() {
            return Err(ServiceError::InvalidAuthData(format!(
                "auth data must use only {:?} and satisfy one key group",
                auth_data.all_keys()
            )));
        }
        let predicate = auth_data.make_equal_predicate()?;

        let mut users = self.records.query(USER_RECORD_TYPE, &predicate).await?;
        let user = match users.len() {
            0 => {
                tracing::debug!(keys = ?auth_data.using_keys(), "Login failed: no such user");
                return Err(ServiceError::InvalidCredentials);
            }
            1 => users.remove(0),
            n => {
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "{} users match the same auth data",
                    n
                )))
            }
        };
        auth_data.update_from_record_data(&user.data);

        let mut auth_info = self
            .auth_infos
            .get_auth_info(&user.id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !auth_info.is_same_password(&Password::new(req.password)) {
            tracing::info!(user_id = %auth_info.id, "Login failed: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        auth_info.touch_last_seen();
        self.auth_infos.update_auth_info(&auth_info).await?;

        tracing::info!(user_id = %auth_info.id, "User logged in");
        self.session(auth_info, auth_data.get_data())
    }

    /// Rotate the credential. Every token issued before the call stops
    /// validating; the returned one is fresh.
    pub async fn change_password(
        &self,
        user_id: &str,
        req: ChangePasswordRequest,
    ) -> Result<AuthSession, ServiceError> {
        let mut auth_info = self
            .auth_infos
            .get_auth_info(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !auth_info.is_same_password(&Password::new(req.old_password)) {
            return Err(ServiceError::InvalidCredentials);
        }

        auth_info.set_password(&Password::new(req.password))?;
        self.auth_infos.update_auth_info(&auth_info).await?;

        tracing::info!(user_id = %auth_info.id, "Password changed");
        self.session(auth_info, Data::new())
    }

    /// Add roles to every listed user. All users must exist.
    pub async fn assign_roles(&self, req: AssignRolesRequest) -> Result<(), ServiceError> {
        let mut auth_infos = Vec::with_capacity(req.user_ids.len());
        for user_id in &req.user_ids {
            let auth_info = self
                .auth_infos
                .get_auth_info(user_id)
                .await?
                .ok_or(ServiceError::UserNotFound)?;
            auth_infos.push(auth_info);
        }

        for mut auth_info in auth_infos {
            for role in &req.roles {
                if !auth_info.has_any_roles(&[role]) {
                    auth_info.roles.push(role.clone());
                }
            }
            self.auth_infos.update_auth_info(&auth_info).await?;
            tracing::info!(user_id = %auth_info.id, roles = ?auth_info.roles, "Roles assigned");
        }
        Ok(())
    }

    /// Resolve a bearer token to its principal, enforcing the AuthInfo
    /// token watermark.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, ServiceError> {
        let claims = self.jwt.validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ServiceError::InvalidToken
        })?;

        let auth_info = self
            .auth_infos
            .get_auth_info(&claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let issued_at = claims.issued_at().ok_or(ServiceError::InvalidToken)?;
        if !auth_info.is_token_valid(issued_at) {
            tracing::debug!(user_id = %auth_info.id, "Access token predates password change");
            return Err(ServiceError::InvalidToken);
        }

        Ok(auth_info.principal())
    }

    fn session(&self, auth_info: AuthInfo, auth_data: Data) -> Result<AuthSession, ServiceError> {
        let token = self.jwt.generate_access_token(&auth_info)?;
        Ok(AuthSession {
            auth_info,
            token,
            auth_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::services::MemoryStore;
    use serde_json::json;

    fn service() -> AuthService {
        let store = Arc::new(MemoryStore::new());
        let jwt = JwtService::new(&JwtConfig {
            secret: "unit-test-secret".to_string(),
            access_token_expiry_minutes: 15,
        })
        .unwrap();
        let identities = IdentityIndex::new(
            store.clone(),
            vec![vec!["username".to_string()], vec!["email".to_string()]],
        );
        AuthService::new(store.clone(), store, jwt, identities)
    }

    fn signup(auth_data: serde_json::Value, password: Option<&str>) -> SignupRequest {
        SignupRequest {
            auth_data: auth_data.as_object().cloned().unwrap(),
            password: password.map(str::to_string),
        }
    }

    fn login(auth_data: serde_json::Value, password: &str) -> LoginRequest {
        LoginRequest {
            auth_data: auth_data.as_object().cloned().unwrap(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_then_login_by_any_key_group() {
        let service = service();
        let created = service
            .signup(signup(json!({"username": "alice", "email": "alice@example.com"}), Some("pw")))
            .await
            .unwrap();

        let by_email = service
            .login(login(json!({"email": "alice@example.com"}), "pw"))
            .await
            .unwrap();
        assert_eq!(by_email.auth_info.id, created.auth_info.id);
        // Refreshed from the stored user record.
        assert_eq!(by_email.auth_data["username"], json!("alice"));

        assert!(matches!(
            service.login(login(json!({"username": "alice"}), "wrong")).await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login(login(json!({"username": "bob"}), "pw")).await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_signup_is_rejected() {
        let service = service();
        service
            .signup(signup(json!({"username": "alice"}), Some("pw")))
            .await
            .unwrap();

        assert!(matches!(
            service.signup(signup(json!({"username": "alice"}), Some("other"))).await,
            Err(ServiceError::DuplicatedUser)
        ));
    }

    #[tokio::test]
    async fn test_signup_validates_auth_data() {
        let service = service();
        assert!(matches!(
            service.signup(signup(json!({"nickname": "x"}), Some("pw"))).await,
            Err(ServiceError::InvalidAuthData(_))
        ));
        assert!(matches!(
            service.signup(signup(json!({"username": "a"}), None)).await,
            Err(ServiceError::InvalidAuthData(_))
        ));
    }

    #[tokio::test]
    async fn test_anonymous_signup() {
        let service = service();
        let session = service.signup(signup(json!({}), None)).await.unwrap();
        assert!(!session.auth_info.has_password());

        let principal = service
            .authenticate(&session.token.access_token)
            .await
            .unwrap();
        assert_eq!(principal.id, session.auth_info.id);
    }

    #[tokio::test]
    async fn test_password_change_invalidates_old_tokens() {
        let service = service();
        let session = service
            .signup(signup(json!({"username": "alice"}), Some("old")))
            .await
            .unwrap();
        let old_token = session.token.access_token;
        assert!(service.authenticate(&old_token).await.is_ok());

        let changed = service
            .change_password(
                &session.auth_info.id,
                ChangePasswordRequest {
                    old_password: "old".to_string(),
                    password: "new".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.authenticate(&old_token).await,
            Err(ServiceError::InvalidToken)
        ));
        assert!(service.authenticate(&changed.token.access_token).await.is_ok());
        assert!(service.login(login(json!({"username": "alice"}), "new")).await.is_ok());
    }

    #[tokio::test]
    async fn test_assign_roles_is_idempotent_and_checks_users() {
        let service = service();
        let session = service
            .signup(signup(json!({"username": "alice"}), Some("pw")))
            .await
            .unwrap();
        let user_id = session.auth_info.id.clone();

        for _ in 0..2 {
            service
                .assign_roles(AssignRolesRequest {
                    user_ids: vec![user_id.clone()],
                    roles: vec!["admin".to_string()],
                })
                .await
                .unwrap();
        }
        let principal = service
            .authenticate(&session.token.access_token)
            .await
            .unwrap();
        assert_eq!(principal.roles, vec!["admin"]);

        assert!(matches!(
            service
                .assign_roles(AssignRolesRequest {
                    user_ids: vec![user_id, "missing".to_string()],
                    roles: vec!["writer".to_string()],
                })
                .await,
            Err(ServiceError::UserNotFound)
        ));
    }
}
