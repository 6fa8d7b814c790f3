//! AuthInfo - the authentication side of a user account.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{Data, Principal};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Authenticated provider principal ID => provider auth data.
///
/// An account connected with a Facebook account might hold
/// `{"com.facebook:46709394": {"accessToken": "...", "facebookID": "46709394"}}`.
pub type ProviderInfo = BTreeMap<String, Data>;

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "password", default, skip_serializing_if = "Option::is_none")]
    hashed_password: Option<PasswordHashString>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_info: ProviderInfo,
    /// Access tokens issued before this instant are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_valid_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl AuthInfo {
    /// New account authenticated by password.
    pub fn new(password: &Password) -> Result<Self, anyhow::Error> {
        let mut info = Self::new_anonymous();
        info.set_password(password)?;
        Ok(info)
    }

    /// Account with no credential at all. It can never log in by password.
    pub fn new_anonymous() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            hashed_password: None,
            roles: Vec::new(),
            provider_info: ProviderInfo::new(),
            token_valid_since: None,
            last_seen_at: None,
        }
    }

    /// Account created through an external auth provider.
    pub fn new_with_provider(principal_id: impl Into<String>, auth_data: Data) -> Self {
        let mut info = Self::new_anonymous();
        info.provider_info.insert(principal_id.into(), auth_data);
        info
    }

    pub fn has_password(&self) -> bool {
        self.hashed_password.is_some()
    }

    /// Replace the credential and move the token watermark forward, which
    /// invalidates every access token issued so far.
    pub fn set_password(&mut self, password: &Password) -> Result<(), anyhow::Error> {
        let hashed = hash_password(password)?;
        self.hashed_password = Some(hashed);

        let now = Utc::now();
        let valid_since = match self.token_valid_since {
            Some(previous) if previous >= now => previous + Duration::microseconds(1),
            _ => now,
        };
        self.token_valid_since = Some(valid_since);

        Ok(())
    }

    pub fn is_same_password(&self, password: &Password) -> bool {
        match &self.hashed_password {
            Some(hash) => verify_password(password, hash),
            None => false,
        }
    }

    pub fn is_token_valid(&self, issued_at: DateTime<Utc>) -> bool {
        self.token_valid_since
            .map_or(true, |valid_since| issued_at >= valid_since)
    }

    pub fn touch_last_seen(&mut self) {
        self.last_seen_at = Some(Utc::now());
    }

    pub fn set_provider_info_data(&mut self, principal_id: impl Into<String>, auth_data: Data) {
        self.provider_info.insert(principal_id.into(), auth_data);
    }

    pub fn get_provider_info_data(&self, principal_id: &str) -> Option<&Data> {
        self.provider_info.get(principal_id)
    }

    pub fn remove_provider_info_data(&mut self, principal_id: &str) -> Option<Data> {
        self.provider_info.remove(principal_id)
    }

    pub fn has_any_roles<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles
            .iter()
            .any(|r| self.roles.iter().any(|own| own == r.as_ref()))
    }

    pub fn has_all_roles<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles
            .iter()
            .all(|r| self.roles.iter().any(|own| own == r.as_ref()))
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.id.clone(), self.roles.clone())
    }
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("id", &self.id)
            .field("has_password", &self.has_password())
            .field("roles", &self.roles)
            .field("providers", &self.provider_info.keys().collect::<Vec<_>>())
            .field("token_valid_since", &self.token_valid_since)
            .field("last_seen_at", &self.last_seen_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_password_constructor_sets_watermark() {
        let info = AuthInfo::new(&Password::new("correct horse")).unwrap();
        assert!(info.has_password());
        assert!(info.token_valid_since.is_some());
        assert!(Uuid::parse_str(&info.id).is_ok());
    }

    #[test]
    fn test_anonymous_cannot_authenticate() {
        let info = AuthInfo::new_anonymous();
        assert!(!info.is_same_password(&Password::new("")));
        assert!(info.token_valid_since.is_none());
    }

    #[test]
    fn test_set_password_rotates_credential_and_watermark() {
        let old = Password::new("old-password");
        let new = Password::new("new-password");
        let mut info = AuthInfo::new(&old).unwrap();
        let before = info.token_valid_since.unwrap();

        info.set_password(&new).unwrap();

        assert!(!info.is_same_password(&old));
        assert!(info.is_same_password(&new));
        assert!(info.token_valid_since.unwrap() > before);
    }

    #[test]
    fn test_watermark_strictly_increases_under_rapid_rotation() {
        let mut info = AuthInfo::new_anonymous();
        let future = Utc::now() + Duration::seconds(60);
        info.token_valid_since = Some(future);

        info.set_password(&Password::new("another-password")).unwrap();

        assert!(info.token_valid_since.unwrap() > future);
    }

    #[test]
    fn test_token_validity_against_watermark() {
        let info = AuthInfo::new(&Password::new("password")).unwrap();
        let valid_since = info.token_valid_since.unwrap();

        assert!(!info.is_token_valid(valid_since - Duration::seconds(1)));
        assert!(info.is_token_valid(valid_since));
        assert!(AuthInfo::new_anonymous().is_token_valid(Utc::now()));
    }

    #[test]
    fn test_provider_info_lifecycle() {
        let auth_data = json!({"accessToken": "token", "facebookID": "46709394"})
            .as_object()
            .cloned()
            .unwrap();
        let mut info = AuthInfo::new_with_provider("com.facebook:46709394", auth_data.clone());

        assert!(!info.has_password());
        assert_eq!(
            info.get_provider_info_data("com.facebook:46709394"),
            Some(&auth_data)
        );
        assert_eq!(info.get_provider_info_data("com.google:1"), None);

        info.set_provider_info_data("com.google:1", Data::new());
        assert_eq!(info.provider_info.len(), 2);

        assert_eq!(
            info.remove_provider_info_data("com.facebook:46709394"),
            Some(auth_data)
        );
        assert_eq!(info.get_provider_info_data("com.facebook:46709394"), None);
        assert_eq!(info.remove_provider_info_data("missing"), None);
    }

    #[test]
    fn test_role_membership() {
        let mut info = AuthInfo::new_anonymous();
        info.roles = vec!["admin".to_string(), "writer".to_string()];

        assert!(info.has_any_roles(&["reader", "writer"]));
        assert!(!info.has_any_roles(&["reader"]));
        assert!(!info.has_any_roles::<&str>(&[]));
        assert!(info.has_all_roles(&["admin", "writer"]));
        assert!(!info.has_all_roles(&["admin", "reader"]));
        assert!(info.has_all_roles::<&str>(&[]));
    }

    #[test]
    fn test_serialized_form_never_leaks_plaintext() {
        let info = AuthInfo::new(&Password::new("plaintext-secret")).unwrap();
        let json = serde_json::to_value(&info).unwrap();

        assert!(json["password"].as_str().unwrap().starts_with("$argon2"));
        assert!(!json.to_string().contains("plaintext-secret"));
        assert!(!format!("{:?}", info).contains("argon2"));
    }
}
