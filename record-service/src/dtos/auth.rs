use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Data;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    /// Identity attributes, e.g. `{"username": "alice"}`. Empty together
    /// with a missing password creates an anonymous user.
    #[serde(default)]
    pub auth_data: Data,

    #[validate(length(min = 1, max = 256, message = "Password must be 1 to 256 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    pub auth_data: Data,

    #[validate(length(min = 1, max = 256, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Old password is required"))]
    pub old_password: String,

    #[validate(length(min = 1, max = 256, message = "Password must be 1 to 256 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRolesRequest {
    #[validate(length(min = 1, message = "At least one user is required"))]
    pub user_ids: Vec<String>,

    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Data::is_empty")]
    pub auth_data: Data,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
