use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{
        AssignRolesRequest, AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse,
        SignupRequest,
    },
    handlers::authorize,
    middleware::Auth,
    services::{AuthSession, Policy, ServiceError},
    utils::ValidatedJson,
    AppState,
};

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user_id: session.auth_info.id,
            access_token: session.token.access_token,
            token_type: session.token.token_type,
            expires_in: session.token.expires_in,
            roles: session.auth_info.roles,
            auth_data: session.auth_data,
        }
    }
}

/// Create a user from identity attributes and a password
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth_service.signup(req).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::from(session))))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth_service.login(req).await?;
    Ok((StatusCode::OK, Json(AuthResponse::from(session))))
}

/// Change the caller's password. Tokens issued before the change stop
/// working; the response carries a fresh one.
pub async fn change_password(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&Policy::RequireAuthenticated, &ctx)?;
    let user_id = ctx.principal_id().ok_or(ServiceError::InvalidToken)?;

    let session = state.auth_service.change_password(user_id, req).await?;
    Ok((StatusCode::OK, Json(AuthResponse::from(session))))
}

pub async fn assign_roles(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    ValidatedJson(req): ValidatedJson<AssignRolesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let policy = Policy::any_of([
        Policy::RequireMasterKey,
        Policy::RequireAnyRole(state.config.auth.admin_roles.clone()),
    ]);
    authorize(&policy, &ctx)?;

    state.auth_service.assign_roles(req).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Roles assigned".to_string(),
        }),
    ))
}
