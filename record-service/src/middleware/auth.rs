use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::{models::AuthContext, services::ServiceError, AppState};

pub const MASTER_KEY_HEADER: &str = "x-master-key";

/// Builds the request's [`AuthContext`] from the master key header and the
/// bearer token. Both are optional; a present but invalid credential is
/// rejected here. Whether the operation is allowed is up to the handler's
/// policy.
pub async fn auth_context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_context(&state, req.headers()).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn resolve_context(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, ServiceError> {
    let mut ctx = AuthContext::unauthenticated();

    if let Some(key) = headers.get(MASTER_KEY_HEADER) {
        let matches: bool = key
            .as_bytes()
            .ct_eq(state.config.security.master_key.as_bytes())
            .into();
        if !matches {
            tracing::warn!("Failed master key authentication attempt");
            return Err(ServiceError::InvalidCredentials);
        }
        ctx.master_key = true;
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        ctx.principal = Some(state.auth_service.authenticate(token).await?);
    }

    Ok(ctx)
}

/// Extractor for the context built by [`auth_context_middleware`].
pub struct Auth(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Auth context missing from request extensions"))
        })?;

        Ok(Auth(ctx.clone()))
    }
}
