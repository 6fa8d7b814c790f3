use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::field_access::FieldAccessPayload,
    handlers::authorize,
    middleware::Auth,
    services::Policy,
    AppState,
};

fn policy() -> Policy {
    Policy::all_of([Policy::RequireMasterKey])
}

pub async fn get_field_access(
    State(state): State<AppState>,
    Auth(ctx): Auth,
) -> Result<impl IntoResponse, AppError> {
    authorize(&policy(), &ctx)?;
    Ok(Json(FieldAccessPayload {
        access: state.field_access_service.rules(),
    }))
}

/// Replace the whole field access table
pub async fn update_field_access(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    Json(req): Json<FieldAccessPayload>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&policy(), &ctx)?;
    state.field_access_service.update(req.access).await?;
    Ok((
        StatusCode::OK,
        Json(FieldAccessPayload {
            access: state.field_access_service.rules(),
        }),
    ))
}
