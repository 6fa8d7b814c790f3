use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::records::{
        DiscoverRecordsRequest, QueryRecordsRequest, RecordsResponse, SaveRecordRequest,
    },
    handlers::authorize,
    middleware::Auth,
    services::Policy,
    utils::ValidatedJson,
    AppState,
};

fn policy() -> Policy {
    Policy::any_of([Policy::RequireMasterKey, Policy::RequireAuthenticated])
}

pub async fn save_record(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    ValidatedJson(req): ValidatedJson<SaveRecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&policy(), &ctx)?;
    let record = state.record_service.save(&ctx, req).await?;
    Ok((StatusCode::OK, Json(record)))
}

pub async fn query_records(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    ValidatedJson(req): ValidatedJson<QueryRecordsRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&policy(), &ctx)?;
    let records = state.record_service.query(&ctx, req).await?;
    Ok(Json(RecordsResponse { records }))
}

pub async fn discover_records(
    State(state): State<AppState>,
    Auth(ctx): Auth,
    ValidatedJson(req): ValidatedJson<DiscoverRecordsRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&policy(), &ctx)?;
    let records = state.record_service.discover(&ctx, req).await?;
    Ok(Json(RecordsResponse { records }))
}
