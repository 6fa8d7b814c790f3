pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use service_core::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{RecordConfig, StorageConfig};
use crate::services::{
    AuthInfoStore, AuthService, FieldAccessRegistry, FieldAccessService, FieldAccessStore,
    IdentityIndex, JwtService, MemoryStore, MongoDb, RecordService, RecordStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: RecordConfig,
    /// Set when records live in MongoDB; used by the health check.
    pub db: Option<MongoDb>,
    pub auth_service: AuthService,
    pub record_service: RecordService,
    pub field_access_service: FieldAccessService,
}

impl AppState {
    /// Wire the services for the configured storage backend and load the
    /// persisted field access table.
    pub async fn new(config: RecordConfig) -> Result<Self, AppError> {
        let (db, records, auth_infos, field_access): (
            Option<MongoDb>,
            Arc<dyn RecordStore>,
            Arc<dyn AuthInfoStore>,
            Arc<dyn FieldAccessStore>,
        ) = match &config.storage {
            StorageConfig::Memory => {
                let store = Arc::new(MemoryStore::new());
                (
                    None,
                    store.clone() as Arc<dyn RecordStore>,
                    store.clone() as Arc<dyn AuthInfoStore>,
                    store as Arc<dyn FieldAccessStore>,
                )
            }
            StorageConfig::Mongodb(mongo) => {
                let db = MongoDb::connect(&mongo.uri, &mongo.database).await?;
                db.initialize_indexes(&config.auth.record_keys).await?;
                let store = Arc::new(db.clone());
                (
                    Some(db),
                    store.clone() as Arc<dyn RecordStore>,
                    store.clone() as Arc<dyn AuthInfoStore>,
                    store as Arc<dyn FieldAccessStore>,
                )
            }
        };

        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let registry = Arc::new(FieldAccessRegistry::default());

        let field_access_service = FieldAccessService::new(field_access, registry.clone());
        field_access_service.load().await.map_err(AppError::from)?;

        let identities = IdentityIndex::new(records.clone(), config.auth.record_keys.clone());
        let auth_service = AuthService::new(auth_infos, records.clone(), jwt, identities.clone());
        let record_service = RecordService::new(records, registry, identities);

        Ok(Self {
            config,
            db,
            auth_service,
            record_service,
            field_access_service,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let api_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/password", post(handlers::auth::change_password))
        .route("/auth/role/assign", post(handlers::auth::assign_roles))
        .route(
            "/schema/field_access",
            get(handlers::field_access::get_field_access),
        )
        .route(
            "/schema/field_access/update",
            post(handlers::field_access::update_field_access),
        )
        .route("/records/save", post(handlers::records::save_record))
        .route("/records/query", post(handlers::records::query_records))
        .route(
            "/records/discover",
            post(handlers::records::discover_records),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_context_middleware,
        ));

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &service_core::axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                },
            ),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(middleware::MASTER_KEY_HEADER),
                    HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let storage = match &state.db {
        Some(db) => {
            db.health_check().await.map_err(|e| {
                tracing::error!(error = %e, "MongoDB health check failed");
                e
            })?;
            "mongodb"
        }
        None => "memory",
    };

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "storage": storage,
            "field_access_rules": state.field_access_service.rules().len()
        }
    })))
}
