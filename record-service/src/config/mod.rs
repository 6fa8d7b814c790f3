use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub auth: AuthSettings,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Mongodb(MongoConfig),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Key groups identifying a user, in priority order.
    pub record_keys: Vec<Vec<String>>,
    /// Roles allowed to assign roles to other users.
    pub admin_roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub master_key: String,
}

impl RecordConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let storage = match get_env("STORAGE_BACKEND", Some("memory"), is_prod)?
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageConfig::Memory,
            "mongodb" => StorageConfig::Mongodb(MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("record_service"), is_prod)?,
            }),
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Invalid storage backend: {}",
                    other
                )))
            }
        };

        let config = RecordConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("record-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            storage,
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-only-insecure-jwt-secret"), is_prod)?,
                access_token_expiry_minutes: get_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
            },
            auth: AuthSettings {
                record_keys: parse_record_keys(&get_env(
                    "AUTH_RECORD_KEYS",
                    Some("username;email"),
                    is_prod,
                )?)?,
                admin_roles: parse_list(&get_env("ADMIN_ROLES", Some("admin"), is_prod)?),
            },
            security: SecurityConfig {
                allowed_origins: parse_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
                // No default: the master key is required in every environment.
                master_key: get_env("MASTER_KEY", None, true)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.security.master_key.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MASTER_KEY must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.storage == StorageConfig::Memory {
                tracing::warn!("In-memory storage in production: data is lost on restart");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// `username;email,phone` => `[["username"], ["email", "phone"]]`
pub fn parse_record_keys(raw: &str) -> Result<Vec<Vec<String>>, AppError> {
    let groups: Vec<Vec<String>> = raw
        .split(';')
        .map(parse_list)
        .filter(|group| !group.is_empty())
        .collect();

    if groups.is_empty() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "AUTH_RECORD_KEYS must name at least one key group"
        )));
    }
    if let Some(key) = groups.iter().flatten().find(|k| k.starts_with('_')) {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "AUTH_RECORD_KEYS cannot use reserved key '{}'",
            key
        )));
    }
    Ok(groups)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
