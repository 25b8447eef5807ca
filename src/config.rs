use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_BASE_URL: &str = "https://svc.qri.jp/jpx/nkopm/";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime settings read from the environment (and `.env`, via dotenvy).
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub base_url: String,
    pub http_timeout: Duration,
    pub import_schedule: Option<String>,
}

impl ImporterConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            base_url: std::env::var("NKOPM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            http_timeout: Duration::from_secs(parse_var(
                "NKOPM_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            import_schedule: std::env::var("NKOPM_IMPORT_SCHEDULE").ok(),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, AppError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
