use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3030)
    pub port: u16,
    /// Database file path (default: ./sitesync.db)
    pub database_path: PathBuf,
    /// CORS allowed origins (comma-separated). Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes (default: 10 MiB)
    pub body_limit: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3030".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_path = PathBuf::from(
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./sitesync.db".to_string()),
        );

        let cors_origins = parse_origins(&env::var("CORS_ORIGINS").unwrap_or_default());

        let body_limit = match env::var("BODY_LIMIT_BYTES") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidBodyLimit)?,
            Err(_) => 10 * 1024 * 1024,
        };

        Ok(Config {
            host,
            port,
            database_path,
            cors_origins,
            body_limit,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid PORT environment variable")]
    InvalidPort,
    #[error("Invalid BODY_LIMIT_BYTES environment variable")]
    InvalidBodyLimit,
}
