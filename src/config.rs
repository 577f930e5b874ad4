//! Configuration module

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (`sqlite:` or `postgres:` scheme)
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// Token required on the management API. `None` leaves it open.
    pub admin_token: Option<String>,

    /// Upper bound on pooled connections
    pub max_connections: u32,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://oob-evidence.db".to_string()),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),

            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            port: 8080,
            admin_token: None,
            max_connections: 10,
            environment: "development".to_string(),
        }
    }
}
