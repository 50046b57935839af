//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use bankroll::db::DatabaseConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Lock store (redis) connection URL
    pub redis_url: String,
    /// Security configuration
    pub security: SecurityConfig,
    /// Distributed lock tuning
    pub lock: LockConfig,
    /// Interval between expiry scheduler sweeps
    pub sweep_interval: Duration,
    /// Optional Prometheus exporter bind address
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
}

/// Distributed lock tuning
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lock TTL in milliseconds
    pub ttl_ms: u64,
    /// Acquisition retries before timing out
    pub retry_count: u32,
    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8080"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "e.g. postgres://postgres@localhost/bankroll_db".to_string(),
            })?;

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 100),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        let lock = LockConfig {
            ttl_ms: parse_env_or("LOCK_TTL_MS", 5_000),
            retry_count: parse_env_or("LOCK_RETRY_COUNT", 10),
            retry_delay_ms: parse_env_or("LOCK_RETRY_DELAY_MS", 100),
        };

        let sweep_interval = Duration::from_secs(parse_env_or("SWEEP_INTERVAL_SECS", 60));

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(ServerConfig {
            bind,
            database,
            redis_url,
            security: SecurityConfig { jwt_secret },
            lock,
            sweep_interval,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "LOCK_TTL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.lock.retry_delay_ms as u128 * self.lock.retry_count as u128
            >= self.lock.ttl_ms as u128 * 10
        {
            return Err(ConfigError::Invalid {
                var: "LOCK_RETRY_COUNT".to_string(),
                reason: format!(
                    "Total retry budget must stay well under 10x the lock TTL ({} ms)",
                    self.lock.ttl_ms
                ),
            });
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            database: DatabaseConfig {
                database_url: "test".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_secs: 5,
                idle_timeout_secs: 300,
                max_lifetime_secs: 1800,
            },
            redis_url: "redis://127.0.0.1:6379".to_string(),
            security: SecurityConfig {
                jwt_secret: "a".repeat(32),
            },
            lock: LockConfig {
                ttl_ms: 5_000,
                retry_count: 10,
                retry_delay_ms: 100,
            },
            sweep_interval: Duration::from_secs(60),
            metrics_bind: None,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_config_validation_zero_ttl() {
        let mut config = base_config();
        config.lock.ttl_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_config_validation_excessive_retry_budget() {
        let mut config = base_config();
        config.lock.retry_count = 1_000;
        config.lock.retry_delay_ms = 1_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_config_validation_zero_sweep_interval() {
        let mut config = base_config();
        config.sweep_interval = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }
}
