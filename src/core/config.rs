use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::shared::constants::MAX_RETENTION_DAYS;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Where limits, activity and audit records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local storage, lost on restart. Intended for local runs.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared HS256 secret used by the upstream identity provider
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwt_leeway: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// Throttling knobs
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Limit applied when no role limit is configured for a role
    pub default_limit: i32,
    pub default_window_secs: i32,
    /// Upper bound on a single evaluation before it fails open
    pub evaluation_timeout: Duration,
    pub retention_days: i64,
    pub retention_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let storage = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse::<StorageBackend>()?;

        let database = match storage {
            StorageBackend::Postgres => Some(DatabaseConfig::from_env()?),
            StorageBackend::Memory => None,
        };

        Ok(Config {
            app: AppConfig::from_env()?,
            storage,
            database,
            auth: AuthConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
            rate_limit: RateLimitSettings::from_env()?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl AuthConfig {
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60; // 1 minute

    pub fn from_env() -> Result<Self, String> {
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "JWT_SECRET environment variable is required".to_string())?;

        let issuer = env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty());
        let audience = env::var("JWT_AUDIENCE").ok().filter(|s| !s.is_empty());

        let jwt_leeway_secs = env::var("JWT_LEEWAY")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_LEEWAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_LEEWAY must be a valid number".to_string())?;

        Ok(Self {
            jwt_secret,
            issuer,
            audience,
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Tenant Throttle API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Request throttling and rate limit administration".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

impl RateLimitSettings {
    pub const DEFAULT_LIMIT: i32 = 200;
    pub const DEFAULT_WINDOW_SECS: i32 = 3600; // 1 hour
    const DEFAULT_EVALUATION_TIMEOUT_MS: u64 = 500;
    pub const DEFAULT_RETENTION_DAYS: i64 = 90;
    const DEFAULT_RETENTION_INTERVAL_SECS: u64 = 86400; // daily

    pub fn from_env() -> Result<Self, String> {
        let default_limit = env::var("RATE_LIMIT_DEFAULT_LIMIT")
            .unwrap_or_else(|_| Self::DEFAULT_LIMIT.to_string())
            .parse::<i32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| "RATE_LIMIT_DEFAULT_LIMIT must be a positive number".to_string())?;

        let default_window_secs = env::var("RATE_LIMIT_DEFAULT_WINDOW_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_WINDOW_SECS.to_string())
            .parse::<i32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                "RATE_LIMIT_DEFAULT_WINDOW_SECS must be a positive number".to_string()
            })?;

        let evaluation_timeout = Self::parse_evaluation_timeout(
            &env::var("RATE_LIMIT_EVALUATION_TIMEOUT_MS")
                .unwrap_or_else(|_| Self::DEFAULT_EVALUATION_TIMEOUT_MS.to_string()),
        )?;

        let retention_days = Self::parse_retention_days(
            &env::var("ACTIVITY_RETENTION_DAYS")
                .unwrap_or_else(|_| Self::DEFAULT_RETENTION_DAYS.to_string()),
        )?;

        let retention_interval_secs = env::var("ACTIVITY_RETENTION_INTERVAL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_RETENTION_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                "ACTIVITY_RETENTION_INTERVAL_SECS must be a positive number".to_string()
            })?;

        Ok(Self {
            default_limit,
            default_window_secs,
            evaluation_timeout,
            retention_days,
            retention_interval: Duration::from_secs(retention_interval_secs),
        })
    }

    /// A zero timeout would fail every evaluation open
    fn parse_evaluation_timeout(raw: &str) -> Result<Duration, String> {
        raw.trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| "RATE_LIMIT_EVALUATION_TIMEOUT_MS must be a positive number".to_string())
    }

    fn parse_retention_days(raw: &str) -> Result<i64, String> {
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|v| (1..=MAX_RETENTION_DAYS).contains(v))
            .ok_or_else(|| {
                format!(
                    "ACTIVITY_RETENTION_DAYS must be between 1 and {}",
                    MAX_RETENTION_DAYS
                )
            })
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_limit: Self::DEFAULT_LIMIT,
            default_window_secs: Self::DEFAULT_WINDOW_SECS,
            evaluation_timeout: Duration::from_millis(Self::DEFAULT_EVALUATION_TIMEOUT_MS),
            retention_days: Self::DEFAULT_RETENTION_DAYS,
            retention_interval: Duration::from_secs(Self::DEFAULT_RETENTION_INTERVAL_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("postgres".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert_eq!(" Memory ".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let settings = RateLimitSettings::default();
        assert_eq!(settings.default_limit, 200);
        assert_eq!(settings.default_window_secs, 3600);
        assert_eq!(settings.retention_days, 90);
    }

    #[test]
    fn test_evaluation_timeout_rejects_zero() {
        assert!(RateLimitSettings::parse_evaluation_timeout("0").is_err());
        assert!(RateLimitSettings::parse_evaluation_timeout("soon").is_err());
        assert_eq!(
            RateLimitSettings::parse_evaluation_timeout("250"),
            Ok(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_retention_days_bounds() {
        assert!(RateLimitSettings::parse_retention_days("0").is_err());
        assert!(RateLimitSettings::parse_retention_days("100000000").is_err());
        assert_eq!(
            RateLimitSettings::parse_retention_days("36500"),
            Ok(MAX_RETENTION_DAYS)
        );
        assert_eq!(RateLimitSettings::parse_retention_days(" 30 "), Ok(30));
    }
}
