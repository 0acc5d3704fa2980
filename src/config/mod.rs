use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub realtime: RealtimeConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

/// Where connection and subscription state is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    fn parse(s: &str) -> Option<StoreKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(StoreKind::Postgres),
            "memory" => Some(StoreKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub store: StoreKind,
    pub policy_file: Option<String>,
    pub directory_file: Option<String>,
    pub notify_channel: String,
    pub heartbeat_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub enable_audit_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env::var("REALTIME_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("REALTIME_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = v.parse().unwrap_or(self.server.request_timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Realtime overrides
        if let Ok(v) = env::var("REALTIME_STORE") {
            self.realtime.store = StoreKind::parse(&v).unwrap_or(self.realtime.store);
        }
        if let Ok(v) = env::var("REALTIME_POLICY_FILE") {
            self.realtime.policy_file = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("REALTIME_DIRECTORY_FILE") {
            self.realtime.directory_file = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("REALTIME_NOTIFY_CHANNEL") {
            if !v.is_empty() {
                self.realtime.notify_channel = v;
            }
        }
        if let Ok(v) = env::var("REALTIME_HEARTBEAT_TIMEOUT_SECS") {
            self.realtime.heartbeat_timeout_secs = v.parse().unwrap_or(self.realtime.heartbeat_timeout_secs);
        }
        if let Ok(v) = env::var("REALTIME_STALE_AFTER_SECS") {
            self.realtime.stale_after_secs = v.parse().unwrap_or(self.realtime.stale_after_secs);
        }
        if let Ok(v) = env::var("REALTIME_SWEEP_INTERVAL_SECS") {
            self.realtime.sweep_interval_secs = v.parse().unwrap_or(self.realtime.sweep_interval_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET").or_else(|_| env::var("JWT_SECRET")) {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { port: 3100, request_timeout_secs: 30 },
            database: DatabaseConfig {
                url: "postgres://localhost:5432/monk_main".to_string(),
                max_connections: 10,
                connection_timeout: 30,
            },
            realtime: RealtimeConfig {
                store: StoreKind::Memory,
                policy_file: None,
                directory_file: None,
                notify_channel: "monk_realtime".to_string(),
                heartbeat_timeout_secs: 300,
                stale_after_secs: 120,
                sweep_interval_secs: 30,
            },
            security: SecurityConfig {
                jwt_secret: "dev-secret-change-me".to_string(),
                enable_audit_logging: false,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig { port: 3100, request_timeout_secs: 10 },
            database: DatabaseConfig { url: String::new(), max_connections: 20, connection_timeout: 10 },
            realtime: RealtimeConfig {
                store: StoreKind::Postgres,
                policy_file: None,
                directory_file: None,
                notify_channel: "monk_realtime".to_string(),
                heartbeat_timeout_secs: 120,
                stale_after_secs: 60,
                sweep_interval_secs: 15,
            },
            security: SecurityConfig { jwt_secret: String::new(), enable_audit_logging: true },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig { port: 3100, request_timeout_secs: 5 },
            database: DatabaseConfig { url: String::new(), max_connections: 50, connection_timeout: 5 },
            realtime: RealtimeConfig {
                store: StoreKind::Postgres,
                policy_file: None,
                directory_file: None,
                notify_channel: "monk_realtime".to_string(),
                heartbeat_timeout_secs: 90,
                stale_after_secs: 45,
                sweep_interval_secs: 15,
            },
            security: SecurityConfig { jwt_secret: String::new(), enable_audit_logging: true },
        }
    }

    /// Preset for in-process use (tests, embedding) without reading the environment
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
