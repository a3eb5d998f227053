use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub cache: CacheConfig,
    pub plugins: PluginConfig,
    pub tenant: TenantConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on compiled tenant models kept alive
    pub max_models: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub hook_timeout_ms: u64,
    pub audit_collection: String,
    pub notification_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
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
        // Store overrides
        if let Ok(v) = env::var("STORE_BACKEND") {
            self.store.backend = match v.to_ascii_lowercase().as_str() {
                "postgres" | "pg" => StoreBackend::Postgres,
                "memory" | "mem" => StoreBackend::Memory,
                _ => self.store.backend,
            };
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.store.database_url = Some(v);
        }
        if let Ok(v) = env::var("STORE_MAX_CONNECTIONS") {
            self.store.max_connections = v.parse().unwrap_or(self.store.max_connections);
        }
        if let Ok(v) = env::var("STORE_CONNECTION_TIMEOUT") {
            self.store.connection_timeout = v.parse().unwrap_or(self.store.connection_timeout);
        }

        // Query overrides
        if let Ok(v) = env::var("QUERY_DEFAULT_LIMIT") {
            self.query.default_limit = v.parse().unwrap_or(self.query.default_limit);
        }
        if let Ok(v) = env::var("QUERY_MAX_LIMIT") {
            self.query.max_limit = v.parse().unwrap_or(self.query.max_limit);
        }

        // Cache overrides
        if let Ok(v) = env::var("CACHE_MAX_MODELS") {
            self.cache.max_models = v.parse().unwrap_or(self.cache.max_models);
        }

        // Plugin overrides
        if let Ok(v) = env::var("PLUGIN_HOOK_TIMEOUT_MS") {
            self.plugins.hook_timeout_ms = v.parse().unwrap_or(self.plugins.hook_timeout_ms);
        }
        if let Ok(v) = env::var("AUDIT_COLLECTION") {
            self.plugins.audit_collection = v;
        }
        if let Ok(v) = env::var("NOTIFICATION_COLLECTION") {
            self.plugins.notification_collection = v;
        }

        // Tenant overrides
        if let Ok(v) = env::var("TENANT_HEADER") {
            self.tenant.header = v.to_ascii_lowercase();
        }

        // API overrides
        if let Ok(v) = env::var("CAMPUS_API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                database_url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            query: QueryConfig {
                default_limit: 10,
                max_limit: 1000,
            },
            cache: CacheConfig { max_models: 256 },
            plugins: PluginConfig {
                hook_timeout_ms: 5_000,
                audit_collection: "activity_logs".to_string(),
                notification_collection: "notifications".to_string(),
            },
            tenant: TenantConfig {
                header: "x-tenant-slug".to_string(),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            store: StoreConfig {
                backend: StoreBackend::Postgres,
                database_url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            query: QueryConfig {
                default_limit: 10,
                max_limit: 500,
            },
            cache: CacheConfig { max_models: 1024 },
            plugins: PluginConfig {
                hook_timeout_ms: 3_000,
                audit_collection: "activity_logs".to_string(),
                notification_collection: "notifications".to_string(),
            },
            tenant: TenantConfig {
                header: "x-tenant-slug".to_string(),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            store: StoreConfig {
                backend: StoreBackend::Postgres,
                database_url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            query: QueryConfig {
                default_limit: 10,
                max_limit: 100,
            },
            cache: CacheConfig { max_models: 4096 },
            plugins: PluginConfig {
                hook_timeout_ms: 2_000,
                audit_collection: "activity_logs".to_string(),
                notification_collection: "notifications".to_string(),
            },
            tenant: TenantConfig {
                header: "x-tenant-slug".to_string(),
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.query.max_limit, 1000);
        assert_eq!(config.tenant.header, "x-tenant-slug");
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.query.max_limit, 100);
        assert!(config.cache.max_models > AppConfig::development().cache.max_models);
    }
}
