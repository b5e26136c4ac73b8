use secrecy::SecretString;
use std::env;

const DEFAULT_JWT_SECRET: &str = "dev_secret_key_change_in_production";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => StorageBackend::Memory,
            _ => StorageBackend::Mongo,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub mongo_conn_string: String,
    pub mongo_db_name: String,
    pub web_server_host: String,
    pub web_server_port: u16,
    pub jwt_secret: SecretString,
    pub jwt_expiration_hours: i64,
    pub app_base_url: String,
    pub email_relay_url: Option<String>,
    pub email_from: String,
    pub upload_dir: String,
    pub upload_base_url: String,
    pub auto_submit_interval_secs: u64,
    pub history_retention_days: i64,
    pub notification_ttl_days: i64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            storage_backend: StorageBackend::parse(&env_or("STORAGE_BACKEND", "mongo")),
            mongo_conn_string: env_or("MONGO_CONN_STRING", "mongodb://localhost:27017"),
            mongo_db_name: env_or("MONGO_DB_NAME", "exam-portal-local"),
            web_server_host: env_or("WEB_SERVER_HOST", "localhost"),
            web_server_port: env_parse("WEB_SERVER_PORT", 8080),
            jwt_secret: SecretString::from(env_or("JWT_SECRET", DEFAULT_JWT_SECRET)),
            jwt_expiration_hours: env_parse("JWT_EXPIRATION_HOURS", 24),
            app_base_url: env_or("APP_BASE_URL", "http://localhost:8080"),
            email_relay_url: env::var("EMAIL_RELAY_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            email_from: env_or("EMAIL_FROM", "no-reply@exam-portal.local"),
            upload_dir: env_or("UPLOAD_DIR", "uploads"),
            upload_base_url: env_or("UPLOAD_BASE_URL", "/uploads"),
            auto_submit_interval_secs: env_parse("AUTO_SUBMIT_INTERVAL_SECS", 30),
            history_retention_days: env_parse("HISTORY_RETENTION_DAYS", 90),
            notification_ttl_days: env_parse("NOTIFICATION_TTL_DAYS", 30),
        }
    }

    /// Validate that production-critical configuration is set
    /// Panics if required secrets are using default values
    pub fn validate_for_production(&self) {
        use secrecy::ExposeSecret;

        let jwt_secret = self.jwt_secret.expose_secret();

        if jwt_secret == DEFAULT_JWT_SECRET {
            panic!(
                "FATAL: JWT_SECRET is using default value! Set JWT_SECRET environment variable to a secure random string."
            );
        }

        if jwt_secret.len() < 32 {
            panic!(
                "FATAL: JWT_SECRET is too short ({}). Must be at least 32 characters for security.",
                jwt_secret.len()
            );
        }

        if self.storage_backend == StorageBackend::Memory {
            panic!("FATAL: STORAGE_BACKEND=memory is not durable and cannot be used in production.");
        }
    }

    pub fn test_config() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            mongo_conn_string: "mongodb://localhost:27017".to_string(),
            mongo_db_name: "exam-portal-test".to_string(),
            web_server_host: "127.0.0.1".to_string(),
            web_server_port: 8080,
            jwt_secret: SecretString::from("test_jwt_secret_key".to_string()),
            jwt_expiration_hours: 1,
            app_base_url: "http://localhost:8080".to_string(),
            email_relay_url: None,
            email_from: "no-reply@test.local".to_string(),
            upload_dir: "uploads-test".to_string(),
            upload_base_url: "/uploads".to_string(),
            auto_submit_interval_secs: 30,
            history_retention_days: 90,
            notification_ttl_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_with_defaults() {
        let config = Config::from_env();

        assert!(!config.mongo_conn_string.is_empty());
        assert!(!config.mongo_db_name.is_empty());
        assert!(config.auto_submit_interval_secs > 0);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test_config();

        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.mongo_db_name, "exam-portal-test");
        assert_eq!(config.notification_ttl_days, 30);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(StorageBackend::parse("memory"), StorageBackend::Memory);
        assert_eq!(StorageBackend::parse(" In-Memory "), StorageBackend::Memory);
        assert_eq!(StorageBackend::parse("mongo"), StorageBackend::Mongo);
        assert_eq!(StorageBackend::parse("anything"), StorageBackend::Mongo);
    }

    #[test]
    #[should_panic(expected = "JWT_SECRET is using default value")]
    fn test_validate_for_production_rejects_default_secret() {
        let mut config = Config::test_config();
        config.jwt_secret = SecretString::from(DEFAULT_JWT_SECRET.to_string());
        config.validate_for_production();
    }
}
