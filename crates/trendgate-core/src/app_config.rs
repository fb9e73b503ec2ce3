use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub topics_path: PathBuf,
    pub api_key_hash_salt: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub http_request_timeout_secs: u64,
    pub http_user_agent: String,
    pub source_max_retries: u32,
    pub source_retry_backoff_base_ms: u64,
    /// Lookback window, in days, for feature extraction.
    pub scoring_window_days: u32,
    pub youtube_api_key: Option<String>,
    pub instagram_access_token: Option<String>,
    pub instagram_user_id: Option<String>,
    pub naver_client_id: Option<String>,
    pub naver_client_secret: Option<String>,
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[redacted]")
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("topics_path", &self.topics_path)
            .field("database_url", &"[redacted]")
            .field("api_key_hash_salt", &redact(self.api_key_hash_salt.as_ref()))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("http_request_timeout_secs", &self.http_request_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("source_max_retries", &self.source_max_retries)
            .field(
                "source_retry_backoff_base_ms",
                &self.source_retry_backoff_base_ms,
            )
            .field("scoring_window_days", &self.scoring_window_days)
            .field("youtube_api_key", &redact(self.youtube_api_key.as_ref()))
            .field(
                "instagram_access_token",
                &redact(self.instagram_access_token.as_ref()),
            )
            .field("instagram_user_id", &self.instagram_user_id)
            .field("naver_client_id", &redact(self.naver_client_id.as_ref()))
            .field(
                "naver_client_secret",
                &redact(self.naver_client_secret.as_ref()),
            )
            .finish()
    }
}
