//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for zylu-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite (or other) database URL (default: `"sqlite://zylu.db"`).
    /// Any sqlx-compatible connection string works; `"sqlite::memory:"` is
    /// handy for tests.
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS origin allowlist; `None` means wildcard (dev).
    pub cors_allowed_origins: Option<String>,

    /// Admissions allowed per caller within one rate-limit window.
    pub rate_limit_admissions: u32,

    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,

    /// How long a closed generation stream stays attachable, in seconds.
    pub stream_retention_secs: u64,

    /// When `false`, `GET /v1/chat/resume` answers 204 and the resumable
    /// subsystem is considered unavailable.
    pub resume_enabled: bool,

    /// Expose Swagger UI at `/swagger-ui` (disable in production).
    pub enable_swagger: bool,

    /// Default provider API key; a per-request key in the POST body wins.
    pub provider_api_key: Option<String>,

    /// Model used for chat-title generation on first message.
    pub title_model: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("ZYLU_BIND", "0.0.0.0:3000"),
            database_url: env_or("ZYLU_DATABASE_URL", "sqlite://zylu.db"),
            log_level: env_or("ZYLU_LOG", "info"),
            log_json: env_flag("ZYLU_LOG_JSON", false),
            cors_allowed_origins: std::env::var("ZYLU_CORS_ORIGINS").ok(),
            rate_limit_admissions: parse_env("ZYLU_RATE_LIMIT_ADMISSIONS", 10),
            rate_limit_window_secs: parse_env("ZYLU_RATE_LIMIT_WINDOW_SECS", 10),
            stream_retention_secs: parse_env("ZYLU_STREAM_RETENTION_SECS", 300),
            resume_enabled: env_flag("ZYLU_RESUME_ENABLED", true),
            enable_swagger: env_flag("ZYLU_ENABLE_SWAGGER", true),
            provider_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            title_model: env_or("ZYLU_TITLE_MODEL", "openai/gpt-4.1-nano"),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
