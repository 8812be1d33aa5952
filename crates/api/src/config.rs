use pixelfan_replicate::api::DEFAULT_BASE_URL;
use pixelfan_replicate::ReplicateConfig;

use crate::auth::jwt::JwtConfig;

/// Default demo login, used when `AUTH_EMAIL` / `AUTH_PASSWORD` are unset.
const DEFAULT_AUTH_EMAIL: &str = "test@example.com";
const DEFAULT_AUTH_PASSWORD: &str = "password123";

const DEFAULT_REPLICATE_MODEL: &str = "stability-ai/stable-diffusion";

/// Which image provider the job engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBackend {
    Replicate,
    Simulated,
}

impl GenerationBackend {
    /// Parse `GENERATION_BACKEND`. With no explicit choice, Replicate is used
    /// only when a token is present.
    pub fn resolve(value: Option<&str>, has_replicate_token: bool) -> Result<Self, String> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) if v.eq_ignore_ascii_case("replicate") => Ok(Self::Replicate),
            Some(v) if v.eq_ignore_ascii_case("simulated") => Ok(Self::Simulated),
            Some(other) => Err(format!(
                "Unknown GENERATION_BACKEND '{other}' (expected 'replicate' or 'simulated')"
            )),
            None if has_replicate_token => Ok(Self::Replicate),
            None => Ok(Self::Simulated),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `ALLOWED_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Token signing settings.
    pub jwt: JwtConfig,
    /// Demo login email.
    pub auth_email: String,
    /// Demo login password. Hashed at startup, never stored in state.
    pub auth_password: String,
    /// Size of the shared generation permit pool (default: `5`).
    pub max_concurrency: usize,
    /// Attempts per slot, including the first (default: `3`).
    pub retry_attempts: u32,
    pub backend: GenerationBackend,
    pub replicate: ReplicateConfig,
    /// Interval between WebSocket pings (default: `15`).
    pub ws_heartbeat_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                          |
    /// |---------------------------|----------------------------------|
    /// | `HOST`                    | `0.0.0.0`                        |
    /// | `PORT`                    | `8000`                           |
    /// | `ALLOWED_ORIGINS`         | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                             |
    /// | `AUTH_EMAIL`              | `test@example.com`               |
    /// | `AUTH_PASSWORD`           | `password123`                    |
    /// | `GEN_MAX_CONCURRENCY`     | `5`                              |
    /// | `RETRY_ATTEMPTS`          | `3`                              |
    /// | `GENERATION_BACKEND`      | `replicate` if a token is set    |
    /// | `REPLICATE_API_TOKEN`     | empty                            |
    /// | `REPLICATE_MODEL`         | `stability-ai/stable-diffusion`  |
    /// | `REPLICATE_MODEL_VERSION` | empty                            |
    /// | `WS_HEARTBEAT_SECS`       | `15`                             |
    ///
    /// # Panics
    ///
    /// Panics on unparseable numbers or an unknown backend name, so
    /// misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = parse_origins(
            &std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_concurrency: usize = std::env::var("GEN_MAX_CONCURRENCY")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("GEN_MAX_CONCURRENCY must be a valid usize");
        assert!(max_concurrency > 0, "GEN_MAX_CONCURRENCY must be at least 1");

        let retry_attempts: u32 = std::env::var("RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("RETRY_ATTEMPTS must be a valid u32");

        let ws_heartbeat_secs: u64 = std::env::var("WS_HEARTBEAT_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("WS_HEARTBEAT_SECS must be a valid u64");

        let replicate = ReplicateConfig {
            api_token: std::env::var("REPLICATE_API_TOKEN").unwrap_or_default(),
            model: std::env::var("REPLICATE_MODEL")
                .unwrap_or_else(|_| DEFAULT_REPLICATE_MODEL.into()),
            model_version: std::env::var("REPLICATE_MODEL_VERSION")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
        };

        let backend = GenerationBackend::resolve(
            std::env::var("GENERATION_BACKEND").ok().as_deref(),
            !replicate.api_token.is_empty(),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            auth_email: std::env::var("AUTH_EMAIL").unwrap_or_else(|_| DEFAULT_AUTH_EMAIL.into()),
            auth_password: std::env::var("AUTH_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_AUTH_PASSWORD.into()),
            max_concurrency,
            retry_attempts: retry_attempts.max(1),
            backend,
            replicate,
            ws_heartbeat_secs: ws_heartbeat_secs.max(1),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
