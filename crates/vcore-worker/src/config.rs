//! Worker configuration, loaded entirely from the environment (§6).

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub openai_api_key: String,
    pub data_dir: String,

    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub log_level: String,

    pub max_frames_per_video: usize,
    pub vision_max_concurrent: usize,

    pub enable_transcription: bool,
    pub enable_vision_analysis: bool,
    pub enable_embeddings: bool,

    pub dev_http: bool,
    pub http_port: u16,

    /// Grace period given to an in-flight job when a shutdown signal arrives.
    pub shutdown_timeout: Duration,
}

impl WorkerConfig {
    /// Build the config from environment variables, per §6.
    ///
    /// `database_url` and `openai_api_key` are required; everything else
    /// falls back to the documented default.
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL is required".to_string())?;
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY is required".to_string())?;

        Ok(Self {
            database_url,
            openai_api_key,
            data_dir: env_or("DATA_DIR", "/app/data"),

            poll_interval: Duration::from_millis(env_parse_or("WORKER_POLL_MS", 1500)),
            max_attempts: env_parse_or("WORKER_MAX_ATTEMPTS", 3),
            log_level: env_or("LOG_LEVEL", "INFO"),

            max_frames_per_video: env_parse_or("MAX_FRAMES_PER_VIDEO", 50),
            vision_max_concurrent: env_parse_or("VISION_MAX_CONCURRENT", 5),

            enable_transcription: env_bool_or("ENABLE_TRANSCRIPTION", true),
            enable_vision_analysis: env_bool_or("ENABLE_VISION_ANALYSIS", true),
            enable_embeddings: env_bool_or("ENABLE_EMBEDDINGS", true),

            dev_http: env_bool_or("WORKER_DEV_HTTP", false),
            http_port: env_parse_or("WORKER_HTTP_PORT", 8000),

            shutdown_timeout: Duration::from_secs(30),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool_or(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
