//! Engine configuration
//!
//! Built from compiled defaults, then overridden by environment variables.
//! The data directory itself resolves separately through verso-common (CLI
//! argument, then VERSO_DATA_DIR, then the shared TOML config file).

/// Runtime configuration for the translation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent translate workers
    pub worker_count: usize,
    /// Worker sleep between empty ledger polls, milliseconds
    pub poll_interval_ms: u64,
    /// Event bus channel capacity
    pub event_capacity: usize,
    /// Model gateway base URL, no trailing slash
    pub model_base_url: String,
    /// Optional bearer token for the model gateway
    pub model_api_key: Option<String>,
    /// Model request timeout, seconds
    pub model_timeout_secs: u64,
    /// Model used by sequential stage passes (draft passes carry their own)
    pub stage_model: String,
    pub stage_temperature: f64,
    pub stage_top_p: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval_ms: 500,
            event_capacity: 256,
            model_base_url: "http://localhost:8900".to_string(),
            model_api_key: None,
            model_timeout_secs: 300,
            stage_model: "default".to_string(),
            stage_temperature: 0.3,
            stage_top_p: 1.0,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by VERSO_* environment variables. Unparsable
    /// values fall back to the default rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("VERSO_WORKERS") {
            config.worker_count = v;
        }
        if let Some(v) = env_parse::<u64>("VERSO_POLL_INTERVAL_MS") {
            config.poll_interval_ms = v;
        }
        if let Some(v) = env_parse::<usize>("VERSO_EVENT_CAPACITY") {
            config.event_capacity = v;
        }
        if let Ok(v) = std::env::var("VERSO_MODEL_URL") {
            if !v.is_empty() {
                config.model_base_url = v.trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("VERSO_MODEL_API_KEY") {
            if !v.is_empty() {
                config.model_api_key = Some(v);
            }
        }
        if let Some(v) = env_parse::<u64>("VERSO_MODEL_TIMEOUT_SECS") {
            config.model_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("VERSO_STAGE_MODEL") {
            if !v.is_empty() {
                config.stage_model = v;
            }
        }
        if let Some(v) = env_parse::<f64>("VERSO_STAGE_TEMPERATURE") {
            config.stage_temperature = v;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
