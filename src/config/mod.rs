use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the analysis cache
    pub redis_url: String,

    /// Vision provider endpoint (batched annotate API)
    #[serde(default)]
    pub vision_endpoint: Option<String>,

    /// Vision provider API key
    #[serde(default)]
    pub vision_api_key: Option<String>,

    /// Whether the remote vision provider is enabled; when false every
    /// analysis uses the local fallback.
    #[serde(default = "default_vision_enabled")]
    pub vision_enabled: bool,

    /// Vision provider request timeout in seconds
    #[serde(default = "default_vision_timeout_secs")]
    pub vision_timeout_secs: u64,

    /// Image bucket name (S3-compatible)
    pub image_bucket: String,

    /// Image storage access key ID
    pub image_access_key: String,

    /// Image storage secret access key
    pub image_secret_key: String,

    /// Image storage endpoint URL
    pub image_endpoint: String,

    /// Worker poll interval in seconds when the queue is idle
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Max items claimed per worker batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Max processing attempts per queue item
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_vision_enabled() -> bool {
    false
}

fn default_vision_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    10
}

fn default_max_attempts() -> i32 {
    3
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
