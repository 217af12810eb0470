use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub token_source: TokenSourceConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allow_lan_access: bool,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl ServerConfig {
    pub fn bind_host(&self) -> &'static str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            allow_lan_access: false,
            max_body_size: default_max_body_size(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorsMode {
    #[default]
    Strict,
    Permissive,
}

// Strict with an empty allowlist refuses every cross-origin browser request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub mode: CorsMode,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSourceConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_region")]
    pub default_region: String,
    // 0 keeps refresh lazy (first access after TTL).
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

impl Default for TokenSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            default_region: default_region(),
            refresh_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    #[default]
    Protobuf,
    Hex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default)]
    pub mode: PayloadMode,
    #[serde(default = "default_id_field")]
    pub id_field: u32,
    // Extra varint fields appended after the identifier, as (field, value).
    #[serde(default)]
    pub trailer_fields: Vec<(u32, u64)>,
    // Externally produced ciphertext, used verbatim in `hex` mode.
    #[serde(default)]
    pub hex: String,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            mode: PayloadMode::Protobuf,
            id_field: default_id_field(),
            trailer_fields: Vec::new(),
            hex: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default = "default_upstream_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            request_timeout_secs: default_upstream_timeout_secs(),
            content_type: default_content_type(),
            extra_headers: HashMap::new(),
            upstream_proxy: UpstreamProxyConfig::default(),
            payload: PayloadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_visits_per_request")]
    pub max_visits_per_request: u32,
    // 0 disables the budget.
    #[serde(default)]
    pub time_budget_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    // 0 disables the consecutive-failure abort.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_visits_per_request: default_max_visits_per_request(),
            time_budget_secs: 0,
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_visits_per_job")]
    pub max_visits_per_job: u32,
    #[serde(default = "default_max_tracked_jobs")]
    pub max_tracked_jobs: usize,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    #[serde(default)]
    pub time_budget_secs: u64,
    // How long shutdown waits for workers before aborting them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_visits_per_job: default_max_visits_per_job(),
            max_tracked_jobs: default_max_tracked_jobs(),
            retention_secs: default_retention_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            time_budget_secs: 0,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_port() -> u16 {
    5200
}

fn default_max_body_size() -> usize {
    64 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_region() -> String {
    "UNKNOWN".to_string()
}

fn default_id_field() -> u32 {
    1
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_delay_ms() -> u64 {
    500
}

fn default_max_visits_per_request() -> u32 {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    200
}

fn default_retry_max_ms() -> u64 {
    2000
}

fn default_max_consecutive_failures() -> u32 {
    25
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_visits_per_job() -> u32 {
    5000
}

fn default_max_tracked_jobs() -> usize {
    1000
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_purge_interval_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    10
}
