use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `MESSENGER_AUTOMATION__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Empty list keeps checkpoints in process memory.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub checkpoint_ttl_secs: u64,
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// Empty list falls back to the in-process timer wake path.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_wake_subject")]
    pub wake_subject: String,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
}

/// Messaging platform (Graph API) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub verify_token: String,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    /// Minimum gap between two runs of a page's fallback rule for one user.
    #[serde(default = "default_fallback_cooldown_secs")]
    pub fallback_cooldown_secs: u64,
    /// Session lifetime for flow steps that do not set their own.
    #[serde(default = "default_step_expiry_secs")]
    pub default_step_expiry_secs: u64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_jump_prefix")]
    pub jump_prefix: String,
    #[serde(default = "default_invalid_number_message")]
    pub invalid_number_message: String,
    /// Upper bound on actions one execution will walk.
    #[serde(default = "default_max_actions_per_run")]
    pub max_actions_per_run: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
    #[serde(default = "default_wake_grace_ms")]
    pub wake_grace_ms: u64,
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_campaign_batch_size")]
    pub campaign_batch_size: usize,
    #[serde(default = "default_recipient_batch_size")]
    pub recipient_batch_size: usize,
    #[serde(default = "default_tag")]
    pub default_tag: String,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_key_prefix() -> String {
    "messenger".to_string()
}
fn default_checkpoint_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_claim_ttl_secs() -> u64 {
    300
}
fn default_wake_subject() -> String {
    "messenger.scheduler.wake".to_string()
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}
fn default_graph_version() -> String {
    "v21.0".to_string()
}
fn default_send_timeout_ms() -> u64 {
    10_000
}
fn default_fallback_cooldown_secs() -> u64 {
    300
}
fn default_step_expiry_secs() -> u64 {
    300
}
fn default_dedup_window_secs() -> u64 {
    120
}
fn default_jump_prefix() -> String {
    "JUMP_TO_RULE:".to_string()
}
fn default_invalid_number_message() -> String {
    "Please enter a valid number.".to_string()
}
fn default_max_actions_per_run() -> usize {
    50
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_sweep_batch_size() -> usize {
    100
}
fn default_wake_grace_ms() -> u64 {
    1_000
}
fn default_push_enabled() -> bool {
    true
}
fn default_broadcast_interval_secs() -> u64 {
    15
}
fn default_campaign_batch_size() -> usize {
    5
}
fn default_recipient_batch_size() -> usize {
    50
}
fn default_tag() -> String {
    "ACCOUNT_UPDATE".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            key_prefix: default_key_prefix(),
            checkpoint_ttl_secs: default_checkpoint_ttl_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            wake_subject: default_wake_subject(),
            max_reconnects: default_nats_max_reconnects(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            graph_version: default_graph_version(),
            app_secret: String::new(),
            verify_token: String::new(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            fallback_cooldown_secs: default_fallback_cooldown_secs(),
            default_step_expiry_secs: default_step_expiry_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            jump_prefix: default_jump_prefix(),
            invalid_number_message: default_invalid_number_message(),
            max_actions_per_run: default_max_actions_per_run(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            wake_grace_ms: default_wake_grace_ms(),
            push_enabled: default_push_enabled(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_broadcast_interval_secs(),
            campaign_batch_size: default_campaign_batch_size(),
            recipient_batch_size: default_recipient_batch_size(),
            default_tag: default_tag(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            nats: NatsConfig::default(),
            platform: PlatformConfig::default(),
            automation: AutomationConfig::default(),
            scheduler: SchedulerConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("MESSENGER_AUTOMATION")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
