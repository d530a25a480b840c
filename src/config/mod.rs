use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL for the bets/markets API, also hosts the SSE stream.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Expected chain id; a mismatch fails bets with WRONG_NETWORK.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// USDT token contract address.
    #[serde(default)]
    pub usdt_address: String,
    /// Prediction market contract address.
    #[serde(default)]
    pub market_address: String,
    /// Wallet private key - loaded from env BETLINE_PRIVATE_KEY
    #[serde(default)]
    pub private_key: String,
    /// Receipt poll interval in milliseconds.
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    /// Hard ceiling on waiting for a receipt, in seconds.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Minimum bet in USDT.
    #[serde(default = "default_min_bet")]
    pub min_bet: Decimal,
    /// Maximum bet in USDT. Also the amount approved for spending.
    #[serde(default = "default_max_bet")]
    pub max_bet: Decimal,
    /// Cooldown between bets from one wallet, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Maximum bets per wallet per market.
    #[serde(default = "default_max_bets_per_wallet")]
    pub max_bets_per_wallet: u32,
    /// Maximum share of the pool one wallet may hold, in percent.
    #[serde(default = "default_max_exposure_percent")]
    pub max_exposure_percent: f64,
    /// Bounded attempts for backend confirmation retries.
    #[serde(default = "default_confirm_retries")]
    pub confirm_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Snapshot cache TTL in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Background refetch interval in seconds.
    #[serde(default = "default_refetch_interval_secs")]
    pub refetch_interval_secs: u64,
    /// Delay before reconnecting a dropped push channel, in seconds.
    #[serde(default = "default_push_reconnect_secs")]
    pub push_reconnect_secs: u64,
    /// Consecutive push failures before falling back to polling only.
    #[serde(default = "default_max_push_reconnects")]
    pub max_push_reconnects: u32,
    /// Request aggregate stats with each market fetch.
    #[serde(default)]
    pub include_stats: bool,
    /// Open the push channel after first load.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_rpc_url() -> String {
    "https://evm.cronos.org".to_string()
}
fn default_chain_id() -> u64 {
    25
}
fn default_receipt_poll_ms() -> u64 {
    3000
}
fn default_receipt_timeout_secs() -> u64 {
    60
}
fn default_min_bet() -> Decimal {
    Decimal::ONE
}
fn default_max_bet() -> Decimal {
    Decimal::from(10_000)
}
fn default_cooldown_secs() -> u64 {
    60
}
fn default_max_bets_per_wallet() -> u32 {
    10
}
fn default_max_exposure_percent() -> f64 {
    25.0
}
fn default_confirm_retries() -> u32 {
    3
}
fn default_cache_ttl_secs() -> u64 {
    10
}
fn default_refetch_interval_secs() -> u64 {
    30
}
fn default_push_reconnect_secs() -> u64 {
    5
}
fn default_max_push_reconnects() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            usdt_address: String::new(),
            market_address: String::new(),
            private_key: String::new(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_bet: default_min_bet(),
            max_bet: default_max_bet(),
            cooldown_secs: default_cooldown_secs(),
            max_bets_per_wallet: default_max_bets_per_wallet(),
            max_exposure_percent: default_max_exposure_percent(),
            confirm_retries: default_confirm_retries(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            refetch_interval_secs: default_refetch_interval_secs(),
            push_reconnect_secs: default_push_reconnect_secs(),
            max_push_reconnects: default_max_push_reconnects(),
            include_stats: false,
            auto_connect: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        Ok(config)
    }

    /// Load a default config with env-only overrides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            backend: BackendConfig::default(),
            chain: ChainConfig::default(),
            limits: LimitsConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        };
        if let Ok(url) = std::env::var("BETLINE_API_URL") {
            config.backend.api_url = url;
        }
        config.overlay_env();
        config
    }

    /// Override secrets and endpoints from environment variables
    /// (never store the key in the config file).
    fn overlay_env(&mut self) {
        if let Ok(key) = std::env::var("BETLINE_PRIVATE_KEY") {
            self.chain.private_key = key;
        }
        if let Ok(url) = std::env::var("BETLINE_RPC_URL") {
            self.chain.rpc_url = url;
        }
    }

    pub fn has_wallet(&self) -> bool {
        !self.chain.private_key.is_empty()
            && !self.chain.usdt_address.is_empty()
            && !self.chain.market_address.is_empty()
    }
}
