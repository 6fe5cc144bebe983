//! YAML backed runtime configuration of the bot.
//!
//! Every section has defaults, so a config file only needs to list what it overrides.

use common::symbols::{STABLE_ASSETS, STRONG_ASSETS};
use common::{PartitionSpec, StreamKind, SymbolKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    pub assets: AssetsConfig,
    pub exchange: ExchangeConfig,
    pub tracker: TrackerConfig,
    pub ingestor: IngestorConfig,
    pub gap: GapConfig,
    pub profit: ProfitConfig,
    pub executor: ExecutorConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub stable: String,
    pub strong: Vec<String>,
    /// How many top-volume alts make up the universe.
    pub top_volume_count: usize,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            stable: "USDT".to_string(),
            strong: STRONG_ASSETS.iter().map(|s| s.to_string()).collect(),
            top_volume_count: 10,
        }
    }
}

impl AssetsConfig {
    /// Assets never eligible as alts: the known stables, the configured stable and the strongs.
    pub fn excluded(&self) -> Vec<String> {
        let mut out: Vec<String> = STABLE_ASSETS.iter().map(|s| s.to_string()).collect();
        if !out.contains(&self.stable) {
            out.push(self.stable.clone());
        }
        out.extend(self.strong.iter().cloned());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Exchange error codes worth retrying in place.
    pub codes: Vec<i64>,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            codes: vec![-1021, -2011],
            delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub composite_url: String,
    /// Taker fee as a fraction (0.001 is 0.1%).
    pub fee: Decimal,
    pub recv_window_ms: u64,
    /// Names of the environment variables holding the API credentials.
    pub api_key_env: String,
    pub api_secret_env: String,
    pub retry: RetryConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            composite_url: "https://www.binance.com".to_string(),
            fee: dec!(0.001),
            recv_window_ms: 5000,
            api_key_env: "BINANCE_API_KEY".to_string(),
            api_secret_env: "BINANCE_API_SECRET".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExchangeConfig {
    pub fn fee_multiplier(&self) -> Decimal {
        Decimal::ONE - self.fee
    }

    /// Reads the API key and secret from the configured environment variables.
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| {
                ConfigError::ValidationError(format!("Environment variable {} is not set", name))
            })
        };
        Ok((read(&self.api_key_env)?, read(&self.api_secret_env)?))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl TrackerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// One ingester group: which stream, over which symbol set, for which shard.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamShard {
    pub stream: StreamKind,
    #[serde(default)]
    pub kind: SymbolKind,
    #[serde(default)]
    pub partition: PartitionSpec,
}

impl std::str::FromStr for StreamShard {
    type Err = String;

    /// Parses `stream:kind:page/total`; kind and partition may be omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let stream = parts
            .next()
            .ok_or_else(|| format!("Invalid shard '{}'", s))?
            .parse::<StreamKind>()?;
        let kind = match parts.next() {
            Some(kind) if !kind.is_empty() => kind.parse::<SymbolKind>()?,
            _ => SymbolKind::All,
        };
        let partition = match parts.next() {
            Some(partition) => partition.parse::<PartitionSpec>()?,
            None => PartitionSpec::WHOLE,
        };
        Ok(Self {
            stream,
            kind,
            partition,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestorConfig {
    pub streams: Vec<StreamShard>,
    pub reconnect_backoff_ms: u64,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            streams: vec![
                StreamShard {
                    stream: StreamKind::Depth,
                    kind: SymbolKind::All,
                    partition: PartitionSpec::WHOLE,
                },
                StreamShard {
                    stream: StreamKind::Ticker,
                    kind: SymbolKind::All,
                    partition: PartitionSpec::WHOLE,
                },
            ],
            reconnect_backoff_ms: 100,
        }
    }
}

impl IngestorConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GapConfig {
    /// Minimum score (percentage points) for a triple to be flagged.
    pub min: Decimal,
    pub interval_ms: u64,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min: dec!(1.5),
            interval_ms: 100,
        }
    }
}

impl GapConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfitConfig {
    /// Opportunities must be strictly above this value to be published.
    pub min_detect: Decimal,
    /// Investable notional in stable units.
    pub notional: Decimal,
    /// Order book level used for the quoted prices (0 is top of book).
    pub level_index: usize,
    /// Report profit in percent (true) or as a ratio (false).
    pub percent: bool,
    pub strict: bool,
    pub interval_ms: u64,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            min_detect: dec!(0.3),
            notional: dec!(100),
            level_index: 0,
            percent: true,
            strict: false,
            interval_ms: 10,
        }
    }
}

impl ProfitConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wait budget of each leg, in seconds.
    pub leg_max_wait_secs: [u64; 3],
    pub order_poll_ms: u64,
    pub balance_poll_ms: u64,
    /// How long to poll for the CANCELED status after a successful cancel.
    pub cancel_confirm_secs: u64,
    pub notional: Decimal,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            leg_max_wait_secs: [10, 30, 60],
            order_poll_ms: 1000,
            balance_poll_ms: 1000,
            cancel_confirm_secs: 5,
            notional: dec!(100),
        }
    }
}

impl ExecutorConfig {
    pub fn leg_max_wait(&self, leg: usize) -> Duration {
        Duration::from_secs(self.leg_max_wait_secs[leg.min(2)])
    }

    pub fn order_poll(&self) -> Duration {
        Duration::from_millis(self.order_poll_ms)
    }

    pub fn balance_poll(&self) -> Duration {
        Duration::from_millis(self.balance_poll_ms)
    }

    pub fn cancel_confirm(&self) -> Duration {
        Duration::from_secs(self.cancel_confirm_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Sleep between attempts while waiting for a record to appear.
    pub wait_backoff_ms: u64,
    /// Restart delay of a service that exited with an error.
    pub restart_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            wait_backoff_ms: 500,
            restart_delay_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn wait_backoff(&self) -> Duration {
        Duration::from_millis(self.wait_backoff_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl BotConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: BotConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.assets.stable = config.assets.stable.to_uppercase();
        for strong in config.assets.strong.iter_mut() {
            *strong = strong.to_uppercase();
        }

        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.assets.stable.is_empty() {
            return invalid("Stable asset cannot be empty".to_string());
        }
        if self.assets.strong.is_empty() {
            return invalid("No strong assets configured".to_string());
        }
        if self.assets.strong.contains(&self.assets.stable) {
            return invalid(format!(
                "Stable asset {} cannot also be a strong asset",
                self.assets.stable
            ));
        }
        if self.assets.top_volume_count == 0 {
            return invalid("Top volume count must be greater than 0".to_string());
        }

        if self.exchange.fee < Decimal::ZERO || self.exchange.fee >= Decimal::ONE {
            return invalid(format!("Exchange fee {} must be in [0, 1)", self.exchange.fee));
        }
        if self.profit.notional <= Decimal::ZERO || self.executor.notional <= Decimal::ZERO {
            return invalid("Notional must be positive".to_string());
        }
        if self.profit.level_index >= 5 {
            return invalid("Depth level index must be below 5".to_string());
        }

        let intervals = [
            ("tracker", self.tracker.interval_secs),
            ("gap", self.gap.interval_ms),
            ("profit", self.profit.interval_ms),
            ("executor order poll", self.executor.order_poll_ms),
            ("executor balance poll", self.executor.balance_poll_ms),
            ("store wait backoff", self.store.wait_backoff_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return invalid(format!("{} interval must be greater than 0", name));
            }
        }

        let budgets = self.executor.leg_max_wait_secs;
        if budgets[0] == 0 || budgets[0] >= budgets[1] || budgets[1] >= budgets[2] {
            return invalid(format!(
                "Leg wait budgets must be positive and increasing, got {:?}",
                budgets
            ));
        }

        for shard in &self.ingestor.streams {
            let PartitionSpec { page, total } = shard.partition;
            PartitionSpec::new(page, total).map_err(ConfigError::ValidationError)?;
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
