//! Records shared through the keyed store and the pub/sub channels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Global prefix of every store key.
pub const KEY_PREFIX: &str = "tria_bot";

/// An entity persisted in the keyed store under `tria_bot:<NAMESPACE>:<pk>`.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const NAMESPACE: &'static str;

    fn pk(&self) -> String;

    fn key(pk: &str) -> String {
        format!("{}:{}:{}", KEY_PREFIX, Self::NAMESPACE, pk)
    }
}

/// A record with one fixed, well-known key.
pub trait Singleton: Record {
    const PK: &'static str;
}

/// Current top-volume alt assets, plus the version bumped on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUniverse {
    pub assets: Vec<String>,
    pub version: u64,
}

impl AssetUniverse {
    pub fn new(assets: Vec<String>, version: u64) -> Self {
        Self { assets, version }
    }

    /// Order-insensitive comparison against a freshly polled asset list.
    pub fn same_assets(&self, other: &[String]) -> bool {
        let mine: HashSet<&str> = self.assets.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other.iter().map(String::as_str).collect();
        mine == theirs
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.assets.iter().any(|a| a == asset)
    }
}

impl Record for AssetUniverse {
    const NAMESPACE: &'static str = "TopVolumeAssets";

    fn pk(&self) -> String {
        Self::PK.to_string()
    }
}

impl Singleton for AssetUniverse {
    const PK: &'static str = "TOP_VOLUME_ASSETS";
}

/// Tradable pair whitelist derived from the asset universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidSymbols {
    pub symbols: Vec<String>,
}

impl ValidSymbols {
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

impl Record for ValidSymbols {
    const NAMESPACE: &'static str = "ValidSymbols";

    fn pk(&self) -> String {
        Self::PK.to_string()
    }
}

impl Singleton for ValidSymbols {
    const PK: &'static str = "VALID_SYMBOLS";
}

/// Per-pair exchange quantization rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub is_spot_trading_allowed: bool,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub tick_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub step_size: Decimal,
    pub order_types: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Record for SymbolInfo {
    const NAMESPACE: &'static str = "Symbol";

    fn pk(&self) -> String {
        self.symbol.clone()
    }
}

/// One order book level, `[price, quantity]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn qty(&self) -> Decimal {
        self.1
    }
}

/// Latest top-of-book snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    #[serde(alias = "s")]
    pub symbol: String,
    #[serde(alias = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(alias = "a")]
    pub asks: Vec<PriceLevel>,
    #[serde(alias = "E")]
    pub event_time: i64,
}

impl Depth {
    pub fn bid(&self, index: usize) -> Option<Decimal> {
        self.bids.get(index).map(PriceLevel::price)
    }

    pub fn ask(&self, index: usize) -> Option<Decimal> {
        self.asks.get(index).map(PriceLevel::price)
    }
}

impl Record for Depth {
    const NAMESPACE: &'static str = "Depth";

    fn pk(&self) -> String {
        self.symbol.clone()
    }
}

/// Latest 24h price change snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(alias = "s")]
    pub symbol: String,
    #[serde(alias = "p")]
    pub price_change: Decimal,
    #[serde(alias = "P")]
    pub price_change_percent: Decimal,
    #[serde(alias = "E")]
    pub event_time: i64,
}

impl Record for Ticker {
    const NAMESPACE: &'static str = "Ticker";

    fn pk(&self) -> String {
        self.symbol.clone()
    }
}

/// Candidate triple flagged by the ticker based gap score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub alt: String,
    pub strong: String,
    pub stable: String,
    pub value: Decimal,
}

/// Detected executable opportunity.
///
/// `prices` are the quoted leg prices: alt/stable, alt/strong, strong/stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitOpportunity {
    pub alt: String,
    pub strong: String,
    pub stable: String,
    pub value: Decimal,
    pub prices: [Decimal; 3],
}

impl ProfitOpportunity {
    pub fn alt_stable_symbol(&self) -> String {
        format!("{}{}", self.alt, self.stable)
    }

    pub fn alt_strong_symbol(&self) -> String {
        format!("{}{}", self.alt, self.strong)
    }

    pub fn strong_stable_symbol(&self) -> String {
        format!("{}{}", self.strong, self.stable)
    }
}

/// How an opportunity ended up once the executor was done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// All three legs filled.
    Completed,
    /// Leg 1 was canceled before anything was bought.
    Aborted,
}

/// Summary of one executed (or aborted) opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub id: Uuid,
    pub opportunity: ProfitOpportunity,
    pub outcome: TradeOutcome,
    pub order_ids: Vec<u64>,
    pub spent_quote: Decimal,
    pub received_quote: Decimal,
    /// `(received - spent) / spent`; `None` when aborted.
    pub realized_profit: Option<Decimal>,
    pub finished_at: DateTime<Utc>,
}

impl Record for TradeReport {
    const NAMESPACE: &'static str = "TradeReport";

    fn pk(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_universe_equality_ignores_order() {
        let universe = AssetUniverse::new(vec!["SOL".into(), "XRP".into()], 1);
        assert!(universe.same_assets(&["XRP".to_string(), "SOL".to_string()]));
        assert!(!universe.same_assets(&["XRP".to_string(), "ADA".to_string()]));
        assert!(!universe.same_assets(&["XRP".to_string()]));
    }

    #[test]
    fn test_record_keys_are_namespaced() {
        assert_eq!(
            AssetUniverse::key(AssetUniverse::PK),
            "tria_bot:TopVolumeAssets:TOP_VOLUME_ASSETS"
        );
        assert_eq!(Depth::key("SOLUSDT"), "tria_bot:Depth:SOLUSDT");
    }

    #[test]
    fn test_ticker_from_stream_payload() {
        let raw = r#"{"e":"24hrTicker","E":1672515782136,"s":"SOLUSDT","p":"0.0015","P":"1.250","c":"0.0025"}"#;
        let ticker: Ticker = serde_json::from_str(raw).unwrap();
        assert_eq!(ticker.symbol, "SOLUSDT");
        assert_eq!(ticker.price_change_percent, dec!(1.250));
        assert_eq!(ticker.event_time, 1672515782136);
    }

    #[test]
    fn test_depth_levels() {
        let depth = Depth {
            symbol: "SOLUSDT".into(),
            bids: vec![PriceLevel(dec!(10.0), dec!(100))],
            asks: vec![PriceLevel(dec!(10.1), dec!(5))],
            event_time: 0,
        };
        assert_eq!(depth.bid(0), Some(dec!(10.0)));
        assert_eq!(depth.ask(0), Some(dec!(10.1)));
        assert_eq!(depth.ask(1), None);
    }

    #[test]
    fn test_opportunity_symbols() {
        let opportunity = ProfitOpportunity {
            alt: "SOL".into(),
            strong: "BTC".into(),
            stable: "USDT".into(),
            value: dec!(0.5),
            prices: [dec!(1), dec!(2), dec!(3)],
        };
        assert_eq!(opportunity.alt_stable_symbol(), "SOLUSDT");
        assert_eq!(opportunity.alt_strong_symbol(), "SOLBTC");
        assert_eq!(opportunity.strong_stable_symbol(), "BTCUSDT");
    }
}
