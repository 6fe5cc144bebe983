//! Asset universe tracker.
//!
//! Polls the top-volume alts and, whenever the set changes, rebuilds every piece of
//! state derived from it (valid symbols, quantization rules) before announcing the change.

use anyhow::Result;
use common::messages::{Channel, UniverseChange, UNIVERSE_CHANGE_EVENT};
use common::models::{AssetUniverse, ValidSymbols};
use common::symbols::all_combos;
use common::traits::SingletonRepository;
use config::AssetsConfig;
use coordination::{MemoryBus, Repositories, ServiceExit, StopSignal};
use exchange_trait::{ExchangeClient, VolumeSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Changed { version: u64, valid_symbols: usize },
}

/// Every alt/strong/stable combination the exchange currently trades.
pub fn valid_symbols(
    alts: &[String],
    strongs: &[String],
    stable: &str,
    tradable: &[String],
) -> Vec<String> {
    let tradable: HashSet<&str> = tradable.iter().map(String::as_str).collect();
    all_combos(alts, strongs, &[stable.to_string()])
        .into_iter()
        .filter(|symbol| tradable.contains(symbol.as_str()))
        .collect()
}

pub struct UniverseTracker {
    volumes: Arc<dyn VolumeSource>,
    exchange: Arc<dyn ExchangeClient>,
    repos: Repositories,
    bus: MemoryBus,
    assets: AssetsConfig,
    interval: Duration,
}

impl UniverseTracker {
    pub fn new(
        volumes: Arc<dyn VolumeSource>,
        exchange: Arc<dyn ExchangeClient>,
        repos: Repositories,
        bus: MemoryBus,
        assets: AssetsConfig,
        interval: Duration,
    ) -> Self {
        Self {
            volumes,
            exchange,
            repos,
            bus,
            assets,
            interval,
        }
    }

    /// Polls once. On a change, symbol rules and valid symbols are stored first, then
    /// the universe itself, then the change is published. A failure anywhere leaves the
    /// stored universe untouched so the next poll sees the change again.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let excluded = self.assets.excluded();
        let assets = self
            .volumes
            .top_volume_assets(self.assets.top_volume_count, &excluded)
            .await?;

        let current = match self.repos.universe.current().await {
            Ok(universe) => Some(universe),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(current) = &current {
            if current.same_assets(&assets) {
                return Ok(PollOutcome::Unchanged);
            }
        }
        let (old, version) = match current {
            Some(current) => (current.assets, current.version + 1),
            None => (Vec::new(), 1),
        };

        let tradable = self.exchange.get_tradable_symbols().await?;
        let symbols = valid_symbols(&assets, &self.assets.strong, &self.assets.stable, &tradable);
        let infos = self.exchange.get_symbol_exchange_info(&symbols).await?;
        if infos.len() < symbols.len() {
            warn!(
                requested = symbols.len(),
                received = infos.len(),
                "Exchange returned rules for fewer symbols than requested"
            );
        }

        self.repos.symbols.add(&infos).await?;
        self.repos
            .valid_symbols
            .save(&ValidSymbols {
                symbols: symbols.clone(),
            })
            .await?;
        self.repos
            .universe
            .save(&AssetUniverse::new(assets.clone(), version))
            .await?;

        let change = UniverseChange { old, new: assets };
        let receivers = self
            .bus
            .publish(Channel::UniverseChange, UNIVERSE_CHANGE_EVENT, &change)?;
        info!(
            version,
            old = ?change.old,
            new = ?change.new,
            valid_symbols = symbols.len(),
            receivers,
            "Asset universe changed"
        );

        Ok(PollOutcome::Changed {
            version,
            valid_symbols: symbols.len(),
        })
    }

    /// Polls every interval until stopped. Poll failures are logged and retried on the
    /// next tick.
    pub async fn run(&self, stop: StopSignal) -> Result<ServiceExit> {
        info!(
            interval_secs = self.interval.as_secs(),
            top = self.assets.top_volume_count,
            "Universe tracker started"
        );
        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Unchanged) => debug!("Asset universe unchanged"),
                Ok(PollOutcome::Changed { .. }) => {}
                Err(e) => warn!(error = %e, "Universe poll failed, retrying next interval"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                reason = stop.stopped() => {
                    info!(reason = ?reason, "Universe tracker stopping");
                    return Ok(reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_symbols_filtered_by_tradable() {
        let alts = strings(&["SOL", "XRP"]);
        let strongs = strings(&["BTC", "ETH"]);
        let tradable = strings(&["SOLBTC", "SOLETH", "XRPBTC", "SOLUSDT", "XRPUSDT", "BTCUSDT", "ETHUSDT", "DOGEBTC"]);

        let symbols = valid_symbols(&alts, &strongs, "USDT", &tradable);
        assert_eq!(
            symbols,
            strings(&["SOLBTC", "XRPBTC", "SOLETH", "SOLUSDT", "XRPUSDT", "BTCUSDT", "ETHUSDT"])
        );
    }

    #[test]
    fn test_valid_symbols_empty_universe() {
        let symbols = valid_symbols(&[], &strings(&["BTC"]), "USDT", &strings(&["BTCUSDT"]));
        assert_eq!(symbols, strings(&["BTCUSDT"]));
    }
}
