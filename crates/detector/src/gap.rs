//! Ticker based pre-filter: flags triples whose alt moved very differently against the
//! strong asset than against the stable one.

use anyhow::Result;
use common::errors::StoreError;
use common::messages::{Channel, GAP_EVENT};
use common::models::{Gap, Ticker};
use common::symbols::symbol;
use config::{AssetsConfig, BotConfig};
use coordination::{MemoryBus, Repositories, ServiceExit, StopHandle, UniverseGuard, UniverseListener};
use rust_decimal::Decimal;
use std::time::Duration;

/// `pcp(alt/strong) - pcp(alt/stable)`, to two decimals.
pub fn gap_score(alt_stable: &Ticker, alt_strong: &Ticker) -> Decimal {
    (alt_strong.price_change_percent - alt_stable.price_change_percent).round_dp(2)
}

pub struct GapScorer {
    repos: Repositories,
    bus: MemoryBus,
    assets: AssetsConfig,
    min: Decimal,
    interval: Duration,
    wait_backoff: Duration,
}

impl GapScorer {
    pub fn new(repos: Repositories, bus: MemoryBus, config: &BotConfig) -> Self {
        Self {
            repos,
            bus,
            assets: config.assets.clone(),
            min: config.gap.min,
            interval: config.gap.interval(),
            wait_backoff: config.store.wait_backoff(),
        }
    }

    /// Scores every alt × strong triple. Triples with a missing ticker are skipped.
    pub async fn evaluate(&self, alts: &[String]) -> Result<Vec<Gap>, StoreError> {
        let stable = &self.assets.stable;
        let mut gaps = Vec::new();
        for alt in alts {
            let Some(stable_ticker) = self.repos.tickers.find(&symbol(alt, stable)).await? else {
                log::debug!("No ticker for {}{}, skipping {}", alt, stable, alt);
                continue;
            };
            for strong in &self.assets.strong {
                let Some(strong_ticker) = self.repos.tickers.find(&symbol(alt, strong)).await? else {
                    log::debug!("No ticker for {}{}", alt, strong);
                    continue;
                };
                let value = gap_score(&stable_ticker, &strong_ticker);
                if value >= self.min {
                    gaps.push(Gap {
                        alt: alt.clone(),
                        strong: strong.clone(),
                        stable: stable.clone(),
                        value,
                    });
                }
            }
        }
        Ok(gaps)
    }

    pub async fn run(&self, stop: StopHandle) -> Result<ServiceExit> {
        let _listener = UniverseListener::spawn(&self.bus, stop.clone());
        let signal = stop.signal();

        let (guard, universe) = tokio::select! {
            acquired = UniverseGuard::acquire(self.repos.universe.clone(), self.wait_backoff) => acquired?,
            reason = signal.stopped() => return Ok(reason),
        };
        log::info!(
            "Gap scorer started for universe v{} ({} alts), min gap {}",
            guard.version(),
            universe.assets.len(),
            self.min
        );

        loop {
            if let Some(reason) = guard.should_stop(&signal).await? {
                log::info!("Gap scorer stopping: {:?}", reason);
                return Ok(reason);
            }

            let gaps = self.evaluate(&universe.assets).await?;
            if !gaps.is_empty() {
                self.bus.publish(Channel::GapBatch, GAP_EVENT, &gaps)?;
                log::info!("Published {} gaps", gaps.len());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                reason = signal.stopped() => {
                    log::info!("Gap scorer stopping: {:?}", reason);
                    return Ok(reason);
                }
            }
        }
    }
}
