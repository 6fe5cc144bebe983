use crate::profit::{ProfitCalculator, TriangleBooks, Triple};
use anyhow::Result;
use common::errors::StoreError;
use common::messages::{Channel, PROFIT_EVENT};
use common::models::{AssetUniverse, Gap, ProfitOpportunity};
use common::quantize::SymbolRules;
use common::traits::SingletonRepository;
use config::{AssetsConfig, BotConfig};
use coordination::{
    BusError, MemoryBus, Repositories, ServiceExit, StopHandle, StopSignal, Subscription,
    UniverseGuard, UniverseListener,
};
use rust_decimal::Decimal;
use std::time::Duration;

/// Evaluates triangles against the stored books and publishes the profitable ones.
///
/// Continuous mode sweeps every alt × strong triple each interval and publishes
/// opportunities one by one. Strict mode only evaluates the triples of each gap batch
/// and publishes what qualifies as one batch.
pub struct ProfitService {
    repos: Repositories,
    bus: MemoryBus,
    assets: AssetsConfig,
    calculator: ProfitCalculator,
    min_detect: Decimal,
    strict: bool,
    interval: Duration,
    wait_backoff: Duration,
}

impl ProfitService {
    pub fn new(repos: Repositories, bus: MemoryBus, config: &BotConfig) -> Self {
        Self {
            repos,
            bus,
            assets: config.assets.clone(),
            calculator: ProfitCalculator::from_config(config),
            min_detect: config.profit.min_detect,
            strict: config.profit.strict,
            interval: config.profit.interval(),
            wait_backoff: config.store.wait_backoff(),
        }
    }

    /// Quotes one triple against the current books. `None` when a book is missing or
    /// cannot be quoted.
    pub async fn evaluate(
        &self,
        triple: &Triple,
        rules: &SymbolRules,
    ) -> Result<Option<ProfitOpportunity>, StoreError> {
        let depths = &self.repos.depths;
        let Some(alt_stable) = depths.find(&triple.alt_stable()).await? else {
            return Ok(None);
        };
        let Some(alt_strong) = depths.find(&triple.alt_strong()).await? else {
            return Ok(None);
        };
        let Some(strong_stable) = depths.find(&triple.strong_stable()).await? else {
            return Ok(None);
        };

        let books = TriangleBooks {
            alt_stable: &alt_stable,
            alt_strong: &alt_strong,
            strong_stable: &strong_stable,
        };
        match self.calculator.quote(triple, books, rules) {
            Ok(opportunity) => Ok(Some(opportunity)),
            Err(e) => {
                log::debug!("Skipping {:?}: {}", triple, e);
                Ok(None)
            }
        }
    }

    fn qualifies(&self, opportunity: &ProfitOpportunity) -> bool {
        opportunity.value > self.min_detect
    }

    pub async fn run(&self, stop: StopHandle) -> Result<ServiceExit> {
        let _listener = UniverseListener::spawn(&self.bus, stop.clone());
        let signal = stop.signal();
        let gaps = self
            .strict
            .then(|| self.bus.subscribe(&[Channel::GapBatch]));

        let (guard, universe) = tokio::select! {
            acquired = UniverseGuard::acquire(self.repos.universe.clone(), self.wait_backoff) => acquired?,
            reason = signal.stopped() => return Ok(reason),
        };
        let valid = tokio::select! {
            valid = self.repos.valid_symbols.wait_current(self.wait_backoff) => valid?,
            reason = signal.stopped() => return Ok(reason),
        };
        let rules = self.repos.symbol_rules(&valid).await?;
        log::info!(
            "Profit calculator started for universe v{} ({} alts, {} symbol rules), strict: {}",
            guard.version(),
            universe.assets.len(),
            rules.len(),
            self.strict
        );

        let reason = match gaps {
            Some(gaps) => self.run_strict(&guard, &rules, gaps, &signal).await?,
            None => {
                self.run_continuous(&guard, &universe, &rules, &signal)
                    .await?
            }
        };
        log::info!("Profit calculator stopping: {:?}", reason);
        Ok(reason)
    }

    async fn run_continuous(
        &self,
        guard: &UniverseGuard,
        universe: &AssetUniverse,
        rules: &SymbolRules,
        signal: &StopSignal,
    ) -> Result<ServiceExit> {
        loop {
            if let Some(reason) = guard.should_stop(signal).await? {
                return Ok(reason);
            }

            for alt in &universe.assets {
                for strong in &self.assets.strong {
                    let triple = Triple::new(alt, strong, &self.assets.stable);
                    let Some(opportunity) = self.evaluate(&triple, rules).await? else {
                        continue;
                    };
                    if self.qualifies(&opportunity) {
                        self.bus
                            .publish(Channel::ProfitSingle, PROFIT_EVENT, &opportunity)?;
                        log::info!(
                            "Profit {} on {}/{}/{} at {:?}",
                            opportunity.value,
                            opportunity.alt,
                            opportunity.strong,
                            opportunity.stable,
                            opportunity.prices
                        );
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                reason = signal.stopped() => return Ok(reason),
            }
        }
    }

    async fn run_strict(
        &self,
        guard: &UniverseGuard,
        rules: &SymbolRules,
        mut gaps: Subscription,
        signal: &StopSignal,
    ) -> Result<ServiceExit> {
        loop {
            let received = tokio::select! {
                received = gaps.recv_envelope::<Vec<Gap>>() => received,
                reason = signal.stopped() => return Ok(reason),
            };
            let batch = match received {
                Ok((_, envelope)) => envelope.data,
                Err(BusError::Codec(e)) => {
                    log::warn!("Dropping undecodable gap batch: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(reason) = guard.should_stop(signal).await? {
                return Ok(reason);
            }

            let mut found = Vec::new();
            for gap in &batch {
                if let Some(opportunity) = self.evaluate(&Triple::from(gap), rules).await? {
                    if self.qualifies(&opportunity) {
                        found.push(opportunity);
                    }
                }
            }
            log::debug!("{} of {} gaps are profitable", found.len(), batch.len());
            if !found.is_empty() {
                self.bus
                    .publish(Channel::ProfitBatch, PROFIT_EVENT, &found)?;
                log::info!("Published {} profit opportunities", found.len());
            }
        }
    }
}
