use crate::frames::{parse_depth, parse_ticker};
use crate::shard::shard_symbols;
use anyhow::Result;
use chrono::Utc;
use common::traits::SingletonRepository;
use common::types::StreamKind;
use config::{AssetsConfig, BotConfig, StreamShard};
use coordination::{
    MemoryBus, Repositories, ServiceExit, StopHandle, StopSignal, UniverseGuard, UniverseListener,
};
use exchange_trait::MarketStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Keeps the latest Depth and Ticker record of every owned symbol in the store.
///
/// One task per (shard, symbol). A broken stream only reconnects itself; a universe
/// change stops the whole group so it can be rebuilt from the new ValidSymbols.
pub struct MarketDataIngestor {
    stream: Arc<dyn MarketStream>,
    repos: Repositories,
    bus: MemoryBus,
    assets: AssetsConfig,
    shards: Vec<StreamShard>,
    reconnect_backoff: Duration,
    wait_backoff: Duration,
}

impl MarketDataIngestor {
    pub fn new(
        stream: Arc<dyn MarketStream>,
        repos: Repositories,
        bus: MemoryBus,
        config: &BotConfig,
    ) -> Self {
        Self {
            stream,
            repos,
            bus,
            assets: config.assets.clone(),
            shards: config.ingestor.streams.clone(),
            reconnect_backoff: config.ingestor.reconnect_backoff(),
            wait_backoff: config.store.wait_backoff(),
        }
    }

    pub async fn run(&self, stop: StopHandle) -> Result<ServiceExit> {
        let _listener = UniverseListener::spawn(&self.bus, stop.clone());
        let signal = stop.signal();

        let (guard, universe) = tokio::select! {
            acquired = UniverseGuard::acquire(self.repos.universe.clone(), self.wait_backoff) => acquired?,
            reason = signal.stopped() => return Ok(reason),
        };
        let valid = tokio::select! {
            valid = self.repos.valid_symbols.wait_current(self.wait_backoff) => valid?,
            reason = signal.stopped() => return Ok(reason),
        };

        // Dropping the set on an error return aborts whatever is still running.
        let mut feeds = JoinSet::new();
        for shard in &self.shards {
            let symbols = shard_symbols(&universe, &valid, &self.assets, shard.kind, shard.partition);
            info!(
                stream = %shard.stream,
                kind = %shard.kind,
                partition = %shard.partition,
                symbols = symbols.len(),
                version = guard.version(),
                "Starting stream shard"
            );
            for symbol in symbols {
                let feed = SymbolFeed {
                    stream: self.stream.clone(),
                    repos: self.repos.clone(),
                    symbol,
                    kind: shard.stream,
                    backoff: self.reconnect_backoff,
                };
                feeds.spawn(feed.run(signal.clone()));
            }
        }
        if feeds.is_empty() {
            warn!("No symbols to ingest for the current universe");
        }

        let reason = loop {
            tokio::select! {
                reason = signal.stopped() => break reason,
                _ = tokio::time::sleep(self.wait_backoff) => {
                    if let Some(reason) = guard.should_stop(&signal).await? {
                        stop.stop(reason);
                        break reason;
                    }
                }
            }
        };

        info!(reason = ?reason, feeds = feeds.len(), "Stopping market data ingestor");
        while let Some(joined) = feeds.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Symbol feed task failed");
            }
        }
        Ok(reason)
    }
}

struct SymbolFeed {
    stream: Arc<dyn MarketStream>,
    repos: Repositories,
    symbol: String,
    kind: StreamKind,
    backoff: Duration,
}

impl SymbolFeed {
    /// Consumes the stream until stopped, reconnecting after `backoff` whenever it
    /// errors or closes.
    async fn run(self, stop: StopSignal) {
        loop {
            if stop.is_stopped() {
                return;
            }
            let consumed = tokio::select! {
                consumed = self.consume() => consumed,
                _ = stop.stopped() => return,
            };
            match consumed {
                Ok(()) => debug!(symbol = %self.symbol, stream = %self.kind, "Stream closed, reconnecting"),
                Err(e) => warn!(
                    symbol = %self.symbol,
                    stream = %self.kind,
                    error = %e,
                    "Stream failed, reconnecting"
                ),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = stop.stopped() => return,
            }
        }
    }

    async fn consume(&self) -> Result<()> {
        let mut frames = self.stream.subscribe(&self.symbol, self.kind).await?;
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            match self.kind {
                StreamKind::Depth => {
                    let depth = parse_depth(&self.symbol, &frame, Utc::now().timestamp_millis())?;
                    self.repos.depths.save(&depth).await?;
                }
                StreamKind::Ticker => {
                    let ticker = parse_ticker(&frame)?;
                    self.repos.tickers.save(&ticker).await?;
                }
            }
        }
        Ok(())
    }
}
