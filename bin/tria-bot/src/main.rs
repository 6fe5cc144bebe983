use anyhow::Result;
use clap::Parser;
use config::{BotConfig, StreamShard};
use coordination::{run_forever, stop_channel, MemoryBus, MemoryStore, Repositories, ServiceExit};
use detector::{GapScorer, ProfitService};
use exchange_adapters::{BinanceClient, BinanceCredentials, BinanceMarketStream, CompositeClient};
use exchange_trait::{ExchangeClient, MarketStream, RetryPolicy, RetryingExchange, VolumeSource};
use executor::ArbitrageExecutor;
use market_data_ingestor::MarketDataIngestor;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use universe::UniverseTracker;

/// Command line arguments for tria-bot.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the bot configuration YAML
    #[arg(long, default_value = "config/default.yml")]
    config: String,
    /// Only evaluate triangles flagged by the gap scorer and execute the best of each batch
    #[arg(long)]
    strict: bool,
    /// Ingester shard `<depth|ticker>:<kind>:<page/total>`; replaces the configured shards
    #[arg(long = "ingest")]
    ingest: Vec<StreamShard>,
    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let mut bot_cfg = BotConfig::load(&args.config)?;
    if args.strict {
        bot_cfg.profit.strict = true;
    }
    if !args.ingest.is_empty() {
        bot_cfg.ingestor.streams = args.ingest.clone();
    }
    bot_cfg.validate()?;
    let bot_cfg = Arc::new(bot_cfg);

    let credentials = match bot_cfg.exchange.credentials() {
        Ok((api_key, api_secret)) => Some(BinanceCredentials {
            api_key,
            api_secret,
        }),
        Err(e) => {
            warn!(error = %e, "No API credentials, order placement will fail");
            None
        }
    };
    let retry = &bot_cfg.exchange.retry;
    let exchange: Arc<dyn ExchangeClient> = Arc::new(RetryingExchange::new(
        BinanceClient::new(
            bot_cfg.exchange.rest_url.clone(),
            credentials,
            bot_cfg.exchange.recv_window_ms,
        ),
        RetryPolicy {
            max_retries: retry.max_retries,
            codes: retry.codes.clone(),
            delay: retry.delay(),
        },
    ));
    let volumes: Arc<dyn VolumeSource> =
        Arc::new(CompositeClient::new(bot_cfg.exchange.composite_url.clone()));
    let stream: Arc<dyn MarketStream> =
        Arc::new(BinanceMarketStream::new(bot_cfg.exchange.ws_url.clone()));

    let store = MemoryStore::new();
    let repos = Repositories::in_memory(&store);
    let bus = MemoryBus::default();
    let restart_delay = bot_cfg.store.restart_delay();
    let (shutdown_handle, shutdown) = stop_channel();

    info!(
        stable = %bot_cfg.assets.stable,
        strong = ?bot_cfg.assets.strong,
        strict = bot_cfg.profit.strict,
        shards = bot_cfg.ingestor.streams.len(),
        "Starting tria-bot"
    );

    let mut services = tokio::task::JoinSet::new();

    let tracker = Arc::new(UniverseTracker::new(
        volumes,
        exchange.clone(),
        repos.clone(),
        bus.clone(),
        bot_cfg.assets.clone(),
        bot_cfg.tracker.interval(),
    ));
    services.spawn(run_forever("universe-tracker", shutdown.clone(), restart_delay, move |handle| {
        let tracker = tracker.clone();
        async move { tracker.run(handle.signal()).await }
    }));

    let (repos_c, bus_c, cfg) = (repos.clone(), bus.clone(), bot_cfg.clone());
    services.spawn(run_forever("market-data-ingestor", shutdown.clone(), restart_delay, move |handle| {
        let ingestor = MarketDataIngestor::new(stream.clone(), repos_c.clone(), bus_c.clone(), &cfg);
        async move { ingestor.run(handle).await }
    }));

    let (repos_c, bus_c, cfg) = (repos.clone(), bus.clone(), bot_cfg.clone());
    services.spawn(run_forever("gap-scorer", shutdown.clone(), restart_delay, move |handle| {
        let scorer = GapScorer::new(repos_c.clone(), bus_c.clone(), &cfg);
        async move { scorer.run(handle).await }
    }));

    let (repos_c, bus_c, cfg) = (repos.clone(), bus.clone(), bot_cfg.clone());
    services.spawn(run_forever("profit-calculator", shutdown.clone(), restart_delay, move |handle| {
        let service = ProfitService::new(repos_c.clone(), bus_c.clone(), &cfg);
        async move { service.run(handle).await }
    }));

    let (repos_c, bus_c, cfg) = (repos.clone(), bus.clone(), bot_cfg.clone());
    services.spawn(run_forever("executor", shutdown.clone(), restart_delay, move |handle| {
        let executor = ArbitrageExecutor::new(exchange.clone(), repos_c.clone(), bus_c.clone(), &cfg);
        async move { executor.run(handle).await }
    }));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    shutdown_handle.stop(ServiceExit::Shutdown);

    while let Some(joined) = services.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Service task panicked");
        }
    }
    info!(records = store.len(), "Shutdown complete");
    Ok(())
}
