//! Leg state machine and consumer loop tests against a scripted exchange.

use async_trait::async_trait;
use common::errors::ExchangeError;
use common::messages::{Channel, PROFIT_EVENT};
use common::models::{
    AssetUniverse, Depth, PriceLevel, ProfitOpportunity, SymbolInfo, TradeOutcome, ValidSymbols,
};
use common::quantize::SymbolRules;
use common::types::{AssetBalance, Order, OrderRequest, OrderSide, OrderStatus, Price, Quantity};
use config::BotConfig;
use coordination::{stop_channel, MemoryBus, MemoryStore, Repositories, ServiceExit};
use executor::{ArbitrageExecutor, ExecutionError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the exchange treats the next order placed on a symbol.
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Filled on placement.
    Fill,
    /// Filled on placement, but the response lacks the cumulative quote quantity.
    FillWithoutQuote,
    /// Stays NEW forever; a cancel succeeds.
    Hang,
    /// Stays NEW until canceled; the cancel is rejected as unknown because it just filled.
    FillOnCancel,
    /// Stays NEW forever; a cancel is accepted but only shows up after a number of queries.
    SlowCancel,
}

/// Order queries a [`Plan::SlowCancel`] order keeps reporting NEW after its cancel.
const SLOW_CANCEL_POLLS: usize = 10;

#[derive(Default)]
struct Book {
    orders: HashMap<u64, Order>,
    plans: HashMap<u64, Plan>,
    pending_cancels: HashMap<u64, usize>,
    next_id: u64,
}

/// Exchange double that follows per-symbol plans and records every call.
#[derive(Default)]
struct ScriptedExchange {
    book: Mutex<Book>,
    scripts: Mutex<HashMap<String, VecDeque<Plan>>>,
    placed: Mutex<Vec<OrderRequest>>,
    cancels: Mutex<Vec<u64>>,
    locked_polls: Mutex<usize>,
    /// Balance queries per asset that still report nothing free.
    uncredited: Mutex<HashMap<String, usize>>,
}

impl ScriptedExchange {
    fn script(&self, symbol: &str, plans: &[Plan]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .extend(plans.iter().copied());
    }

    fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    fn cancels(&self) -> usize {
        self.cancels.lock().unwrap().len()
    }

    fn filled(order: &mut Order, with_quote: bool) {
        order.status = OrderStatus::Filled;
        order.executed_qty = order.orig_qty.clone();
        order.cummulative_quote_qty = with_quote.then(|| order.orig_qty.0 * order.price.0);
    }
}

#[async_trait]
impl exchange_trait::ExchangeClient for ScriptedExchange {
    async fn get_symbol_exchange_info(
        &self,
        _symbols: &[String],
    ) -> Result<Vec<SymbolInfo>, ExchangeError> {
        Ok(vec![])
    }

    async fn get_tradable_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        Ok(vec![])
    }

    async fn get_order(&self, _symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        let mut book = self.book.lock().unwrap();
        if let Some(polls) = book.pending_cancels.get_mut(&order_id) {
            *polls -= 1;
            if *polls == 0 {
                book.pending_cancels.remove(&order_id);
                if let Some(order) = book.orders.get_mut(&order_id) {
                    order.status = OrderStatus::Canceled;
                }
            }
        }
        let mut order = book.orders.get(&order_id).cloned().ok_or(ExchangeError::Api {
            code: -2013,
            msg: "Order does not exist.".to_string(),
        })?;
        // Queried fills always carry the quote quantity.
        if order.status.is_filled() && order.cummulative_quote_qty.is_none() {
            order.cummulative_quote_qty = Some(order.executed_qty.0 * order.price.0);
        }
        Ok(order)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        self.cancels.lock().unwrap().push(order_id);
        let mut book = self.book.lock().unwrap();
        let plan = book.plans.get(&order_id).copied();
        let order = book
            .orders
            .get_mut(&order_id)
            .ok_or(ExchangeError::Api {
                code: -2011,
                msg: "Unknown order sent.".to_string(),
            })?;
        match plan {
            Some(Plan::FillOnCancel) => {
                Self::filled(order, true);
                Err(ExchangeError::Api {
                    code: -2011,
                    msg: "Unknown order sent.".to_string(),
                })
            }
            Some(Plan::SlowCancel) => {
                let order = order.clone();
                book.pending_cancels
                    .entry(order_id)
                    .or_insert(SLOW_CANCEL_POLLS);
                Ok(order)
            }
            _ => {
                order.status = OrderStatus::Canceled;
                Ok(order.clone())
            }
        }
    }

    async fn place_limit_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        self.placed.lock().unwrap().push(request.clone());
        let plan = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.symbol)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Plan::Fill);

        let mut book = self.book.lock().unwrap();
        book.next_id += 1;
        let mut order = Order {
            order_id: book.next_id,
            symbol: request.symbol.clone(),
            status: OrderStatus::New,
            side: request.side,
            price: request.price.clone(),
            orig_qty: request.quantity.clone(),
            executed_qty: Quantity(Decimal::ZERO),
            cummulative_quote_qty: None,
        };
        match plan {
            Plan::Fill => Self::filled(&mut order, true),
            Plan::FillWithoutQuote => Self::filled(&mut order, false),
            Plan::Hang | Plan::FillOnCancel | Plan::SlowCancel => {}
        }
        let id = order.order_id;
        book.orders.insert(id, order.clone());
        book.plans.insert(id, plan);
        Ok(order)
    }

    async fn get_asset_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError> {
        let free = match self.uncredited.lock().unwrap().get_mut(asset) {
            Some(polls) if *polls > 0 => {
                *polls -= 1;
                Decimal::ZERO
            }
            _ => dec!(1000000),
        };
        let mut locked_polls = self.locked_polls.lock().unwrap();
        let locked = if *locked_polls > 0 {
            *locked_polls -= 1;
            dec!(1)
        } else {
            Decimal::ZERO
        };
        Ok(AssetBalance {
            asset: asset.to_string(),
            free,
            locked,
        })
    }
}

fn info(symbol: &str, step_size: Decimal, tick_size: Decimal) -> SymbolInfo {
    SymbolInfo {
        symbol: symbol.to_string(),
        base_asset: String::new(),
        quote_asset: String::new(),
        status: "TRADING".to_string(),
        is_spot_trading_allowed: true,
        min_price: tick_size,
        max_price: dec!(100000),
        tick_size,
        min_qty: step_size,
        max_qty: dec!(100000),
        step_size,
        order_types: vec!["LIMIT".to_string()],
        permissions: vec![],
    }
}

fn symbol_infos() -> Vec<SymbolInfo> {
    vec![
        info("SOLUSDT", dec!(0.01), dec!(0.01)),
        info("SOLBTC", dec!(0.01), dec!(0.0001)),
        info("BTCUSDT", dec!(0.0001), dec!(0.01)),
    ]
}

fn rules() -> SymbolRules {
    SymbolRules::new(symbol_infos())
}

fn opportunity(alt: &str, value: Decimal) -> ProfitOpportunity {
    ProfitOpportunity {
        alt: alt.to_string(),
        strong: "BTC".to_string(),
        stable: "USDT".to_string(),
        value,
        prices: [dec!(10.0), dec!(0.5), dec!(21.0)],
    }
}

fn config() -> BotConfig {
    let mut config = BotConfig::default();
    config.exchange.fee = dec!(0.001);
    config.executor.notional = dec!(100);
    config
}

fn new_executor(exchange: Arc<ScriptedExchange>, repos: Repositories, config: &BotConfig) -> ArbitrageExecutor {
    ArbitrageExecutor::new(exchange, repos, MemoryBus::default(), config)
}

#[tokio::test(start_paused = true)]
async fn test_round_trip_completes() {
    let exchange = Arc::new(ScriptedExchange::default());
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    let placed = exchange.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!(
        placed[0],
        OrderRequest {
            symbol: "SOLUSDT".to_string(),
            side: OrderSide::Buy,
            price: Price(dec!(10.0)),
            quantity: Quantity(dec!(10)),
        }
    );
    // 10 SOL less fees, then 4.995 BTC less fees floored to 4.99.
    assert_eq!(placed[1].symbol, "SOLBTC");
    assert_eq!(placed[1].side, OrderSide::Sell);
    assert_eq!(placed[1].quantity, Quantity(dec!(9.99)));
    assert_eq!(placed[2].symbol, "BTCUSDT");
    assert_eq!(placed[2].quantity, Quantity(dec!(4.99)));

    assert_eq!(report.outcome, TradeOutcome::Completed);
    assert_eq!(report.order_ids, vec![1, 2, 3]);
    assert_eq!(report.spent_quote, dec!(100));
    assert_eq!(report.received_quote, dec!(104.79));
    assert_eq!(report.realized_profit, Some(dec!(0.0479)));
    assert_eq!(exchange.cancels(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_buy_timeout_aborts_without_second_leg() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLUSDT", &[Plan::Hang]);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let started = tokio::time::Instant::now();
    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(report.outcome, TradeOutcome::Aborted);
    assert_eq!(report.realized_profit, None);
    assert_eq!(exchange.placed().len(), 1);
    assert_eq!(exchange.cancels(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_rejected_as_unknown_counts_as_filled() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLUSDT", &[Plan::FillOnCancel]);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    assert_eq!(report.outcome, TradeOutcome::Completed);
    assert_eq!(exchange.cancels(), 1);
    assert_eq!(exchange.placed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sell_timeout_resubmits_at_refreshed_ask() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLBTC", &[Plan::Hang, Plan::Fill]);
    let store = MemoryStore::new();
    let repos = Repositories::in_memory(&store);
    repos
        .depths
        .save(&Depth {
            symbol: "SOLBTC".to_string(),
            bids: vec![PriceLevel(dec!(0.47), dec!(10))],
            asks: vec![PriceLevel(dec!(0.48), dec!(10))],
            event_time: 0,
        })
        .await
        .unwrap();
    let executor = new_executor(exchange.clone(), repos, &config());

    let started = tokio::time::Instant::now();
    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    let placed = exchange.placed();
    let sells: Vec<&OrderRequest> = placed.iter().filter(|o| o.symbol == "SOLBTC").collect();
    assert_eq!(sells.len(), 2);
    assert_eq!(sells[0].price, Price(dec!(0.5)));
    assert_eq!(sells[1].price, Price(dec!(0.48)));
    assert_eq!(sells[1].quantity, Quantity(dec!(9.99)));
    assert_eq!(report.outcome, TradeOutcome::Completed);
    assert_eq!(report.order_ids.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_final_sell_timeout_resubmits_at_refreshed_ask() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("BTCUSDT", &[Plan::Hang, Plan::Fill]);
    let store = MemoryStore::new();
    let repos = Repositories::in_memory(&store);
    repos
        .depths
        .save(&Depth {
            symbol: "BTCUSDT".to_string(),
            bids: vec![PriceLevel(dec!(20.8), dec!(10))],
            asks: vec![PriceLevel(dec!(20.9), dec!(10))],
            event_time: 0,
        })
        .await
        .unwrap();
    let executor = new_executor(exchange.clone(), repos, &config());

    let started = tokio::time::Instant::now();
    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(60));
    let sells: Vec<(Decimal, Decimal)> = exchange
        .placed()
        .iter()
        .filter(|o| o.symbol == "BTCUSDT")
        .map(|o| (o.price.0, o.quantity.0))
        .collect();
    assert_eq!(
        sells,
        vec![(dec!(21.0), dec!(4.99)), (dec!(20.9), dec!(4.99))]
    );
    assert_eq!(exchange.cancels(), 1);
    assert_eq!(report.outcome, TradeOutcome::Completed);
    assert_eq!(report.received_quote, dec!(104.291));
}

#[tokio::test(start_paused = true)]
async fn test_sell_waits_out_unconfirmed_cancel() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLBTC", &[Plan::SlowCancel, Plan::Fill]);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    let sells: Vec<OrderRequest> = exchange
        .placed()
        .into_iter()
        .filter(|o| o.symbol == "SOLBTC")
        .collect();
    assert_eq!(sells.len(), 2);
    // No stored depth, so the resubmission keeps the quoted price.
    assert_eq!(sells[1].price, Price(dec!(0.5)));
    assert_eq!(sells[1].quantity, Quantity(dec!(9.99)));
    assert_eq!(exchange.cancels(), 1);
    assert_eq!(report.outcome, TradeOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_buy_with_unconfirmed_cancel_fails() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLUSDT", &[Plan::SlowCancel]);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let err = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::CancelUnconfirmed { order_id: 1, .. }));
    assert_eq!(exchange.placed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sell_waits_for_credited_balance() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange
        .uncredited
        .lock()
        .unwrap()
        .insert("SOL".to_string(), 3);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let started = tokio::time::Instant::now();
    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
    let placed = exchange.placed();
    assert_eq!(placed.len(), 3);
    assert_eq!(placed[1].symbol, "SOLBTC");
    assert_eq!(placed[1].quantity, Quantity(dec!(9.99)));
    assert_eq!(report.outcome, TradeOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_missing_quote_quantity_is_requeried() {
    let exchange = Arc::new(ScriptedExchange::default());
    exchange.script("SOLUSDT", &[Plan::FillWithoutQuote]);
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let report = executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();
    assert_eq!(report.spent_quote, dec!(100));
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_locked_balance() {
    let exchange = Arc::new(ScriptedExchange::default());
    *exchange.locked_polls.lock().unwrap() = 3;
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let started = tokio::time::Instant::now();
    executor
        .execute(&opportunity("SOL", dec!(4.69)), &rules())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_symbol_rules_fail_before_trading() {
    let exchange = Arc::new(ScriptedExchange::default());
    let store = MemoryStore::new();
    let executor = new_executor(exchange.clone(), Repositories::in_memory(&store), &config());

    let err = executor
        .execute(&opportunity("XRP", dec!(4.69)), &rules())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Quantize(_)));
    assert!(exchange.placed().is_empty());
}

async fn seed(repos: &Repositories) {
    repos
        .valid_symbols
        .save(&ValidSymbols {
            symbols: vec![
                "SOLUSDT".to_string(),
                "SOLBTC".to_string(),
                "BTCUSDT".to_string(),
            ],
        })
        .await
        .unwrap();
    repos.symbols.add(&symbol_infos()).await.unwrap();
    repos
        .universe
        .save(&AssetUniverse::new(vec!["SOL".to_string()], 1))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_consumer_skips_stale_alts_and_saves_reports() {
    let exchange = Arc::new(ScriptedExchange::default());
    let store = MemoryStore::new();
    let repos = Repositories::in_memory(&store);
    seed(&repos).await;

    let bus = MemoryBus::default();
    let executor = ArbitrageExecutor::new(exchange.clone(), repos.clone(), bus.clone(), &config());
    let (handle, _signal) = stop_channel();
    let task = tokio::spawn({
        let handle = handle.clone();
        async move { executor.run(handle).await }
    });

    // The consumer subscribes once running; wait for it before publishing.
    while bus.publish(Channel::ProfitSingle, PROFIT_EVENT, &opportunity("ADA", dec!(9))).unwrap() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bus.publish(Channel::ProfitSingle, PROFIT_EVENT, &opportunity("SOL", dec!(4.69)))
        .unwrap();

    while repos.reports.all_pks().await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reports = repos.reports.scan_all().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].opportunity.alt, "SOL");
    assert_eq!(reports[0].outcome, TradeOutcome::Completed);
    assert!(exchange.placed().iter().all(|o| !o.symbol.starts_with("ADA")));

    handle.stop(ServiceExit::Shutdown);
    assert_eq!(task.await.unwrap().unwrap(), ServiceExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_strict_consumer_takes_best_of_batch() {
    let exchange = Arc::new(ScriptedExchange::default());
    let store = MemoryStore::new();
    let repos = Repositories::in_memory(&store);
    seed(&repos).await;

    let mut config = config();
    config.profit.strict = true;
    let bus = MemoryBus::default();
    let executor = ArbitrageExecutor::new(exchange.clone(), repos.clone(), bus.clone(), &config);
    let (handle, _signal) = stop_channel();
    let task = tokio::spawn({
        let handle = handle.clone();
        async move { executor.run(handle).await }
    });

    let mut worse = opportunity("SOL", dec!(0.5));
    worse.prices = [dec!(20.0), dec!(0.25), dec!(42.0)];
    let batch = vec![worse, opportunity("SOL", dec!(4.69))];
    while bus.publish(Channel::ProfitBatch, PROFIT_EVENT, &batch).unwrap() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    while repos.reports.all_pks().await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reports = repos.reports.scan_all().await.unwrap();
    assert_eq!(reports[0].opportunity.value, dec!(4.69));
    assert_eq!(exchange.placed()[0].price, Price(dec!(10.0)));

    handle.stop(ServiceExit::Shutdown);
    assert_eq!(task.await.unwrap().unwrap(), ServiceExit::Shutdown);
}
