use crate::error::ExecutionError;
use crate::leg::{LegFill, LegRunner, LegState, LegTimings};
use anyhow::Result;
use chrono::Utc;
use common::messages::Channel;
use common::models::{ProfitOpportunity, TradeOutcome, TradeReport};
use common::quantize::SymbolRules;
use common::traits::SingletonRepository;
use common::types::{OrderRequest, OrderSide, Price, Quantity};
use config::BotConfig;
use coordination::{
    BusError, MemoryBus, Repositories, ServiceExit, StopHandle, Subscription, UniverseGuard,
    UniverseListener,
};
use exchange_trait::ExchangeClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Executes profit opportunities as three sequential limit order legs:
/// buy alt with stable, sell alt for strong, sell strong for stable.
///
/// Only the buy leg may give up. Once alt is held, the sell legs resubmit at the
/// freshest stored ask until everything is sold.
pub struct ArbitrageExecutor {
    legs: LegRunner,
    repos: Repositories,
    bus: MemoryBus,
    notional: Decimal,
    fee_mult: Decimal,
    strict: bool,
    wait_backoff: Duration,
    balance_poll: Duration,
}

impl ArbitrageExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        repos: Repositories,
        bus: MemoryBus,
        config: &BotConfig,
    ) -> Self {
        Self {
            legs: LegRunner::new(exchange, LegTimings::from_config(&config.executor)),
            repos,
            bus,
            notional: config.executor.notional,
            fee_mult: config.exchange.fee_multiplier(),
            strict: config.profit.strict,
            wait_backoff: config.store.wait_backoff(),
            balance_poll: config.executor.balance_poll(),
        }
    }

    pub async fn execute(
        &self,
        opportunity: &ProfitOpportunity,
        rules: &SymbolRules,
    ) -> Result<TradeReport, ExecutionError> {
        log::info!(
            "Executing {}/{}/{} expecting {} at {:?}",
            opportunity.alt,
            opportunity.strong,
            opportunity.stable,
            opportunity.value,
            opportunity.prices
        );

        let bought = self.buy_leg(opportunity, rules).await?;
        if bought.executed.is_zero() {
            log::warn!(
                "Buy of {} canceled without a fill, aborting opportunity",
                opportunity.alt
            );
            return Ok(report(
                opportunity,
                TradeOutcome::Aborted,
                bought.order_ids,
                Decimal::ZERO,
                Decimal::ZERO,
            ));
        }

        let sold_alt = self
            .sell_leg(
                1,
                &opportunity.alt_strong_symbol(),
                &opportunity.alt,
                bought.executed * self.fee_mult,
                opportunity.prices[1],
                rules,
            )
            .await?;
        let sold_strong = self
            .sell_leg(
                2,
                &opportunity.strong_stable_symbol(),
                &opportunity.strong,
                sold_alt.quote * self.fee_mult,
                opportunity.prices[2],
                rules,
            )
            .await?;

        let order_ids = [bought.order_ids, sold_alt.order_ids, sold_strong.order_ids].concat();
        Ok(report(
            opportunity,
            TradeOutcome::Completed,
            order_ids,
            bought.quote,
            sold_strong.quote,
        ))
    }

    async fn buy_leg(
        &self,
        opportunity: &ProfitOpportunity,
        rules: &SymbolRules,
    ) -> Result<LegFill, ExecutionError> {
        let symbol = opportunity.alt_stable_symbol();
        self.legs.wait_unlocked(&opportunity.stable).await?;

        let price = rules.apply_tick_size(&symbol, opportunity.prices[0])?;
        if price.is_zero() {
            return Err(ExecutionError::ZeroQuantity { symbol });
        }
        let quantity = rules.apply_step_size(&symbol, self.notional / price)?;
        if quantity.is_zero() {
            return Err(ExecutionError::ZeroQuantity { symbol });
        }

        let order = self
            .legs
            .place(&OrderRequest {
                symbol,
                side: OrderSide::Buy,
                price: Price(price),
                quantity: Quantity(quantity),
            })
            .await?;
        let state = self.legs.await_final(order, self.legs.max_wait(0)).await?;

        let mut fill = LegFill::default();
        let quote = self.legs.settled_quote(state.order()).await?;
        fill.record(state.order(), quote);
        Ok(fill)
    }

    /// Sells `target` of `asset` on `symbol`, capped by the free balance. A timed out
    /// order is resubmitted for the unfilled rest at the freshest stored ask. Never gives
    /// up on the held asset: an unconfirmed cancel is waited out and a balance that is not
    /// credited yet is polled for.
    async fn sell_leg(
        &self,
        leg: usize,
        symbol: &str,
        asset: &str,
        target: Decimal,
        price: Decimal,
        rules: &SymbolRules,
    ) -> Result<LegFill, ExecutionError> {
        let mut fill = LegFill::default();
        let mut price = price;
        loop {
            let wanted = rules.apply_step_size(symbol, target - fill.executed)?;
            if wanted.is_zero() {
                if fill.executed < target {
                    log::warn!(
                        "Leg {} left {} {} unsold below step size",
                        leg + 1,
                        target - fill.executed,
                        asset
                    );
                }
                return Ok(fill);
            }
            let balance = self.legs.wait_unlocked(asset).await?;
            let quantity = rules.apply_step_size(symbol, wanted.min(balance.free))?;
            if quantity.is_zero() {
                log::warn!(
                    "Leg {} waiting for {} {} to be credited, {} free",
                    leg + 1,
                    wanted,
                    asset,
                    balance.free
                );
                tokio::time::sleep(self.balance_poll).await;
                continue;
            }

            let limit = rules.apply_tick_size(symbol, price)?;
            let order = self
                .legs
                .place(&OrderRequest {
                    symbol: symbol.to_string(),
                    side: OrderSide::Sell,
                    price: Price(limit),
                    quantity: Quantity(quantity),
                })
                .await?;

            let state = match self.legs.await_final(order, self.legs.max_wait(leg)).await {
                Err(ExecutionError::CancelUnconfirmed { symbol, order_id }) => {
                    log::warn!(
                        "Leg {} cancel of order {} on {} unconfirmed, waiting for it to settle",
                        leg + 1,
                        order_id,
                        symbol
                    );
                    self.legs.await_settled(&symbol, order_id).await?
                }
                other => other?,
            };
            match state {
                LegState::Filled(order) => {
                    let quote = self.legs.quote_qty(&order).await?;
                    fill.record(&order, quote);
                    return Ok(fill);
                }
                LegState::Canceled(order) => {
                    let quote = self.legs.settled_quote(&order).await?;
                    fill.record(&order, quote);
                    if let Some(ask) = self.refreshed_ask(symbol).await? {
                        price = ask;
                    }
                    log::warn!(
                        "Leg {} order {} on {} canceled, resubmitting at {}",
                        leg + 1,
                        order.order_id,
                        symbol,
                        price
                    );
                }
            }
        }
    }

    async fn refreshed_ask(&self, symbol: &str) -> Result<Option<Decimal>, ExecutionError> {
        let depth = self.repos.depths.find(symbol).await?;
        Ok(depth.and_then(|depth| depth.ask(0)))
    }

    async fn next_opportunity(
        &self,
        profits: &mut Subscription,
    ) -> Result<Option<ProfitOpportunity>, BusError> {
        let received = if self.strict {
            profits
                .recv_envelope::<Vec<ProfitOpportunity>>()
                .await
                .map(|(_, envelope)| envelope.data.into_iter().max_by(|a, b| a.value.cmp(&b.value)))
        } else {
            profits
                .recv_envelope::<ProfitOpportunity>()
                .await
                .map(|(_, envelope)| Some(envelope.data))
        };
        match received {
            Err(BusError::Codec(e)) => {
                log::warn!("Dropping undecodable opportunity: {}", e);
                Ok(None)
            }
            other => other,
        }
    }

    /// Consumes opportunities one at a time until stopped. Anything published while an
    /// execution was in flight is discarded afterwards.
    pub async fn run(&self, stop: StopHandle) -> Result<ServiceExit> {
        let _listener = UniverseListener::spawn(&self.bus, stop.clone());
        let signal = stop.signal();
        let channel = if self.strict {
            Channel::ProfitBatch
        } else {
            Channel::ProfitSingle
        };
        let mut profits = self.bus.subscribe(&[channel]);

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
            "Executor listening on {} for universe v{}",
            channel,
            guard.version()
        );

        loop {
            let next = tokio::select! {
                next = self.next_opportunity(&mut profits) => next?,
                reason = signal.stopped() => {
                    log::info!("Executor stopping: {:?}", reason);
                    return Ok(reason);
                }
            };
            let Some(opportunity) = next else {
                continue;
            };

            if let Some(reason) = guard.should_stop(&signal).await? {
                log::info!("Executor stopping: {:?}", reason);
                return Ok(reason);
            }
            if !universe.contains(&opportunity.alt) {
                log::warn!("Skipping stale opportunity for {}", opportunity.alt);
                continue;
            }

            let report = match self.execute(&opportunity, &rules).await {
                Ok(report) => report,
                Err(e) => {
                    log::error!(
                        "Execution of {}/{}/{} failed: {}",
                        opportunity.alt,
                        opportunity.strong,
                        opportunity.stable,
                        e
                    );
                    return Err(e.into());
                }
            };
            self.repos.reports.save(&report).await?;
            log::info!(
                "Trade {} {:?}: spent {} received {} realized {:?}",
                report.id,
                report.outcome,
                report.spent_quote,
                report.received_quote,
                report.realized_profit
            );

            let dropped = profits.drain();
            if dropped > 0 {
                log::info!("Discarded {} opportunities published during execution", dropped);
            }
        }
    }
}

/// Realized profit is `(received - spent) / spent` of a completed round trip.
fn report(
    opportunity: &ProfitOpportunity,
    outcome: TradeOutcome,
    order_ids: Vec<u64>,
    spent: Decimal,
    received: Decimal,
) -> TradeReport {
    let realized_profit = match outcome {
        TradeOutcome::Completed if !spent.is_zero() => Some((received - spent) / spent),
        _ => None,
    };
    TradeReport {
        id: Uuid::new_v4(),
        opportunity: opportunity.clone(),
        outcome,
        order_ids,
        spent_quote: spent,
        received_quote: received,
        realized_profit,
        finished_at: Utc::now(),
    }
}
