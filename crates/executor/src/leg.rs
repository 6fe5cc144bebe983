//! A single leg: one limit order driven to FILLED or CANCELED.

use crate::error::ExecutionError;
use common::types::{AssetBalance, Order, OrderRequest};
use config::ExecutorConfig;
use exchange_trait::retry::CODE_UNKNOWN_ORDER;
use exchange_trait::ExchangeClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct LegTimings {
    /// Wait budget per leg; the buy leg gets the shortest.
    pub max_wait: [Duration; 3],
    pub order_poll: Duration,
    pub balance_poll: Duration,
    pub cancel_confirm: Duration,
}

impl LegTimings {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_wait: [
                config.leg_max_wait(0),
                config.leg_max_wait(1),
                config.leg_max_wait(2),
            ],
            order_poll: config.order_poll(),
            balance_poll: config.balance_poll(),
            cancel_confirm: config.cancel_confirm(),
        }
    }
}

/// Final state of a placed order.
#[derive(Debug, Clone, PartialEq)]
pub enum LegState {
    Filled(Order),
    /// Canceled, possibly after a partial fill.
    Canceled(Order),
}

impl LegState {
    pub fn order(&self) -> &Order {
        match self {
            LegState::Filled(order) | LegState::Canceled(order) => order,
        }
    }
}

/// What one leg traded across all of its orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegFill {
    pub order_ids: Vec<u64>,
    /// Base asset quantity executed.
    pub executed: Decimal,
    /// Quote asset quantity spent or received.
    pub quote: Decimal,
}

impl LegFill {
    pub fn record(&mut self, order: &Order, quote: Decimal) {
        self.order_ids.push(order.order_id);
        self.executed += order.executed_qty.0;
        self.quote += quote;
    }
}

pub struct LegRunner {
    exchange: Arc<dyn ExchangeClient>,
    timings: LegTimings,
}

impl LegRunner {
    pub fn new(exchange: Arc<dyn ExchangeClient>, timings: LegTimings) -> Self {
        Self { exchange, timings }
    }

    pub fn max_wait(&self, leg: usize) -> Duration {
        self.timings.max_wait[leg.min(2)]
    }

    pub async fn place(&self, request: &OrderRequest) -> Result<Order, ExecutionError> {
        let order = self.exchange.place_limit_order(request).await?;
        log::info!(
            "Placed {} {} {} @ {}: order {} {}",
            request.side,
            request.quantity.0,
            request.symbol,
            request.price.0,
            order.order_id,
            order.status
        );
        Ok(order)
    }

    /// Polls the order until it is final. Past `max_wait` it is canceled and the
    /// cancel confirmed; an order that filled in the meantime still comes back as
    /// [`LegState::Filled`].
    pub async fn await_final(
        &self,
        mut order: Order,
        max_wait: Duration,
    ) -> Result<LegState, ExecutionError> {
        let deadline = Instant::now() + max_wait;
        loop {
            if order.status.is_filled() {
                return Ok(LegState::Filled(order));
            }
            if order.status.is_canceled() {
                return Ok(LegState::Canceled(order));
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.timings.order_poll).await;
            order = self.exchange.get_order(&order.symbol, order.order_id).await?;
        }

        log::warn!(
            "Order {} on {} still {} after {:?}, canceling",
            order.order_id,
            order.symbol,
            order.status,
            max_wait
        );
        self.cancel(&order.symbol, order.order_id).await
    }

    async fn cancel(&self, symbol: &str, order_id: u64) -> Result<LegState, ExecutionError> {
        match self.exchange.cancel_order(symbol, order_id).await {
            Ok(_) => {}
            // The exchange no longer knows the order as open: it most likely filled.
            Err(e) if e.code() == Some(CODE_UNKNOWN_ORDER) => {
                log::info!("Cancel of order {} on {} rejected: {}", order_id, symbol, e);
            }
            Err(e) => return Err(e.into()),
        }

        let deadline = Instant::now() + self.timings.cancel_confirm;
        loop {
            let order = self.exchange.get_order(symbol, order_id).await?;
            if order.status.is_filled() {
                log::info!("Order {} on {} filled before the cancel", order_id, symbol);
                return Ok(LegState::Filled(order));
            }
            if order.status.is_canceled() {
                return Ok(LegState::Canceled(order));
            }
            if Instant::now() >= deadline {
                return Err(ExecutionError::CancelUnconfirmed {
                    symbol: symbol.to_string(),
                    order_id,
                });
            }
            tokio::time::sleep(self.timings.order_poll).await;
        }
    }

    /// Waits out an order whose cancel was never confirmed, re-sending the cancel every
    /// `cancel_confirm`. Only returns once the exchange reports a final status.
    pub async fn await_settled(
        &self,
        symbol: &str,
        order_id: u64,
    ) -> Result<LegState, ExecutionError> {
        let mut resend = Instant::now() + self.timings.cancel_confirm;
        loop {
            tokio::time::sleep(self.timings.order_poll).await;
            let order = self.exchange.get_order(symbol, order_id).await?;
            if order.status.is_filled() {
                return Ok(LegState::Filled(order));
            }
            if order.status.is_canceled() {
                return Ok(LegState::Canceled(order));
            }
            if Instant::now() >= resend {
                log::warn!(
                    "Order {} on {} still {}, re-sending cancel",
                    order_id,
                    symbol,
                    order.status
                );
                if let Err(e) = self.exchange.cancel_order(symbol, order_id).await {
                    log::warn!("Cancel of order {} on {} failed: {}", order_id, symbol, e);
                }
                resend = Instant::now() + self.timings.cancel_confirm;
            }
        }
    }

    /// Polls the balance until nothing of `asset` is locked in open orders.
    pub async fn wait_unlocked(&self, asset: &str) -> Result<AssetBalance, ExecutionError> {
        loop {
            let balance = self.exchange.get_asset_balance(asset).await?;
            if balance.locked.is_zero() {
                return Ok(balance);
            }
            log::debug!("{} {} still locked", balance.locked, asset);
            tokio::time::sleep(self.timings.balance_poll).await;
        }
    }

    /// Cumulative quote quantity of a final order, re-querying it when the placement
    /// response did not carry one.
    pub async fn quote_qty(&self, order: &Order) -> Result<Decimal, ExecutionError> {
        if let Some(quote) = order.cummulative_quote_qty {
            return Ok(quote);
        }
        let order = self.exchange.get_order(&order.symbol, order.order_id).await?;
        Ok(order
            .cummulative_quote_qty
            .unwrap_or(order.executed_qty.0 * order.price.0))
    }

    /// Like [`LegRunner::quote_qty`], but zero for an order that never traded.
    pub async fn settled_quote(&self, order: &Order) -> Result<Decimal, ExecutionError> {
        if order.executed_qty.0.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.quote_qty(order).await
    }
}
