//! In-place retries for a narrow whitelist of transient exchange errors.

use crate::ExchangeClient;
use async_trait::async_trait;
use common::errors::ExchangeError;
use common::models::SymbolInfo;
use common::types::{AssetBalance, Order, OrderRequest};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timestamp outside of the receive window.
pub const CODE_TIMESTAMP_SKEW: i64 = -1021;
/// Cancel of an order the exchange no longer knows, usually because it just filled.
pub const CODE_UNKNOWN_ORDER: i64 = -2011;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub codes: Vec<i64>,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            codes: vec![CODE_TIMESTAMP_SKEW, CODE_UNKNOWN_ORDER],
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn is_transient(&self, err: &ExchangeError) -> bool {
        matches!(err, ExchangeError::Api { code, .. } if self.codes.contains(code))
    }
}

/// Runs `op`, retrying it up to `policy.max_retries` times while it fails with a
/// whitelisted code. Other errors propagate immediately; a whitelisted error that
/// outlives the budget comes back as [`ExchangeError::RetriesExhausted`].
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    call: &str,
    mut op: F,
) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.is_transient(&e) => {
                if attempt >= policy.max_retries {
                    return Err(ExchangeError::RetriesExhausted {
                        retries: policy.max_retries,
                        last: Box::new(e),
                    });
                }
                attempt += 1;
                warn!(call, attempt, error = %e, "Transient exchange error, retrying");
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exchange client decorator applying [`retry_transient`] to every call.
pub struct RetryingExchange<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: ExchangeClient> RetryingExchange<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for RetryingExchange<C> {
    async fn get_symbol_exchange_info(
        &self,
        symbols: &[String],
    ) -> Result<Vec<SymbolInfo>, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "get_symbol_exchange_info", move || {
            inner.get_symbol_exchange_info(symbols)
        })
        .await
    }

    async fn get_tradable_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "get_tradable_symbols", move || {
            inner.get_tradable_symbols()
        })
        .await
    }

    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "get_order", move || {
            inner.get_order(symbol, order_id)
        })
        .await
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "cancel_order", move || {
            inner.cancel_order(symbol, order_id)
        })
        .await
    }

    async fn place_limit_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "place_limit_order", move || {
            inner.place_limit_order(request)
        })
        .await
    }

    async fn get_asset_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError> {
        let inner = &self.inner;
        retry_transient(&self.policy, "get_asset_balance", move || {
            inner.get_asset_balance(asset)
        })
        .await
    }
}
