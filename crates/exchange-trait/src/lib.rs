//! Seams between the bot and the exchange: trading client, volume ranking and market
//! data streams.

pub mod retry;
pub mod stream;

use async_trait::async_trait;
use common::errors::ExchangeError;
use common::models::SymbolInfo;
use common::types::{AssetBalance, Order, OrderRequest};

pub use retry::{retry_transient, RetryPolicy, RetryingExchange};
pub use stream::{ErrorBody, FrameStream, MarketStream, StreamError};

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Quantization rules for the given symbols. Unknown symbols are left out.
    async fn get_symbol_exchange_info(
        &self,
        symbols: &[String],
    ) -> Result<Vec<SymbolInfo>, ExchangeError>;

    /// Every symbol currently in `TRADING` status.
    async fn get_tradable_symbols(&self) -> Result<Vec<String>, ExchangeError>;

    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError>;

    /// Places a GTC limit order. Price and quantity must already be quantized.
    async fn place_limit_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError>;

    async fn get_asset_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError>;
}

/// Ranks alt assets by traded volume.
#[async_trait]
pub trait VolumeSource: Send + Sync {
    /// Names of the `count` highest volume assets, skipping `excluded`.
    async fn top_volume_assets(
        &self,
        count: usize,
        excluded: &[String],
    ) -> Result<Vec<String>, ExchangeError>;
}
