//! # Tria Bot Common Crate
//!
//! This crate provides the records, error definitions, quantization rules and
//! symbol helpers shared across the `tria-bot` workspace.

/// Module for common error types.
pub mod errors;

/// Pub/sub channels and message envelopes.
pub mod messages;

/// Records persisted in the keyed store.
pub mod models;

/// Step/tick size quantization.
pub mod quantize;

/// Symbol combinations and sharding.
pub mod symbols;

/// Repository traits.
pub mod traits;

/// Module for common data structures and types.
pub mod types;

// Re-export key items for easier access.
pub use errors::{ExchangeError, QuantizeError, StoreError};
pub use messages::{Channel, Envelope, UniverseChange};
pub use models::{
    AssetUniverse, Depth, Gap, PriceLevel, ProfitOpportunity, Record, Singleton, SymbolInfo,
    Ticker, TradeOutcome, TradeReport, ValidSymbols,
};
pub use quantize::SymbolRules;
pub use symbols::{PartitionSpec, SymbolKind};
pub use traits::{Repository, SingletonRepository};
pub use types::{
    AssetBalance, Order, OrderRequest, OrderSide, OrderStatus, Price, Quantity,
    StreamKind,
};
