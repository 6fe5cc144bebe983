//! Market data ingestion: per-symbol depth and ticker streams written to the store.

pub mod frames;
pub mod ingestor;
pub mod shard;

pub use frames::{parse_depth, parse_ticker};
pub use ingestor::MarketDataIngestor;
pub use shard::shard_symbols;
