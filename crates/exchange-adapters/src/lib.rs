//! Binance implementations of the exchange seams.

pub mod binance;
pub mod composite;
pub mod websocket;

pub use binance::{BinanceClient, BinanceCredentials};
pub use composite::CompositeClient;
pub use websocket::BinanceMarketStream;
