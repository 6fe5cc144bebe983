//! # Arbitrage Detector Crate
//!
//! Finds triangular opportunities in the stored market data. The gap scorer cheaply
//! pre-filters triples from 24h tickers; the profit service simulates the round trip on
//! top-of-book depth and publishes what clears the configured threshold.

pub mod gap;
pub mod profit;
pub mod service;

pub use gap::{gap_score, GapScorer};
pub use profit::{ProfitCalculator, ProfitError, TriangleBooks, Triple};
pub use service::ProfitService;
