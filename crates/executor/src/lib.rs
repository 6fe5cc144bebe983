//! Order execution for detected opportunities.
//!
//! [`ArbitrageExecutor`] turns each opportunity into three limit order legs, each one
//! driven by a [`LegRunner`] through place, poll and cancel-on-timeout.

pub mod error;
pub mod executor;
pub mod leg;

pub use error::ExecutionError;
pub use executor::ArbitrageExecutor;
pub use leg::{LegFill, LegRunner, LegState, LegTimings};
