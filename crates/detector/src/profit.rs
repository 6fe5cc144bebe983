//! Top-of-book round trip simulation: stable → alt → strong → stable.

use common::errors::QuantizeError;
use common::models::{Depth, Gap, ProfitOpportunity};
use common::quantize::SymbolRules;
use common::symbols::symbol;
use config::BotConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfitError {
    /// The book has no level at the configured index, or its price is not positive.
    #[error("No usable {side} level {index} for {symbol}")]
    MissingLevel {
        symbol: String,
        side: &'static str,
        index: usize,
    },

    #[error(transparent)]
    Quantize(#[from] QuantizeError),
}

/// One alt/strong/stable triangle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub alt: String,
    pub strong: String,
    pub stable: String,
}

impl Triple {
    pub fn new(alt: &str, strong: &str, stable: &str) -> Self {
        Self {
            alt: alt.to_string(),
            strong: strong.to_string(),
            stable: stable.to_string(),
        }
    }

    pub fn alt_stable(&self) -> String {
        symbol(&self.alt, &self.stable)
    }

    pub fn alt_strong(&self) -> String {
        symbol(&self.alt, &self.strong)
    }

    pub fn strong_stable(&self) -> String {
        symbol(&self.strong, &self.stable)
    }
}

impl From<&Gap> for Triple {
    fn from(gap: &Gap) -> Self {
        Triple::new(&gap.alt, &gap.strong, &gap.stable)
    }
}

/// Books of the three legs, in trading order.
#[derive(Debug, Clone, Copy)]
pub struct TriangleBooks<'a> {
    pub alt_stable: &'a Depth,
    pub alt_strong: &'a Depth,
    pub strong_stable: &'a Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Bid,
    Ask,
}

fn level(depth: &Depth, side: Side, index: usize) -> Result<Decimal, ProfitError> {
    let price = match side {
        Side::Bid => depth.bid(index),
        Side::Ask => depth.ask(index),
    };
    match price {
        Some(price) if price > Decimal::ZERO => Ok(price),
        _ => Err(ProfitError::MissingLevel {
            symbol: depth.symbol.clone(),
            side: match side {
                Side::Bid => "bid",
                Side::Ask => "ask",
            },
            index,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct ProfitCalculator {
    notional: Decimal,
    fee_mult: Decimal,
    level_index: usize,
    percent: bool,
}

impl ProfitCalculator {
    pub fn new(notional: Decimal, fee_mult: Decimal, level_index: usize, percent: bool) -> Self {
        Self {
            notional,
            fee_mult,
            level_index,
            percent,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.profit.notional,
            config.exchange.fee_multiplier(),
            config.profit.level_index,
            config.profit.percent,
        )
    }

    /// Simulates the round trip on the given books.
    ///
    /// The alt quantity is floored to the alt/strong step size and the strong quantity
    /// to the strong/stable step size, the quantities the later legs can actually sell.
    /// The result is a percentage rounded to two decimals, or a ratio rounded to four
    /// when percent scaling is off.
    pub fn quote(
        &self,
        triple: &Triple,
        books: TriangleBooks<'_>,
        rules: &SymbolRules,
    ) -> Result<ProfitOpportunity, ProfitError> {
        let alt_price = level(books.alt_stable, Side::Bid, self.level_index)?;
        let alt_strong_price = level(books.alt_strong, Side::Ask, self.level_index)?;
        let strong_price = level(books.strong_stable, Side::Ask, self.level_index)?;

        let alt_qty = rules.apply_step_size(
            &triple.alt_strong(),
            self.notional / alt_price * self.fee_mult,
        )?;
        let strong_qty = rules.apply_step_size(
            &triple.strong_stable(),
            alt_qty * alt_strong_price * self.fee_mult,
        )?;
        let stable_out = strong_qty * strong_price * self.fee_mult;

        let ratio = stable_out / self.notional - Decimal::ONE;
        let value = if self.percent {
            (ratio * dec!(100)).round_dp(2)
        } else {
            ratio.round_dp(4)
        };

        Ok(ProfitOpportunity {
            alt: triple.alt.clone(),
            strong: triple.strong.clone(),
            stable: triple.stable.clone(),
            value,
            prices: [alt_price, alt_strong_price, strong_price],
        })
    }
}
