//! Exchange quantization: step size for quantities, tick size for prices.
//!
//! Both always round *down* to the nearest multiple, so a quantized value is never
//! larger than the input and quantizing twice is a no-op.

use crate::errors::QuantizeError;
use crate::models::SymbolInfo;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Floors `value` to a multiple of `step`.
pub fn apply_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return None;
    }
    let floored = (value / step).floor() * step;
    Some(floored.normalize())
}

/// Renders a decimal positionally, without exponent or trailing zeros (`0.00000475`).
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

#[derive(Debug, Clone, Copy)]
enum SizeKind {
    Step,
    Tick,
}

impl SizeKind {
    fn name(self) -> &'static str {
        match self {
            SizeKind::Step => "step",
            SizeKind::Tick => "tick",
        }
    }
}

impl SymbolInfo {
    pub fn apply_step_size(&self, value: Decimal) -> Result<Decimal, QuantizeError> {
        apply_step(value, self.step_size).ok_or_else(|| QuantizeError::MissingSize {
            symbol: self.symbol.clone(),
            kind: SizeKind::Step.name(),
        })
    }

    pub fn apply_tick_size(&self, value: Decimal) -> Result<Decimal, QuantizeError> {
        apply_step(value, self.tick_size).ok_or_else(|| QuantizeError::MissingSize {
            symbol: self.symbol.clone(),
            kind: SizeKind::Tick.name(),
        })
    }
}

/// Quantization metadata for a set of symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolRules {
    symbols: HashMap<String, SymbolInfo>,
}

impl SymbolRules {
    pub fn new(symbols: impl IntoIterator<Item = SymbolInfo>) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|info| (info.symbol.clone(), info))
                .collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.symbols.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn size(&self, symbol: &str, kind: SizeKind) -> Result<Decimal, QuantizeError> {
        let info = self
            .symbols
            .get(symbol)
            .ok_or_else(|| QuantizeError::UnknownSymbol(symbol.to_string()))?;
        let size = match kind {
            SizeKind::Step => info.step_size,
            SizeKind::Tick => info.tick_size,
        };
        if size <= Decimal::ZERO {
            return Err(QuantizeError::MissingSize {
                symbol: symbol.to_string(),
                kind: kind.name(),
            });
        }
        Ok(size)
    }

    pub fn step_size(&self, symbol: &str) -> Result<Decimal, QuantizeError> {
        self.size(symbol, SizeKind::Step)
    }

    pub fn tick_size(&self, symbol: &str) -> Result<Decimal, QuantizeError> {
        self.size(symbol, SizeKind::Tick)
    }

    pub fn apply_step_size(&self, symbol: &str, value: Decimal) -> Result<Decimal, QuantizeError> {
        let step = self.step_size(symbol)?;
        Ok(apply_step(value, step).unwrap_or(Decimal::ZERO))
    }

    pub fn apply_tick_size(&self, symbol: &str, value: Decimal) -> Result<Decimal, QuantizeError> {
        let tick = self.tick_size(symbol)?;
        Ok(apply_step(value, tick).unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
pub(crate) fn fake_symbol(symbol: &str, step_size: Decimal, tick_size: Decimal) -> SymbolInfo {
    use rust_decimal_macros::dec;
    SymbolInfo {
        symbol: symbol.to_string(),
        base_asset: "FAKE".to_string(),
        quote_asset: "SYMBOL".to_string(),
        status: "TRADING".to_string(),
        is_spot_trading_allowed: true,
        min_price: dec!(0.0007),
        max_price: dec!(2.05467),
        tick_size,
        min_qty: dec!(0.005),
        max_qty: dec!(5.0),
        step_size,
        order_types: vec!["LIMIT".to_string()],
        permissions: vec!["SPOT".to_string()],
    }
}
