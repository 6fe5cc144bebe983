use thiserror::Error;

/// Errors raised by the keyed record store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The record has not been written yet. Producers are expected to populate it eventually.
    #[error("Record not found: {namespace}:{pk}")]
    NotFound { namespace: String, pk: String },

    /// A stored record could not be (de)serialized.
    #[error("Record codec error: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors raised when applying exchange quantization rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantizeError {
    /// No quantization metadata is known for the symbol.
    #[error("Symbol {0} not found")]
    UnknownSymbol(String),

    /// The symbol has no usable step/tick size (missing or zero).
    #[error("No {kind} size for symbol {symbol}")]
    MissingSize { symbol: String, kind: &'static str },
}

/// Errors surfaced by the exchange trading client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    /// The exchange answered with an error body `{code, msg}`.
    #[error("Exchange API error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// Network or HTTP level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The exchange answered with something we could not decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A whitelisted transient error kept occurring past the retry budget.
    #[error("Max retries ({retries}) reached, last error: {last}")]
    RetriesExhausted {
        retries: u32,
        last: Box<ExchangeError>,
    },
}

impl ExchangeError {
    /// The exchange error code, looking through an exhausted retry wrapper.
    pub fn code(&self) -> Option<i64> {
        match self {
            ExchangeError::Api { code, .. } => Some(*code),
            ExchangeError::RetriesExhausted { last, .. } => last.code(),
            _ => None,
        }
    }
}
