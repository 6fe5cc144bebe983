use common::errors::{ExchangeError, QuantizeError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Quantize(#[from] QuantizeError),

    /// The quantity left to trade floors to zero at the symbol's step size.
    #[error("Quantity for {symbol} quantizes to zero")]
    ZeroQuantity { symbol: String },

    /// The exchange accepted the cancel but never reported the order as final.
    #[error("Cancel of order {order_id} on {symbol} was not confirmed")]
    CancelUnconfirmed { symbol: String, order_id: u64 },
}
