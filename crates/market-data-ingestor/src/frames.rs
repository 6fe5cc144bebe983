//! Decoding of raw stream frames into store records.

use common::models::{Depth, PriceLevel, Ticker};
use exchange_trait::{ErrorBody, StreamError};
use serde::Deserialize;

/// `depth5` partial book frame. Carries neither symbol nor event time.
#[derive(Deserialize, Debug)]
struct PartialBook {
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

/// An error object sent in place of market data.
fn error_payload(frame: &str) -> Option<StreamError> {
    serde_json::from_str::<ErrorBody>(frame)
        .ok()
        .map(StreamError::from)
}

pub fn parse_depth(symbol: &str, frame: &str, received_ms: i64) -> Result<Depth, StreamError> {
    if let Some(err) = error_payload(frame) {
        return Err(err);
    }
    let book: PartialBook =
        serde_json::from_str(frame).map_err(|e| StreamError::Malformed(e.to_string()))?;
    Ok(Depth {
        symbol: symbol.to_string(),
        bids: book.bids,
        asks: book.asks,
        event_time: received_ms,
    })
}

pub fn parse_ticker(frame: &str) -> Result<Ticker, StreamError> {
    if let Some(err) = error_payload(frame) {
        return Err(err);
    }
    serde_json::from_str(frame).map_err(|e| StreamError::Malformed(e.to_string()))
}
