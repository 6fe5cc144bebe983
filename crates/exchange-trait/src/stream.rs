use async_trait::async_trait;
use common::types::StreamKind;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Raw text frames of one market data stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

/// `{code, msg}` error body the exchange sends over REST and WebSocket alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub msg: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The stream sent an error object instead of market data.
    #[error("Stream error payload {code}: {msg}")]
    Payload { code: i64, msg: String },

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Stream transport error: {0}")]
    Transport(String),
}

impl From<ErrorBody> for StreamError {
    fn from(body: ErrorBody) -> Self {
        StreamError::Payload {
            code: body.code,
            msg: body.msg,
        }
    }
}

#[async_trait]
pub trait MarketStream: Send + Sync {
    /// Opens the `kind` stream of one symbol. The stream ends when the connection closes.
    async fn subscribe(&self, symbol: &str, kind: StreamKind) -> Result<FrameStream, StreamError>;
}
