//! Per-symbol Binance WebSocket market streams.

use async_trait::async_trait;
use common::types::StreamKind;
use exchange_trait::{FrameStream, MarketStream, StreamError};
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BinanceMarketStream {
    ws_url: String,
}

impl BinanceMarketStream {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/<symbol>@depth5@100ms` or `<base>/<symbol>@ticker`.
    pub fn stream_url(&self, symbol: &str, kind: StreamKind) -> String {
        let topic = match kind {
            StreamKind::Depth => "depth5@100ms",
            StreamKind::Ticker => "ticker",
        };
        format!("{}/{}@{}", self.ws_url, symbol.to_lowercase(), topic)
    }
}

fn frame(message: Result<Message, tokio_tungstenite::tungstenite::Error>) -> Option<Result<String, StreamError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => {
            Some(String::from_utf8(bytes).map_err(|e| StreamError::Malformed(e.to_string())))
        }
        // Pings are answered by the socket itself; close ends the stream.
        Ok(_) => None,
        Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
    }
}

#[async_trait]
impl MarketStream for BinanceMarketStream {
    async fn subscribe(&self, symbol: &str, kind: StreamKind) -> Result<FrameStream, StreamError> {
        let url = self.stream_url(symbol, kind);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        debug!(symbol, stream = %kind, url = %url, "Stream connected");

        let frames = socket.filter_map(|message| async move { frame(message) });
        Ok(Box::pin(frames))
    }
}
