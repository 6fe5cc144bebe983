//! In-process pub/sub bus.
//!
//! A single broadcast channel carries every message tagged with its [`Channel`];
//! subscribers only see the channels they asked for. Payloads are the JSON encoded
//! `{event, data}` envelope.

use common::messages::{Channel, Envelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Bus closed")]
    Closed,

    #[error("Message codec error: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub channel: Channel,
    pub payload: String,
}

impl BusMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Envelope<T>, BusError> {
        serde_json::from_str(&self.payload).map_err(|e| BusError::Codec(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<BusMessage>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes `{event, data}` on `channel`. Returns how many subscribers received it;
    /// publishing with nobody listening is not an error.
    pub fn publish<T: Serialize>(
        &self,
        channel: Channel,
        event: &str,
        data: &T,
    ) -> Result<usize, BusError> {
        let payload = serde_json::to_string(&Envelope::new(event, data))
            .map_err(|e| BusError::Codec(e.to_string()))?;
        Ok(self.tx.send(BusMessage { channel, payload }).unwrap_or(0))
    }

    /// Subscribes to `channels`. Only messages published after this call are delivered.
    pub fn subscribe(&self, channels: &[Channel]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            channels: channels.to_vec(),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<BusMessage>,
    channels: Vec<Channel>,
}

impl Subscription {
    /// Waits for the next message on one of the subscribed channels.
    pub async fn recv(&mut self) -> Result<BusMessage, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(message) if self.channels.contains(&message.channel) => return Ok(message),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, channels = ?self.channels, "Subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }

    /// Receives and decodes the next message.
    pub async fn recv_envelope<T: DeserializeOwned>(
        &mut self,
    ) -> Result<(Channel, Envelope<T>), BusError> {
        let message = self.recv().await?;
        Ok((message.channel, message.decode()?))
    }

    /// Discards everything already queued for this subscriber and returns how many
    /// messages of the subscribed channels were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if self.channels.contains(&message.channel) {
                        dropped += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => dropped += skipped as usize,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return dropped,
            }
        }
    }
}
