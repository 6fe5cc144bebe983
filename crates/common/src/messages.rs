//! Pub/sub channel names and payload envelopes.

use crate::models::{Gap, ProfitOpportunity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pub/sub channels connecting the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    UniverseChange,
    GapBatch,
    ProfitSingle,
    ProfitBatch,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::UniverseChange => "top-volume-assets-change",
            Channel::GapBatch => "gaps-detected",
            Channel::ProfitSingle => "profit-detected",
            Channel::ProfitBatch => "multi-profit-detected",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const UNIVERSE_CHANGE_EVENT: &str = "top-volume-change";
pub const GAP_EVENT: &str = "gap-detected";
pub const PROFIT_EVENT: &str = "profit-detected";

/// Wire envelope of every published message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub event: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(event: impl Into<String>, data: T) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Payload of the universe-change channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseChange {
    pub old: Vec<String>,
    pub new: Vec<String>,
}

pub type UniverseChangeMessage = Envelope<UniverseChange>;
pub type GapsMessage = Envelope<Vec<Gap>>;
pub type ProfitMessage = Envelope<ProfitOpportunity>;
pub type MultiProfitMessage = Envelope<Vec<ProfitOpportunity>>;
