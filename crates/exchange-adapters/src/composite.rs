//! Top-volume asset ranking from the exchange's public marketing symbol list.

use async_trait::async_trait;
use common::errors::ExchangeError;
use exchange_trait::VolumeSource;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

const SYMBOL_LIST_PATH: &str = "/bapi/composite/v1/public/marketing/symbol/list";

#[derive(Deserialize, Debug)]
struct SymbolListResponse {
    #[serde(default)]
    data: Vec<MarketingSymbol>,
}

#[derive(Deserialize, Debug)]
struct MarketingSymbol {
    name: String,
    #[serde(default)]
    volume: Option<Decimal>,
}

#[derive(Clone)]
pub struct CompositeClient {
    client: Client,
    base_url: String,
}

impl CompositeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn symbol_list(&self) -> Result<SymbolListResponse, ExchangeError> {
        let url = format!("{}{}", self.base_url, SYMBOL_LIST_PATH);
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(e.to_string()))
    }
}

/// Keeps assets with a positive volume that are not excluded, highest volume first.
fn rank(symbols: Vec<MarketingSymbol>, count: usize, excluded: &[String]) -> Vec<String> {
    let mut ranked: Vec<(String, Decimal)> = symbols
        .into_iter()
        .filter(|s| !excluded.iter().any(|e| e == &s.name))
        .filter_map(|s| match s.volume {
            Some(volume) if volume > Decimal::ZERO => Some((s.name, volume)),
            _ => None,
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().take(count).map(|(name, _)| name).collect()
}

#[async_trait]
impl VolumeSource for CompositeClient {
    async fn top_volume_assets(
        &self,
        count: usize,
        excluded: &[String],
    ) -> Result<Vec<String>, ExchangeError> {
        let list = self.symbol_list().await?;
        debug!(listed = list.data.len(), "Fetched marketing symbol list");
        Ok(rank(list.data, count, excluded))
    }
}
