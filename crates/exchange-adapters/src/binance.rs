//! Binance spot REST client.

use async_trait::async_trait;
use common::errors::ExchangeError;
use common::models::SymbolInfo;
use common::quantize::format_decimal;
use common::types::{AssetBalance, Order, OrderRequest, OrderSide, OrderStatus, Price, Quantity};
use exchange_trait::{ErrorBody, ExchangeClient};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const API_PREFIX: &str = "/api/v3";

#[derive(Debug, Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Option<BinanceCredentials>,
    recv_window_ms: u64,
}

// --- Wire formats ---

#[derive(Deserialize, Debug)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolEntry>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SymbolEntry {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    is_spot_trading_allowed: bool,
    #[serde(default)]
    order_types: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    filters: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PriceFilter {
    min_price: Decimal,
    max_price: Decimal,
    tick_size: Decimal,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    min_qty: Decimal,
    max_qty: Decimal,
    step_size: Decimal,
}

impl SymbolEntry {
    fn filter<T: DeserializeOwned>(&self, filter_type: &str) -> Option<T> {
        self.filters
            .iter()
            .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some(filter_type))
            .and_then(|f| serde_json::from_value(f.clone()).ok())
    }

    fn into_symbol_info(self) -> SymbolInfo {
        let price = self.filter::<PriceFilter>("PRICE_FILTER");
        let lot = self.filter::<LotSizeFilter>("LOT_SIZE");
        // A missing filter leaves zero sizes, which quantization refuses to use.
        SymbolInfo {
            min_price: price.as_ref().map_or(Decimal::ZERO, |p| p.min_price),
            max_price: price.as_ref().map_or(Decimal::ZERO, |p| p.max_price),
            tick_size: price.as_ref().map_or(Decimal::ZERO, |p| p.tick_size),
            min_qty: lot.as_ref().map_or(Decimal::ZERO, |l| l.min_qty),
            max_qty: lot.as_ref().map_or(Decimal::ZERO, |l| l.max_qty),
            step_size: lot.as_ref().map_or(Decimal::ZERO, |l| l.step_size),
            symbol: self.symbol,
            base_asset: self.base_asset,
            quote_asset: self.quote_asset,
            status: self.status,
            is_spot_trading_allowed: self.is_spot_trading_allowed,
            order_types: self.order_types,
            permissions: self.permissions,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: u64,
    status: OrderStatus,
    side: OrderSide,
    price: Decimal,
    orig_qty: Decimal,
    executed_qty: Decimal,
    #[serde(default)]
    cummulative_quote_qty: Option<Decimal>,
}

impl From<OrderResponse> for Order {
    fn from(r: OrderResponse) -> Self {
        Order {
            order_id: r.order_id,
            symbol: r.symbol,
            status: r.status,
            side: r.side,
            price: Price(r.price),
            orig_qty: Quantity(r.orig_qty),
            executed_qty: Quantity(r.executed_qty),
            cummulative_quote_qty: r.cummulative_quote_qty,
        }
    }
}

#[derive(Deserialize, Debug)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

impl BinanceClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<BinanceCredentials>,
        recv_window_ms: u64,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
        }
    }

    fn sign(secret: &str, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ExchangeError::Transport(format!("HMAC key error: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn encode(params: &[(&str, String)]) -> Result<String, ExchangeError> {
        serde_urlencoded::to_string(params)
            .map_err(|e| ExchangeError::Transport(format!("Query encoding error: {}", e)))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let mut request = if signed {
            let credentials = self.credentials.as_ref().ok_or_else(|| {
                ExchangeError::Transport("Signed endpoint called without credentials".to_string())
            })?;
            params.push(("recvWindow", self.recv_window_ms.to_string()));
            params.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));
            let query = Self::encode(&params)?;
            let signature = Self::sign(&credentials.api_secret, &query)?;
            let url = format!(
                "{}{}{}?{}&signature={}",
                self.base_url, API_PREFIX, path, query, signature
            );
            self.client
                .request(method.clone(), url)
                .header("X-MBX-APIKEY", &credentials.api_key)
        } else {
            let query = Self::encode(&params)?;
            let url = if query.is_empty() {
                format!("{}{}{}", self.base_url, API_PREFIX, path)
            } else {
                format!("{}{}{}?{}", self.base_url, API_PREFIX, path, query)
            };
            self.client.request(method.clone(), url)
        };
        request = request.header("Accept", "application/json");

        debug!(method = %method, path, signed, "Binance request");
        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) => ExchangeError::Api {
                    code: err.code,
                    msg: err.msg,
                },
                Err(_) => ExchangeError::Transport(format!("HTTP {}: {}", status, body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_symbol_exchange_info(
        &self,
        symbols: &[String],
    ) -> Result<Vec<SymbolInfo>, ExchangeError> {
        if symbols.is_empty() {
            return Ok(vec![]);
        }
        let list = serde_json::to_string(symbols).map_err(|e| ExchangeError::Decode(e.to_string()))?;
        let info: ExchangeInfoResponse = self
            .request(Method::GET, "/exchangeInfo", vec![("symbols", list)], false)
            .await?;
        Ok(info
            .symbols
            .into_iter()
            .map(SymbolEntry::into_symbol_info)
            .collect())
    }

    async fn get_tradable_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        let info: ExchangeInfoResponse = self
            .request(Method::GET, "/exchangeInfo", vec![], false)
            .await?;
        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING")
            .map(|s| s.symbol)
            .collect())
    }

    async fn get_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let order: OrderResponse = self.request(Method::GET, "/order", params, true).await?;
        Ok(order.into())
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<Order, ExchangeError> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let order: OrderResponse = self.request(Method::DELETE, "/order", params, true).await?;
        Ok(order.into())
    }

    async fn place_limit_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        let params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_decimal(request.quantity.0)),
            ("price", format_decimal(request.price.0)),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        let order: OrderResponse = self.request(Method::POST, "/order", params, true).await?;
        Ok(order.into())
    }

    async fn get_asset_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError> {
        let account: AccountResponse = self.request(Method::GET, "/account", vec![], true).await?;
        Ok(account
            .balances
            .into_iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .unwrap_or_else(|| AssetBalance {
                asset: asset.to_string(),
                free: Decimal::ZERO,
                locked: Decimal::ZERO,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    const EXCHANGE_INFO: &str = r#"{
        "timezone": "UTC",
        "symbols": [
            {
                "symbol": "SOLBTC",
                "status": "TRADING",
                "baseAsset": "SOL",
                "quoteAsset": "BTC",
                "isSpotTradingAllowed": true,
                "orderTypes": ["LIMIT", "MARKET"],
                "permissions": ["SPOT"],
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.00000010", "maxPrice": "1000.00000000", "tickSize": "0.00000010"},
                    {"filterType": "LOT_SIZE", "minQty": "0.01000000", "maxQty": "90000000.00000000", "stepSize": "0.01000000"},
                    {"filterType": "NOTIONAL", "minNotional": "0.00010000"}
                ]
            },
            {
                "symbol": "OLDBTC",
                "status": "BREAK",
                "baseAsset": "OLD",
                "quoteAsset": "BTC",
                "filters": []
            }
        ]
    }"#;

    fn credentials() -> Option<BinanceCredentials> {
        Some(BinanceCredentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        })
    }

    #[test]
    fn test_signature_is_hex_hmac_sha256() {
        // Reference vector from the exchange API documentation.
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        assert_eq!(
            BinanceClient::sign(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_query_encoding() {
        let params = [
            ("symbols", r#"["SOLBTC","XRPBTC"]"#.to_string()),
            ("price", "0.00000475".to_string()),
        ];
        assert_eq!(
            BinanceClient::encode(&params).unwrap(),
            "symbols=%5B%22SOLBTC%22%2C%22XRPBTC%22%5D&price=0.00000475"
        );
        assert_eq!(BinanceClient::encode(&[]).unwrap(), "");
    }

    #[tokio::test]
    async fn test_symbol_exchange_info_parses_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(Matcher::UrlEncoded(
                "symbols".into(),
                r#"["SOLBTC","OLDBTC"]"#.into(),
            ))
            .with_status(200)
            .with_body(EXCHANGE_INFO)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), None, 5000);
        let infos = client
            .get_symbol_exchange_info(&["SOLBTC".to_string(), "OLDBTC".to_string()])
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].symbol, "SOLBTC");
        assert_eq!(infos[0].step_size, dec!(0.01));
        assert_eq!(infos[0].tick_size, dec!(0.0000001));
        assert_eq!(infos[0].max_price, dec!(1000));
        assert!(infos[0].is_spot_trading_allowed);
        assert_eq!(infos[1].step_size, Decimal::ZERO);
        assert!(infos[1].apply_step_size(dec!(1)).is_err());
    }

    #[tokio::test]
    async fn test_tradable_symbols_skip_halted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .with_status(200)
            .with_body(EXCHANGE_INFO)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), None, 5000);
        assert_eq!(
            client.get_tradable_symbols().await.unwrap(),
            vec!["SOLBTC".to_string()]
        );
    }

    #[tokio::test]
    async fn test_signed_order_placement() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/order")
            .match_header("X-MBX-APIKEY", "key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "SOLUSDT".into()),
                Matcher::UrlEncoded("side".into(), "BUY".into()),
                Matcher::UrlEncoded("quantity".into(), "9.99".into()),
                Matcher::UrlEncoded("price".into(), "10".into()),
                Matcher::UrlEncoded("recvWindow".into(), "5000".into()),
                Matcher::Regex("signature=[0-9a-f]{64}".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"symbol":"SOLUSDT","orderId":28,"status":"NEW","side":"BUY","price":"10.00000000","origQty":"9.99000000","executedQty":"0.00000000","cummulativeQuoteQty":"0.00000000","type":"LIMIT"}"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), credentials(), 5000);
        let order = client
            .place_limit_order(&OrderRequest {
                symbol: "SOLUSDT".to_string(),
                side: OrderSide::Buy,
                price: Price(dec!(10.000)),
                quantity: Quantity(dec!(9.9900)),
            })
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(order.order_id, 28);
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.orig_qty, Quantity(dec!(9.99)));
        assert_eq!(order.cummulative_quote_qty, Some(dec!(0)));
    }

    #[tokio::test]
    async fn test_api_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/api/v3/order")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2011,"msg":"Unknown order sent."}"#)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), credentials(), 5000);
        let err = client.cancel_order("SOLUSDT", 1).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::Api {
                code: -2011,
                msg: "Unknown order sent.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_signed_call_requires_credentials() {
        let client = BinanceClient::new("http://127.0.0.1:1", None, 5000);
        assert!(matches!(
            client.get_order("SOLUSDT", 1).await,
            Err(ExchangeError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_asset_balance_lookup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/account")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"balances":[{"asset":"SOL","free":"9.98","locked":"0.01"},{"asset":"BTC","free":"0","locked":"0"}]}"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), credentials(), 5000);
        let sol = client.get_asset_balance("SOL").await.unwrap();
        assert_eq!(sol.free, dec!(9.98));
        assert_eq!(sol.locked, dec!(0.01));

        let eth = client.get_asset_balance("ETH").await.unwrap();
        assert_eq!(eth.free, Decimal::ZERO);
    }
}
