use crate::auth::sign_request;
use crate::error::ExchangeError;
use crate::traits::Exchange;
use crate::types::{Account, Balance, ExchangeKind, Order, OrderStatus, Ticker};
use async_trait::async_trait;
use configuration::BinanceConfig;
use core_types::{Credentials, OrderSide};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// `GET /api/v3/account`
#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

/// `GET /api/v3/ticker/bookTicker`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTickerResponse {
    bid_price: Decimal,
    ask_price: Decimal,
}

/// `GET /api/v3/ticker/price`
#[derive(Debug, Deserialize)]
struct PriceTickerResponse {
    price: Decimal,
}

/// The order payload returned by the `/api/v3/order` endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    symbol: String,
    order_id: i64,
    price: Decimal,
    orig_qty: Decimal,
    executed_qty: Decimal,
    status: String,
    side: String,
}

impl TryFrom<OrderResponse> for Order {
    type Error = ExchangeError;

    fn try_from(raw: OrderResponse) -> Result<Self, Self::Error> {
        let side = match raw.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(ExchangeError::InvalidData(format!("Unknown order side: {}", other))),
        };
        let status = match raw.status.as_str() {
            "NEW" | "PARTIALLY_FILLED" | "PENDING_NEW" => OrderStatus::Pending,
            "FILLED" => OrderStatus::Filled,
            _ => OrderStatus::Cancelled,
        };
        Ok(Order {
            id: raw.order_id.to_string(),
            symbol: raw.symbol,
            side,
            price: raw.price,
            amount: raw.orig_qty,
            filled: raw.executed_qty,
            status,
        })
    }
}

/// Represents an error response from the Binance API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: i64,
    msg: String,
}

/// A concrete `Exchange` for a Binance spot account.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    recv_window_ms: u64,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(config: &BinanceConfig, credentials: &Credentials) -> Result<Self, ExchangeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&credentials.access_key)
                .map_err(|e| ExchangeError::InvalidData(format!("Invalid API key: {}", e)))?,
        );

        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
            api_secret: credentials.secret_key.clone(),
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ExchangeError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ExchangeError::Deserialization(e.to_string()))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ExchangeError::Deserialization(format!(
                    "Failed to deserialize error response: {}. Original text: {}",
                    e, text
                ))
            })?;
            Err(ExchangeError::Api {
                code: api_error.code,
                msg: api_error.msg,
            })
        }
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(&[("symbol", symbol)]).send().await?;
        Self::decode(response).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: BTreeMap<&str, String>,
    ) -> Result<T, ExchangeError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ExchangeError::InvalidData(e.to_string()))?
            .as_millis();
        params.insert("timestamp", timestamp.to_string());
        params.insert("recvWindow", self.recv_window_ms.to_string());

        let query_string =
            serde_qs::to_string(&params).map_err(|e| ExchangeError::InvalidData(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string);

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        tracing::debug!(%method, path, "Sending signed Binance request");
        let response = self.client.request(method, &url).send().await?;
        Self::decode(response).await
    }

    async fn place(
        &self,
        side: &str,
        symbol: &str,
        price: Decimal,
        amount: Decimal,
    ) -> Result<String, ExchangeError> {
        let params = BTreeMap::from([
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", amount.normalize().to_string()),
            ("price", price.normalize().to_string()),
        ]);
        let order: OrderResponse = self.signed(Method::POST, "/api/v3/order", params).await?;
        Ok(order.order_id.to_string())
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Binance
    }

    async fn get_account(&self) -> Result<Account, ExchangeError> {
        let raw: AccountResponse = self
            .signed(Method::GET, "/api/v3/account", BTreeMap::new())
            .await?;

        let balances = raw
            .balances
            .into_iter()
            .filter(|b| !(b.free.is_zero() && b.locked.is_zero()))
            .map(|b| {
                (
                    b.asset,
                    Balance {
                        free: b.free,
                        frozen: b.locked,
                    },
                )
            })
            .collect();
        Ok(Account { balances })
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let (book, last) = tokio::join!(
            self.public::<BookTickerResponse>("/api/v3/ticker/bookTicker", symbol),
            self.public::<PriceTickerResponse>("/api/v3/ticker/price", symbol)
        );
        let book = book?;
        Ok(Ticker {
            bid: book.bid_price,
            ask: book.ask_price,
            last: last?.price,
        })
    }

    async fn buy(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError> {
        self.place("BUY", symbol, price, amount).await
    }

    async fn sell(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError> {
        self.place("SELL", symbol, price, amount).await
    }

    async fn get_order(&self, symbol: &str, id: &str) -> Result<Order, ExchangeError> {
        let params = BTreeMap::from([("symbol", symbol.to_string()), ("orderId", id.to_string())]);
        let raw: OrderResponse = self.signed(Method::GET, "/api/v3/order", params).await?;
        Order::try_from(raw)
    }

    async fn cancel_order(&self, symbol: &str, id: &str) -> Result<(), ExchangeError> {
        let params = BTreeMap::from([("symbol", symbol.to_string()), ("orderId", id.to_string())]);
        let _: OrderResponse = self.signed(Method::DELETE, "/api/v3/order", params).await?;
        Ok(())
    }
}
