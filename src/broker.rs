//! Signed REST client for the brokerage's market and order endpoints.

use chrono::{Days, Local, NaiveDate};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::bot::{MarketData, OrderExecutor};
use crate::config::BrokerSettings;
use crate::error::{Error, Result};
use crate::parameters::RequestParams;
use crate::strategy::{Action, TradeSignal};
use crate::util::percent_encode_str;
use crate::v1a::RequestSigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

/// An equity order as sent to the place-order endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: Action,
    pub quantity: u32,
    pub order_type: OrderType,
    /// Required for `Limit`, ignored for `Market`.
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, action: Action, quantity: u32) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            action,
            quantity,
            order_type: OrderType::Market,
            price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, action: Action, quantity: u32, price: f64) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            action,
            quantity,
            order_type: OrderType::Limit,
            price: Some(price),
        }
    }

    /// Builds the `PlaceOrderRequest` JSON body.
    pub fn to_payload(&self) -> Result<Value> {
        if self.action == Action::Hold {
            return Err(Error::InvalidOrder("HOLD is not an order action".into()));
        }
        if self.quantity == 0 {
            return Err(Error::InvalidOrder("quantity must be positive".into()));
        }

        let mut payload = json!({
            "PlaceOrderRequest": {
                "orderType": self.order_type,
                "clientOrderId": format!("bot-{}", self.symbol),
                "orderTerm": "GOOD_FOR_DAY",
                "marketSession": "REGULAR",
                "priceType": self.order_type,
                "orderAction": self.action,
                "quantity": self.quantity,
                "instrument": [{
                    "product": {
                        "symbol": self.symbol,
                        "securityType": "EQ"
                    },
                    "orderAction": self.action,
                    "quantity": self.quantity
                }]
            }
        });

        if self.order_type == OrderType::Limit {
            let price = self
                .price
                .ok_or_else(|| Error::InvalidOrder("limit orders require a price".into()))?;
            payload["PlaceOrderRequest"]["price"] = json!(price);
        }
        Ok(payload)
    }
}

/// Brokerage REST client. Every request carries a freshly signed
/// `Authorization` header.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    signer: RequestSigner,
    market_url: String,
    accounts_url: String,
    account_id: String,
    lookback_days: u32,
    interval: String,
}

impl BrokerClient {
    pub fn new(settings: &BrokerSettings, signer: RequestSigner) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(BrokerClient {
            http,
            signer,
            market_url: settings.market_url.trim_end_matches('/').to_string(),
            accounts_url: settings.accounts_url.trim_end_matches('/').to_string(),
            account_id: settings.account_id.clone(),
            lookback_days: 60,
            interval: "daily".into(),
        })
    }

    /// Window used by [`MarketData::latest_prices`]: trailing days and bar interval.
    pub fn with_history_window(mut self, lookback_days: u32, interval: impl Into<String>) -> Self {
        self.lookback_days = lookback_days;
        self.interval = interval.into();
        self
    }

    /// Last traded price for one symbol.
    ///
    /// `GET {market}/quote/{symbol}.json`
    pub async fn get_quote(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/quote/{}.json", self.market_url, percent_encode_str(symbol));
        let value = self.signed_get(&url, RequestParams::new()).await?;

        let last_price = value
            .pointer("/quoteResponse/quoteData/0/all/lastTrade")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                Error::UnexpectedResponse(format!("no lastTrade in quote response for {}", symbol))
            })?;
        info!(symbol, last_price, "fetched quote");
        Ok(last_price)
    }

    /// Closing prices between two dates, oldest first. Bars without a close
    /// are skipped; a response without bars yields an empty list.
    ///
    /// `GET {market}/historical/{symbol}.json?startDate=..&endDate=..&interval=..`
    pub async fn get_historical_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        interval: &str,
    ) -> Result<Vec<f64>> {
        let url = format!("{}/historical/{}.json", self.market_url, percent_encode_str(symbol));
        let params = RequestParams::new()
            .with("startDate", start_date.format("%Y-%m-%d").to_string())
            .with("endDate", end_date.format("%Y-%m-%d").to_string())
            .with("interval", interval);
        let value = self.signed_get(&url, params).await?;

        let prices: Vec<f64> = value
            .pointer("/historicalQuoteData/quoteData")
            .and_then(Value::as_array)
            .map(|bars| {
                bars.iter()
                    .filter_map(|bar| bar.get("close").and_then(Value::as_f64))
                    .collect()
            })
            .unwrap_or_default();
        info!(symbol, count = prices.len(), "fetched historical prices");
        Ok(prices)
    }

    /// `POST {accounts}/{account_id}/orders/place.json`
    ///
    /// Invalid orders (HOLD, zero quantity, LIMIT without price) fail before
    /// any request is made.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<Value> {
        let payload = order.to_payload()?;
        let url = format!(
            "{}/{}/orders/place.json",
            self.accounts_url,
            percent_encode_str(self.account_id.as_str())
        );
        let auth = self.signer.sign("POST", &url, &RequestParams::new())?;

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await?;
        let value = read_json(response).await?;
        info!(
            symbol = %order.symbol,
            action = %order.action,
            quantity = order.quantity,
            "order placed"
        );
        Ok(value)
    }

    async fn signed_get(&self, url: &str, params: RequestParams) -> Result<Value> {
        let auth = self.signer.sign("GET", url, &params)?;
        debug!(url, "GET");
        let query: Vec<(&String, &String)> = params.iter().collect();
        let response = self
            .http
            .get(url)
            .query(&query)
            .header(AUTHORIZATION, auth)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(serde_json::from_str(&text)?)
}

impl MarketData for BrokerClient {
    async fn latest_prices(&self, symbol: &str) -> Result<Vec<f64>> {
        let end = Local::now().date_naive();
        let start = end
            .checked_sub_days(Days::new(self.lookback_days.into()))
            .unwrap_or(NaiveDate::MIN);
        self.get_historical_prices(symbol, start, end, &self.interval).await
    }
}

impl OrderExecutor for BrokerClient {
    async fn execute(&self, signal: &TradeSignal) -> Result<Value> {
        self.place_order(&OrderRequest::market(signal.symbol.clone(), signal.action, signal.size))
            .await
    }
}
