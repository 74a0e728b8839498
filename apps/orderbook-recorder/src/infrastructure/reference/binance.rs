//! Binance spot REST adapter for the reference price.
//!
//! - current: `GET /api/v3/ticker/price?symbol=…`
//! - period open: `GET /api/v3/klines?symbol=…&interval=1h&startTime=<ms>&limit=1`
//!
//! A kline is only accepted when its open time equals the requested boundary;
//! anything else means the candle for that hour does not exist yet.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{ReferencePricePort, ReferenceSourceError};

/// Binance reference price adapter.
#[derive(Debug, Clone)]
pub struct BinanceReferenceSource {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
}

impl BinanceReferenceSource {
    /// Create an adapter for `symbol` against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        symbol: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReferenceSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReferenceSourceError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into(),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ReferenceSourceError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ReferenceSourceError::Network {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReferenceSourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ReferenceSourceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ReferencePricePort for BinanceReferenceSource {
    async fn latest_price(&self) -> Result<Decimal, ReferenceSourceError> {
        let ticker: TickerPrice = self
            .get("/api/v3/ticker/price", &[("symbol", self.symbol.clone())])
            .await?;
        parse_decimal(&ticker.price)
    }

    async fn period_open(
        &self,
        period_start: DateTime<Utc>,
    ) -> Result<Decimal, ReferenceSourceError> {
        let start_ms = period_start.timestamp_millis();
        let rows: Vec<Vec<serde_json::Value>> = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", self.symbol.clone()),
                    ("interval", "1h".to_string()),
                    ("startTime", start_ms.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let row = rows
            .first()
            .ok_or(ReferenceSourceError::PeriodUnavailable { period_start })?;

        let open_time = row
            .first()
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ReferenceSourceError::Parse("kline open time missing".to_string()))?;
        if open_time != start_ms {
            return Err(ReferenceSourceError::PeriodUnavailable { period_start });
        }

        let open = row
            .get(1)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ReferenceSourceError::Parse("kline open price missing".to_string()))?;
        parse_decimal(open)
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

fn parse_decimal(raw: &str) -> Result<Decimal, ReferenceSourceError> {
    Decimal::from_str(raw).map_err(|e| ReferenceSourceError::Parse(format!("{raw}: {e}")))
}
