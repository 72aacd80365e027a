//! Binance public REST connector.
//!
//! Uses the unauthenticated market-data endpoints (`/api/v3/klines`,
//! `/api/v3/aggTrades`). Transient failures (timeouts, 429, 5xx) are
//! retried a few times with linear backoff before giving up.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use shared::{ms_to_utc, CandleType, ExchangeCandle, ExchangeTrade, ImportError, Timeframe, TradeSide};

use super::ExchangeConnector;

const BASE_URL: &str = "https://api.binance.com";
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;
const TRADES_PAGE_LIMIT: u32 = 1000;

pub struct BinanceConnector {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceConnector {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn symbol(asset: &str, currency: &str) -> String {
        format!("{}{}", asset.to_uppercase(), currency.to_uppercase())
    }

    async fn get_json(&self, url: String) -> Result<Value, ImportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            ImportError::WrongResponseShape(format!(
                                "binance returned invalid json: {e}"
                            ))
                        });
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= MAX_RETRIES {
                        return Err(ImportError::ExchangeUnavailable(format!(
                            "binance responded {status} for {url}"
                        )));
                    }
                    tracing::warn!(%status, attempt, "binance request throttled, retrying");
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if !retryable || attempt >= MAX_RETRIES {
                        return Err(ImportError::Network(format!("binance request failed: {e}")));
                    }
                    tracing::warn!(error = %e, attempt, "binance request failed, retrying");
                }
            }
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
        }
    }
}

impl Default for BinanceConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn number_field(value: &Value, index: usize) -> Result<f64, ImportError> {
    value
        .get(index)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            ImportError::WrongResponseShape(format!("kline field {index} is not a finite number"))
        })
}

#[derive(Deserialize)]
struct AggTrade {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    time: i64,
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn exchange(&self) -> &str {
        "binance"
    }

    async fn get_timeframes(&self) -> Result<HashMap<String, u32>, ImportError> {
        // Binance's kline interval set is static; the subset stored by
        // this system never changes at runtime.
        Ok([
            ("1m", 1),
            ("5m", 5),
            ("15m", 15),
            ("30m", 30),
            ("1h", 60),
            ("2h", 120),
            ("4h", 240),
            ("8h", 480),
            ("12h", 720),
            ("1d", 1440),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect())
    }

    async fn get_candles(
        &self,
        asset: &str,
        currency: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ExchangeCandle>, ImportError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            Self::symbol(asset, currency),
            timeframe.label(),
            date_from.timestamp_millis(),
            limit
        );
        let body = self.get_json(url).await?;
        let rows = body.as_array().ok_or_else(|| {
            ImportError::WrongResponseShape("klines response is not an array".to_string())
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let time = row.get(0).and_then(|v| v.as_i64()).ok_or_else(|| {
                ImportError::WrongResponseShape("kline open time is not an integer".to_string())
            })?;
            candles.push(ExchangeCandle {
                exchange: self.exchange().to_string(),
                asset: asset.to_string(),
                currency: currency.to_string(),
                timeframe,
                time,
                timestamp: ms_to_utc(time),
                open: number_field(row, 1)?,
                high: number_field(row, 2)?,
                low: number_field(row, 3)?,
                close: number_field(row, 4)?,
                volume: number_field(row, 5)?,
                candle_type: CandleType::Loaded,
            });
        }
        Ok(candles)
    }

    async fn get_trades(
        &self,
        asset: &str,
        currency: &str,
        date_from: DateTime<Utc>,
    ) -> Result<Vec<ExchangeTrade>, ImportError> {
        let url = format!(
            "{}/api/v3/aggTrades?symbol={}&startTime={}&limit={}",
            self.base_url,
            Self::symbol(asset, currency),
            date_from.timestamp_millis(),
            TRADES_PAGE_LIMIT
        );
        let body = self.get_json(url).await?;
        let rows: Vec<AggTrade> = serde_json::from_value(body).map_err(|e| {
            ImportError::WrongResponseShape(format!("aggTrades response: {e}"))
        })?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let price = row.price.parse::<f64>().ok().filter(|n| n.is_finite());
            let amount = row.quantity.parse::<f64>().ok().filter(|n| n.is_finite());
            let (Some(price), Some(amount)) = (price, amount) else {
                return Err(ImportError::WrongResponseShape(
                    "aggTrade price/quantity is not a finite number".to_string(),
                ));
            };
            trades.push(ExchangeTrade {
                exchange: self.exchange().to_string(),
                asset: asset.to_string(),
                currency: currency.to_string(),
                time: row.time,
                timestamp: ms_to_utc(row.time),
                // the taker side: buyer-is-maker means a sell hit the book
                side: if row.buyer_is_maker {
                    TradeSide::Sell
                } else {
                    TradeSide::Buy
                },
                price,
                amount,
            });
        }
        Ok(trades)
    }
}
