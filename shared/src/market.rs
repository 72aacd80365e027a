//! Market domain model: exchange candles and raw trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// How a stored candle came to exist. `Previous` marks a synthesized
/// gap-fill bar (zero volume, OHLC equal to the prior close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleType {
    Loaded,
    Created,
    Previous,
    History,
}

impl CandleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleType::Loaded => "loaded",
            CandleType::Created => "created",
            CandleType::Previous => "previous",
            CandleType::History => "history",
        }
    }
}

/// One OHLCV bar as fetched from or derived for an exchange market.
/// `time` is the bar's window-start in epoch milliseconds UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeCandle {
    pub exchange: String,
    pub asset: String,
    pub currency: String,
    pub timeframe: Timeframe,
    pub time: i64,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(rename = "type")]
    pub candle_type: CandleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One raw trade tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeTrade {
    pub exchange: String,
    pub asset: String,
    pub currency: String,
    pub time: i64,
    pub timestamp: DateTime<Utc>,
    pub side: TradeSide,
    pub price: f64,
    pub amount: f64,
}
