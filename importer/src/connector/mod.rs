//! Exchange data access.

pub mod binance;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use shared::{ExchangeCandle, ExchangeTrade, ImportError, Timeframe};

pub use binance::BinanceConnector;

/// Read-only market-data source for one exchange. Implementations own
/// transient retry; errors surfacing here are considered final for the
/// chunk being loaded.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Exchange identifier used on stored candles and in the limit table.
    fn exchange(&self) -> &str;

    /// Natively supported timeframes, label -> minutes.
    async fn get_timeframes(&self) -> Result<HashMap<String, u32>, ImportError>;

    /// Up to `limit` candles starting at `date_from`, ascending.
    async fn get_candles(
        &self,
        asset: &str,
        currency: &str,
        timeframe: Timeframe,
        date_from: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ExchangeCandle>, ImportError>;

    /// One page of trades at or after `date_from`, ascending. Callers page
    /// forward by re-requesting from the last returned timestamp.
    async fn get_trades(
        &self,
        asset: &str,
        currency: &str,
        date_from: DateTime<Utc>,
    ) -> Result<Vec<ExchangeTrade>, ImportError>;
}
