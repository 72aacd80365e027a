use std::sync::Arc;

use async_trait::async_trait;

use shared::{DbPool, ExchangeCandle, ImportError};

use super::CandleStore;

pub struct CandleRepository {
    pool: Arc<DbPool>,
}

impl CandleRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleStore for CandleRepository {
    async fn upsert_candles(&self, candles: &[ExchangeCandle]) -> Result<(), ImportError> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles
                    (exchange, asset, currency, timeframe, time, ts,
                     open, high, low, close, volume, type)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON DUPLICATE KEY UPDATE
                    ts = VALUES(ts),
                    open = VALUES(open),
                    high = VALUES(high),
                    low = VALUES(low),
                    close = VALUES(close),
                    volume = VALUES(volume),
                    type = VALUES(type)
                "#,
            )
            .bind(&candle.exchange)
            .bind(&candle.asset)
            .bind(&candle.currency)
            .bind(candle.timeframe.minutes())
            .bind(candle.time)
            .bind(candle.timestamp)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .bind(candle.candle_type.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
