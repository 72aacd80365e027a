//! Candle timeframes and date-range arithmetic.
//!
//! All alignment math is done on UTC epoch milliseconds. Every valid
//! timeframe divides a day evenly, so flooring a timestamp to a timeframe
//! boundary is a plain modulo against the epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

const MINUTE_MS: i64 = 60_000;

/// The set of timeframes candles are stored at, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Timeframe {
    Min1 = 1,
    Min5 = 5,
    Min15 = 15,
    Min30 = 30,
    Hour1 = 60,
    Hour2 = 120,
    Hour4 = 240,
    Hour8 = 480,
    Hour12 = 720,
    Day1 = 1440,
}

impl Timeframe {
    pub const ALL: [Timeframe; 10] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Min30,
        Timeframe::Hour1,
        Timeframe::Hour2,
        Timeframe::Hour4,
        Timeframe::Hour8,
        Timeframe::Hour12,
        Timeframe::Day1,
    ];

    pub fn minutes(&self) -> u32 {
        *self as u32
    }

    pub fn duration_ms(&self) -> i64 {
        self.minutes() as i64 * MINUTE_MS
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
            Timeframe::Hour8 => "8h",
            Timeframe::Hour12 => "12h",
            Timeframe::Day1 => "1d",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tf| tf.label() == label)
    }

    /// Latest timeframe boundary at or before `date`.
    pub fn floor(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        let ms = date.timestamp_millis();
        ms_to_utc(ms - ms.rem_euclid(self.duration_ms()))
    }

    /// Earliest timeframe boundary at or after `date`.
    pub fn ceil(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        let ms = date.timestamp_millis();
        let rem = ms.rem_euclid(self.duration_ms());
        if rem == 0 {
            date
        } else {
            ms_to_utc(ms - rem + self.duration_ms())
        }
    }

    /// Number of whole bars covering the half-open range `[date_from, date_to)`.
    /// Both bounds are expected to be aligned to this timeframe.
    pub fn bars_between(&self, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> i64 {
        let span = date_to.timestamp_millis() - date_from.timestamp_millis();
        if span <= 0 {
            0
        } else {
            span / self.duration_ms()
        }
    }
}

impl TryFrom<u32> for Timeframe {
    type Error = ImportError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.minutes() == minutes)
            .ok_or_else(|| ImportError::Validation(format!("invalid timeframe: {minutes}")))
    }
}

impl From<Timeframe> for u32 {
    fn from(tf: Timeframe) -> Self {
        tf.minutes()
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Epoch milliseconds to UTC datetime. Out-of-range values collapse to the
/// epoch, which never occurs for real market timestamps.
pub fn ms_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// One bounded slice of an import date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeChunk {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

/// Splits the half-open range `[date_from, date_to)` into contiguous chunks
/// of at most `limit` bars at the given timeframe. Chunks partition the range
/// with no overlap and no gap; bounds are expected to be aligned.
pub fn chunk_date_range(
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
    timeframe: Timeframe,
    limit: u32,
) -> Vec<DateRangeChunk> {
    let step = timeframe.duration_ms() * limit.max(1) as i64;
    let to = date_to.timestamp_millis();
    let mut chunks = Vec::new();
    let mut from = date_from.timestamp_millis();
    while from < to {
        let chunk_to = (from + step).min(to);
        chunks.push(DateRangeChunk {
            date_from: ms_to_utc(from),
            date_to: ms_to_utc(chunk_to),
        });
        from = chunk_to;
    }
    chunks
}

/// Maximum bars one connector call may return, per exchange.
pub fn load_limit(exchange: &str) -> u32 {
    match exchange {
        "bitfinex" => 900,
        "kraken" => 450,
        "binance" => 900,
        "binance_futures" => 500,
        "kucoin" => 1400,
        "huobipro" => 1900,
        _ => 250,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_floor_and_ceil_alignment() {
        let date = utc(2019, 7, 3, 15, 37);
        assert_eq!(Timeframe::Hour1.floor(date), utc(2019, 7, 3, 15, 0));
        assert_eq!(Timeframe::Hour1.ceil(date), utc(2019, 7, 3, 16, 0));
        assert_eq!(Timeframe::Day1.floor(date), utc(2019, 7, 3, 0, 0));
        assert_eq!(Timeframe::Day1.ceil(date), utc(2019, 7, 4, 0, 0));
        // already aligned dates stay put
        let aligned = utc(2019, 7, 3, 12, 0);
        assert_eq!(Timeframe::Hour4.floor(aligned), aligned);
        assert_eq!(Timeframe::Hour4.ceil(aligned), aligned);
    }

    #[test]
    fn test_labels_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::from_label(tf.label()), Some(tf));
            assert_eq!(Timeframe::try_from(tf.minutes()).ok(), Some(tf));
        }
        assert!(Timeframe::from_label("3m").is_none());
        assert!(Timeframe::try_from(7).is_err());
    }

    #[test]
    fn test_chunk_date_range_partitions_without_gaps() {
        let from = utc(2017, 1, 1, 0, 0);
        let to = utc(2017, 1, 29, 0, 0);
        let chunks = chunk_date_range(from, to, Timeframe::Hour1, 100);

        // 28 days of hourly bars = 672, in chunks of 100
        assert_eq!(chunks.len(), 7);
        assert_eq!(chunks[0].date_from, from);
        assert_eq!(chunks[chunks.len() - 1].date_to, to);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].date_to, pair[1].date_from);
        }
        for chunk in &chunks {
            assert!(Timeframe::Hour1.bars_between(chunk.date_from, chunk.date_to) <= 100);
        }
    }

    #[test]
    fn test_chunk_date_range_empty_range() {
        let from = utc(2017, 1, 1, 0, 0);
        assert!(chunk_date_range(from, from, Timeframe::Hour1, 100).is_empty());
    }

    #[test]
    fn test_bars_between() {
        let from = utc(2017, 1, 1, 0, 0);
        let to = utc(2017, 1, 2, 0, 0);
        assert_eq!(Timeframe::Hour1.bars_between(from, to), 24);
        assert_eq!(Timeframe::Day1.bars_between(from, to), 1);
        assert_eq!(Timeframe::Day1.bars_between(to, from), 0);
    }

    #[test]
    fn test_load_limit_known_exchanges() {
        assert_eq!(load_limit("binance"), 900);
        assert_eq!(load_limit("kraken"), 450);
        assert_eq!(load_limit("unknown"), 250);
    }
}
