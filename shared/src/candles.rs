//! Pure candle aggregation: gap filling, timeframe batching and
//! trade-to-candle bucketing. No I/O, no state; every function takes a
//! half-open UTC range `[date_from, date_to)` and slices of input data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::market::{CandleType, ExchangeCandle, ExchangeTrade};
use crate::timeframe::{ms_to_utc, Timeframe};

/// Fills holes in a fixed-timeframe candle series.
///
/// Walks the dense timestamp grid of `[date_from, date_to)` (with
/// `date_from` aligned forward to the series timeframe) and synthesizes a
/// `previous`-type candle for every missing timestamp: OHLC equal to the
/// prior bar's close, zero volume. A leading gap with no prior bar to copy
/// from is left unfilled. Output is ascending with exactly one candle per
/// covered timestamp.
pub fn fill_gaps(
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
    candles: &[ExchangeCandle],
) -> Vec<ExchangeCandle> {
    if candles.is_empty() {
        return Vec::new();
    }
    let timeframe = candles[0].timeframe;
    let step = timeframe.duration_ms();
    let from = timeframe.ceil(date_from).timestamp_millis();
    let to = date_to.timestamp_millis();

    let by_time: BTreeMap<i64, &ExchangeCandle> = candles.iter().map(|c| (c.time, c)).collect();
    // a bar just before the window still seeds the first gap fill
    let mut prev_close = by_time
        .range(..from)
        .next_back()
        .map(|(_, candle)| candle.close);

    let mut filled = Vec::with_capacity(((to - from).max(0) / step) as usize);
    let mut time = from;
    while time < to {
        match by_time.get(&time) {
            Some(candle) => {
                prev_close = Some(candle.close);
                filled.push((*candle).clone());
            }
            None => {
                if let Some(close) = prev_close {
                    filled.push(ExchangeCandle {
                        exchange: candles[0].exchange.clone(),
                        asset: candles[0].asset.clone(),
                        currency: candles[0].currency.clone(),
                        timeframe,
                        time,
                        timestamp: ms_to_utc(time),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 0.0,
                        candle_type: CandleType::Previous,
                    });
                }
            }
        }
        time += step;
    }
    filled
}

/// Aggregates lower-timeframe candles into `target` candles.
///
/// For every complete `target` window inside `[date_from, date_to)`:
/// open of the first contributing candle, close of the last, max high,
/// min low, summed volume. Windows with no contributing candles are
/// omitted; completing the series is gap filling's job, applied before
/// batching.
pub fn batch_candles(
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
    target: Timeframe,
    candles: &[ExchangeCandle],
) -> Vec<ExchangeCandle> {
    if candles.is_empty() {
        return Vec::new();
    }
    let step = target.duration_ms();
    let from = target.ceil(date_from).timestamp_millis();
    let to = date_to.timestamp_millis();

    let mut sorted: Vec<&ExchangeCandle> = candles.iter().collect();
    sorted.sort_by_key(|c| c.time);

    let mut batched = Vec::new();
    let mut window = from;
    while window + step <= to {
        let bucket: Vec<&&ExchangeCandle> = sorted
            .iter()
            .filter(|c| c.time >= window && c.time < window + step)
            .collect();
        if !bucket.is_empty() {
            let volume: f64 = bucket.iter().map(|c| c.volume).sum();
            batched.push(ExchangeCandle {
                exchange: candles[0].exchange.clone(),
                asset: candles[0].asset.clone(),
                currency: candles[0].currency.clone(),
                timeframe: target,
                time: window,
                timestamp: ms_to_utc(window),
                open: bucket[0].open,
                high: bucket.iter().map(|c| c.high).fold(f64::MIN, f64::max),
                low: bucket.iter().map(|c| c.low).fold(f64::MAX, f64::min),
                close: bucket[bucket.len() - 1].close,
                volume,
                candle_type: if volume == 0.0 {
                    CandleType::Previous
                } else {
                    CandleType::Created
                },
            });
        }
        window += step;
    }
    batched
}

/// Buckets raw trades into candles, independently for each requested
/// timeframe.
///
/// Trades are deduplicated by `(time, price, amount, side)`, filtered to
/// `[date_from, date_to)` and sorted ascending before bucketing. Each
/// window with trades yields a candle: open of the first trade, close of
/// the last, max/min price, summed amount as volume. Empty windows yield
/// no candle; downstream gap filling completes the series.
pub fn candles_from_trades(
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
    timeframes: &[Timeframe],
    trades: &[ExchangeTrade],
) -> BTreeMap<Timeframe, Vec<ExchangeCandle>> {
    let mut result: BTreeMap<Timeframe, Vec<ExchangeCandle>> = BTreeMap::new();
    for timeframe in timeframes {
        result.insert(*timeframe, Vec::new());
    }
    if trades.is_empty() {
        return result;
    }

    let from = date_from.timestamp_millis();
    let to = date_to.timestamp_millis();
    let mut uniq: Vec<&ExchangeTrade> = trades
        .iter()
        .filter(|t| t.time >= from && t.time < to)
        .collect();
    uniq.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then(a.price.total_cmp(&b.price))
            .then(a.amount.total_cmp(&b.amount))
            .then(a.side.cmp(&b.side))
    });
    uniq.dedup_by(|a, b| {
        a.time == b.time && a.price == b.price && a.amount == b.amount && a.side == b.side
    });

    for timeframe in timeframes {
        let step = timeframe.duration_ms();
        let mut candles = Vec::new();
        let mut i = 0;
        while i < uniq.len() {
            let window = uniq[i].time - uniq[i].time.rem_euclid(step);
            let mut j = i;
            let (mut high, mut low, mut volume) = (f64::MIN, f64::MAX, 0.0);
            while j < uniq.len() && uniq[j].time < window + step {
                high = high.max(uniq[j].price);
                low = low.min(uniq[j].price);
                volume += uniq[j].amount;
                j += 1;
            }
            candles.push(ExchangeCandle {
                exchange: uniq[i].exchange.clone(),
                asset: uniq[i].asset.clone(),
                currency: uniq[i].currency.clone(),
                timeframe: *timeframe,
                time: window,
                timestamp: ms_to_utc(window),
                open: uniq[i].price,
                high,
                low,
                close: uniq[j - 1].price,
                volume,
                candle_type: if volume == 0.0 {
                    CandleType::Previous
                } else {
                    CandleType::Created
                },
            });
            i = j;
        }
        result.insert(*timeframe, candles);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::TradeSide;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn candle(timeframe: Timeframe, time: DateTime<Utc>, ohlc: [f64; 4], volume: f64) -> ExchangeCandle {
        ExchangeCandle {
            exchange: "binance".to_string(),
            asset: "BTC".to_string(),
            currency: "USDT".to_string(),
            timeframe,
            time: time.timestamp_millis(),
            timestamp: time,
            open: ohlc[0],
            high: ohlc[1],
            low: ohlc[2],
            close: ohlc[3],
            volume,
            candle_type: CandleType::Loaded,
        }
    }

    fn trade(time: DateTime<Utc>, offset_ms: i64, price: f64, amount: f64, side: TradeSide) -> ExchangeTrade {
        let ms = time.timestamp_millis() + offset_ms;
        ExchangeTrade {
            exchange: "kraken".to_string(),
            asset: "BTC".to_string(),
            currency: "USD".to_string(),
            time: ms,
            timestamp: ms_to_utc(ms),
            side,
            price,
            amount,
        }
    }

    #[test]
    fn test_fill_gaps_completes_overnight_hole() {
        // hourly series with a hole between 15:00 and 02:00 the next day
        let date_from = utc(2019, 7, 3, 15, 0);
        let date_to = utc(2019, 7, 4, 2, 0);
        let input = vec![candle(
            Timeframe::Hour1,
            utc(2019, 7, 3, 15, 0),
            [100.0, 110.0, 95.0, 105.0],
            42.0,
        )];

        let filled = fill_gaps(date_from, date_to, &input);

        assert_eq!(filled.len(), 11);
        assert_eq!(filled[0].time, utc(2019, 7, 3, 15, 0).timestamp_millis());
        let last = &filled[filled.len() - 1];
        assert_eq!(last.time, utc(2019, 7, 4, 1, 0).timestamp_millis());
        assert_eq!(last.candle_type, CandleType::Previous);
        assert_eq!(last.open, 105.0);
        assert_eq!(last.close, 105.0);
        assert_eq!(last.volume, 0.0);
        // one candle per expected timestamp, no duplicates
        let mut times: Vec<i64> = filled.iter().map(|c| c.time).collect();
        times.dedup();
        assert_eq!(times.len(), 11);
        for pair in filled.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, Timeframe::Hour1.duration_ms());
        }
    }

    #[test]
    fn test_fill_gaps_leaves_leading_gap_unfilled() {
        let date_from = utc(2019, 7, 3, 12, 0);
        let date_to = utc(2019, 7, 3, 16, 0);
        // first real candle only at 14:00
        let input = vec![candle(
            Timeframe::Hour1,
            utc(2019, 7, 3, 14, 0),
            [100.0, 101.0, 99.0, 100.5],
            1.0,
        )];

        let filled = fill_gaps(date_from, date_to, &input);

        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].time, utc(2019, 7, 3, 14, 0).timestamp_millis());
        assert_eq!(filled[1].candle_type, CandleType::Previous);
    }

    #[test]
    fn test_fill_gaps_seeds_from_bar_before_window() {
        let date_from = utc(2019, 7, 3, 12, 0);
        let date_to = utc(2019, 7, 3, 14, 0);
        let input = vec![candle(
            Timeframe::Hour1,
            utc(2019, 7, 3, 11, 0),
            [100.0, 101.0, 99.0, 100.5],
            1.0,
        )];

        let filled = fill_gaps(date_from, date_to, &input);

        assert_eq!(filled.len(), 2);
        assert!(filled.iter().all(|c| c.candle_type == CandleType::Previous));
        assert!(filled.iter().all(|c| c.close == 100.5));
    }

    #[test]
    fn test_fill_gaps_empty_input() {
        let filled = fill_gaps(utc(2019, 7, 3, 0, 0), utc(2019, 7, 4, 0, 0), &[]);
        assert!(filled.is_empty());
    }

    #[test]
    fn test_batch_candles_two_hours_into_one() {
        let date_from = utc(2019, 7, 3, 0, 0);
        let date_to = utc(2019, 7, 3, 4, 0);
        let input = vec![
            candle(Timeframe::Hour1, utc(2019, 7, 3, 0, 0), [100.0, 115.0, 98.0, 110.0], 10.0),
            candle(Timeframe::Hour1, utc(2019, 7, 3, 1, 0), [110.0, 120.0, 105.0, 107.0], 5.0),
            candle(Timeframe::Hour1, utc(2019, 7, 3, 2, 0), [107.0, 108.0, 90.0, 95.0], 2.0),
            candle(Timeframe::Hour1, utc(2019, 7, 3, 3, 0), [95.0, 99.0, 94.0, 98.0], 3.0),
        ];

        let batched = batch_candles(date_from, date_to, Timeframe::Hour2, &input);

        assert_eq!(batched.len(), 2);
        let first = &batched[0];
        assert_eq!(first.time, date_from.timestamp_millis());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 120.0);
        assert_eq!(first.low, 98.0);
        assert_eq!(first.close, 107.0);
        assert_eq!(first.volume, 15.0);
        assert_eq!(first.candle_type, CandleType::Created);
        assert_eq!(batched[1].timeframe, Timeframe::Hour2);
    }

    #[test]
    fn test_batch_candles_skips_empty_windows_and_incomplete_tail() {
        let date_from = utc(2019, 7, 3, 0, 0);
        let date_to = utc(2019, 7, 3, 5, 0);
        // window 02:00-04:00 has no input, window 04:00-06:00 is incomplete
        let input = vec![
            candle(Timeframe::Hour1, utc(2019, 7, 3, 0, 0), [1.0, 2.0, 0.5, 1.5], 1.0),
            candle(Timeframe::Hour1, utc(2019, 7, 3, 1, 0), [1.5, 3.0, 1.0, 2.0], 1.0),
            candle(Timeframe::Hour1, utc(2019, 7, 3, 4, 0), [2.0, 2.5, 1.5, 2.2], 1.0),
        ];

        let batched = batch_candles(date_from, date_to, Timeframe::Hour2, &input);

        assert_eq!(batched.len(), 1);
        assert_eq!(batched[0].time, date_from.timestamp_millis());
    }

    #[test]
    fn test_batch_candles_zero_volume_marks_previous() {
        let date_from = utc(2019, 7, 3, 0, 0);
        let date_to = utc(2019, 7, 3, 2, 0);
        let mut gap = candle(Timeframe::Hour1, utc(2019, 7, 3, 0, 0), [1.0, 1.0, 1.0, 1.0], 0.0);
        gap.candle_type = CandleType::Previous;
        let mut gap2 = gap.clone();
        gap2.time = utc(2019, 7, 3, 1, 0).timestamp_millis();
        gap2.timestamp = utc(2019, 7, 3, 1, 0);

        let batched = batch_candles(date_from, date_to, Timeframe::Hour2, &[gap, gap2]);

        assert_eq!(batched.len(), 1);
        assert_eq!(batched[0].candle_type, CandleType::Previous);
    }

    #[test]
    fn test_candles_from_trades_buckets_and_dedupes() {
        let date_from = utc(2017, 1, 1, 0, 0);
        let date_to = utc(2017, 1, 1, 0, 10);
        let t0 = utc(2017, 1, 1, 0, 0);
        let trades = vec![
            trade(t0, 1_000, 100.0, 1.0, TradeSide::Buy),
            trade(t0, 1_000, 100.0, 1.0, TradeSide::Buy), // exact duplicate
            trade(t0, 30_000, 105.0, 2.0, TradeSide::Sell),
            trade(t0, 70_000, 95.0, 1.5, TradeSide::Buy), // second minute
            trade(t0, 601_000, 90.0, 1.0, TradeSide::Sell), // outside range
        ];

        let result = candles_from_trades(date_from, date_to, &[Timeframe::Min1, Timeframe::Min5], &trades);

        let minutes = &result[&Timeframe::Min1];
        assert_eq!(minutes.len(), 2);
        assert_eq!(minutes[0].open, 100.0);
        assert_eq!(minutes[0].high, 105.0);
        assert_eq!(minutes[0].close, 105.0);
        assert_eq!(minutes[0].volume, 3.0);
        assert_eq!(minutes[1].low, 95.0);

        let fives = &result[&Timeframe::Min5];
        assert_eq!(fives.len(), 1);
        assert_eq!(fives[0].volume, 4.5);
        assert_eq!(fives[0].time, t0.timestamp_millis());
    }

    #[test]
    fn test_candles_from_trades_empty_input() {
        let result = candles_from_trades(
            utc(2017, 1, 1, 0, 0),
            utc(2017, 1, 2, 0, 0),
            &[Timeframe::Hour1],
            &[],
        );
        assert!(result[&Timeframe::Hour1].is_empty());
    }
}
