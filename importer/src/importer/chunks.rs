//! Sub-state and chunk planning.
//!
//! Planning is pure arithmetic over half-open, timeframe-aligned date
//! ranges: sub-states pin down what each timeframe needs, chunks split
//! that into connector-sized slices. Both are computed once and then only
//! consumed, so a resumed run never re-plans finished work.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use shared::{chunk_date_range, load_limit, ImportError, Timeframe};

use super::state::{
    CandlesChunk, CandlesSubState, ImportType, ImporterParams, TradesChunk, TradesSubState,
    CANDLES_RECENT_AMOUNT,
};

/// Range covering the requested candle window; trades are fetched day by
/// day, with the final chunk allowed to be a partial day. The requested
/// `date_to` is kept as-is (minute-floored, capped at now) so a mid-day
/// bound never pulls in trades past what the caller asked for.
pub fn plan_trades_state(params: &ImporterParams, now: DateTime<Utc>) -> TradesSubState {
    let date_from = Timeframe::Day1.floor(params.date_from.unwrap_or(now));
    let date_to = Timeframe::Min1
        .floor(params.date_to.unwrap_or(now))
        .min(Timeframe::Min1.floor(now));
    TradesSubState {
        date_from,
        date_to,
        loaded: date_from >= date_to,
        chunks: Vec::new(),
    }
}

/// Per-timeframe candle ranges. History ranges shrink to the bars fully
/// inside `[date_from, date_to)` and never extend past the last closed bar;
/// recent ranges end at the last closed bar and reach back `amount` bars.
pub fn plan_candles_states(
    import_type: ImportType,
    params: &ImporterParams,
    now: DateTime<Utc>,
) -> BTreeMap<Timeframe, CandlesSubState> {
    params
        .timeframes
        .iter()
        .map(|&timeframe| {
            let (date_from, date_to) = match import_type {
                ImportType::History => {
                    let from = timeframe.ceil(params.date_from.unwrap_or(now));
                    let to = timeframe
                        .floor(params.date_to.unwrap_or(now))
                        .min(timeframe.floor(now));
                    (from, to)
                }
                ImportType::Recent => {
                    let amount = params.amount.unwrap_or(CANDLES_RECENT_AMOUNT);
                    let to = timeframe.floor(now);
                    let from = to - chrono::Duration::milliseconds(
                        timeframe.duration_ms() * amount as i64,
                    );
                    (from, to)
                }
            };
            (
                timeframe,
                CandlesSubState {
                    timeframe,
                    load_timeframe: timeframe,
                    date_from,
                    date_to,
                    loaded: date_from >= date_to,
                    chunks: Vec::new(),
                },
            )
        })
        .collect()
}

/// One chunk per day (the last one may cover a partial day); trade volume
/// per call is unbounded, so paging within a day is left to the connector.
pub fn plan_trades_chunks(sub: &mut TradesSubState) {
    sub.chunks = chunk_date_range(sub.date_from, sub.date_to, Timeframe::Day1, 1)
        .into_iter()
        .enumerate()
        .map(|(id, range)| TradesChunk {
            id: id as u32,
            date_from: range.date_from,
            date_to: range.date_to,
            loaded: false,
        })
        .collect();
    if sub.chunks.is_empty() {
        sub.loaded = true;
    }
}

/// Resolves the timeframe to actually fetch and splits the sub-state range
/// so no chunk asks the connector for more than its per-call limit.
///
/// When the exchange does not support the requested timeframe natively, the
/// largest supported divisor is fetched instead and the per-chunk span is
/// scaled down by the ratio, keeping every call under the exchange limit.
pub fn plan_candles_chunks(
    exchange: &str,
    exchange_timeframes: &HashMap<String, u32>,
    sub: &mut CandlesSubState,
) -> Result<(), ImportError> {
    let native: Vec<Timeframe> = exchange_timeframes
        .values()
        .filter_map(|&minutes| Timeframe::try_from(minutes).ok())
        .collect();

    let load_timeframe = if native.contains(&sub.timeframe) {
        sub.timeframe
    } else {
        native
            .iter()
            .copied()
            .filter(|tf| {
                tf.minutes() < sub.timeframe.minutes()
                    && sub.timeframe.minutes() % tf.minutes() == 0
            })
            .max()
            .ok_or_else(|| {
                ImportError::Validation(format!(
                    "exchange {exchange} has no timeframe usable to load {}",
                    sub.timeframe
                ))
            })?
    };
    sub.load_timeframe = load_timeframe;

    let ratio = sub.timeframe.minutes() / load_timeframe.minutes();
    let span_limit = (load_limit(exchange) / ratio).max(1);

    sub.chunks = chunk_date_range(sub.date_from, sub.date_to, sub.timeframe, span_limit)
        .into_iter()
        .enumerate()
        .map(|(id, range)| CandlesChunk {
            id: id as u32,
            timeframe: sub.timeframe,
            limit: load_timeframe.bars_between(range.date_from, range.date_to) as u32,
            date_from: range.date_from,
            date_to: range.date_to,
            loaded: false,
        })
        .collect();
    if sub.chunks.is_empty() {
        sub.loaded = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn timeframes(labels: &[(&str, u32)]) -> HashMap<String, u32> {
        labels
            .iter()
            .map(|&(k, v)| (k.to_string(), v))
            .collect()
    }

    fn history_params(from: DateTime<Utc>, to: DateTime<Utc>) -> ImporterParams {
        ImporterParams {
            timeframes: vec![Timeframe::Hour1],
            amount: None,
            date_from: Some(from),
            date_to: Some(to),
        }
    }

    #[test]
    fn test_history_range_snaps_inward() {
        let params = ImporterParams {
            timeframes: vec![Timeframe::Hour1],
            amount: None,
            date_from: Some(utc(2017, 1, 1, 0, 30)),
            date_to: Some(utc(2017, 1, 29, 23, 30)),
        };
        let states = plan_candles_states(ImportType::History, &params, utc(2017, 2, 1, 0, 0));
        let sub = &states[&Timeframe::Hour1];
        assert_eq!(sub.date_from, utc(2017, 1, 1, 1, 0));
        assert_eq!(sub.date_to, utc(2017, 1, 29, 23, 0));
    }

    #[test]
    fn test_recent_range_counts_back_from_last_closed_bar() {
        let params = ImporterParams {
            timeframes: vec![Timeframe::Hour1],
            amount: Some(100),
            date_from: None,
            date_to: None,
        };
        let states = plan_candles_states(ImportType::Recent, &params, utc(2017, 1, 29, 1, 17));
        let sub = &states[&Timeframe::Hour1];
        assert_eq!(sub.date_to, utc(2017, 1, 29, 1, 0));
        assert_eq!(Timeframe::Hour1.bars_between(sub.date_from, sub.date_to), 100);
    }

    #[test]
    fn test_native_timeframe_chunks_honor_load_limit() {
        let params = history_params(utc(2017, 1, 1, 0, 0), utc(2017, 3, 1, 0, 0));
        let mut states = plan_candles_states(ImportType::History, &params, utc(2017, 4, 1, 0, 0));
        let sub = states.get_mut(&Timeframe::Hour1).unwrap();
        plan_candles_chunks("binance", &timeframes(&[("1h", 60)]), sub).unwrap();

        assert_eq!(sub.load_timeframe, Timeframe::Hour1);
        // 59 days of hourly bars = 1416, binance limit 900 -> 2 chunks
        assert_eq!(sub.chunks.len(), 2);
        assert_eq!(sub.chunks[0].limit, 900);
        assert_eq!(sub.chunks[1].limit, 516);
        assert_eq!(sub.chunks[0].date_to, sub.chunks[1].date_from);
        assert_eq!(sub.chunks[0].date_from, sub.date_from);
        assert_eq!(sub.chunks[1].date_to, sub.date_to);
    }

    #[test]
    fn test_unsupported_timeframe_falls_back_to_largest_divisor() {
        let params = ImporterParams {
            timeframes: vec![Timeframe::Hour2],
            amount: None,
            date_from: Some(utc(2017, 1, 1, 0, 0)),
            date_to: Some(utc(2017, 3, 1, 0, 0)),
        };
        let mut states = plan_candles_states(ImportType::History, &params, utc(2017, 4, 1, 0, 0));
        let sub = states.get_mut(&Timeframe::Hour2).unwrap();
        plan_candles_chunks(
            "binance",
            &timeframes(&[("1m", 1), ("15m", 15), ("30m", 30), ("1h", 60)]),
            sub,
        )
        .unwrap();

        assert_eq!(sub.load_timeframe, Timeframe::Hour1);
        // span limit halves: 450 two-hour bars = 900 hourly bars per call
        for chunk in &sub.chunks {
            assert!(Timeframe::Hour2.bars_between(chunk.date_from, chunk.date_to) <= 450);
            assert!(chunk.limit <= 900);
            assert_eq!(
                chunk.limit as i64,
                Timeframe::Hour1.bars_between(chunk.date_from, chunk.date_to)
            );
        }
    }

    #[test]
    fn test_no_usable_timeframe_is_an_error() {
        let params = ImporterParams {
            timeframes: vec![Timeframe::Min5],
            amount: None,
            date_from: Some(utc(2017, 1, 1, 0, 0)),
            date_to: Some(utc(2017, 1, 2, 0, 0)),
        };
        let mut states = plan_candles_states(ImportType::History, &params, utc(2017, 2, 1, 0, 0));
        let sub = states.get_mut(&Timeframe::Min5).unwrap();
        let err = plan_candles_chunks("odd", &timeframes(&[("30m", 30)]), sub);
        assert!(matches!(err, Err(ImportError::Validation(_))));
    }

    #[test]
    fn test_trades_chunks_are_single_days() {
        let params = history_params(utc(2017, 1, 1, 0, 0), utc(2017, 1, 8, 0, 0));
        let mut sub = plan_trades_state(&params, utc(2017, 2, 1, 0, 0));
        plan_trades_chunks(&mut sub);

        assert_eq!(sub.chunks.len(), 7);
        for (i, chunk) in sub.chunks.iter().enumerate() {
            assert_eq!(chunk.id, i as u32);
            assert_eq!(
                Timeframe::Day1.bars_between(chunk.date_from, chunk.date_to),
                1
            );
        }
    }

    #[test]
    fn test_trades_range_keeps_mid_day_date_to() {
        let params = ImporterParams {
            timeframes: vec![Timeframe::Hour1],
            amount: None,
            date_from: Some(utc(2017, 1, 1, 0, 0)),
            date_to: Some(utc(2017, 1, 8, 13, 37)),
        };
        let mut sub = plan_trades_state(&params, utc(2017, 2, 1, 0, 0));
        assert_eq!(sub.date_to, utc(2017, 1, 8, 13, 37));

        plan_trades_chunks(&mut sub);
        // 7 whole days plus a partial final chunk ending at the bound
        assert_eq!(sub.chunks.len(), 8);
        let last = &sub.chunks[sub.chunks.len() - 1];
        assert_eq!(last.date_from, utc(2017, 1, 8, 0, 0));
        assert_eq!(last.date_to, utc(2017, 1, 8, 13, 37));
        for pair in sub.chunks.windows(2) {
            assert_eq!(pair[0].date_to, pair[1].date_from);
        }
    }

    #[test]
    fn test_empty_range_is_immediately_loaded() {
        let now = utc(2017, 1, 1, 0, 30);
        // history entirely in the future relative to now
        let params = history_params(utc(2017, 6, 1, 0, 0), utc(2017, 7, 1, 0, 0));
        let states = plan_candles_states(ImportType::History, &params, now);
        assert!(states[&Timeframe::Hour1].loaded);

        let mut trades = plan_trades_state(&params, now);
        assert!(trades.loaded);
        plan_trades_chunks(&mut trades);
        assert!(trades.chunks.is_empty());
        assert!(trades.loaded);
    }
}
