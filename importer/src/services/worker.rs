//! The worker pipeline driving one import run to a terminal state.
//!
//! Chunks are pulled through a bounded `buffer_unordered` fan-out. A
//! failed chunk marks the run failed but the stream keeps draining, so
//! every already-dispatched fetch still lands in the store; persistence
//! errors abort the run and propagate to the caller.

use std::sync::Arc;

use chrono::Utc;
use futures::{future, stream, StreamExt};

use shared::{
    batch_candles, candles_from_trades, fill_gaps, ms_to_utc, EmptyResponsePolicy, ExchangeCandle,
    ImportError, Timeframe,
};

use crate::connector::ExchangeConnector;
use crate::importer::{CandlesChunk, ImportType, Importer, TradesChunk};
use crate::repositories::{CandleStore, ImporterStore};

use super::{CancelFlags, ImporterEvents};

pub struct ImportWorker {
    connector: Arc<dyn ExchangeConnector>,
    candles: Arc<dyn CandleStore>,
    importers: Arc<dyn ImporterStore>,
    events: ImporterEvents,
    cancel: CancelFlags,
    concurrency: usize,
    history_empty_response: EmptyResponsePolicy,
}

impl ImportWorker {
    pub fn new(
        connector: Arc<dyn ExchangeConnector>,
        candles: Arc<dyn CandleStore>,
        importers: Arc<dyn ImporterStore>,
        events: ImporterEvents,
        cancel: CancelFlags,
        concurrency: usize,
        history_empty_response: EmptyResponsePolicy,
    ) -> Self {
        Self {
            connector,
            candles,
            importers,
            events,
            cancel,
            concurrency: concurrency.max(1),
            history_empty_response,
        }
    }

    /// Drives the importer to a terminal state and returns its final
    /// snapshot. Planning and chunk errors become a `failed` importer;
    /// only persistence errors (and internal inconsistencies) bubble up.
    pub async fn run(&self, mut importer: Importer) -> Result<Importer, ImportError> {
        let outcome = self.drive(&mut importer).await;
        // the flag is consumed even when a mid-run save bails out, so a
        // later resume of the same id starts unflagged
        self.cancel.clear(importer.id);
        outcome?;
        Ok(importer)
    }

    async fn drive(&self, importer: &mut Importer) -> Result<(), ImportError> {
        let now = Utc::now();
        let planned = match self.connector.get_timeframes().await {
            Ok(timeframes) => importer
                .init(now)
                .and_then(|_| importer.create_chunks(&timeframes)),
            Err(e) => Err(e),
        };

        match planned {
            Ok(()) => {
                importer.start(now);
                self.importers.save(importer).await?;
                self.events.progress(importer);
                tracing::info!(
                    id = %importer.id,
                    exchange = %importer.exchange,
                    asset = %importer.asset,
                    currency = %importer.currency,
                    import_type = importer.import_type.as_str(),
                    "import started"
                );
                if importer.uses_trades() {
                    self.import_trades(importer).await?;
                } else {
                    self.import_candles(importer).await?;
                }
                let cancelled = self.cancel.is_set(importer.id);
                importer.finish(cancelled, Utc::now());
            }
            Err(e) => {
                tracing::error!(id = %importer.id, error = %e, "import planning failed");
                importer.fail(e.to_string());
            }
        }

        self.importers.save(importer).await?;
        self.events.status(importer);
        tracing::info!(
            id = %importer.id,
            status = importer.status.as_str(),
            progress = importer.progress,
            "import ended"
        );
        Ok(())
    }

    async fn import_candles(&self, importer: &mut Importer) -> Result<(), ImportError> {
        let chunks = importer.candles_chunks();
        if chunks.is_empty() {
            return Ok(());
        }
        let load_timeframes = importer.load_timeframes();
        let id = importer.id;
        let asset = importer.asset.clone();
        let currency = importer.currency.clone();
        let policy = match importer.import_type {
            ImportType::Recent => EmptyResponsePolicy::Tolerate,
            ImportType::History => self.history_empty_response,
        };

        let mut results = stream::iter(chunks)
            .take_while(|_| future::ready(!self.cancel.is_set(id)))
            .map(|chunk| {
                let asset = asset.clone();
                let currency = currency.clone();
                let load_timeframe = load_timeframes
                    .get(&chunk.timeframe)
                    .copied()
                    .unwrap_or(chunk.timeframe);
                async move {
                    let result = self
                        .load_candles_chunk(&asset, &currency, load_timeframe, policy, &chunk)
                        .await;
                    (chunk, result)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((chunk, result)) = results.next().await {
            match result {
                Ok(candles) => {
                    self.candles.upsert_candles(&candles).await?;
                    let changed = importer.set_candles_progress(chunk.timeframe, chunk.id)?;
                    self.importers.save(importer).await?;
                    if changed {
                        self.events.progress(importer);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        id = %id,
                        timeframe = %chunk.timeframe,
                        chunk = chunk.id,
                        error = %e,
                        "candles chunk failed"
                    );
                    importer.fail(e.to_string());
                }
            }
        }
        Ok(())
    }

    async fn import_trades(&self, importer: &mut Importer) -> Result<(), ImportError> {
        let chunks = importer.trades_chunks();
        if chunks.is_empty() {
            return Ok(());
        }
        let id = importer.id;
        let asset = importer.asset.clone();
        let currency = importer.currency.clone();
        let timeframes = importer.params.timeframes.clone();

        let mut results = stream::iter(chunks)
            .take_while(|_| future::ready(!self.cancel.is_set(id)))
            .map(|chunk| {
                let asset = asset.clone();
                let currency = currency.clone();
                let timeframes = timeframes.clone();
                async move {
                    let result = self
                        .load_trades_chunk(&asset, &currency, &timeframes, &chunk)
                        .await;
                    (chunk, result)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((chunk, result)) = results.next().await {
            match result {
                Ok(candles) => {
                    self.candles.upsert_candles(&candles).await?;
                    let changed = importer.set_trades_progress(chunk.id)?;
                    self.importers.save(importer).await?;
                    if changed {
                        self.events.progress(importer);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        id = %id,
                        chunk = chunk.id,
                        error = %e,
                        "trades chunk failed"
                    );
                    importer.fail(e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Fetches one candle chunk and shapes it for storage: validate,
    /// window to the chunk range, fill gaps and batch up when the
    /// timeframe was substituted at planning time.
    async fn load_candles_chunk(
        &self,
        asset: &str,
        currency: &str,
        load_timeframe: Timeframe,
        policy: EmptyResponsePolicy,
        chunk: &CandlesChunk,
    ) -> Result<Vec<ExchangeCandle>, ImportError> {
        let candles = self
            .connector
            .get_candles(asset, currency, load_timeframe, chunk.date_from, chunk.limit)
            .await?;

        if candles.is_empty() {
            return match policy {
                EmptyResponsePolicy::Tolerate => {
                    tracing::warn!(
                        timeframe = %chunk.timeframe,
                        date_from = %chunk.date_from,
                        "no candles returned for chunk"
                    );
                    Ok(Vec::new())
                }
                EmptyResponsePolicy::Fail => Err(ImportError::EmptyResponse(format!(
                    "no {} candles returned from {}",
                    chunk.timeframe, chunk.date_from
                ))),
            };
        }

        for candle in &candles {
            if candle.timeframe != load_timeframe {
                return Err(ImportError::WrongResponseShape(format!(
                    "expected {} candles, got {}",
                    load_timeframe, candle.timeframe
                )));
            }
            let values = [
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            ];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ImportError::WrongResponseShape(format!(
                    "non-finite ohlcv value at {}",
                    candle.time
                )));
            }
        }

        let from = chunk.date_from.timestamp_millis();
        let to = chunk.date_to.timestamp_millis();
        let in_range: Vec<ExchangeCandle> = candles
            .into_iter()
            .filter(|c| c.time >= from && c.time < to)
            .collect();

        let filled = fill_gaps(chunk.date_from, chunk.date_to, &in_range);
        if load_timeframe != chunk.timeframe {
            Ok(batch_candles(
                chunk.date_from,
                chunk.date_to,
                chunk.timeframe,
                &filled,
            ))
        } else {
            Ok(filled)
        }
    }

    /// Pages trades through the chunk's day, aggregates them into candles
    /// for every requested timeframe and gap-fills each series.
    async fn load_trades_chunk(
        &self,
        asset: &str,
        currency: &str,
        timeframes: &[Timeframe],
        chunk: &TradesChunk,
    ) -> Result<Vec<ExchangeCandle>, ImportError> {
        let to = chunk.date_to.timestamp_millis();
        let mut trades = Vec::new();
        let mut cursor = chunk.date_from;
        loop {
            let page = self.connector.get_trades(asset, currency, cursor).await?;
            let Some(last) = page.last() else {
                break;
            };
            let last_time = last.time;
            trades.extend(page.into_iter().filter(|t| t.time < to));
            if last_time + 1 >= to {
                break;
            }
            cursor = ms_to_utc(last_time + 1);
        }

        if trades.is_empty() {
            return match self.history_empty_response {
                EmptyResponsePolicy::Tolerate => {
                    tracing::warn!(date_from = %chunk.date_from, "no trades returned for chunk");
                    Ok(Vec::new())
                }
                EmptyResponsePolicy::Fail => Err(ImportError::EmptyResponse(format!(
                    "no trades returned from {}",
                    chunk.date_from
                ))),
            };
        }

        let by_timeframe = candles_from_trades(chunk.date_from, chunk.date_to, timeframes, &trades);
        let mut result = Vec::new();
        for candles in by_timeframe.values() {
            result.extend(fill_gaps(chunk.date_from, chunk.date_to, candles));
        }
        Ok(result)
    }
}
