//! The import run state machine.
//!
//! An [`Importer`] is a plain serializable struct: persisting it after every
//! state-changing step and reconstructing it from the stored snapshot is the
//! whole crash-recovery mechanism. Remaining work is always re-derived as
//! the `loaded == false` subset of the chunk lists.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{ImportError, Timeframe};

use super::chunks;

/// Default bar count for `recent` imports when none was requested.
pub const CANDLES_RECENT_AMOUNT: u32 = 300;

/// Exchanges whose candle history is only available as raw trade ticks.
const TICK_EXCHANGES: [&str; 1] = ["kraken"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    History,
    Recent,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::History => "history",
            ImportType::Recent => "recent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Started,
    Finished,
    Failed,
    Canceled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Started => "started",
            Status::Finished => "finished",
            Status::Failed => "failed",
            Status::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterParams {
    pub timeframes: Vec<Timeframe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
}

/// A bounded, independently retriable slice of a trades sub-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesChunk {
    pub id: u32,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub loaded: bool,
}

/// A bounded, independently retriable slice of a candles sub-state.
/// `limit` is the number of bars the chunk spans at the timeframe the
/// connector is asked for (the sub-state's `load_timeframe`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlesChunk {
    pub id: u32,
    pub timeframe: Timeframe,
    pub limit: u32,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesSubState {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub loaded: bool,
    pub chunks: Vec<TradesChunk>,
}

/// Per-timeframe candle import progress. When the exchange does not
/// natively support `timeframe`, `load_timeframe` holds the supported
/// divisor timeframe to fetch instead; fetched candles are then batched
/// back up to `timeframe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlesSubState {
    pub timeframe: Timeframe,
    pub load_timeframe: Timeframe,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub loaded: bool,
    pub chunks: Vec<CandlesChunk>,
}

impl CandlesSubState {
    pub fn needs_batching(&self) -> bool {
        self.load_timeframe != self.timeframe
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentState {
    Trades(TradesSubState),
    Candles(BTreeMap<Timeframe, CandlesSubState>),
}

/// The aggregate root of one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Importer {
    pub id: Uuid,
    pub exchange: String,
    pub asset: String,
    pub currency: String,
    #[serde(rename = "type")]
    pub import_type: ImportType,
    pub params: ImporterParams,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<CurrentState>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Importer {
    pub fn new(
        id: Uuid,
        exchange: String,
        asset: String,
        currency: String,
        import_type: ImportType,
        params: ImporterParams,
    ) -> Self {
        Self {
            id,
            exchange,
            asset,
            currency,
            import_type,
            params,
            status: Status::Queued,
            current_state: None,
            progress: 0,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.params.timeframes.is_empty() {
            return Err(ImportError::Validation(
                "at least one timeframe is required".to_string(),
            ));
        }
        match self.import_type {
            ImportType::History => {
                let date_from = self.params.date_from.ok_or_else(|| {
                    ImportError::Validation("dateFrom is required for history imports".to_string())
                })?;
                let date_to = self.params.date_to.ok_or_else(|| {
                    ImportError::Validation("dateTo is required for history imports".to_string())
                })?;
                if date_from >= date_to {
                    return Err(ImportError::Validation(format!(
                        "dateFrom {date_from} must be before dateTo {date_to}"
                    )));
                }
            }
            ImportType::Recent => {
                if self.params.amount.unwrap_or(CANDLES_RECENT_AMOUNT) == 0 {
                    return Err(ImportError::Validation(
                        "amount must be positive for recent imports".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// History on a tick-oriented exchange is imported from raw trades.
    pub fn uses_trades(&self) -> bool {
        self.import_type == ImportType::History && TICK_EXCHANGES.contains(&self.exchange.as_str())
    }

    /// Computes the sub-states from the import parameters. No-op when the
    /// importer was reconstructed from a snapshot that already has them.
    pub fn init(&mut self, now: DateTime<Utc>) -> Result<(), ImportError> {
        self.validate()?;
        if self.current_state.is_some() {
            return Ok(());
        }
        self.current_state = Some(if self.uses_trades() {
            CurrentState::Trades(chunks::plan_trades_state(&self.params, now))
        } else {
            CurrentState::Candles(chunks::plan_candles_states(
                self.import_type,
                &self.params,
                now,
            ))
        });
        Ok(())
    }

    /// Populates the chunk lists, honoring the exchange's per-call limit
    /// and native timeframe set. Sub-states that already have chunks (a
    /// resumed run) are left untouched.
    pub fn create_chunks(
        &mut self,
        exchange_timeframes: &HashMap<String, u32>,
    ) -> Result<(), ImportError> {
        let exchange = self.exchange.clone();
        match &mut self.current_state {
            Some(CurrentState::Trades(sub)) => {
                if !sub.loaded && sub.chunks.is_empty() {
                    chunks::plan_trades_chunks(sub);
                }
                Ok(())
            }
            Some(CurrentState::Candles(map)) => {
                for sub in map.values_mut() {
                    if !sub.loaded && sub.chunks.is_empty() {
                        chunks::plan_candles_chunks(&exchange, exchange_timeframes, sub)?;
                    }
                }
                Ok(())
            }
            None => Err(ImportError::Validation(
                "importer is not initialized".to_string(),
            )),
        }
    }

    /// Enters `started`, recording `started_at` only once so replays keep
    /// the original start time.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = Status::Started;
        self.started_at.get_or_insert(now);
    }

    /// The only path to a terminal non-failed state. A prior `fail` wins;
    /// `cancel` forces `canceled`; otherwise `finished` requires every
    /// sub-state to be fully loaded, else the run goes back to `queued`
    /// for the owning scheduler to re-run.
    pub fn finish(&mut self, cancel: bool, now: DateTime<Utc>) {
        if self.status == Status::Failed {
            return;
        }
        if cancel {
            self.status = Status::Canceled;
            self.ended_at = Some(now);
            return;
        }
        if self.is_loaded() {
            self.status = Status::Finished;
            self.ended_at = Some(now);
        } else {
            self.status = Status::Queued;
        }
    }

    /// Terminal failure; the first recorded message wins.
    pub fn fail(&mut self, message: String) {
        self.status = Status::Failed;
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    pub fn is_started(&self) -> bool {
        self.status == Status::Started
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    pub fn is_finished(&self) -> bool {
        self.status == Status::Finished
    }

    pub fn is_loaded(&self) -> bool {
        match &self.current_state {
            Some(CurrentState::Trades(sub)) => sub.loaded,
            Some(CurrentState::Candles(map)) => map.values().all(|s| s.loaded),
            None => false,
        }
    }

    /// Remaining candle work: the `loaded == false` chunks of every
    /// unfinished sub-state.
    pub fn candles_chunks(&self) -> Vec<CandlesChunk> {
        match &self.current_state {
            Some(CurrentState::Candles(map)) => map
                .values()
                .filter(|sub| !sub.loaded)
                .flat_map(|sub| sub.chunks.iter().filter(|c| !c.loaded).cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Remaining trades work.
    pub fn trades_chunks(&self) -> Vec<TradesChunk> {
        match &self.current_state {
            Some(CurrentState::Trades(sub)) if !sub.loaded => {
                sub.chunks.iter().filter(|c| !c.loaded).cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// The timeframe the connector is asked for, per requested timeframe.
    pub fn load_timeframes(&self) -> HashMap<Timeframe, Timeframe> {
        match &self.current_state {
            Some(CurrentState::Candles(map)) => map
                .values()
                .map(|sub| (sub.timeframe, sub.load_timeframe))
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// Marks a candle chunk loaded (idempotent) and recomputes progress.
    /// Returns whether the reported progress changed.
    pub fn set_candles_progress(
        &mut self,
        timeframe: Timeframe,
        chunk_id: u32,
    ) -> Result<bool, ImportError> {
        let Some(CurrentState::Candles(map)) = &mut self.current_state else {
            return Err(ImportError::Validation(
                "importer has no candles state".to_string(),
            ));
        };
        let sub = map.get_mut(&timeframe).ok_or_else(|| {
            ImportError::Validation(format!("unknown timeframe sub-state: {timeframe}"))
        })?;
        let chunk = sub
            .chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .ok_or_else(|| {
                ImportError::Validation(format!("unknown {timeframe} chunk: {chunk_id}"))
            })?;
        chunk.loaded = true;
        if sub.chunks.iter().all(|c| c.loaded) {
            sub.loaded = true;
        }
        Ok(self.recalc_progress())
    }

    /// Marks a trades chunk loaded (idempotent) and recomputes progress.
    pub fn set_trades_progress(&mut self, chunk_id: u32) -> Result<bool, ImportError> {
        let Some(CurrentState::Trades(sub)) = &mut self.current_state else {
            return Err(ImportError::Validation(
                "importer has no trades state".to_string(),
            ));
        };
        let chunk = sub
            .chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .ok_or_else(|| ImportError::Validation(format!("unknown trades chunk: {chunk_id}")))?;
        chunk.loaded = true;
        if sub.chunks.iter().all(|c| c.loaded) {
            sub.loaded = true;
        }
        Ok(self.recalc_progress())
    }

    fn recalc_progress(&mut self) -> bool {
        let (loaded, total) = match &self.current_state {
            Some(CurrentState::Trades(sub)) => (
                sub.chunks.iter().filter(|c| c.loaded).count(),
                sub.chunks.len(),
            ),
            Some(CurrentState::Candles(map)) => (
                map.values()
                    .flat_map(|s| &s.chunks)
                    .filter(|c| c.loaded)
                    .count(),
                map.values().map(|s| s.chunks.len()).sum(),
            ),
            None => (0, 0),
        };
        let progress = if total == 0 {
            if self.is_loaded() {
                100
            } else {
                0
            }
        } else if loaded == total {
            100
        } else {
            // rounding must never report 100 for a partially loaded run
            (((loaded as f64 / total as f64) * 100.0).round() as u8).min(99)
        };
        let changed = progress != self.progress;
        self.progress = progress;
        changed
    }
}
