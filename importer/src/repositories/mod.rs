//! Persistence seams and their MySQL implementations.

pub mod candle_repository;
pub mod importer_repository;

use async_trait::async_trait;
use uuid::Uuid;

use shared::{ExchangeCandle, ImportError};

use crate::importer::Importer;

pub use candle_repository::CandleRepository;
pub use importer_repository::ImporterRepository;

/// Write side of the candle store. Upserts are idempotent: candles are
/// keyed by (time, exchange, asset, currency, timeframe) and a re-imported
/// chunk simply overwrites the same rows.
#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn upsert_candles(&self, candles: &[ExchangeCandle]) -> Result<(), ImportError>;
}

/// Snapshot persistence for import runs.
#[async_trait]
pub trait ImporterStore: Send + Sync {
    async fn save(&self, importer: &Importer) -> Result<(), ImportError>;
    async fn load(&self, id: Uuid) -> Result<Option<Importer>, ImportError>;
}
