//! Scheduling surface for import runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::{ImportError, Timeframe};

use crate::importer::{state::CANDLES_RECENT_AMOUNT, ImportType, Importer, ImporterParams, Status};
use crate::repositories::ImporterStore;

use super::{CancelFlags, ImportWorker};

/// What a caller asks to import.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub exchange: String,
    pub asset: String,
    pub currency: String,
    pub import_type: ImportType,
    pub timeframes: Vec<Timeframe>,
    pub amount: Option<u32>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// The in-process surface an external scheduler or API front door would
/// call: start new runs, resume persisted ones, cancel running ones.
pub struct ImporterService {
    worker: Arc<ImportWorker>,
    importers: Arc<dyn ImporterStore>,
    cancel: CancelFlags,
}

impl ImporterService {
    pub fn new(
        worker: Arc<ImportWorker>,
        importers: Arc<dyn ImporterStore>,
        cancel: CancelFlags,
    ) -> Self {
        Self {
            worker,
            importers,
            cancel,
        }
    }

    fn build_importer(request: ImportRequest) -> Importer {
        let amount = match request.import_type {
            ImportType::Recent => Some(request.amount.unwrap_or(CANDLES_RECENT_AMOUNT)),
            ImportType::History => request.amount,
        };
        Importer::new(
            Uuid::new_v4(),
            request.exchange,
            request.asset,
            request.currency,
            request.import_type,
            ImporterParams {
                timeframes: request.timeframes,
                amount,
                date_from: request.date_from,
                date_to: request.date_to,
            },
        )
    }

    /// Validates the request, persists a `queued` snapshot and spawns the
    /// run. Returns the importer id.
    pub async fn start(&self, request: ImportRequest) -> Result<Uuid, ImportError> {
        let importer = Self::build_importer(request);
        importer.validate()?;
        let id = importer.id;
        self.importers.save(&importer).await?;
        self.spawn(importer);
        Ok(id)
    }

    /// Validates and runs the request inline, returning the terminal
    /// snapshot. Used by the one-shot binary.
    pub async fn execute(&self, request: ImportRequest) -> Result<Importer, ImportError> {
        let importer = Self::build_importer(request);
        importer.validate()?;
        self.importers.save(&importer).await?;
        self.worker.run(importer).await
    }

    /// Re-runs a persisted importer; chunks already marked loaded are not
    /// fetched again.
    pub async fn resume(&self, id: Uuid) -> Result<(), ImportError> {
        let Some(mut importer) = self.importers.load(id).await? else {
            return Err(ImportError::Validation(format!("importer {id} not found")));
        };
        if importer.is_finished() {
            tracing::info!(id = %id, "importer already finished");
            return Ok(());
        }
        importer.status = Status::Queued;
        importer.error = None;
        self.spawn(importer);
        Ok(())
    }

    /// Requests cooperative cancellation; the worker stops dispatching new
    /// chunks and finishes the run as `canceled`.
    pub fn cancel(&self, id: Uuid) {
        tracing::info!(id = %id, "cancel requested");
        self.cancel.set(id);
    }

    fn spawn(&self, importer: Importer) {
        let worker = Arc::clone(&self.worker);
        tokio::spawn(async move {
            if let Err(e) = worker.run(importer).await {
                tracing::error!(error = %e, "import run aborted");
            }
        });
    }
}
