//! Progress and status event channels.
//!
//! Workers push owned snapshots over unbounded `tokio::sync::mpsc`
//! channels; whoever drives the process (the binary, a test, a future job
//! queue adapter) holds the receiving halves. A dropped receiver silently
//! discards events, it never blocks or fails a run.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::importer::{ImportType, Importer, Status};

/// Terminal (or re-queued) run outcome notification.
#[derive(Debug, Clone, Serialize)]
pub struct ImporterStatusEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub import_type: ImportType,
    pub exchange: String,
    pub asset: String,
    pub currency: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImporterStatusEvent {
    pub fn from_importer(importer: &Importer) -> Self {
        Self {
            id: importer.id,
            import_type: importer.import_type,
            exchange: importer.exchange.clone(),
            asset: importer.asset.clone(),
            currency: importer.currency.clone(),
            status: importer.status,
            error: importer.error.clone(),
        }
    }
}

/// Sending half, cloned into every worker.
#[derive(Clone)]
pub struct ImporterEvents {
    progress: mpsc::UnboundedSender<Importer>,
    status: mpsc::UnboundedSender<ImporterStatusEvent>,
}

/// Receiving half, handed to the process driver.
pub struct ImporterStreams {
    pub progress: mpsc::UnboundedReceiver<Importer>,
    pub status: mpsc::UnboundedReceiver<ImporterStatusEvent>,
}

impl ImporterEvents {
    pub fn channel() -> (Self, ImporterStreams) {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        (
            Self {
                progress: progress_tx,
                status: status_tx,
            },
            ImporterStreams {
                progress: progress_rx,
                status: status_rx,
            },
        )
    }

    pub fn progress(&self, importer: &Importer) {
        let _ = self.progress.send(importer.clone());
    }

    pub fn status(&self, importer: &Importer) {
        let _ = self.status.send(ImporterStatusEvent::from_importer(importer));
    }
}
