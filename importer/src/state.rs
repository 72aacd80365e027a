use std::sync::Arc;

use shared::{get_pool, Config, DbPool};

use crate::connector::{BinanceConnector, ExchangeConnector};
use crate::repositories::{CandleRepository, ImporterRepository, ImporterStore};
use crate::services::{CancelFlags, ImportWorker, ImporterEvents, ImporterService, ImporterStreams};

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DbPool>,
    pub service: Arc<ImporterService>,
    pub cancel: CancelFlags,
}

impl AppState {
    pub async fn new() -> Result<(Self, ImporterStreams), anyhow::Error> {
        let config = Config::from_env()?;
        let pool = Arc::new(get_pool(&config.database_url).await?);
        tracing::info!("Connected to database successfully");

        let connector: Arc<dyn ExchangeConnector> = Arc::new(BinanceConnector::new());
        let candles = Arc::new(CandleRepository::new(Arc::clone(&pool)));
        let importers: Arc<ImporterRepository> =
            Arc::new(ImporterRepository::new(Arc::clone(&pool)));
        let (events, streams) = ImporterEvents::channel();
        let cancel = CancelFlags::new();

        let worker = Arc::new(ImportWorker::new(
            connector,
            candles,
            importers.clone(),
            events,
            cancel.clone(),
            config.import_concurrency,
            config.history_empty_response,
        ));
        let importer_store: Arc<dyn ImporterStore> = importers;
        let service = Arc::new(ImporterService::new(worker, importer_store, cancel.clone()));

        Ok((
            AppState {
                pool,
                service,
                cancel,
            },
            streams,
        ))
    }
}
