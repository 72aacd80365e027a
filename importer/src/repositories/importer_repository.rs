use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use shared::{DbPool, ImportError};

use crate::importer::{CurrentState, ImportType, Importer, ImporterParams, Status};

use super::ImporterStore;

pub struct ImporterRepository {
    pool: Arc<DbPool>,
}

impl ImporterRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn from_json_str<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, ImportError> {
    serde_json::from_str(s).map_err(ImportError::from)
}

#[async_trait]
impl ImporterStore for ImporterRepository {
    async fn save(&self, importer: &Importer) -> Result<(), ImportError> {
        let params = serde_json::to_string(&importer.params)?;
        let current_state = importer
            .current_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO importers
                (id, exchange, asset, currency, type, params, status,
                 current_state, progress, started_at, ended_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                params = VALUES(params),
                status = VALUES(status),
                current_state = VALUES(current_state),
                progress = VALUES(progress),
                started_at = VALUES(started_at),
                ended_at = VALUES(ended_at),
                error = VALUES(error)
            "#,
        )
        .bind(importer.id.to_string())
        .bind(&importer.exchange)
        .bind(&importer.asset)
        .bind(&importer.currency)
        .bind(importer.import_type.as_str())
        .bind(params)
        .bind(importer.status.as_str())
        .bind(current_state)
        .bind(importer.progress)
        .bind(importer.started_at)
        .bind(importer.ended_at)
        .bind(&importer.error)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Importer>, ImportError> {
        let row = sqlx::query(
            r#"
            SELECT exchange, asset, currency, type, params, status,
                   current_state, progress, started_at, ended_at, error
            FROM importers
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let import_type: ImportType =
            from_json_str(&format!("\"{}\"", row.try_get::<String, _>("type")?))?;
        let status: Status =
            from_json_str(&format!("\"{}\"", row.try_get::<String, _>("status")?))?;
        let params: ImporterParams = from_json_str(&row.try_get::<String, _>("params")?)?;
        let current_state: Option<CurrentState> = row
            .try_get::<Option<String>, _>("current_state")?
            .map(|s| from_json_str(&s))
            .transpose()?;

        Ok(Some(Importer {
            id,
            exchange: row.try_get("exchange")?,
            asset: row.try_get("asset")?,
            currency: row.try_get("currency")?,
            import_type,
            params,
            status,
            current_state,
            progress: row.try_get("progress")?,
            started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
            ended_at: row.try_get::<Option<DateTime<Utc>>, _>("ended_at")?,
            error: row.try_get::<Option<String>, _>("error")?,
        }))
    }
}
