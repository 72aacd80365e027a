use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use importer::importer::ImportType;
use importer::services::ImportRequest;
use importer::AppState;
use shared::Timeframe;

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_date(key: &str) -> Result<Option<DateTime<Utc>>> {
    env_opt(key)
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| anyhow!("invalid {key} {v}: {e}"))
        })
        .transpose()
}

fn request_from_env() -> Result<ImportRequest> {
    let import_type = match env_opt("IMPORT_TYPE").as_deref() {
        Some("history") => ImportType::History,
        Some("recent") | None => ImportType::Recent,
        Some(other) => return Err(anyhow!("invalid IMPORT_TYPE: {other}")),
    };
    let timeframes = env_opt("TIMEFRAMES")
        .unwrap_or_else(|| "1d".to_string())
        .split(',')
        .map(|label| {
            Timeframe::from_label(label.trim())
                .ok_or_else(|| anyhow!("invalid timeframe label: {label}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let amount = env_opt("AMOUNT")
        .map(|v| v.parse::<u32>().map_err(|e| anyhow!("invalid AMOUNT {v}: {e}")))
        .transpose()?;

    Ok(ImportRequest {
        exchange: env_opt("EXCHANGE").unwrap_or_else(|| "binance".to_string()),
        asset: env_opt("ASSET").unwrap_or_else(|| "BTC".to_string()),
        currency: env_opt("CURRENCY").unwrap_or_else(|| "USDT".to_string()),
        import_type,
        timeframes,
        amount,
        date_from: parse_date("DATE_FROM")?,
        date_to: parse_date("DATE_TO")?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting market-data importer...");

    let (app_state, mut streams) = AppState::new().await?;
    tracing::info!("AppState initialized");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(snapshot) = streams.progress.recv() => {
                    tracing::info!(
                        id = %snapshot.id,
                        progress = snapshot.progress,
                        status = snapshot.status.as_str(),
                        "import progress"
                    );
                }
                Some(event) = streams.status.recv() => {
                    tracing::info!(
                        id = %event.id,
                        status = event.status.as_str(),
                        error = event.error.as_deref().unwrap_or(""),
                        "import status"
                    );
                }
                else => break,
            }
        }
    });

    let request = request_from_env()?;
    let importer = app_state.service.execute(request).await?;
    tracing::info!(
        id = %importer.id,
        status = importer.status.as_str(),
        progress = importer.progress,
        "import run complete"
    );
    if let Some(error) = importer.error {
        return Err(anyhow!("import failed: {error}"));
    }
    Ok(())
}
