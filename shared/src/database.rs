use anyhow::Result;
use sqlx::MySqlPool;
use tracing::info;

pub async fn get_pool(database_url: &str) -> Result<MySqlPool> {
    info!("Connecting to database at: {}", database_url);
    let pool = MySqlPool::connect(database_url).await?;
    Ok(pool)
}

pub type DbPool = MySqlPool;
