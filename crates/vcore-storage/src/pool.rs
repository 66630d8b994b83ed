//! Connection pool construction and embedded schema migration.

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::StorageResult;

/// Connects a pool against `database_url` and applies the embedded
/// migrations, standing up the §3 schema this gateway assumes.
pub async fn connect(database_url: &str) -> StorageResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
