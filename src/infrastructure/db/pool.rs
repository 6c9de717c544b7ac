use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use tracing::log::LevelFilter;

pub type DbPool = Pool<Postgres>;

/// Arbitrary key shared by every instance that bootstraps the schema.
const SCHEMA_LOCK_KEY: i64 = 0x766f_645f_6170_69;

pub async fn connect_to_db(connection_string: &str, acquire_timeout: Duration) -> Result<DbPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(connection_string)?
        .log_statements(LevelFilter::Debug);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(acquire_timeout)
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Creates the `videos` table if it does not exist yet.
///
/// Runs under a transaction-scoped advisory lock so several instances booting at
/// once do not trip over each other's `CREATE TABLE IF NOT EXISTS`.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id UUID PRIMARY KEY,
            title TEXT NOT NULL,
            source_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS videos_created_at_idx
            ON videos (created_at DESC, id DESC)
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("Schema ready");
    Ok(())
}
