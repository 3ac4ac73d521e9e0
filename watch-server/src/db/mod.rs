//! Postgres persistence layer
//!
//! Thin query modules over `sqlx`; schema lives in `migrations/`. Callers
//! treat this layer as an opaque append + upsert log — registry state is
//! authoritative in memory and only mirrored here.

pub mod alerts;
pub mod history;
pub mod stores;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bounded pool; heartbeat transactions are short.
const MAX_CONNECTIONS: u32 = 10;

/// Initial retry delay when the database is unreachable at boot.
const INITIAL_RETRY_DELAY_SECS: u64 = 1;
/// Cap for the boot retry backoff.
const MAX_RETRY_DELAY_SECS: u64 = 30;

/// Connect and run migrations, retrying with exponential backoff while the
/// database is unreachable at boot.
pub async fn connect(database_url: &str, max_attempts: u32) -> Result<PgPool, BoxError> {
    let mut delay = Duration::from_secs(INITIAL_RETRY_DELAY_SECS);

    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!(attempt, "Database connected, migrations applied");
                return Ok(pool);
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    "Database unreachable, retrying: {e}"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(MAX_RETRY_DELAY_SECS));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err("database connect: all retries exhausted".into())
}
