//! Store backends: Postgres for durability, memory for development and tests.

mod memory;
mod pages;
mod util;

pub use memory::MemoryRepositories;
pub use util::map_sqlx_error;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Page store backed by the `pages`, `posts` and `employees` tables.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
}

impl PostgresRepositories {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, bring the schema up to date and verify the store answers.
    pub async fn open(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!(
            target = "pagelens::db",
            max_connections,
            "postgres page store ready"
        );
        Ok(Self::new(pool))
    }
}
