//! Version and build history stores for the BuildIt input resolver.
//!
//! Provides the [`VersionsDb`] repository trait with PostgreSQL and
//! in-memory implementations, plus lazily paginated build iteration.

pub mod dump;
pub mod error;
pub mod pagination;
pub mod repo;

pub use dump::HistoryDump;
pub use error::{DbError, DbResult};
pub use pagination::{BuildPageSource, PaginatedBuilds};
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
