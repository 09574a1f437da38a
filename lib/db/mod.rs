pub mod sql;
#[cfg(any(test, feature = "sqlite-tests"))]
pub mod sqlite_test;
pub mod store;

use diesel::pg::PgConnection;
use diesel_async::{
    pg::AsyncPgConnection,
    pooled_connection::{
        deadpool::{BuildError, Pool},
        AsyncDieselConnectionManager,
    },
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::error::Error;

pub use store::{CourseDb, DbRow};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Builds the async Postgres pool used by the read path.
pub async fn build_db_pool(
    db_url: &str,
    max_size: usize,
) -> Result<Pool<AsyncPgConnection>, BuildError> {
    let pool_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    let pool = Pool::builder(pool_config).max_size(max_size.max(1)).build()?;

    Ok(pool)
}

/// Runs every pending embedded Postgres migration. Returns the applied versions.
pub fn run_postgres_migrations(
    conn: &mut PgConnection,
) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    Ok(applied.into_iter().map(|version| version.to_string()).collect())
}
