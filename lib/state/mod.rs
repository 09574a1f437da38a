use diesel_async::{pg::AsyncPgConnection, pooled_connection::deadpool::Pool};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    /// Used to open sync connections for the ordering and catalog operations.
    pub db_url: String,
    /// Async pool for the hierarchy read path.
    pub pool: Pool<AsyncPgConnection>,
    pub shutdown_token: CancellationToken,
    pub registry: RwLock<Registry>,
}

impl AppState {
    pub fn new(
        db_url: String,
        pool: Pool<AsyncPgConnection>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            db_url,
            pool,
            shutdown_token,
            registry: RwLock::new(<Registry>::default()),
        }
    }
}
