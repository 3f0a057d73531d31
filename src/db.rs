use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use crate::error::Result;
use std::time::Duration;

/// Creates the connection pool shared by every request.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
/// * `max_size` - Upper bound on pooled connections.
///
/// # Returns
///
/// A `Result` containing the `Pool`.
pub fn create_pool(database_url: &str, max_size: usize) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let mut pool = PoolConfig::new(max_size);
    pool.timeouts.wait = Some(Duration::from_secs(3));
    pool.timeouts.create = Some(Duration::from_secs(2));
    pool.timeouts.recycle = Some(Duration::from_secs(1));
    cfg.pool = Some(pool);

    Ok(cfg.create_pool(Some(Runtime::Tokio1), NoTls)?)
}
