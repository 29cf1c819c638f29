use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;

use super::executor::StoreError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Create a read-only SQLite connection pool for the market data file.
///
/// The hub never writes, so connections are opened without create/write
/// flags and a missing file is an error rather than an empty database.
pub fn open_ro_pool(path: &Path, max_size: u32) -> Result<DbPool, StoreError> {
    if !path.exists() {
        tracing::error!("market DB not found: {}", path.display());
        return Err(StoreError(format!("database file not found: {}", path.display())));
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let manager = SqliteConnectionManager::file(path).with_flags(flags);
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    tracing::info!("opened read-only pool for {} (max_size={max_size})", path.display());
    Ok(pool)
}
