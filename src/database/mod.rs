//! Persistence layer: SQLite via sqlx.
//!
//! Two pools share one database file. Reads go through a multi-connection
//! pool; every write transaction goes through a single-connection pool and
//! opens with `BEGIN IMMEDIATE`, so writers queue on the pool instead of
//! hitting `SQLITE_BUSY` mid-transaction. Timestamps are stored as `INTEGER`
//! Unix epoch milliseconds (see [`time`]).

pub mod models;
pub mod repositories;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

/// Pool handle for reads.
pub type DbPool = Pool<Sqlite>;

/// Pool handle for serialized writes (`max_connections = 1`).
pub type WritePool = Pool<Sqlite>;

const MAX_READ_CONNECTIONS: u32 = 10;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .create_if_missing(true))
}

/// SQLite readers stop gaining much past a handful of connections.
fn read_pool_size() -> u32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(2);
    (cores * 2).min(MAX_READ_CONNECTIONS)
}

/// Open the read pool. WAL mode keeps readers unblocked during writes.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let connections = read_pool_size();
    let pool = SqlitePoolOptions::new()
        .max_connections(connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options(database_url)?)
        .await?;

    tracing::info!(connections, "read pool ready");
    Ok(pool)
}

/// Open the write pool. With a single connection, at most one transaction
/// ever holds the SQLite write lock.
pub async fn init_write_pool(database_url: &str) -> Result<WritePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(60))
        .connect_with(connect_options(database_url)?)
        .await?;

    tracing::info!("write pool ready (single connection)");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Start a write transaction that takes the write lock up front.
///
/// Deferred transactions deadlock when two readers try to upgrade to writers
/// at the same time; `BEGIN IMMEDIATE` avoids the upgrade entirely.
pub async fn begin_immediate(pool: &WritePool) -> Result<ImmediateTransaction, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction::new(conn))
}

/// A manually managed `BEGIN IMMEDIATE` transaction.
///
/// Derefs to the underlying connection so queries run against it directly.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    fn new(conn: sqlx::pool::PoolConnection<Sqlite>) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            // A connection with an open transaction must not rejoin the pool.
            self.conn.close_on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_connect_options() {
        let pool = init_pool("sqlite::memory:").await.unwrap();

        let (fk,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);

        // In-memory databases report "memory" instead of "wal".
        let (journal,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(journal == "memory" || journal == "wal");
    }
}
