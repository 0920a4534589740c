//! Persistence gateway: one SQLite connection behind one lock.
//!
//! Every query method lives on [`DbLock`], the guard returned by
//! [`Database::lock`]. Holding the guard is the only way to reach the
//! connection, so all reads and writes in the process are serialized. An
//! operation that checks and then writes (seat occupancy then ticket insert)
//! is atomic with respect to every other connection as long as it keeps one
//! guard for its whole duration.

use std::path::Path;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

pub use railway_core::db::DatabaseError;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<SqliteConnection>>,
}

/// Exclusive access to the shared connection.
pub struct DbLock<'a> {
    pub(super) conn: MutexGuard<'a, SqliteConnection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = railway_core::db::open_connection(path).await?;
        Self::from_connection(conn).await
    }

    /// Open an in-memory database (for testing).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = railway_core::db::open_connection_in_memory().await?;
        Self::from_connection(conn).await
    }

    async fn from_connection(mut conn: SqliteConnection) -> Result<Self, DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&mut conn)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        info!("Railway database migrations complete");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Wait for the connection lock.
    pub async fn lock(&self) -> DbLock<'_> {
        DbLock {
            conn: self.conn.lock().await,
        }
    }
}

impl DbLock<'_> {
    /// The locked connection, usable as a sqlx executor.
    pub(super) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}
