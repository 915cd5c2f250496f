use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// WAL gives one writer; the other connections serve reads.
const POOL_SIZE: u32 = 4;

/// How long a writer waits on the SQLite lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool over the kiosk's settings database, migrated on open.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the settings database at `path`, creating the file and its
    /// directory when missing.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kiosk_storage::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new("/var/lib/kiosk/kiosk.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Configuration(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        tracing::debug!(path = %path.display(), "Settings database opened");
        Ok(db)
    }

    /// Fresh migrated database that lives as long as the pool.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the embedded migrations. Already applied ones are skipped.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
