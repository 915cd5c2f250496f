//! Persisted operator settings.
//!
//! The kiosk remembers exactly one thing across restarts: the address of the
//! relay controller that last connected successfully. It is read at startup
//! to skip discovery and written after every successful network bind.

#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use kiosk_core::constants::LAST_ADDRESS_KEY;
use kiosk_core::normalize_address;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::StorageResult;

/// One row of the `settings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Access to the persisted last-used address.
///
/// Uses native async trait methods (Edition 2024), so implementations can be
/// swapped for an in-memory fake in tests.
pub trait SettingsRepository: Send + Sync {
    /// Address of the last controller that connected, if any.
    async fn last_network_address(&self) -> StorageResult<Option<String>>;

    /// Record `address` as the last controller that connected.
    ///
    /// The address is normalised first; blank or malformed input is refused
    /// with [`StorageError::Validation`](crate::StorageError::Validation).
    async fn save_last_network_address(&self, address: &str) -> StorageResult<()>;

    /// Forget the stored address. Returns whether one was stored.
    async fn clear_last_network_address(&self) -> StorageResult<bool>;
}

/// SQLite implementation of [`SettingsRepository`]
#[derive(Debug, Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Full row for `key`, including when it was last written.
    pub async fn entry(&self, key: &str) -> StorageResult<Option<Setting>> {
        let setting = sqlx::query_as::<_, Setting>(
            r#"
            SELECT key, value, updated_at
            FROM settings
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(setting)
    }

    async fn upsert(&self, key: &str, value: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl SettingsRepository for SqliteSettingsRepository {
    async fn last_network_address(&self) -> StorageResult<Option<String>> {
        Ok(self.entry(LAST_ADDRESS_KEY).await?.map(|s| s.value))
    }

    async fn save_last_network_address(&self, address: &str) -> StorageResult<()> {
        let address = normalize_address(address)?;
        self.upsert(LAST_ADDRESS_KEY, &address).await?;
        tracing::debug!(address = %address, "Saved last network address");
        Ok(())
    }

    async fn clear_last_network_address(&self) -> StorageResult<bool> {
        self.remove(LAST_ADDRESS_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use crate::error::StorageError;

    async fn repository() -> SqliteSettingsRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteSettingsRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_empty_store_has_no_address() {
        let repo = repository().await;
        assert_eq!(repo.last_network_address().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_normalises_address() {
        let repo = repository().await;

        repo.save_last_network_address("http://192.168.4.1/")
            .await
            .unwrap();

        assert_eq!(
            repo.last_network_address().await.unwrap().as_deref(),
            Some("192.168.4.1")
        );
    }

    #[tokio::test]
    async fn test_blank_address_refused() {
        let repo = repository().await;

        let err = repo.save_last_network_address("   ").await.unwrap_err();

        assert!(matches!(err, StorageError::Validation(_)));
        assert_eq!(repo.last_network_address().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_carries_timestamp() {
        let repo = repository().await;
        let before = Utc::now();

        repo.save_last_network_address("10.0.0.7:8080").await.unwrap();

        let entry = repo.entry(LAST_ADDRESS_KEY).await.unwrap().unwrap();
        assert_eq!(entry.value, "10.0.0.7:8080");
        assert!(entry.updated_at >= before - chrono::Duration::seconds(1));
    }
}
