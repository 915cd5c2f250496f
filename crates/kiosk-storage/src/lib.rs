//! Persistence for the photo card kiosk.
//!
//! The only persisted state is the last relay controller address that
//! connected successfully, kept in a one-table SQLite database.
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`SettingsRepository`] - read, write and clear the stored address
//!
//! # Example
//!
//! ```no_run
//! use kiosk_storage::{Database, SettingsRepository, SqliteSettingsRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("kiosk.db").await?;
//! let settings = SqliteSettingsRepository::new(db.pool().clone());
//!
//! if let Some(address) = settings.last_network_address().await? {
//!     println!("Reconnecting to {address}");
//! }
//! settings.save_last_network_address("192.168.4.1").await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod settings;

pub use connection::Database;
pub use error::{StorageError, StorageResult};
pub use settings::{Setting, SettingsRepository, SqliteSettingsRepository};
