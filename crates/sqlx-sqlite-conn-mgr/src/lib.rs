//! # sqlx-sqlite-conn-mgr
//!
//! A minimal wrapper around SQLx that owns one SQLite database file and
//! enforces the connection policy the DAO layer relies on.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: Database handle with separate read and write connection pools
//! - **[`SqliteDatabaseConfig`]**: Configuration for connection pool settings
//! - **[`WriteGuard`]**: RAII guard holding the single write connection
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **Dual pools**: Separate read-only pool and write pool (max 1 connection)
//! - **Lazy WAL mode**: Write-Ahead Logging enabled automatically on first write
//! - **Exclusive writes**: Single-connection write pool serializes writers
//! - **Concurrent reads**: Multiple readers can query simultaneously via the read pool
//! - **Schema version**: `PRAGMA user_version` exposed as a plain integer
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_conn_mgr::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_conn_mgr::Result<()> {
//!    let db = SqliteDatabase::connect("example.db", None).await?;
//!
//!    let mut writer = db.acquire_writer().await?;
//!    sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT)")
//!       .execute(&mut *writer)
//!       .await?;
//!    drop(writer);
//!
//!    let rows = sqlx::query("SELECT * FROM users")
//!       .fetch_all(db.read_pool()?)
//!       .await?;
//!    assert!(rows.is_empty());
//!
//!    db.close().await?;
//!    Ok(())
//! }
//! ```

mod config;
mod database;
mod error;
mod write_guard;

// Re-export public types
pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::{Error, Result};
pub use write_guard::WriteGuard;
