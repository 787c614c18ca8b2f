//! SQLite database with a read pool and a single serialized writer

use std::fs::{create_dir_all, remove_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::debug;

use crate::config::SqliteDatabaseConfig;
use crate::error::{Error, Result};
use crate::write_guard::WriteGuard;

/// SQLite database with connection pooling for concurrent reads and exclusive writes.
///
/// ## Architecture
///
/// The database maintains two connection pools:
/// - **`read_pool`**: Pool of read-only connections for concurrent reads
/// - **`write_conn`**: Single-connection pool for exclusive write access (enforced by max_connections=1)
///
/// ## State Management
///
/// - **`wal_initialized`**: Tracks whether WAL journal mode has been enabled (lazy initialization)
/// - **`closed`**: Prevents use after the database has been closed
/// - **`path`**: Database file path for cleanup operations
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect to database (creates the file and both pools)
/// 2. Read operations: Access read_pool for concurrent reads
/// 3. Write operations: Acquire writer (lazily enables WAL on first call)
/// 4. Close database when done
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Pool of read-only connections for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Tracks if WAL mode has been initialized (set on first write)
   wal_initialized: AtomicBool,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Path to database file (used for cleanup)
   path: PathBuf,
}

impl SqliteDatabase {
   /// Open the database at `path`, creating the file and its parent
   /// directories when missing.
   ///
   /// The write pool is opened first so the file exists before the
   /// read-only pool connects to it.
   pub async fn connect(
      path: impl AsRef<Path>,
      custom_config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      let path = path.as_ref().to_path_buf();

      if let Some(parent) = path.parent()
         && !parent.as_os_str().is_empty()
      {
         create_dir_all(parent)?;
      }

      let write_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .busy_timeout(config.busy_timeout);

      // Keep the writer alive so the WAL index outlives idle readers
      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(1)
         .idle_timeout(config.idle_timeout)
         .connect_with(write_options)
         .await?;

      let read_options = SqliteConnectOptions::new()
         .filename(&path)
         .read_only(true)
         .busy_timeout(config.busy_timeout);

      let read_pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections.max(1))
         .idle_timeout(config.idle_timeout)
         .connect_with(read_options)
         .await?;

      debug!("Opened sqlite database at {}", path.display());

      Ok(Arc::new(Self {
         read_pool,
         write_conn,
         wal_initialized: AtomicBool::new(false),
         closed: AtomicBool::new(false),
         path,
      }))
   }

   /// Path of the database file
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Whether [`close`](Self::close) has been called
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Read-only pool for queries
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }
      Ok(&self.read_pool)
   }

   /// Acquire the single write connection, waiting until the current
   /// holder releases it.
   ///
   /// The first acquisition switches the database to WAL so readers keep
   /// working while a write is in progress.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }

      let mut conn = self.write_conn.acquire().await?;

      if !self.wal_initialized.load(Ordering::SeqCst) {
         sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;
         self.wal_initialized.store(true, Ordering::SeqCst);
         debug!("Enabled WAL journal mode for {}", self.path.display());
      }

      Ok(WriteGuard::new(conn))
   }

   /// Schema version stored in the database header (`PRAGMA user_version`)
   pub async fn user_version(&self) -> Result<i64> {
      let version: i64 = sqlx::query_scalar("PRAGMA user_version")
         .fetch_one(self.read_pool()?)
         .await?;
      Ok(version)
   }

   /// Overwrite the schema version stored in the database header
   pub async fn set_user_version(&self, version: i64) -> Result<()> {
      let mut writer = self.acquire_writer().await?;
      // PRAGMA arguments cannot be bound
      sqlx::query(&format!("PRAGMA user_version = {version}"))
         .execute(&mut *writer)
         .await?;
      Ok(())
   }

   /// Close both pools. Further use returns [`Error::DatabaseClosed`].
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }

      self.read_pool.close().await;
      self.write_conn.close().await;
      debug!("Closed sqlite database at {}", self.path.display());
      Ok(())
   }

   /// Close the database and delete its file along with WAL side files
   pub async fn remove(&self) -> Result<()> {
      self.close().await?;

      for suffix in ["", "-wal", "-shm"] {
         let mut file = self.path.clone().into_os_string();
         file.push(suffix);
         match remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
         }
      }

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   async fn create_test_db() -> (Arc<SqliteDatabase>, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let db = SqliteDatabase::connect(temp_dir.path().join("nested/test.db"), None)
         .await
         .expect("Failed to connect to test database");

      (db, temp_dir)
   }

   #[tokio::test]
   async fn test_connect_creates_parent_directories() {
      let (db, temp) = create_test_db().await;

      assert!(temp.path().join("nested/test.db").exists());
      assert_eq!(db.path(), temp.path().join("nested/test.db"));
   }

   #[tokio::test]
   async fn test_writes_are_visible_to_read_pool() {
      let (db, _temp) = create_test_db().await;

      let mut writer = db.acquire_writer().await.unwrap();
      sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
         .execute(&mut *writer)
         .await
         .unwrap();
      sqlx::query("INSERT INTO t (name) VALUES (?)")
         .bind("Alice")
         .execute(&mut *writer)
         .await
         .unwrap();
      drop(writer);

      let name: String = sqlx::query_scalar("SELECT name FROM t WHERE id = 1")
         .fetch_one(db.read_pool().unwrap())
         .await
         .unwrap();

      assert_eq!(name, "Alice");
   }

   #[tokio::test]
   async fn test_read_pool_rejects_writes() {
      let (db, _temp) = create_test_db().await;

      let result = sqlx::query("CREATE TABLE t (id INTEGER)")
         .execute(db.read_pool().unwrap())
         .await;

      assert!(result.is_err());
   }

   #[tokio::test]
   async fn test_user_version_round_trip() {
      let (db, _temp) = create_test_db().await;

      assert_eq!(db.user_version().await.unwrap(), 0);
      db.set_user_version(7).await.unwrap();
      assert_eq!(db.user_version().await.unwrap(), 7);
   }

   #[tokio::test]
   async fn test_closed_database_rejects_use() {
      let (db, _temp) = create_test_db().await;

      db.close().await.unwrap();
      // Second close is a no-op
      db.close().await.unwrap();

      assert!(db.is_closed());
      assert!(matches!(db.read_pool(), Err(Error::DatabaseClosed)));
      assert!(matches!(
         db.acquire_writer().await,
         Err(Error::DatabaseClosed)
      ));
   }

   #[tokio::test]
   async fn test_remove_deletes_files() {
      let (db, temp) = create_test_db().await;
      let mut writer = db.acquire_writer().await.unwrap();
      sqlx::query("CREATE TABLE t (id INTEGER)")
         .execute(&mut *writer)
         .await
         .unwrap();
      drop(writer);

      db.remove().await.unwrap();

      assert!(!temp.path().join("nested/test.db").exists());
   }
}
