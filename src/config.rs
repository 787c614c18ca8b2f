//! Store configuration

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;

use crate::error::DbError;
use crate::store::Store;

/// Hook run when a store is opened with a schema version different from the
/// one recorded in the database file.
///
/// Without a listener, the store drops every table instead.
///
/// ```
/// use futures::future::BoxFuture;
/// use sqlite_dao::{DbError, DbUpgradeListener, Store};
///
/// struct AddColumn;
///
/// impl DbUpgradeListener for AddColumn {
///    fn on_upgrade<'a>(
///       &'a self,
///       store: &'a Store,
///       _old_version: i64,
///       _new_version: i64,
///    ) -> BoxFuture<'a, Result<(), DbError>> {
///       Box::pin(async move {
///          store
///             .exec_non_query(&"ALTER TABLE users ADD COLUMN bio TEXT".into())
///             .await?;
///          Ok(())
///       })
///    }
/// }
/// ```
pub trait DbUpgradeListener: Send + Sync {
   fn on_upgrade<'a>(
      &'a self,
      store: &'a Store,
      old_version: i64,
      new_version: i64,
   ) -> BoxFuture<'a, Result<(), DbError>>;
}

/// Configuration for one named store.
///
/// # Examples
///
/// ```
/// use sqlite_dao::DaoConfig;
///
/// let config = DaoConfig::new("notes.db")
///    .with_db_dir("/tmp/app")
///    .with_db_version(3)
///    .with_allow_transaction(false);
///
/// assert_eq!(config.db_path(), std::path::Path::new("/tmp/app/notes.db"));
/// ```
#[derive(Clone)]
pub struct DaoConfig {
   /// Directory holding the database file
   ///
   /// Default: current directory
   pub db_dir: PathBuf,

   /// File name, also the store's key in the registry
   pub db_name: String,

   /// Schema version the caller expects
   ///
   /// Default: 1
   pub db_version: i64,

   /// Run write critical sections as native transactions
   ///
   /// Default: true
   pub allow_transaction: bool,

   /// Connection pool settings for the underlying database
   pub pool: SqliteDatabaseConfig,

   pub upgrade_listener: Option<Arc<dyn DbUpgradeListener>>,
}

impl DaoConfig {
   pub fn new(db_name: impl Into<String>) -> Self {
      Self {
         db_name: db_name.into(),
         ..Default::default()
      }
   }

   pub fn with_db_dir(mut self, db_dir: impl Into<PathBuf>) -> Self {
      self.db_dir = db_dir.into();
      self
   }

   pub fn with_db_version(mut self, db_version: i64) -> Self {
      self.db_version = db_version;
      self
   }

   pub fn with_allow_transaction(mut self, allow_transaction: bool) -> Self {
      self.allow_transaction = allow_transaction;
      self
   }

   pub fn with_pool_config(mut self, pool: SqliteDatabaseConfig) -> Self {
      self.pool = pool;
      self
   }

   pub fn with_upgrade_listener(mut self, listener: impl DbUpgradeListener + 'static) -> Self {
      self.upgrade_listener = Some(Arc::new(listener));
      self
   }

   /// Full path of the database file.
   pub fn db_path(&self) -> PathBuf {
      self.db_dir.join(&self.db_name)
   }
}

impl Default for DaoConfig {
   fn default() -> Self {
      Self {
         db_dir: PathBuf::from("."),
         db_name: "dao.db".to_string(),
         db_version: 1,
         allow_transaction: true,
         pool: SqliteDatabaseConfig::default(),
         upgrade_listener: None,
      }
   }
}

impl fmt::Debug for DaoConfig {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("DaoConfig")
         .field("db_dir", &self.db_dir)
         .field("db_name", &self.db_name)
         .field("db_version", &self.db_version)
         .field("allow_transaction", &self.allow_transaction)
         .field("pool", &self.pool)
         .field("upgrade_listener", &self.upgrade_listener.is_some())
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_defaults() {
      let config = DaoConfig::default();
      assert_eq!(config.db_dir, PathBuf::from("."));
      assert_eq!(config.db_version, 1);
      assert!(config.allow_transaction);
      assert!(config.upgrade_listener.is_none());
   }

   #[test]
   fn test_builder_overrides() {
      let config = DaoConfig::new("a.db")
         .with_db_dir("data")
         .with_db_version(4)
         .with_allow_transaction(false)
         .with_pool_config(SqliteDatabaseConfig {
            max_read_connections: 2,
            ..Default::default()
         });

      assert_eq!(config.db_name, "a.db");
      assert_eq!(config.db_path(), PathBuf::from("data").join("a.db"));
      assert_eq!(config.db_version, 4);
      assert!(!config.allow_transaction);
      assert_eq!(config.pool.max_read_connections, 2);
   }
}
