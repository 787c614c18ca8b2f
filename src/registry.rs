//! Process-wide registry of open stores, keyed by database name

use std::collections::HashMap;
use std::sync::Arc;

use sqlx_sqlite_conn_mgr::SqliteDatabase;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::cache::FindSequence;
use crate::config::DaoConfig;
use crate::error::Result;
use crate::store::Store;

/// Open stores plus the invalidation sequence they share.
///
/// Opening a name that is already open returns the same store with the new
/// configuration applied, so every caller sees one cache and one write lock
/// per database.
#[derive(Default)]
pub struct StoreRegistry {
   stores: Mutex<HashMap<String, Arc<Store>>>,
   sequence: Arc<FindSequence>,
}

impl StoreRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn sequence(&self) -> &Arc<FindSequence> {
      &self.sequence
   }

   /// Open (or reuse) the store named by `config.db_name`.
   ///
   /// Either way the file's schema version is reconciled with
   /// `config.db_version` before the store is handed out. A fresh store that
   /// fails to reconcile is closed and not registered.
   pub async fn open(&self, config: DaoConfig) -> Result<Arc<Store>> {
      let mut stores = self.stores.lock().await;

      if let Some(store) = stores.get(&config.db_name) {
         debug!("Reusing open store: {}", config.db_name);
         store.replace_config(config);
         store.reconcile_version().await?;
         return Ok(Arc::clone(store));
      }

      let db = SqliteDatabase::connect(config.db_path(), Some(config.pool.clone())).await?;
      let name = config.db_name.clone();
      let store = Arc::new(Store::new(db, config, Arc::clone(&self.sequence)));

      if let Err(e) = store.reconcile_version().await {
         if let Err(close_err) = store.close().await {
            error!("Failed to close {} after version check: {}", name, close_err);
         }
         return Err(e);
      }

      debug!("Opened store: {}", name);
      stores.insert(name, Arc::clone(&store));
      Ok(store)
   }

   pub async fn get(&self, name: &str) -> Option<Arc<Store>> {
      self.stores.lock().await.get(name).cloned()
   }

   /// Close and forget one store. Returns `false` if it was not open.
   pub async fn close(&self, name: &str) -> Result<bool> {
      let Some(store) = self.stores.lock().await.remove(name) else {
         return Ok(false);
      };

      store.close().await?;
      debug!("Closed store: {}", name);
      Ok(true)
   }

   /// Close every store, continuing past failures. The first failure is
   /// returned.
   pub async fn close_all(&self) -> Result<()> {
      let stores: Vec<Arc<Store>> = self.stores.lock().await.drain().map(|(_, s)| s).collect();
      debug!("Closing {} store(s)", stores.len());

      let mut first_error = None;
      for store in stores {
         if let Err(e) = store.close().await {
            error!("Failed to close store {}: {}", store.name(), e);
            first_error.get_or_insert(e);
         }
      }

      match first_error {
         Some(e) => Err(e),
         None => Ok(()),
      }
   }

   pub async fn len(&self) -> usize {
      self.stores.lock().await.len()
   }

   pub async fn is_empty(&self) -> bool {
      self.len().await == 0
   }
}
