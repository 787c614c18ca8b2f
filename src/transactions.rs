//! Write critical sections
//!
//! Every mutating store operation runs inside one [`WriteSection`]. Sections
//! on the same store are strictly serialized in arrival order. With
//! transactions allowed, a section is a native `BEGIN IMMEDIATE` transaction
//! that commits only when every statement in it succeeded. Without, the
//! section simply holds the store's write lock: statements apply one by one
//! and a failure part way leaves the earlier ones in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx_sqlite_conn_mgr::WriteGuard;
use sqlx_sqlite_mapper::{DbModel, Record, SqlStatement, TableDescriptor, WriteQueryResult, query, sql};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::store::Store;

/// Per-store write lock.
///
/// The lock is fair, so writers are admitted in the order they asked.
#[derive(Debug, Default)]
pub(crate) struct WriteSerializer {
   lock: Mutex<()>,
   write_locked: AtomicBool,
}

impl WriteSerializer {
   pub(crate) fn new() -> Self {
      Self::default()
   }

   /// Wait for the lock without opening a section.
   pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
      self.lock.lock().await
   }

   /// Whether a non-transactional section currently holds the lock.
   pub(crate) fn is_write_locked(&self) -> bool {
      self.write_locked.load(Ordering::SeqCst)
   }
}

/// Table existence to record once the section's work is durable.
trait ExistenceFlag: Send + Sync {
   fn table_name(&self) -> &str;
   fn confirm(&self);
}

impl<T: 'static> ExistenceFlag for TableDescriptor<T> {
   fn table_name(&self) -> &str {
      TableDescriptor::table_name(self)
   }

   fn confirm(&self) {
      self.confirm_existence();
   }
}

/// Exclusive write access to one store.
///
/// Must be finished with [`end`](Self::end). A section dropped without it
/// (e.g. its task was cancelled) closes the write connection, which makes
/// SQLite roll back any open transaction.
#[must_use = "a write section must be finished with `end`"]
pub(crate) struct WriteSection<'s> {
   store: &'s Store,
   // Declared before the permit so the connection is back in its pool
   // before the next writer is admitted.
   writer: WriteGuard,
   _permit: MutexGuard<'s, ()>,
   native: bool,
   ended: bool,
   created: Vec<Arc<dyn ExistenceFlag>>,
}

impl<'s> WriteSection<'s> {
   pub(crate) async fn begin(store: &'s Store) -> Result<Self> {
      let permit = store.serializer().lock.lock().await;
      let native = store.allow_transaction();
      let mut writer = store.database().acquire_writer().await?;

      if native {
         sqlx::query("BEGIN IMMEDIATE").execute(&mut *writer).await?;
      } else {
         store.serializer().write_locked.store(true, Ordering::SeqCst);
      }
      trace!(store = store.name(), native, "write section started");

      Ok(Self {
         store,
         writer,
         _permit: permit,
         native,
         ended: false,
         created: Vec::new(),
      })
   }

   /// Run one mutating statement. Advances the invalidation sequence whether
   /// or not the statement succeeds.
   pub(crate) async fn execute(&mut self, statement: &SqlStatement) -> Result<WriteQueryResult> {
      self.store.record_statement(statement);
      let result = query::execute(&mut *self.writer, statement).await;
      self.store.sequence().advance();
      Ok(result?)
   }

   /// Run a query on the write connection, seeing this section's own writes.
   pub(crate) async fn fetch_all(&mut self, statement: &SqlStatement) -> Result<Vec<DbModel>> {
      self.store.record_query(statement);
      Ok(query::fetch_all(&mut *self.writer, statement).await?)
   }

   pub(crate) async fn table_exists<T: Record>(&mut self, table: &TableDescriptor<T>) -> Result<bool> {
      if table.is_existence_confirmed()
         || self
            .created
            .iter()
            .any(|created| created.table_name() == table.table_name())
      {
         return Ok(true);
      }

      let rows = self.fetch_all(&sql::table_exists(table.table_name())).await?;
      let exists = rows.first().and_then(|row| row.get_i64("c")).unwrap_or(0) > 0;
      if exists {
         table.confirm_existence();
      }
      Ok(exists)
   }

   /// Create the table and run its post-create statement unless it exists.
   ///
   /// In a native transaction the descriptor learns about the table only
   /// after commit, so a rolled back creation is probed again next time.
   pub(crate) async fn create_table_if_not_exist<T: Record>(
      &mut self,
      table: &Arc<TableDescriptor<T>>,
   ) -> Result<()> {
      if self.table_exists(table).await? {
         return Ok(());
      }

      self.execute(&sql::create_table(table)?).await?;
      if let Some(after_create) = table.exec_after_create() {
         self.execute(&SqlStatement::new(after_create)).await?;
      }
      debug!("Created table {} in {}", table.table_name(), self.store.name());

      if self.native {
         self.created.push(Arc::clone(table) as Arc<dyn ExistenceFlag>);
      } else {
         table.confirm_existence();
      }
      Ok(())
   }

   /// Finish the section with the outcome of its body.
   ///
   /// A successful body is committed; a failed one is rolled back and its
   /// error returned unchanged. A failing commit is returned in place of the
   /// body's value.
   pub(crate) async fn end<R>(mut self, result: Result<R>) -> Result<R> {
      self.ended = true;

      let outcome = match (&result, self.native) {
         (_, false) => Ok(()),
         (Ok(_), true) => self.commit().await,
         (Err(_), true) => {
            self.rollback().await;
            Ok(())
         }
      };

      self.store.sequence().advance();
      outcome.and(result)
   }

   async fn commit(&mut self) -> Result<()> {
      match sqlx::query("COMMIT").execute(&mut *self.writer).await {
         Ok(_) => {
            for table in self.created.drain(..) {
               table.confirm();
            }
            debug!("Transaction committed for store: {}", self.store.name());
            Ok(())
         }
         Err(e) => {
            self.rollback().await;
            Err(e.into())
         }
      }
   }

   async fn rollback(&mut self) {
      self.created.clear();
      match sqlx::query("ROLLBACK").execute(&mut *self.writer).await {
         Ok(_) => debug!("Transaction rolled back for store: {}", self.store.name()),
         Err(e) => {
            warn!("Rollback failed for store {}: {}", self.store.name(), e);
            self.writer.close_on_drop();
         }
      }
   }
}

impl Drop for WriteSection<'_> {
   fn drop(&mut self) {
      if !self.native {
         self.store.serializer().write_locked.store(false, Ordering::SeqCst);
      }

      if !self.ended {
         if self.native {
            self.writer.close_on_drop();
         }
         self.store.sequence().advance();
         debug!(
            "Dropping unfinished write section for store: {} (will auto-rollback)",
            self.store.name()
         );
      }
   }
}
