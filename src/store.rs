//! Store handle
//!
//! A [`Store`] is the persistence surface for one database file. Writes go
//! through a serialized write section; finds are served from the store's
//! read cache when the invalidation sequence has not moved since the result
//! was cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use sqlx_sqlite_conn_mgr::SqliteDatabase;
use sqlx_sqlite_mapper::{
   DbModel, DbModelSelector, Error as MapperError, Record, Selector, SqlStatement, TableDescriptor,
   Value, WhereBuilder, WriteQueryResult, materialize, materialize_all, query, quote_identifier,
   sql,
};
use tracing::{debug, error, trace, warn};

use crate::cache::{FindCache, FindSequence};
use crate::config::DaoConfig;
use crate::error::Result;
use crate::tables::TableRegistry;
use crate::transactions::{WriteSection, WriteSerializer};

/// Counters of the statements a store has issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
   /// Mutating statements, DDL included
   pub statements_executed: u64,
   /// Read queries, existence probes included
   pub queries: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
   statements: AtomicU64,
   queries: AtomicU64,
}

pub struct Store {
   name: String,
   db: Arc<SqliteDatabase>,
   config: RwLock<DaoConfig>,
   allow_transaction: AtomicBool,
   tables: TableRegistry,
   sequence: Arc<FindSequence>,
   cache: FindCache,
   serializer: WriteSerializer,
   counters: StatCounters,
}

impl Store {
   pub(crate) fn new(db: Arc<SqliteDatabase>, config: DaoConfig, sequence: Arc<FindSequence>) -> Self {
      Self {
         name: config.db_name.clone(),
         db,
         allow_transaction: AtomicBool::new(config.allow_transaction),
         config: RwLock::new(config),
         tables: TableRegistry::new(),
         cache: FindCache::new(Arc::clone(&sequence)),
         sequence,
         serializer: WriteSerializer::new(),
         counters: StatCounters::default(),
      }
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn database(&self) -> &Arc<SqliteDatabase> {
      &self.db
   }

   /// Snapshot of the current configuration.
   pub fn config(&self) -> DaoConfig {
      self.config.read().clone()
   }

   pub(crate) fn replace_config(&self, config: DaoConfig) {
      self
         .allow_transaction
         .store(config.allow_transaction, Ordering::SeqCst);
      *self.config.write() = config;
   }

   /// Switch between native transactions and plain write locking for
   /// sections started from now on.
   pub fn config_allow_transaction(&self, allow: bool) {
      self.allow_transaction.store(allow, Ordering::SeqCst);
      self.config.write().allow_transaction = allow;
   }

   pub fn allow_transaction(&self) -> bool {
      self.allow_transaction.load(Ordering::SeqCst)
   }

   /// Whether a write section without a native transaction is in progress.
   pub fn is_write_locked(&self) -> bool {
      self.serializer.is_write_locked()
   }

   pub fn stats(&self) -> StoreStats {
      StoreStats {
         statements_executed: self.counters.statements.load(Ordering::Relaxed),
         queries: self.counters.queries.load(Ordering::Relaxed),
      }
   }

   /// Table descriptor for `T`, built on first use.
   pub fn describe<T: Record>(&self) -> Result<Arc<TableDescriptor<T>>> {
      self.tables.describe::<T>()
   }

   pub(crate) fn sequence(&self) -> &FindSequence {
      &self.sequence
   }

   pub(crate) fn serializer(&self) -> &WriteSerializer {
      &self.serializer
   }

   pub(crate) fn record_statement(&self, statement: &SqlStatement) {
      self.counters.statements.fetch_add(1, Ordering::Relaxed);
      debug!("[{}] {}", self.name, statement);
   }

   pub(crate) fn record_query(&self, statement: &SqlStatement) {
      self.counters.queries.fetch_add(1, Ordering::Relaxed);
      trace!("[{}] {}", self.name, statement);
   }

   async fn begin_transaction(&self) -> Result<WriteSection<'_>> {
      WriteSection::begin(self).await
   }

   async fn query(&self, statement: &SqlStatement) -> Result<Vec<DbModel>> {
      self.record_query(statement);
      Ok(query::fetch_all(self.db.read_pool()?, statement).await?)
   }

   /// Run one statement on the writer, outside a transaction but queued
   /// behind any open write section.
   async fn execute_exclusive(&self, statement: &SqlStatement) -> Result<WriteQueryResult> {
      let _permit = self.serializer.exclusive().await;
      self.record_statement(statement);
      let mut writer = self.db.acquire_writer().await?;
      let result = query::execute(&mut *writer, statement).await;
      self.sequence.advance();
      Ok(result?)
   }

   async fn table_exists<T>(&self, table: &TableDescriptor<T>) -> Result<bool> {
      if table.is_existence_confirmed() {
         return Ok(true);
      }

      let rows = self.query(&sql::table_exists(table.table_name())).await?;
      let exists = rows.first().and_then(|row| row.get_i64("c")).unwrap_or(0) > 0;
      if exists {
         table.confirm_existence();
      }
      Ok(exists)
   }

   // ============================================================================
   // Inserts and replaces
   // ============================================================================

   /// Insert one record, creating its table on first use.
   pub async fn save<T: Record>(&self, record: &T) -> Result<()> {
      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         section.execute(&sql::insert(&table, record)?).await?;
         Ok(())
      }
      .await;

      section.end(result).await
   }

   /// Insert every record in one write section.
   pub async fn save_all<T: Record>(&self, records: &[T]) -> Result<()> {
      if records.is_empty() {
         return Ok(());
      }

      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         for record in records {
            section.execute(&sql::insert(&table, record)?).await?;
         }
         Ok(())
      }
      .await;

      section.end(result).await
   }

   /// Insert one record and write the generated id back into it.
   ///
   /// Returns `false` when no usable id could be bound. Records whose id is
   /// supplied by the caller, zero and negative ids included, are inserted
   /// as is and report `true`.
   pub async fn save_binding_id<T: Record>(&self, record: &mut T) -> Result<bool> {
      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<bool> = async {
         section.create_table_if_not_exist(&table).await?;
         insert_binding_id(&mut section, &table, record).await
      }
      .await;

      section.end(result).await
   }

   /// Insert every record, binding generated ids. Any record without a
   /// usable id fails the whole batch.
   pub async fn save_binding_id_all<T: Record>(&self, records: &mut [T]) -> Result<()> {
      if records.is_empty() {
         return Ok(());
      }

      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         for record in records.iter_mut() {
            if !insert_binding_id(&mut section, &table, record).await? {
               return Err(MapperError::BindingIdFailed(table.table_name().to_string()).into());
            }
         }
         Ok(())
      }
      .await;

      section.end(result).await
   }

   /// Update the record when it already has an id, insert it otherwise.
   ///
   /// For auto-increment tables an unset id means insert and bind the new
   /// id; tables with caller supplied ids are written with `REPLACE`.
   pub async fn save_or_update<T: Record>(&self, record: &mut T) -> Result<()> {
      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         save_or_update_in(&mut section, &table, record, false).await
      }
      .await;

      section.end(result).await
   }

   pub async fn save_or_update_all<T: Record>(&self, records: &mut [T]) -> Result<()> {
      if records.is_empty() {
         return Ok(());
      }

      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         for record in records.iter_mut() {
            save_or_update_in(&mut section, &table, record, true).await?;
         }
         Ok(())
      }
      .await;

      section.end(result).await
   }

   /// Insert the record, replacing any row with the same key.
   pub async fn replace<T: Record>(&self, record: &T) -> Result<()> {
      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         section.execute(&sql::replace(&table, record)?).await?;
         Ok(())
      }
      .await;

      section.end(result).await
   }

   pub async fn replace_all<T: Record>(&self, records: &[T]) -> Result<()> {
      if records.is_empty() {
         return Ok(());
      }

      let table = self.describe::<T>()?;
      let mut section = self.begin_transaction().await?;

      let result: Result<()> = async {
         section.create_table_if_not_exist(&table).await?;
         for record in records {
            section.execute(&sql::replace(&table, record)?).await?;
         }
         Ok(())
      }
      .await;

      section.end(result).await
   }

   // ============================================================================
   // Updates
   // ============================================================================

   /// Update the row with the record's id. `columns` restricts the update to
   /// the named columns; empty means every non-id column.
   ///
   /// Returns the number of rows changed, 0 when the table does not exist.
   pub async fn update<T: Record>(&self, record: &T, columns: &[&str]) -> Result<u64> {
      let table = self.describe::<T>()?;
      if !self.table_exists(&table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result: Result<u64> = async {
         let statement = sql::update(&table, record, columns)?;
         Ok(section.execute(&statement).await?.rows_affected)
      }
      .await;

      section.end(result).await
   }

   /// Write the record's values into every row matching `filter`.
   pub async fn update_where<T: Record>(
      &self,
      record: &T,
      filter: &WhereBuilder,
      columns: &[&str],
   ) -> Result<u64> {
      let table = self.describe::<T>()?;
      if !self.table_exists(&table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result: Result<u64> = async {
         let statement = sql::update_where(&table, record, filter, columns)?;
         Ok(section.execute(&statement).await?.rows_affected)
      }
      .await;

      section.end(result).await
   }

   pub async fn update_all<T: Record>(&self, records: &[T], columns: &[&str]) -> Result<u64> {
      let table = self.describe::<T>()?;
      if records.is_empty() || !self.table_exists(&table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result: Result<u64> = async {
         let mut changed = 0;
         for record in records {
            changed += section
               .execute(&sql::update(&table, record, columns)?)
               .await?
               .rows_affected;
         }
         Ok(changed)
      }
      .await;

      section.end(result).await
   }

   pub async fn update_all_where<T: Record>(
      &self,
      records: &[T],
      filter: &WhereBuilder,
      columns: &[&str],
   ) -> Result<u64> {
      let table = self.describe::<T>()?;
      if records.is_empty() || !self.table_exists(&table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result: Result<u64> = async {
         let mut changed = 0;
         for record in records {
            let statement = sql::update_where(&table, record, filter, columns)?;
            changed += section.execute(&statement).await?.rows_affected;
         }
         Ok(changed)
      }
      .await;

      section.end(result).await
   }

   // ============================================================================
   // Deletes
   // ============================================================================

   /// Delete the row with the record's id.
   pub async fn delete<T: Record>(&self, record: &T) -> Result<u64> {
      let table = self.describe::<T>()?;
      let statement = sql::delete(&table, record)?;
      self.delete_with(&table, &statement).await
   }

   pub async fn delete_by_id<T: Record>(&self, id: impl Into<Value>) -> Result<u64> {
      let table = self.describe::<T>()?;
      let statement = sql::delete_by_id(&table, id.into())?;
      self.delete_with(&table, &statement).await
   }

   pub async fn delete_where<T: Record>(&self, filter: &WhereBuilder) -> Result<u64> {
      let table = self.describe::<T>()?;
      let statement = sql::delete_where(&table, Some(filter));
      self.delete_with(&table, &statement).await
   }

   /// Delete the row of each record, in one write section.
   pub async fn delete_all<T: Record>(&self, records: &[T]) -> Result<u64> {
      let table = self.describe::<T>()?;
      if records.is_empty() || !self.table_exists(&table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result: Result<u64> = async {
         let mut deleted = 0;
         for record in records {
            deleted += section
               .execute(&sql::delete(&table, record)?)
               .await?
               .rows_affected;
         }
         Ok(deleted)
      }
      .await;

      section.end(result).await
   }

   /// Delete every row of `T`'s table. The table itself is kept.
   pub async fn delete_all_of<T: Record>(&self) -> Result<u64> {
      let table = self.describe::<T>()?;
      let statement = sql::delete_where(&table, None);
      self.delete_with(&table, &statement).await
   }

   async fn delete_with<T>(&self, table: &TableDescriptor<T>, statement: &SqlStatement) -> Result<u64> {
      if !self.table_exists(table).await? {
         return Ok(0);
      }

      let mut section = self.begin_transaction().await?;
      let result = section.execute(statement).await.map(|r| r.rows_affected);
      section.end(result).await
   }

   // ============================================================================
   // Finds
   // ============================================================================

   pub async fn find_by_id<T: Record>(&self, id: impl Into<Value>) -> Result<Option<Arc<T>>> {
      let table = self.describe::<T>()?;
      let filter = WhereBuilder::b(&quote_identifier(table.id().name()), "=", id);
      self.find_first_in(&table, &Selector::new().filter(filter)).await
   }

   /// First record matching the selector, or `None`.
   pub async fn find_first<T: Record>(&self, selector: &Selector<T>) -> Result<Option<Arc<T>>> {
      let table = self.describe::<T>()?;
      self.find_first_in(&table, selector).await
   }

   pub async fn find_first_of<T: Record>(&self) -> Result<Option<Arc<T>>> {
      let table = self.describe::<T>()?;
      self.find_first_in(&table, &Selector::new()).await
   }

   /// Every record matching the selector. Missing tables read as empty.
   ///
   /// Repeating the same find with no write in between returns the same
   /// shared result.
   pub async fn find_all<T: Record>(&self, selector: &Selector<T>) -> Result<Arc<Vec<T>>> {
      let table = self.describe::<T>()?;
      self.find_all_in(&table, selector).await
   }

   pub async fn find_all_of<T: Record>(&self) -> Result<Arc<Vec<T>>> {
      let table = self.describe::<T>()?;
      self.find_all_in(&table, &Selector::new()).await
   }

   async fn find_first_in<T: Record>(
      &self,
      table: &TableDescriptor<T>,
      selector: &Selector<T>,
   ) -> Result<Option<Arc<T>>> {
      if !self.table_exists(table).await? {
         return Ok(None);
      }

      let statement = sql::select(table, &selector.clone().limit(1))?;
      let seq = self.cache.begin_read();
      if let Some(hit) = self.cache.get::<T>(statement.sql()) {
         trace!(store = %self.name, seq, "find cache hit");
         return Ok(Some(hit));
      }

      let rows = self.query(&statement).await?;
      let Some(row) = rows.first() else {
         return Ok(None);
      };

      let record = Arc::new(materialize(table, row, seq)?);
      self.cache.put(statement.sql(), seq, Arc::clone(&record));
      Ok(Some(record))
   }

   async fn find_all_in<T: Record>(
      &self,
      table: &TableDescriptor<T>,
      selector: &Selector<T>,
   ) -> Result<Arc<Vec<T>>> {
      if !self.table_exists(table).await? {
         return Ok(Arc::new(Vec::new()));
      }

      let statement = sql::select(table, selector)?;
      let seq = self.cache.begin_read();
      if let Some(hit) = self.cache.get::<Vec<T>>(statement.sql()) {
         trace!(store = %self.name, seq, "find cache hit");
         return Ok(hit);
      }

      let rows = self.query(&statement).await?;
      let records = Arc::new(materialize_all(table, &rows, seq)?);
      if !records.is_empty() {
         self.cache.put(statement.sql(), seq, Arc::clone(&records));
      }
      Ok(records)
   }

   /// Number of rows matching the selector's filter. Never cached.
   pub async fn count<T: Record>(&self, selector: &Selector<T>) -> Result<u64> {
      let table = self.describe::<T>()?;
      self.count_in(&table, Some(selector)).await
   }

   pub async fn count_of<T: Record>(&self) -> Result<u64> {
      let table = self.describe::<T>()?;
      self.count_in(&table, None).await
   }

   async fn count_in<T>(&self, table: &TableDescriptor<T>, selector: Option<&Selector<T>>) -> Result<u64> {
      if !self.table_exists(table).await? {
         return Ok(0);
      }

      let rows = self.query(&sql::count(table, selector)).await?;
      let count = rows.first().and_then(|row| row.get_i64("count")).unwrap_or(0);
      Ok(u64::try_from(count).unwrap_or(0))
   }

   // ============================================================================
   // Raw rows
   // ============================================================================

   /// First row of an arbitrary query, uncached.
   pub async fn find_db_model_first(&self, statement: &SqlStatement) -> Result<Option<DbModel>> {
      Ok(self.query(statement).await?.into_iter().next())
   }

   pub async fn find_db_model_all(&self, statement: &SqlStatement) -> Result<Vec<DbModel>> {
      self.query(statement).await
   }

   /// First raw row of a projection over `T`'s table. `None` when the table
   /// does not exist.
   pub async fn find_db_model_first_of<T: Record>(
      &self,
      selector: &DbModelSelector<T>,
   ) -> Result<Option<DbModel>> {
      let table = self.describe::<T>()?;
      if !self.table_exists(&table).await? {
         return Ok(None);
      }

      let statement = SqlStatement::new(selector.clone().limit(1).to_sql(&table)?);
      Ok(self.query(&statement).await?.into_iter().next())
   }

   pub async fn find_db_model_all_of<T: Record>(
      &self,
      selector: &DbModelSelector<T>,
   ) -> Result<Vec<DbModel>> {
      let table = self.describe::<T>()?;
      if !self.table_exists(&table).await? {
         return Ok(Vec::new());
      }

      let statement = SqlStatement::new(selector.to_sql(&table)?);
      self.query(&statement).await
   }

   // ============================================================================
   // Tables and raw statements
   // ============================================================================

   pub async fn create_table_if_not_exist<T: Record>(&self) -> Result<()> {
      let table = self.describe::<T>()?;
      if table.is_existence_confirmed() {
         return Ok(());
      }

      let mut section = self.begin_transaction().await?;
      let result = section.create_table_if_not_exist(&table).await;
      section.end(result).await
   }

   pub async fn table_is_exist<T: Record>(&self) -> Result<bool> {
      let table = self.describe::<T>()?;
      self.table_exists(&table).await
   }

   /// Drop `T`'s table. The descriptor is forgotten so the next use creates
   /// the table again.
   pub async fn drop_table<T: Record>(&self) -> Result<()> {
      let table = self.describe::<T>()?;
      self
         .execute_exclusive(&sql::drop_table(table.table_name()))
         .await?;
      self.tables.forget(table.table_name());
      debug!("Dropped table {} in {}", table.table_name(), self.name);
      Ok(())
   }

   /// Drop every user table in the database. A table that fails to drop is
   /// logged and skipped.
   pub async fn drop_db(&self) -> Result<()> {
      let rows = self.query(&sql::list_tables()).await?;

      for name in rows.iter().filter_map(|row| row.get_str("name")) {
         match self.execute_exclusive(&sql::drop_table(name)).await {
            Ok(_) => {
               self.tables.forget(name);
               debug!("Dropped table {} in {}", name, self.name);
            }
            Err(e) => error!("Failed to drop table {} in {}: {}", name, self.name, e),
         }
      }
      Ok(())
   }

   /// Run an arbitrary mutating statement in a write section.
   pub async fn exec_non_query(&self, statement: &SqlStatement) -> Result<WriteQueryResult> {
      let mut section = self.begin_transaction().await?;
      let result = section.execute(statement).await;
      section.end(result).await
   }

   /// Run an arbitrary query on the read pool, uncached.
   pub async fn exec_query(&self, statement: &SqlStatement) -> Result<Vec<DbModel>> {
      self.query(statement).await
   }

   /// Bring the file's recorded schema version in line with the configured
   /// one, running the upgrade listener or dropping every table.
   pub(crate) async fn reconcile_version(&self) -> Result<()> {
      let config = self.config();
      let old_version = self.db.user_version().await?;
      let new_version = config.db_version;
      if old_version == new_version {
         return Ok(());
      }

      if old_version != 0 {
         match &config.upgrade_listener {
            Some(listener) => {
               debug!(
                  "Upgrading {} from version {} to {}",
                  self.name, old_version, new_version
               );
               listener.on_upgrade(self, old_version, new_version).await?;
            }
            None => {
               debug!(
                  "No upgrade listener for {}, dropping all tables (version {} to {})",
                  self.name, old_version, new_version
               );
               if let Err(e) = self.drop_db().await {
                  error!("Failed to drop tables of {} during upgrade: {}", self.name, e);
               }
            }
         }
      }

      self.db.set_user_version(new_version).await?;
      Ok(())
   }

   pub(crate) async fn close(&self) -> Result<()> {
      self.cache.clear();
      self.db.close().await?;
      Ok(())
   }
}

impl std::fmt::Debug for Store {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Store")
         .field("name", &self.name)
         .field("path", &self.db.path())
         .field("allow_transaction", &self.allow_transaction())
         .field("tables", &self.tables.len())
         .field("cached", &self.cache.len())
         .finish()
   }
}

async fn insert_binding_id<T: Record>(
   section: &mut WriteSection<'_>,
   table: &TableDescriptor<T>,
   record: &mut T,
) -> Result<bool> {
   // A preset id is the bound id, whatever its value
   let generated = table.is_auto_increment() && table.id_value(record)?.is_null();
   let written = section.execute(&sql::insert(table, record)?).await?;
   if !generated {
      return Ok(true);
   }

   if written.last_insert_id <= 0 {
      return Ok(false);
   }
   table.set_auto_increment_id(record, written.last_insert_id)?;
   Ok(!table.id_value(record)?.is_null())
}

async fn save_or_update_in<T: Record>(
   section: &mut WriteSection<'_>,
   table: &TableDescriptor<T>,
   record: &mut T,
   strict: bool,
) -> Result<()> {
   if !table.is_auto_increment() {
      section.execute(&sql::replace(table, record)?).await?;
      return Ok(());
   }

   if !table.id_value(record)?.is_null() {
      section.execute(&sql::update(table, record, &[])?).await?;
   } else if !insert_binding_id(section, table, record).await? {
      if strict {
         return Err(MapperError::BindingIdFailed(table.table_name().to_string()).into());
      }
      warn!("No generated id reported for insert into {}", table.table_name());
   }
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_stats_serialize_camel_case() {
      let stats = StoreStats {
         statements_executed: 3,
         queries: 7,
      };
      let json = serde_json::to_value(stats).unwrap();
      assert_eq!(json, serde_json::json!({ "statementsExecuted": 3, "queries": 7 }));
   }
}
