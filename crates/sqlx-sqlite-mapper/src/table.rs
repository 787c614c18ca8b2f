//! Record schemas and the table descriptors derived from them
//!
//! A record type declares its mapping once through [`Record::schema`]:
//! the table name, exactly one id column, and an accessor/mutator pair for
//! every persisted field. [`Schema::build`] validates the declaration and
//! freezes it into a [`TableDescriptor`], which the statement builders and
//! the materializer read from.
//!
//! ```
//! use sqlx_sqlite_mapper::{Record, Schema};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!    id: Option<i64>,
//!    email: String,
//!    age: Option<u32>,
//! }
//!
//! impl Record for User {
//!    fn schema() -> Schema<Self> {
//!       Schema::<Self>::new("users")
//!          .auto_id("id", |u| u.id, |u, v| u.id = v)
//!          .column("email", |u| u.email.clone(), |u, v| u.email = v)
//!          .unique()
//!          .column("age", |u| u.age, |u, v| u.age = v)
//!    }
//! }
//!
//! let table = User::schema().build().unwrap();
//! assert_eq!(table.table_name(), "users");
//! assert!(table.is_auto_increment());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::db_model::DbModel;
use crate::error::{Error, Result, SchemaError};
use crate::field::{FieldError, Foreign, SqlField, SqlType};
use crate::materialize::materialize;
use crate::value::Value;

/// A type persisted as one row of one table.
pub trait Record: Default + Send + Sync + 'static {
   /// Declare the table this type maps to.
   fn schema() -> Schema<Self>;
}

type Getter<T> = Box<dyn Fn(&T) -> std::result::Result<Value, FieldError> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> std::result::Result<(), FieldError> + Send + Sync>;
type ForeignSetter<T, U> = Arc<dyn Fn(&mut T, Foreign<U>) + Send + Sync>;

/// One persisted column of a record type.
pub struct ColumnDef<T> {
   name: String,
   // None for foreign columns, which take the referenced id's type
   sql_type: Option<SqlType>,
   nullable: bool,
   primary_key: bool,
   auto_increment: bool,
   unique: bool,
   check: Option<String>,
   get: Getter<T>,
   set: Setter<T>,
   foreign: Option<Box<dyn ForeignLink<T>>>,
}

impl<T> ColumnDef<T> {
   pub fn name(&self) -> &str {
      &self.name
   }

   /// Declared storage type. Foreign columns report the type of the
   /// referenced table's id, which builds that table's descriptor.
   pub fn sql_type(&self) -> Result<SqlType> {
      match (&self.sql_type, &self.foreign) {
         (Some(sql_type), _) => Ok(*sql_type),
         (None, Some(link)) => Ok(link.target()?.id_type),
         (None, None) => Ok(SqlType::Blob),
      }
   }

   pub fn is_nullable(&self) -> bool {
      self.nullable
   }

   pub fn is_primary_key(&self) -> bool {
      self.primary_key
   }

   pub fn is_auto_increment(&self) -> bool {
      self.auto_increment
   }

   pub fn is_unique(&self) -> bool {
      self.unique
   }

   pub fn check(&self) -> Option<&str> {
      self.check.as_deref()
   }

   /// Whether the column references another record type.
   pub fn is_foreign(&self) -> bool {
      self.foreign.is_some()
   }

   /// Read this column's value from a record.
   pub fn value_of(&self, record: &T) -> Result<Value> {
      (self.get)(record).map_err(|e| self.field_error(e))
   }

   /// Write a column value into a record.
   pub fn assign(&self, record: &mut T, value: Value) -> Result<()> {
      (self.set)(record, value).map_err(|e| self.field_error(e))
   }

   pub(crate) fn foreign_link(&self) -> Option<&dyn ForeignLink<T>> {
      self.foreign.as_deref()
   }

   fn field_error(&self, e: FieldError) -> Error {
      Error::Field {
         column: self.name.clone(),
         message: e.message().to_string(),
      }
   }
}

impl<T> fmt::Debug for ColumnDef<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ColumnDef")
         .field("name", &self.name)
         .field("sql_type", &self.sql_type)
         .field("nullable", &self.nullable)
         .field("primary_key", &self.primary_key)
         .field("auto_increment", &self.auto_increment)
         .field("foreign", &self.foreign.is_some())
         .finish()
   }
}

/// Shape of a referenced table, as needed to join it.
#[derive(Debug, Clone)]
pub(crate) struct ForeignTarget {
   pub(crate) table_name: String,
   pub(crate) id_column: String,
   pub(crate) id_type: SqlType,
   pub(crate) columns: Vec<String>,
}

/// Type-erased link from a column of `T` to the record type it references.
pub(crate) trait ForeignLink<T>: Send + Sync {
   fn target(&self) -> Result<&ForeignTarget>;

   /// Materialize the referenced record from joined columns and attach it.
   fn resolve(&self, record: &mut T, key: Value, joined: &DbModel, seq: u64) -> Result<()>;
}

struct ForeignColumn<T, U> {
   // Built on first use so self-referencing schemas do not recurse
   resolved: OnceLock<std::result::Result<(Arc<TableDescriptor<U>>, ForeignTarget), SchemaError>>,
   set: ForeignSetter<T, U>,
}

impl<T, U: Record> ForeignColumn<T, U> {
   fn resolved(&self) -> Result<&(Arc<TableDescriptor<U>>, ForeignTarget)> {
      self
         .resolved
         .get_or_init(|| {
            let table = U::schema().build()?;
            let id = table.id();
            let target = ForeignTarget {
               table_name: table.table_name().to_string(),
               id_column: id.name().to_string(),
               id_type: id.sql_type.unwrap_or(SqlType::Integer),
               columns: table.column_names().map(str::to_string).collect(),
            };
            Ok((Arc::new(table), target))
         })
         .as_ref()
         .map_err(|e| Error::Schema(e.clone()))
   }
}

impl<T, U> ForeignLink<T> for ForeignColumn<T, U>
where
   T: Send + Sync + 'static,
   U: Record,
{
   fn target(&self) -> Result<&ForeignTarget> {
      Ok(&self.resolved()?.1)
   }

   fn resolve(&self, record: &mut T, key: Value, joined: &DbModel, seq: u64) -> Result<()> {
      let (table, target) = self.resolved()?;

      // LEFT JOIN without a match yields NULL for every joined column
      if joined.get(&target.id_column).is_none_or(Value::is_null) {
         return Ok(());
      }

      let referenced = materialize(table, joined, seq)?;
      (self.set)(record, Foreign::loaded(key, referenced));
      Ok(())
   }
}

/// Declarative mapping of a record type to a table.
///
/// Column modifiers ([`unique`](Self::unique), [`not_null`](Self::not_null),
/// [`check`](Self::check)) apply to the most recently declared column.
pub struct Schema<T> {
   table_name: String,
   columns: Vec<ColumnDef<T>>,
   after_create: Option<String>,
}

impl<T: Record> Schema<T> {
   pub fn new(table_name: impl Into<String>) -> Self {
      Self {
         table_name: table_name.into(),
         columns: Vec::new(),
         after_create: None,
      }
   }

   /// Declare a caller-assigned id column.
   pub fn id<F, G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
   where
      F: SqlField,
      G: Fn(&T) -> F + Send + Sync + 'static,
      S: Fn(&mut T, F) + Send + Sync + 'static,
   {
      let mut column = field_column(name.into(), get, set);
      column.primary_key = true;
      self.columns.push(column);
      self
   }

   /// Declare an engine-assigned id column (`INTEGER PRIMARY KEY AUTOINCREMENT`).
   ///
   /// `None` means "not yet saved"; the generated id is written back through
   /// `set` after an insert.
   pub fn auto_id<G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
   where
      G: Fn(&T) -> Option<i64> + Send + Sync + 'static,
      S: Fn(&mut T, Option<i64>) + Send + Sync + 'static,
   {
      let mut column = field_column(name.into(), get, set);
      column.primary_key = true;
      column.auto_increment = true;
      self.columns.push(column);
      self
   }

   pub fn column<F, G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
   where
      F: SqlField,
      G: Fn(&T) -> F + Send + Sync + 'static,
      S: Fn(&mut T, F) + Send + Sync + 'static,
   {
      self.columns.push(field_column(name.into(), get, set));
      self
   }

   /// Declare a column holding the id of another record type.
   pub fn foreign<U, G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
   where
      U: Record,
      G: Fn(&T) -> Foreign<U> + Send + Sync + 'static,
      S: Fn(&mut T, Foreign<U>) + Send + Sync + 'static,
   {
      let set: ForeignSetter<T, U> = Arc::new(set);
      let key_set = Arc::clone(&set);

      self.columns.push(ColumnDef {
         name: name.into(),
         sql_type: None,
         nullable: true,
         primary_key: false,
         auto_increment: false,
         unique: false,
         check: None,
         get: Box::new(move |record| Ok(get(record).key().clone())),
         set: Box::new(move |record, value| {
            key_set(record, Foreign::to(value));
            Ok(())
         }),
         foreign: Some(Box::new(ForeignColumn {
            resolved: OnceLock::new(),
            set,
         })),
      });
      self
   }

   pub fn unique(mut self) -> Self {
      if let Some(column) = self.columns.last_mut() {
         column.unique = true;
      }
      self
   }

   pub fn not_null(mut self) -> Self {
      if let Some(column) = self.columns.last_mut() {
         column.nullable = false;
      }
      self
   }

   /// Attach a `CHECK (expr)` constraint. `expr` is emitted verbatim.
   pub fn check(mut self, expr: impl Into<String>) -> Self {
      if let Some(column) = self.columns.last_mut() {
         column.check = Some(expr.into());
      }
      self
   }

   /// Statement to run once right after the table is created, e.g. an index.
   pub fn exec_after_create(mut self, sql: impl Into<String>) -> Self {
      self.after_create = Some(sql.into());
      self
   }

   /// Validate the declaration and freeze it.
   pub fn build(self) -> std::result::Result<TableDescriptor<T>, SchemaError> {
      if self.table_name.trim().is_empty() {
         return Err(SchemaError::EmptyTableName);
      }

      let mut seen = HashSet::new();
      for column in &self.columns {
         if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
               table: self.table_name.clone(),
               column: column.name.clone(),
            });
         }
      }

      let mut ids = self
         .columns
         .iter()
         .enumerate()
         .filter(|(_, column)| column.primary_key)
         .map(|(index, _)| index);

      let id_index = match (ids.next(), ids.next()) {
         (Some(index), None) => index,
         (None, _) => return Err(SchemaError::MissingIdColumn(self.table_name)),
         (Some(_), Some(_)) => return Err(SchemaError::DuplicateIdColumn(self.table_name)),
      };

      Ok(TableDescriptor {
         table_name: self.table_name,
         columns: self.columns,
         id_index,
         after_create: self.after_create,
         existence_confirmed: AtomicBool::new(false),
      })
   }
}

fn field_column<T, F, G, S>(name: String, get: G, set: S) -> ColumnDef<T>
where
   F: SqlField,
   G: Fn(&T) -> F + Send + Sync + 'static,
   S: Fn(&mut T, F) + Send + Sync + 'static,
{
   ColumnDef {
      name,
      sql_type: Some(F::SQL_TYPE),
      nullable: F::NULLABLE,
      primary_key: false,
      auto_increment: false,
      unique: false,
      check: None,
      get: Box::new(move |record| get(record).to_value()),
      set: Box::new(move |record, value| {
         set(record, F::from_value(value)?);
         Ok(())
      }),
      foreign: None,
   }
}

/// Immutable description of how a record type maps to its table.
///
/// The only mutable state is the "existence confirmed" flag, set once the
/// table has been seen in the database so later calls can skip the probe.
pub struct TableDescriptor<T> {
   table_name: String,
   columns: Vec<ColumnDef<T>>,
   id_index: usize,
   after_create: Option<String>,
   existence_confirmed: AtomicBool,
}

impl<T> TableDescriptor<T> {
   pub fn table_name(&self) -> &str {
      &self.table_name
   }

   /// All persisted columns in declaration order, id included.
   pub fn columns(&self) -> &[ColumnDef<T>] {
      &self.columns
   }

   pub fn column_names(&self) -> impl Iterator<Item = &str> {
      self.columns.iter().map(ColumnDef::name)
   }

   pub fn column(&self, name: &str) -> Option<&ColumnDef<T>> {
      self.columns.iter().find(|column| column.name == name)
   }

   pub fn id(&self) -> &ColumnDef<T> {
      &self.columns[self.id_index]
   }

   pub fn is_auto_increment(&self) -> bool {
      self.id().auto_increment
   }

   pub fn exec_after_create(&self) -> Option<&str> {
      self.after_create.as_deref()
   }

   pub fn id_value(&self, record: &T) -> Result<Value> {
      self.id().value_of(record)
   }

   /// Write an engine-generated id back into a record.
   pub fn set_auto_increment_id(&self, record: &mut T, id: i64) -> Result<()> {
      self.id().assign(record, Value::Integer(id))
   }

   pub fn is_existence_confirmed(&self) -> bool {
      self.existence_confirmed.load(Ordering::Acquire)
   }

   pub fn confirm_existence(&self) {
      self.existence_confirmed.store(true, Ordering::Release);
   }
}

impl<T> fmt::Debug for TableDescriptor<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("TableDescriptor")
         .field("table_name", &self.table_name)
         .field("id", &self.id().name())
         .field("columns", &self.columns)
         .field("existence_confirmed", &self.is_existence_confirmed())
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[derive(Debug, Default, PartialEq)]
   struct Note {
      id: Option<i64>,
      title: String,
      rank: Option<i32>,
   }

   impl Record for Note {
      fn schema() -> Schema<Self> {
         Schema::<Self>::new("notes")
            .auto_id("id", |n| n.id, |n, v| n.id = v)
            .column("title", |n| n.title.clone(), |n, v| n.title = v)
            .unique()
            .column("rank", |n| n.rank, |n, v| n.rank = v)
            .check("rank >= 0")
      }
   }

   #[derive(Debug, Default)]
   struct Keyless {
      name: String,
   }

   impl Record for Keyless {
      fn schema() -> Schema<Self> {
         Schema::<Self>::new("keyless").column("name", |k| k.name.clone(), |k, v| k.name = v)
      }
   }

   #[test]
   fn test_build_records_column_shape() {
      let table = Note::schema().build().unwrap();

      assert_eq!(table.table_name(), "notes");
      assert_eq!(table.id().name(), "id");
      assert!(table.is_auto_increment());
      assert_eq!(
         table.column_names().collect::<Vec<_>>(),
         vec!["id", "title", "rank"]
      );

      let title = table.column("title").unwrap();
      assert!(title.is_unique());
      assert!(!title.is_nullable());
      assert_eq!(title.sql_type().unwrap(), SqlType::Text);

      let rank = table.column("rank").unwrap();
      assert!(rank.is_nullable());
      assert_eq!(rank.check(), Some("rank >= 0"));
   }

   #[test]
   fn test_missing_id_is_rejected() {
      let err = Keyless::schema().build().unwrap_err();
      assert_eq!(err, SchemaError::MissingIdColumn("keyless".into()));
   }

   #[test]
   fn test_duplicate_id_is_rejected() {
      let err = Note::schema()
         .id("code", |n| n.title.clone(), |n, v| n.title = v)
         .build()
         .unwrap_err();
      assert_eq!(err, SchemaError::DuplicateIdColumn("notes".into()));
   }

   #[test]
   fn test_duplicate_column_is_rejected() {
      let err = Note::schema()
         .column("title", |n| n.title.clone(), |n, v| n.title = v)
         .build()
         .unwrap_err();
      assert!(matches!(err, SchemaError::DuplicateColumn { column, .. } if column == "title"));
   }

   #[test]
   fn test_empty_table_name_is_rejected() {
      let err = Schema::<Note>::new(" ")
         .auto_id("id", |n| n.id, |n, v| n.id = v)
         .build()
         .unwrap_err();
      assert_eq!(err, SchemaError::EmptyTableName);
   }

   #[test]
   fn test_accessors_convert_through_values() {
      let table = Note::schema().build().unwrap();
      let mut note = Note {
         id: None,
         title: "hello".into(),
         rank: Some(2),
      };

      assert_eq!(table.id_value(&note).unwrap(), Value::Null);
      table.set_auto_increment_id(&mut note, 9).unwrap();
      assert_eq!(note.id, Some(9));

      let title = table.column("title").unwrap();
      assert_eq!(title.value_of(&note).unwrap(), Value::from("hello"));

      let err = title.assign(&mut note, Value::Integer(1)).unwrap_err();
      assert_eq!(err.error_code(), "FIELD_CONVERSION");
      assert!(err.to_string().contains("title"));
   }

   #[test]
   fn test_existence_flag() {
      let table = Note::schema().build().unwrap();
      assert!(!table.is_existence_confirmed());
      table.confirm_existence();
      assert!(table.is_existence_confirmed());
   }
}
