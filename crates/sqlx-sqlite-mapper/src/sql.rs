//! Statement builders.
//!
//! Pure functions from a [`TableDescriptor`] plus a record, predicate or
//! selector to a [`SqlStatement`]. Record values always travel as bind
//! arguments; only caller-supplied predicates are inlined.

use std::fmt;

use crate::error::{Error, Result};
use crate::selector::{Selector, WhereBuilder};
use crate::table::{ColumnDef, TableDescriptor};
use crate::value::Value;

/// SQL text plus positional bind arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlStatement {
   sql: String,
   bind_args: Vec<Value>,
}

impl SqlStatement {
   pub fn new(sql: impl Into<String>) -> Self {
      Self {
         sql: sql.into(),
         bind_args: Vec::new(),
      }
   }

   pub fn with_args(sql: impl Into<String>, bind_args: Vec<Value>) -> Self {
      Self {
         sql: sql.into(),
         bind_args,
      }
   }

   /// Append a bind argument for the next `?` placeholder.
   pub fn bind(mut self, value: impl Into<Value>) -> Self {
      self.bind_args.push(value.into());
      self
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   pub fn bind_args(&self) -> &[Value] {
      &self.bind_args
   }
}

impl fmt::Display for SqlStatement {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.sql)
   }
}

impl From<String> for SqlStatement {
   fn from(sql: String) -> Self {
      Self::new(sql)
   }
}

impl From<&str> for SqlStatement {
   fn from(sql: &str) -> Self {
      Self::new(sql)
   }
}

/// Quote an identifier with double quotes.
///
/// Any embedded double quotes are doubled per SQL standard (`"` → `""`).
pub fn quote_identifier(name: &str) -> String {
   format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column definition as it appears inside CREATE TABLE.
pub fn column_definition<T>(column: &ColumnDef<T>) -> Result<String> {
   let mut definition = format!(
      "{} {}",
      quote_identifier(column.name()),
      column.sql_type()?.as_sql()
   );

   if column.is_primary_key() {
      definition.push_str(" PRIMARY KEY");
      if column.is_auto_increment() {
         definition.push_str(" AUTOINCREMENT");
      }
   }

   if !column.is_nullable() && !column.is_auto_increment() {
      definition.push_str(" NOT NULL");
   }

   if column.is_unique() && !column.is_primary_key() {
      definition.push_str(" UNIQUE");
   }

   if let Some(check) = column.check() {
      definition.push_str(&format!(" CHECK ({check})"));
   }

   Ok(definition)
}

pub fn create_table<T>(table: &TableDescriptor<T>) -> Result<SqlStatement> {
   let columns = table
      .columns()
      .iter()
      .map(column_definition)
      .collect::<Result<Vec<_>>>()?;

   Ok(SqlStatement::new(format!(
      "CREATE TABLE IF NOT EXISTS {} ({})",
      quote_identifier(table.table_name()),
      columns.join(", ")
   )))
}

/// INSERT with every column, except an auto-increment id that is unset.
pub fn insert<T>(table: &TableDescriptor<T>, record: &T) -> Result<SqlStatement> {
   let mut names = Vec::new();
   let mut args = Vec::new();

   for column in table.columns() {
      let value = column.value_of(record)?;
      if column.is_auto_increment() && value.is_null() {
         continue;
      }
      names.push(quote_identifier(column.name()));
      args.push(value);
   }

   Ok(values_statement("INSERT INTO", table.table_name(), names, args))
}

/// REPLACE with every column, id included.
pub fn replace<T>(table: &TableDescriptor<T>, record: &T) -> Result<SqlStatement> {
   let mut names = Vec::new();
   let mut args = Vec::new();

   for column in table.columns() {
      names.push(quote_identifier(column.name()));
      args.push(column.value_of(record)?);
   }

   Ok(values_statement("REPLACE INTO", table.table_name(), names, args))
}

fn values_statement(verb: &str, table_name: &str, names: Vec<String>, args: Vec<Value>) -> SqlStatement {
   let sql = if names.is_empty() {
      format!("{verb} {} DEFAULT VALUES", quote_identifier(table_name))
   } else {
      format!(
         "{verb} {} ({}) VALUES ({})",
         quote_identifier(table_name),
         names.join(", "),
         vec!["?"; names.len()].join(", ")
      )
   };
   SqlStatement::with_args(sql, args)
}

/// UPDATE one record matched by its id.
///
/// `columns` restricts the SET list; empty means every non-id column.
pub fn update<T>(table: &TableDescriptor<T>, record: &T, columns: &[&str]) -> Result<SqlStatement> {
   let id = table.id_value(record)?;
   if id.is_null() {
      return Err(Error::MissingIdValue(table.table_name().to_string()));
   }

   let mut statement = set_clause(table, record, columns)?;
   statement.sql.push_str(&format!(" WHERE {} = ?", quote_identifier(table.id().name())));
   statement.bind_args.push(id);
   Ok(statement)
}

/// UPDATE every row matching a predicate with the record's column values.
pub fn update_where<T>(
   table: &TableDescriptor<T>,
   record: &T,
   filter: &WhereBuilder,
   columns: &[&str],
) -> Result<SqlStatement> {
   let mut statement = set_clause(table, record, columns)?;
   push_where(&mut statement.sql, Some(filter));
   Ok(statement)
}

fn set_clause<T>(table: &TableDescriptor<T>, record: &T, columns: &[&str]) -> Result<SqlStatement> {
   let selected: Vec<&ColumnDef<T>> = if columns.is_empty() {
      table
         .columns()
         .iter()
         .filter(|column| !column.is_primary_key())
         .collect()
   } else {
      columns
         .iter()
         .map(|name| {
            table.column(name).ok_or_else(|| Error::UnknownColumn {
               table: table.table_name().to_string(),
               column: name.to_string(),
            })
         })
         .collect::<Result<_>>()?
   };

   let mut assignments = Vec::with_capacity(selected.len());
   let mut args = Vec::with_capacity(selected.len() + 1);
   for column in selected {
      assignments.push(format!("{} = ?", quote_identifier(column.name())));
      args.push(column.value_of(record)?);
   }

   if assignments.is_empty() {
      return Err(Error::Other(format!(
         "table '{}' has no columns to update",
         table.table_name()
      )));
   }

   Ok(SqlStatement::with_args(
      format!(
         "UPDATE {} SET {}",
         quote_identifier(table.table_name()),
         assignments.join(", ")
      ),
      args,
   ))
}

/// DELETE the row holding the record's current id.
pub fn delete<T>(table: &TableDescriptor<T>, record: &T) -> Result<SqlStatement> {
   delete_by_id(table, table.id_value(record)?)
}

pub fn delete_by_id<T>(table: &TableDescriptor<T>, id: Value) -> Result<SqlStatement> {
   if id.is_null() {
      return Err(Error::MissingIdValue(table.table_name().to_string()));
   }

   Ok(SqlStatement::with_args(
      format!(
         "DELETE FROM {} WHERE {} = ?",
         quote_identifier(table.table_name()),
         quote_identifier(table.id().name())
      ),
      vec![id],
   ))
}

/// DELETE rows matching a predicate, or every row when there is none.
pub fn delete_where<T>(table: &TableDescriptor<T>, filter: Option<&WhereBuilder>) -> SqlStatement {
   let mut sql = format!("DELETE FROM {}", quote_identifier(table.table_name()));
   push_where(&mut sql, filter);
   SqlStatement::new(sql)
}

/// Count rows by id, honoring only the selector's predicate.
pub fn count<T>(table: &TableDescriptor<T>, selector: Option<&Selector<T>>) -> SqlStatement {
   let mut sql = format!(
      "SELECT count({}) AS count FROM {}",
      quote_identifier(table.id().name()),
      quote_identifier(table.table_name())
   );
   push_where(&mut sql, selector.map(Selector::where_clause));
   SqlStatement::new(sql)
}

pub fn select<T>(table: &TableDescriptor<T>, selector: &Selector<T>) -> Result<SqlStatement> {
   selector.to_sql(table).map(SqlStatement::new)
}

/// Existence probe against `sqlite_master`.
pub fn table_exists(table_name: &str) -> SqlStatement {
   SqlStatement::new("SELECT COUNT(*) AS c FROM sqlite_master WHERE type = 'table' AND name = ?")
      .bind(table_name)
}

/// Every user table, excluding SQLite's own bookkeeping.
pub fn list_tables() -> SqlStatement {
   SqlStatement::new(
      "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
   )
}

pub fn drop_table(table_name: &str) -> SqlStatement {
   SqlStatement::new(format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name)))
}

fn push_where(sql: &mut String, filter: Option<&WhereBuilder>) {
   if let Some(filter) = filter
      && !filter.is_empty()
   {
      sql.push_str(" WHERE ");
      sql.push_str(filter.to_sql());
   }
}
