//! Predicate and SELECT builders.
//!
//! [`WhereBuilder`] renders a WHERE clause with caller-supplied values
//! inlined as SQL literals, so the finished SELECT text fully identifies a
//! query. [`Selector`] adds ordering, limit/offset and foreign-column joins
//! on top of a record's table; [`DbModelSelector`] switches to a raw
//! projection with grouping for aggregate queries.
//!
//! # Example
//!
//! ```
//! use sqlx_sqlite_mapper::WhereBuilder;
//!
//! let filter = WhereBuilder::b("age", ">", 18)
//!    .and("email", "!=", None::<String>)
//!    .or_group(WhereBuilder::b("role", "=", "admin"));
//!
//! assert_eq!(
//!    filter.to_sql(),
//!    "age > 18 AND email IS NOT NULL OR (role = 'admin')"
//! );
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sql::quote_identifier;
use crate::table::TableDescriptor;
use crate::value::Value;

/// Sort direction for an ORDER BY term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
   /// Ascending order (smallest first)
   Asc,
   /// Descending order (largest first)
   Desc,
}

impl SortDirection {
   fn as_sql(self) -> &'static str {
      match self {
         SortDirection::Asc => "ASC",
         SortDirection::Desc => "DESC",
      }
   }
}

/// Validate that a column name is safe for SQL interpolation.
///
/// Accepts names matching `[a-zA-Z_][a-zA-Z0-9_.]*`.
pub(crate) fn validate_column_name(name: &str) -> Result<()> {
   let mut chars = name.chars();
   let valid = match chars.next() {
      Some(first) if first.is_ascii_alphabetic() || first == '_' => {
         chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.')
      }
      _ => false,
   };

   if valid {
      Ok(())
   } else {
      Err(Error::InvalidColumnName {
         name: name.to_string(),
      })
   }
}

/// Builder for a WHERE clause.
///
/// Conditions are joined left to right with `AND`/`OR` and SQL operator
/// precedence applies; use [`and_group`](Self::and_group) /
/// [`or_group`](Self::or_group) for explicit parentheses. Column names and
/// operators are emitted verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereBuilder {
   clause: String,
}

impl WhereBuilder {
   pub fn new() -> Self {
      Self::default()
   }

   /// Start a builder with a single condition.
   pub fn b(column: &str, op: &str, value: impl Into<Value>) -> Self {
      Self::new().and(column, op, value)
   }

   pub fn and(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
      self.push("AND", condition(column, op, &value.into()))
   }

   pub fn or(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
      self.push("OR", condition(column, op, &value.into()))
   }

   pub fn and_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
      self.push("AND", in_list(column, "IN", values))
   }

   pub fn or_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
      self.push("OR", in_list(column, "IN", values))
   }

   pub fn and_not_in<V: Into<Value>>(
      self,
      column: &str,
      values: impl IntoIterator<Item = V>,
   ) -> Self {
      self.push("AND", in_list(column, "NOT IN", values))
   }

   pub fn and_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
      let fragment = format!(
         "{column} BETWEEN {} AND {}",
         low.into().to_sql_literal(),
         high.into().to_sql_literal()
      );
      self.push("AND", fragment)
   }

   /// Append a raw SQL fragment with `AND`.
   pub fn and_expr(self, expr: impl Into<String>) -> Self {
      self.push("AND", expr.into())
   }

   /// Append a raw SQL fragment with `OR`.
   pub fn or_expr(self, expr: impl Into<String>) -> Self {
      self.push("OR", expr.into())
   }

   /// Append another builder in parentheses with `AND`. Empty groups are ignored.
   pub fn and_group(self, group: WhereBuilder) -> Self {
      if group.is_empty() {
         return self;
      }
      self.push("AND", format!("({})", group.clause))
   }

   /// Append another builder in parentheses with `OR`. Empty groups are ignored.
   pub fn or_group(self, group: WhereBuilder) -> Self {
      if group.is_empty() {
         return self;
      }
      self.push("OR", format!("({})", group.clause))
   }

   pub fn is_empty(&self) -> bool {
      self.clause.is_empty()
   }

   /// The rendered clause, without the `WHERE` keyword.
   pub fn to_sql(&self) -> &str {
      &self.clause
   }

   fn push(mut self, connector: &str, fragment: String) -> Self {
      if self.clause.is_empty() {
         self.clause = fragment;
      } else {
         self.clause = format!("{} {connector} {fragment}", self.clause);
      }
      self
   }
}

impl fmt::Display for WhereBuilder {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.clause)
   }
}

fn condition(column: &str, op: &str, value: &Value) -> String {
   let op = op.trim();

   if value.is_null() {
      match op.to_ascii_uppercase().as_str() {
         "=" | "==" | "IS" => return format!("{column} IS NULL"),
         "!=" | "<>" | "IS NOT" => return format!("{column} IS NOT NULL"),
         _ => {}
      }
   }

   format!("{column} {op} {}", value.to_sql_literal())
}

fn in_list<V: Into<Value>>(column: &str, op: &str, values: impl IntoIterator<Item = V>) -> String {
   let literals: Vec<String> = values
      .into_iter()
      .map(|v| v.into().to_sql_literal())
      .collect();

   // An empty list matches nothing (IN) or everything (NOT IN)
   if literals.is_empty() {
      return if op == "IN" { "0" } else { "1" }.to_string();
   }

   format!("{column} {op} ({})", literals.join(", "))
}

/// SELECT over a record type's table.
///
/// Queries built from the same selector state render identical SQL text.
pub struct Selector<T> {
   filter: WhereBuilder,
   order_by: Vec<(String, SortDirection)>,
   limit: Option<i64>,
   offset: Option<i64>,
   joins: Vec<String>,
   _record: PhantomData<fn() -> T>,
}

impl<T> Selector<T> {
   pub fn new() -> Self {
      Self {
         filter: WhereBuilder::new(),
         order_by: Vec::new(),
         limit: None,
         offset: None,
         joins: Vec::new(),
         _record: PhantomData,
      }
   }

   /// Replace the WHERE clause.
   pub fn filter(mut self, filter: WhereBuilder) -> Self {
      self.filter = filter;
      self
   }

   pub fn and(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
      self.filter = self.filter.and(column, op, value);
      self
   }

   pub fn or(mut self, column: &str, op: &str, value: impl Into<Value>) -> Self {
      self.filter = self.filter.or(column, op, value);
      self
   }

   /// Append a raw predicate fragment with `AND`.
   pub fn expr(mut self, expr: impl Into<String>) -> Self {
      self.filter = self.filter.and_expr(expr);
      self
   }

   pub fn order_by(mut self, column: impl Into<String>) -> Self {
      self.order_by.push((column.into(), SortDirection::Asc));
      self
   }

   pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
      self.order_by.push((column.into(), SortDirection::Desc));
      self
   }

   pub fn limit(mut self, limit: i64) -> Self {
      self.limit = Some(limit);
      self
   }

   pub fn offset(mut self, offset: i64) -> Self {
      self.offset = Some(offset);
      self
   }

   /// LEFT JOIN the table referenced by a foreign column.
   ///
   /// The referenced record's columns are projected as `"<column>.<field>"`
   /// and attached to the column's [`Foreign`](crate::Foreign) value when
   /// the row is materialized. With a join in place, predicate columns that
   /// exist on both tables must be qualified.
   pub fn join(mut self, column: impl Into<String>) -> Self {
      let column = column.into();
      if !self.joins.contains(&column) {
         self.joins.push(column);
      }
      self
   }

   /// Switch to a raw projection. The result is read as
   /// [`DbModel`](crate::DbModel) rows rather than records.
   pub fn select<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> DbModelSelector<T> {
      DbModelSelector::new(self).select(columns)
   }

   /// Switch to a grouped raw projection.
   pub fn group_by(self, column: impl Into<String>) -> DbModelSelector<T> {
      DbModelSelector::new(self).group_by(column)
   }

   pub fn where_clause(&self) -> &WhereBuilder {
      &self.filter
   }

   pub fn to_sql(&self, table: &TableDescriptor<T>) -> Result<String> {
      self.render(table, None, &[], None)
   }

   fn render(
      &self,
      table: &TableDescriptor<T>,
      columns: Option<&[String]>,
      group_by: &[String],
      having: Option<&str>,
   ) -> Result<String> {
      let table_name = quote_identifier(table.table_name());
      let mut projection = match columns {
         Some(columns) if !columns.is_empty() => columns.join(", "),
         _ if self.joins.is_empty() => "*".to_string(),
         _ => format!("{table_name}.*"),
      };
      let mut from = table_name.clone();

      for column in &self.joins {
         let link = table
            .column(column)
            .ok_or_else(|| Error::UnknownColumn {
               table: table.table_name().to_string(),
               column: column.clone(),
            })?
            .foreign_link()
            .ok_or_else(|| Error::NotForeignColumn {
               table: table.table_name().to_string(),
               column: column.clone(),
            })?;
         let target = link.target()?;
         let alias = quote_identifier(column);

         if columns.is_none() {
            for field in &target.columns {
               projection.push_str(&format!(
                  ", {alias}.{} AS {}",
                  quote_identifier(field),
                  quote_identifier(&format!("{column}.{field}"))
               ));
            }
         }

         from.push_str(&format!(
            " LEFT JOIN {} AS {alias} ON {alias}.{} = {table_name}.{alias}",
            quote_identifier(&target.table_name),
            quote_identifier(&target.id_column)
         ));
      }

      let mut sql = format!("SELECT {projection} FROM {from}");

      if !self.filter.is_empty() {
         sql.push_str(" WHERE ");
         sql.push_str(self.filter.to_sql());
      }

      if !group_by.is_empty() {
         for column in group_by {
            validate_column_name(column)?;
         }
         sql.push_str(" GROUP BY ");
         sql.push_str(&group_by.join(", "));

         if let Some(having) = having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
         }
      }

      if !self.order_by.is_empty() {
         let terms = self
            .order_by
            .iter()
            .map(|(column, direction)| {
               let column = self.order_column(&table_name, column)?;
               Ok(format!("{column} {}", direction.as_sql()))
            })
            .collect::<Result<Vec<_>>>()?;
         sql.push_str(" ORDER BY ");
         sql.push_str(&terms.join(", "));
      }

      match (self.limit, self.offset) {
         (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
         (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
         (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
         (None, None) => {}
      }

      Ok(sql)
   }

   /// Quote an ORDER BY column. `table.column` and `alias.column` are quoted
   /// part by part; a bare name is qualified with the base table once a join
   /// is in place.
   fn order_column(&self, table_name: &str, column: &str) -> Result<String> {
      validate_column_name(column)?;

      match column.split('.').collect::<Vec<_>>().as_slice() {
         [field] if self.joins.is_empty() => Ok(quote_identifier(field)),
         [field] => Ok(format!("{table_name}.{}", quote_identifier(field))),
         [qualifier, field] if !qualifier.is_empty() && !field.is_empty() => Ok(format!(
            "{}.{}",
            quote_identifier(qualifier),
            quote_identifier(field)
         )),
         _ => Err(Error::InvalidColumnName {
            name: column.to_string(),
         }),
      }
   }
}

impl<T> Default for Selector<T> {
   fn default() -> Self {
      Self::new()
   }
}

impl<T> Clone for Selector<T> {
   fn clone(&self) -> Self {
      Self {
         filter: self.filter.clone(),
         order_by: self.order_by.clone(),
         limit: self.limit,
         offset: self.offset,
         joins: self.joins.clone(),
         _record: PhantomData,
      }
   }
}

impl<T> fmt::Debug for Selector<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Selector")
         .field("filter", &self.filter)
         .field("order_by", &self.order_by)
         .field("limit", &self.limit)
         .field("offset", &self.offset)
         .field("joins", &self.joins)
         .finish()
   }
}

/// SELECT with a raw projection over a record type's table.
pub struct DbModelSelector<T> {
   selector: Selector<T>,
   columns: Vec<String>,
   group_by: Vec<String>,
   having: Option<String>,
}

impl<T> DbModelSelector<T> {
   pub fn new(selector: Selector<T>) -> Self {
      Self {
         selector,
         columns: Vec::new(),
         group_by: Vec::new(),
         having: None,
      }
   }

   /// Add projected expressions, emitted verbatim (`count(*) AS n` is fine).
   pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
      self.columns.extend(columns.into_iter().map(Into::into));
      self
   }

   pub fn group_by(mut self, column: impl Into<String>) -> Self {
      self.group_by.push(column.into());
      self
   }

   /// Raw HAVING fragment; only rendered with a GROUP BY.
   pub fn having(mut self, expr: impl Into<String>) -> Self {
      self.having = Some(expr.into());
      self
   }

   pub fn limit(mut self, limit: i64) -> Self {
      self.selector = self.selector.limit(limit);
      self
   }

   pub fn to_sql(&self, table: &TableDescriptor<T>) -> Result<String> {
      self.selector.render(
         table,
         Some(&self.columns),
         &self.group_by,
         self.having.as_deref(),
      )
   }
}

impl<T> Clone for DbModelSelector<T> {
   fn clone(&self) -> Self {
      Self {
         selector: self.selector.clone(),
         columns: self.columns.clone(),
         group_by: self.group_by.clone(),
         having: self.having.clone(),
      }
   }
}

impl<T> fmt::Debug for DbModelSelector<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("DbModelSelector")
         .field("selector", &self.selector)
         .field("columns", &self.columns)
         .field("group_by", &self.group_by)
         .field("having", &self.having)
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::field::Foreign;
   use crate::table::{Record, Schema};

   #[derive(Debug, Default)]
   struct Author {
      id: Option<i64>,
      name: String,
   }

   impl Record for Author {
      fn schema() -> Schema<Self> {
         Schema::<Self>::new("authors")
            .auto_id("id", |a| a.id, |a, v| a.id = v)
            .column("name", |a| a.name.clone(), |a, v| a.name = v)
      }
   }

   #[derive(Debug, Default)]
   struct Book {
      id: Option<i64>,
      title: String,
      author: Foreign<Author>,
   }

   impl Record for Book {
      fn schema() -> Schema<Self> {
         Schema::<Self>::new("books")
            .auto_id("id", |b| b.id, |b, v| b.id = v)
            .column("title", |b| b.title.clone(), |b, v| b.title = v)
            .foreign("author", |b| b.author.clone(), |b, v| b.author = v)
      }
   }

   fn books() -> TableDescriptor<Book> {
      Book::schema().build().unwrap()
   }

   #[test]
   fn where_null_comparisons_use_is() {
      let filter = WhereBuilder::b("a", "=", Value::Null).or("b", "<>", None::<i64>);
      assert_eq!(filter.to_sql(), "a IS NULL OR b IS NOT NULL");
   }

   #[test]
   fn where_inlines_escaped_literals() {
      let filter = WhereBuilder::b("name", "=", "O'Brien").and("age", ">=", 21);
      assert_eq!(filter.to_sql(), "name = 'O''Brien' AND age >= 21");
   }

   #[test]
   fn where_in_and_between() {
      let filter = WhereBuilder::new()
         .and_in("id", [1, 2, 3])
         .and_not_in("tag", ["x"])
         .and_between("score", 1.5, 3.0);
      assert_eq!(
         filter.to_sql(),
         "id IN (1, 2, 3) AND tag NOT IN ('x') AND score BETWEEN 1.5 AND 3.0"
      );
   }

   #[test]
   fn where_empty_in_list() {
      assert_eq!(WhereBuilder::new().and_in("id", Vec::<i64>::new()).to_sql(), "0");
      assert_eq!(WhereBuilder::new().and_not_in("id", Vec::<i64>::new()).to_sql(), "1");
   }

   #[test]
   fn where_groups_are_parenthesised() {
      let filter = WhereBuilder::b("a", "=", 1)
         .and_group(WhereBuilder::b("b", "=", 2).or("c", "=", 3))
         .or_group(WhereBuilder::new());
      assert_eq!(filter.to_sql(), "a = 1 AND (b = 2 OR c = 3)");
   }

   #[test]
   fn select_plain() {
      let sql = Selector::<Book>::new().to_sql(&books()).unwrap();
      assert_eq!(sql, r#"SELECT * FROM "books""#);
   }

   #[test]
   fn select_with_filter_order_and_paging() {
      let sql = Selector::<Book>::new()
         .and("title", "LIKE", "R%")
         .order_by_desc("id")
         .order_by("title")
         .limit(10)
         .offset(20)
         .to_sql(&books())
         .unwrap();
      assert_eq!(
         sql,
         r#"SELECT * FROM "books" WHERE title LIKE 'R%' ORDER BY "id" DESC, "title" ASC LIMIT 10 OFFSET 20"#
      );
   }

   #[test]
   fn select_offset_without_limit() {
      let sql = Selector::<Book>::new().offset(5).to_sql(&books()).unwrap();
      assert_eq!(sql, r#"SELECT * FROM "books" LIMIT -1 OFFSET 5"#);
   }

   #[test]
   fn select_with_join_projects_prefixed_columns() {
      let sql = Selector::<Book>::new()
         .join("author")
         .order_by("id")
         .to_sql(&books())
         .unwrap();
      assert_eq!(
         sql,
         concat!(
            r#"SELECT "books".*, "author"."id" AS "author.id", "author"."name" AS "author.name" "#,
            r#"FROM "books" LEFT JOIN "authors" AS "author" ON "author"."id" = "books"."author" "#,
            r#"ORDER BY "books"."id" ASC"#
         )
      );
   }

   #[test]
   fn join_rejects_plain_and_unknown_columns() {
      let err = Selector::<Book>::new().join("title").to_sql(&books()).unwrap_err();
      assert_eq!(err.error_code(), "NOT_FOREIGN_COLUMN");

      let err = Selector::<Book>::new().join("nope").to_sql(&books()).unwrap_err();
      assert_eq!(err.error_code(), "UNKNOWN_COLUMN");
   }

   #[test]
   fn order_by_rejects_injection() {
      let err = Selector::<Book>::new()
         .order_by("id; DROP TABLE books")
         .to_sql(&books())
         .unwrap_err();
      assert_eq!(err.error_code(), "INVALID_COLUMN_NAME");
   }

   #[test]
   fn order_by_qualified_columns_quotes_each_part() {
      let sql = Selector::<Book>::new()
         .order_by("books.title")
         .to_sql(&books())
         .unwrap();
      assert_eq!(sql, r#"SELECT * FROM "books" ORDER BY "books"."title" ASC"#);

      let sql = Selector::<Book>::new()
         .join("author")
         .order_by_desc("author.name")
         .order_by("title")
         .to_sql(&books())
         .unwrap();
      assert!(sql.ends_with(r#"ORDER BY "author"."name" DESC, "books"."title" ASC"#));
   }

   #[test]
   fn order_by_rejects_malformed_qualified_names() {
      for column in ["a.b.c", "books.", "books..title"] {
         let err = Selector::<Book>::new()
            .order_by(column)
            .to_sql(&books())
            .unwrap_err();
         assert_eq!(err.error_code(), "INVALID_COLUMN_NAME", "{column}");
      }
   }

   #[test]
   fn db_model_selector_groups() {
      let sql = Selector::<Book>::new()
         .and("title", "!=", "")
         .select(["author", "count(*) AS books"])
         .group_by("author")
         .having("count(*) > 1")
         .to_sql(&books())
         .unwrap();
      assert_eq!(
         sql,
         r#"SELECT author, count(*) AS books FROM "books" WHERE title != '' GROUP BY author HAVING count(*) > 1"#
      );
   }

   #[test]
   fn selector_clone_renders_same_sql() {
      let selector = Selector::<Book>::new().and("id", ">", 3).limit(1);
      let table = books();
      assert_eq!(
         selector.to_sql(&table).unwrap(),
         selector.clone().to_sql(&table).unwrap()
      );
   }
}
