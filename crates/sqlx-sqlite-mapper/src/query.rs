//! Statement execution and row decoding

use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Executor, Row, Sqlite, TypeInfo, ValueRef};

use crate::db_model::DbModel;
use crate::error::{Error, Result};
use crate::sql::SqlStatement;
use crate::value::Value;

/// Result returned from write statements (INSERT, UPDATE, DELETE, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteQueryResult {
   /// The number of rows affected by the write operation.
   pub rows_affected: u64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Only meaningful after an INSERT on a table with a ROWID; SQLite keeps
   /// reporting the previous insert's rowid otherwise.
   pub last_insert_id: i64,
}

/// Run a statement that returns no rows.
pub async fn execute<'c, E>(executor: E, statement: &SqlStatement) -> Result<WriteQueryResult>
where
   E: Executor<'c, Database = Sqlite>,
{
   let result = bind_all(statement).execute(executor).await?;
   Ok(WriteQueryResult {
      rows_affected: result.rows_affected(),
      last_insert_id: result.last_insert_rowid(),
   })
}

/// Run a query and decode every row.
pub async fn fetch_all<'c, E>(executor: E, statement: &SqlStatement) -> Result<Vec<DbModel>>
where
   E: Executor<'c, Database = Sqlite>,
{
   let rows = bind_all(statement).fetch_all(executor).await?;
   rows.iter().map(decode_row).collect()
}

fn bind_all(statement: &SqlStatement) -> Query<'_, Sqlite, SqliteArguments<'_>> {
   statement
      .bind_args()
      .iter()
      .fold(sqlx::query(statement.sql()), bind_value)
}

/// Bind one [`Value`] to the next placeholder.
pub(crate) fn bind_value<'q>(
   query: Query<'q, Sqlite, SqliteArguments<'q>>,
   value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
   match value {
      Value::Null => query.bind(None::<i64>),
      Value::Integer(i) => query.bind(*i),
      Value::Real(f) => query.bind(*f),
      Value::Text(s) => query.bind(s.as_str()),
      Value::Blob(b) => query.bind(b.as_slice()),
   }
}

/// Decode a row into column order.
pub fn decode_row(row: &SqliteRow) -> Result<DbModel> {
   let mut model = DbModel::new();
   for (i, column) in row.columns().iter().enumerate() {
      let raw = row.try_get_raw(i)?;
      model.insert(column.name(), to_value(raw)?);
   }
   Ok(model)
}

/// Convert a raw SQLite value by its runtime storage class.
pub fn to_value(raw: SqliteValueRef<'_>) -> Result<Value> {
   if raw.is_null() {
      return Ok(Value::Null);
   }

   let type_name = raw.type_info().name().to_ascii_uppercase();
   let value = match type_name.as_str() {
      "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" | "BOOL" => {
         Value::Integer(<i64 as Decode<Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?)
      }
      "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
         Value::Real(<f64 as Decode<Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?)
      }
      "TEXT" | "DATE" | "TIME" | "DATETIME" => {
         Value::Text(<String as Decode<Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?)
      }
      "BLOB" => Value::Blob(<Vec<u8> as Decode<Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?),
      "NULL" => Value::Null,
      other => return Err(Error::UnsupportedDatatype(other.to_string())),
   };

   Ok(value)
}

#[cfg(test)]
mod tests {
   use super::*;
   use sqlx_sqlite_conn_mgr::SqliteDatabase;
   use std::sync::Arc;
   use tempfile::TempDir;

   async fn create_test_db() -> (Arc<SqliteDatabase>, TempDir) {
      let temp = TempDir::new().unwrap();
      let db = SqliteDatabase::connect(temp.path().join("query.db"), None)
         .await
         .unwrap();
      (db, temp)
   }

   #[tokio::test]
   async fn test_bind_and_decode_every_storage_class() {
      let (db, _temp) = create_test_db().await;
      let mut writer = db.acquire_writer().await.unwrap();

      execute(
         &mut *writer,
         &SqlStatement::new("CREATE TABLE t (id INTEGER PRIMARY KEY, i INTEGER, r REAL, s TEXT, b BLOB, n TEXT)"),
      )
      .await
      .unwrap();

      let result = execute(
         &mut *writer,
         &SqlStatement::new("INSERT INTO t (i, r, s, b, n) VALUES (?, ?, ?, ?, ?)")
            .bind(42)
            .bind(1.5)
            .bind("text")
            .bind(vec![1u8, 2, 3])
            .bind(Value::Null),
      )
      .await
      .unwrap();
      drop(writer);

      assert_eq!(result.rows_affected, 1);
      assert_eq!(result.last_insert_id, 1);

      let rows = fetch_all(
         db.read_pool().unwrap(),
         &SqlStatement::new("SELECT i, r, s, b, n FROM t"),
      )
      .await
      .unwrap();

      assert_eq!(rows.len(), 1);
      let row = &rows[0];
      assert_eq!(row.get("i"), Some(&Value::Integer(42)));
      assert_eq!(row.get("r"), Some(&Value::Real(1.5)));
      assert_eq!(row.get("s"), Some(&Value::from("text")));
      assert_eq!(row.get("b"), Some(&Value::Blob(vec![1, 2, 3])));
      assert_eq!(row.get("n"), Some(&Value::Null));
   }

   #[tokio::test]
   async fn test_decoding_follows_stored_class_not_declared_type() {
      let (db, _temp) = create_test_db().await;
      let mut writer = db.acquire_writer().await.unwrap();

      execute(&mut *writer, &SqlStatement::new("CREATE TABLE t (v TEXT)"))
         .await
         .unwrap();
      execute(
         &mut *writer,
         &SqlStatement::new("INSERT INTO t (v) VALUES (?)").bind(Value::Blob(vec![0xff])),
      )
      .await
      .unwrap();

      let rows = fetch_all(&mut *writer, &SqlStatement::new("SELECT v, count(*) AS c FROM t"))
         .await
         .unwrap();
      assert_eq!(rows[0].get("v"), Some(&Value::Blob(vec![0xff])));
      assert_eq!(rows[0].get_i64("c"), Some(1));
   }

   #[tokio::test]
   async fn test_engine_errors_carry_sqlite_code() {
      let (db, _temp) = create_test_db().await;
      let mut writer = db.acquire_writer().await.unwrap();

      execute(&mut *writer, &SqlStatement::new("CREATE TABLE t (v TEXT UNIQUE)"))
         .await
         .unwrap();
      let insert = SqlStatement::new("INSERT INTO t (v) VALUES (?)").bind("x");
      execute(&mut *writer, &insert).await.unwrap();

      let err = execute(&mut *writer, &insert).await.unwrap_err();
      assert!(matches!(err, Error::Sqlx(_)));
      assert!(err.error_code().starts_with("SQLITE_"));
   }

   #[test]
   fn test_write_result_serializes_camel_case() {
      let result = WriteQueryResult {
         rows_affected: 2,
         last_insert_id: 9,
      };
      assert_eq!(
         serde_json::to_string(&result).unwrap(),
         r#"{"rowsAffected":2,"lastInsertId":9}"#
      );
   }
}
