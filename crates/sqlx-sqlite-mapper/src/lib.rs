//! # sqlx-sqlite-mapper
//!
//! Declarative mapping between Rust record types and SQLite tables, on top
//! of SQLx and [`sqlx_sqlite_conn_mgr`].
//!
//! ## Core Types
//!
//! - **[`Record`] / [`Schema`]**: A record type declares its table, id column and
//!   field accessors once
//! - **[`TableDescriptor`]**: The validated, immutable form of a schema
//! - **[`SqlStatement`]**: SQL text plus positional bind arguments, produced by the
//!   builders in [`sql`]
//! - **[`WhereBuilder`] / [`Selector`] / [`DbModelSelector`]**: Predicates and SELECTs
//! - **[`DbModel`]**: An untyped, column-ordered result row
//! - **[`materialize`]**: Turns a result row back into a record, following joined
//!   foreign columns
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_conn_mgr::SqliteDatabase;
//! use sqlx_sqlite_mapper::{Record, Schema, Selector, materialize, query, sql};
//!
//! #[derive(Debug, Default)]
//! struct Tag {
//!    id: Option<i64>,
//!    label: String,
//! }
//!
//! impl Record for Tag {
//!    fn schema() -> Schema<Self> {
//!       Schema::<Self>::new("tags")
//!          .auto_id("id", |t| t.id, |t, v| t.id = v)
//!          .column("label", |t| t.label.clone(), |t, v| t.label = v)
//!    }
//! }
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_mapper::Result<()> {
//!    let db = SqliteDatabase::connect("tags.db", None).await?;
//!    let table = Tag::schema().build()?;
//!
//!    let mut writer = db.acquire_writer().await?;
//!    query::execute(&mut *writer, &sql::create_table(&table)?).await?;
//!    let tag = Tag { id: None, label: "rust".into() };
//!    query::execute(&mut *writer, &sql::insert(&table, &tag)?).await?;
//!    drop(writer);
//!
//!    let select = sql::select(&table, &Selector::new().order_by("label"))?;
//!    for row in query::fetch_all(db.read_pool()?, &select).await? {
//!       let tag: Tag = materialize(&table, &row, 0)?;
//!       println!("{tag:?}");
//!    }
//!    Ok(())
//! }
//! ```

mod db_model;
mod error;
mod field;
mod materialize;
pub mod query;
mod selector;
pub mod sql;
mod table;
mod value;

pub use db_model::DbModel;
pub use error::{Error, Result, SchemaError};
pub use field::{FieldError, Foreign, Json, SqlField, SqlType};
pub use materialize::{materialize, materialize_all};
pub use query::WriteQueryResult;
pub use selector::{DbModelSelector, Selector, SortDirection, WhereBuilder};
pub use sql::{SqlStatement, quote_identifier};
pub use table::{ColumnDef, Record, Schema, TableDescriptor};
pub use value::Value;
