//! # sqlite-dao
//!
//! Typed record persistence for SQLite.
//!
//! A record type declares its table once through [`Record::schema`]. A
//! [`Store`] then saves, updates, deletes and finds records of any declared
//! type, creating tables on first write.
//!
//! ## Behavior
//!
//! - **Serialized writes**: every write operation on a store runs in one write
//!   section, admitted in arrival order. With transactions allowed (the
//!   default) a section is a native transaction, so a batch applies all or
//!   nothing
//! - **Cached finds**: identical finds with no write in between return the same
//!   shared result. Any write in any store of the registry invalidates every
//!   cache
//! - **Schema versions**: opening a store with a new [`DaoConfig::db_version`]
//!   runs the configured [`DbUpgradeListener`], or drops every table when
//!   there is none
//!
//! ## Usage
//!
//! ```no_run
//! use sqlite_dao::{DaoConfig, Record, Schema, Selector, StoreRegistry};
//!
//! #[derive(Debug, Default)]
//! struct Note {
//!    id: Option<i64>,
//!    title: String,
//!    pinned: bool,
//! }
//!
//! impl Record for Note {
//!    fn schema() -> Schema<Self> {
//!       Schema::<Self>::new("notes")
//!          .auto_id("id", |n| n.id, |n, v| n.id = v)
//!          .column("title", |n| n.title.clone(), |n, v| n.title = v)
//!          .column("pinned", |n| n.pinned, |n, v| n.pinned = v)
//!    }
//! }
//!
//! #[tokio::main]
//! async fn main() -> sqlite_dao::Result<()> {
//!    let registry = StoreRegistry::new();
//!    let store = registry.open(DaoConfig::new("notes.db").with_db_dir("data")).await?;
//!
//!    let mut note = Note { id: None, title: "groceries".into(), pinned: true };
//!    store.save_binding_id(&mut note).await?;
//!
//!    let pinned = store
//!       .find_all(&Selector::<Note>::new().and("pinned", "=", true).order_by("title"))
//!       .await?;
//!    println!("{} pinned note(s)", pinned.len());
//!
//!    registry.close_all().await
//! }
//! ```

mod cache;
mod config;
mod error;
mod registry;
mod store;
mod tables;
mod transactions;

pub use cache::{FindCache, FindSequence};
pub use config::{DaoConfig, DbUpgradeListener};
pub use error::{DbError, Result};
pub use registry::StoreRegistry;
pub use store::{Store, StoreStats};
pub use tables::TableRegistry;

pub use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
pub use sqlx_sqlite_mapper::{
   ColumnDef, DbModel, DbModelSelector, Error as MapperError, FieldError, Foreign, Json, Record,
   Schema, SchemaError, Selector, SortDirection, SqlField, SqlStatement, SqlType, TableDescriptor,
   Value, WhereBuilder, WriteQueryResult, quote_identifier,
};
