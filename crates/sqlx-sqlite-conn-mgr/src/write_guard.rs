//! RAII guard for the single write connection

use std::ops::{Deref, DerefMut};

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;

/// Exclusive handle on the database's only write connection.
///
/// While a `WriteGuard` is alive no other caller can acquire the writer;
/// dropping it returns the connection to the write pool. Dereferences to
/// [`SqliteConnection`], so `&mut *guard` can be passed to any sqlx executor.
#[must_use = "if unused, the write connection is immediately released"]
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
}

impl WriteGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>) -> Self {
      Self { conn }
   }

   /// Close the underlying connection instead of returning it to the pool.
   ///
   /// Used when the guard is dropped with an open transaction: closing the
   /// connection makes SQLite roll the transaction back, so the next writer
   /// never inherits it.
   pub fn close_on_drop(&mut self) {
      self.conn.close_on_drop();
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}
