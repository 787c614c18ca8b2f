//! Connection manager errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
   /// Creating the database directory or removing its files failed
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Opening a pool or running a pragma failed
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// The database was closed; its pools no longer hand out connections
   #[error("Database has been closed")]
   DatabaseClosed,
}

impl Error {
   /// Machine-readable code for the error kind.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Io(_) => "IO_ERROR",
         Error::Sqlx(_) => "CONNECTION_ERROR",
         Error::DatabaseClosed => "DATABASE_CLOSED",
      }
   }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_codes() {
      assert_eq!(Error::DatabaseClosed.error_code(), "DATABASE_CLOSED");
      assert_eq!(
         Error::Sqlx(sqlx::Error::PoolTimedOut).error_code(),
         "CONNECTION_ERROR"
      );
      let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
      assert_eq!(Error::from(io).error_code(), "IO_ERROR");
   }
}
