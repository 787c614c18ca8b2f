use sqlx_sqlite_mapper::{Error as MapperError, SchemaError};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// The single error kind returned by every store operation.
///
/// The underlying cause (engine failure, schema problem, conversion failure)
/// is carried unchanged and available through [`cause`](Self::cause).
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct DbError {
   #[from]
   cause: MapperError,
}

impl DbError {
   /// Error raised by the caller, e.g. from a custom upgrade listener.
   pub fn other(message: impl Into<String>) -> Self {
      MapperError::Other(message.into()).into()
   }

   pub fn cause(&self) -> &MapperError {
      &self.cause
   }

   pub fn into_cause(self) -> MapperError {
      self.cause
   }

   /// Machine-readable code of the underlying cause.
   pub fn error_code(&self) -> String {
      self.cause.error_code()
   }
}

impl From<sqlx::Error> for DbError {
   fn from(e: sqlx::Error) -> Self {
      MapperError::Sqlx(e).into()
   }
}

impl From<sqlx_sqlite_conn_mgr::Error> for DbError {
   fn from(e: sqlx_sqlite_conn_mgr::Error) -> Self {
      MapperError::ConnectionManager(e).into()
   }
}

impl From<SchemaError> for DbError {
   fn from(e: SchemaError) -> Self {
      MapperError::Schema(e).into()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_cause_is_preserved() {
      let err = DbError::from(SchemaError::EmptyTableName);
      assert!(matches!(err.cause(), MapperError::Schema(SchemaError::EmptyTableName)));
      assert_eq!(err.error_code(), "INVALID_SCHEMA");
      assert_eq!(err.to_string(), "table name must not be empty");
   }

   #[test]
   fn test_engine_error_code() {
      let err = DbError::from(sqlx::Error::RowNotFound);
      assert_eq!(err.error_code(), "SQLX_ERROR");
      assert!(matches!(err.into_cause(), MapperError::Sqlx(_)));
   }

   #[test]
   fn test_connection_error_code() {
      let err = DbError::from(sqlx_sqlite_conn_mgr::Error::DatabaseClosed);
      assert_eq!(err.error_code(), "DATABASE_CLOSED");
   }

   #[test]
   fn test_other() {
      let err = DbError::other("upgrade failed");
      assert_eq!(err.error_code(), "ERROR");
      assert_eq!(err.to_string(), "upgrade failed");
   }
}
