/// Result type alias for mapper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Problems detected while turning a [`Schema`](crate::Schema) into a
/// [`TableDescriptor`](crate::TableDescriptor).
///
/// Cloneable so a lazily built descriptor can hand the same failure to
/// every caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
   /// Table name is empty.
   #[error("table name must not be empty")]
   EmptyTableName,

   /// No identity column was declared.
   #[error("table '{0}' declares no id column")]
   MissingIdColumn(String),

   /// More than one identity column was declared.
   #[error("table '{0}' declares more than one id column")]
   DuplicateIdColumn(String),

   /// Two columns share a name.
   #[error("table '{table}' declares column '{column}' twice")]
   DuplicateColumn { table: String, column: String },
}

/// Error types for mapping operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] sqlx_sqlite_conn_mgr::Error),

   /// Invalid record schema declaration.
   #[error(transparent)]
   Schema(#[from] SchemaError),

   /// SQLite type that cannot be mapped to a [`Value`](crate::Value).
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// A column value could not be converted to or from its field type.
   #[error("column '{column}': {message}")]
   Field { column: String, message: String },

   /// A column name that the table descriptor does not know.
   #[error("table '{table}' has no column '{column}'")]
   UnknownColumn { table: String, column: String },

   /// Column name that is unsafe to interpolate into SQL.
   #[error("invalid column name: {name:?}")]
   InvalidColumnName { name: String },

   /// A join was requested on a column that does not reference another record.
   #[error("column '{column}' of table '{table}' is not a foreign column")]
   NotForeignColumn { table: String, column: String },

   /// An operation keyed by the id column got a record without an id.
   #[error("record for table '{0}' has no id value")]
   MissingIdValue(String),

   /// The engine did not report a generated id after an insert.
   #[error("no generated id reported for insert into '{0}'")]
   BindingIdFailed(String),

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::ConnectionManager(e) => e.error_code().to_string(),
         Error::Schema(_) => "INVALID_SCHEMA".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::Field { .. } => "FIELD_CONVERSION".to_string(),
         Error::UnknownColumn { .. } => "UNKNOWN_COLUMN".to_string(),
         Error::InvalidColumnName { .. } => "INVALID_COLUMN_NAME".to_string(),
         Error::NotForeignColumn { .. } => "NOT_FOREIGN_COLUMN".to_string(),
         Error::MissingIdValue(_) => "MISSING_ID_VALUE".to_string(),
         Error::BindingIdFailed(_) => "BINDING_ID_FAILED".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_unsupported_datatype() {
      let err = Error::UnsupportedDatatype("WEIRD".into());
      assert_eq!(err.error_code(), "UNSUPPORTED_DATATYPE");
   }

   #[test]
   fn test_error_code_schema() {
      let err = Error::from(SchemaError::MissingIdColumn("users".into()));
      assert_eq!(err.error_code(), "INVALID_SCHEMA");
      assert!(err.to_string().contains("users"));
   }

   #[test]
   fn test_error_code_field() {
      let err = Error::Field {
         column: "age".into(),
         message: "expected INTEGER, found TEXT".into(),
      };
      assert_eq!(err.error_code(), "FIELD_CONVERSION");
      assert!(err.to_string().starts_with("column 'age'"));
   }

   #[test]
   fn test_error_code_unknown_column() {
      let err = Error::UnknownColumn {
         table: "users".into(),
         column: "nope".into(),
      };
      assert_eq!(err.error_code(), "UNKNOWN_COLUMN");
      assert!(err.to_string().contains("nope"));
   }

   #[test]
   fn test_error_code_binding_id_failed() {
      let err = Error::BindingIdFailed("users".into());
      assert_eq!(err.error_code(), "BINDING_ID_FAILED");
      assert!(err.to_string().contains("users"));
   }

   #[test]
   fn test_error_code_sqlx_non_database() {
      // RowNotFound is not a database error, so no SQLite code
      let err = Error::Sqlx(sqlx::Error::RowNotFound);
      assert_eq!(err.error_code(), "SQLX_ERROR");
   }

   #[test]
   fn test_error_code_other() {
      let err = Error::Other("something went wrong".into());
      assert_eq!(err.error_code(), "ERROR");
      assert_eq!(err.to_string(), "something went wrong");
   }
}
