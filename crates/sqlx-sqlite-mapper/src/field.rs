//! Conversions between Rust field types and column values

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::value::Value;

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
   Integer,
   Real,
   Text,
   Blob,
}

impl SqlType {
   pub fn as_sql(self) -> &'static str {
      match self {
         SqlType::Integer => "INTEGER",
         SqlType::Real => "REAL",
         SqlType::Text => "TEXT",
         SqlType::Blob => "BLOB",
      }
   }
}

/// A field value that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
   message: String,
}

impl FieldError {
   pub fn new(message: impl Into<String>) -> Self {
      Self {
         message: message.into(),
      }
   }

   /// The column held a value of the wrong storage class.
   pub fn mismatch(expected: &str, found: &Value) -> Self {
      Self::new(format!("expected {expected}, found {}", found.type_name()))
   }

   pub fn message(&self) -> &str {
      &self.message
   }
}

/// A Rust type that can be stored in a single column.
///
/// Implementors declare the column's storage type and whether it accepts
/// NULL, and convert to and from [`Value`] without loss.
pub trait SqlField: Sized + Send + Sync + 'static {
   const SQL_TYPE: SqlType;
   const NULLABLE: bool = false;

   fn to_value(&self) -> Result<Value, FieldError>;

   fn from_value(value: Value) -> Result<Self, FieldError>;
}

impl SqlField for i64 {
   const SQL_TYPE: SqlType = SqlType::Integer;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Integer(*self))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      match value {
         Value::Integer(i) => Ok(i),
         other => Err(FieldError::mismatch("INTEGER", &other)),
      }
   }
}

macro_rules! narrow_integer_field {
   ($($ty:ty),*) => {
      $(
         impl SqlField for $ty {
            const SQL_TYPE: SqlType = SqlType::Integer;

            fn to_value(&self) -> Result<Value, FieldError> {
               Ok(Value::Integer(i64::from(*self)))
            }

            fn from_value(value: Value) -> Result<Self, FieldError> {
               let wide = i64::from_value(value)?;
               <$ty>::try_from(wide).map_err(|_| {
                  FieldError::new(format!("{wide} out of range for {}", stringify!($ty)))
               })
            }
         }
      )*
   };
}

narrow_integer_field!(i32, i16, i8, u32, u16, u8);

impl SqlField for bool {
   const SQL_TYPE: SqlType = SqlType::Integer;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Integer(i64::from(*self)))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      Ok(i64::from_value(value)? != 0)
   }
}

impl SqlField for f64 {
   const SQL_TYPE: SqlType = SqlType::Real;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Real(*self))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      value.as_f64().ok_or_else(|| FieldError::mismatch("REAL", &value))
   }
}

impl SqlField for f32 {
   const SQL_TYPE: SqlType = SqlType::Real;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Real(f64::from(*self)))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      f64::from_value(value).map(|f| f as f32)
   }
}

impl SqlField for String {
   const SQL_TYPE: SqlType = SqlType::Text;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Text(self.clone()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      match value {
         Value::Text(s) => Ok(s),
         other => Err(FieldError::mismatch("TEXT", &other)),
      }
   }
}

impl SqlField for Vec<u8> {
   const SQL_TYPE: SqlType = SqlType::Blob;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Blob(self.clone()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      match value {
         Value::Blob(b) => Ok(b),
         Value::Text(s) => Ok(s.into_bytes()),
         other => Err(FieldError::mismatch("BLOB", &other)),
      }
   }
}

impl<F: SqlField> SqlField for Option<F> {
   const SQL_TYPE: SqlType = F::SQL_TYPE;
   const NULLABLE: bool = true;

   fn to_value(&self) -> Result<Value, FieldError> {
      match self {
         Some(inner) => inner.to_value(),
         None => Ok(Value::Null),
      }
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      match value {
         Value::Null => Ok(None),
         other => F::from_value(other).map(Some),
      }
   }
}

/// Stored as RFC 3339 text so the offset survives the round trip.
impl SqlField for OffsetDateTime {
   const SQL_TYPE: SqlType = SqlType::Text;

   fn to_value(&self) -> Result<Value, FieldError> {
      self
         .format(&Rfc3339)
         .map(Value::Text)
         .map_err(|e| FieldError::new(e.to_string()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      let text = String::from_value(value)?;
      OffsetDateTime::parse(&text, &Rfc3339).map_err(|e| FieldError::new(e.to_string()))
   }
}

impl SqlField for Uuid {
   const SQL_TYPE: SqlType = SqlType::Text;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Text(self.hyphenated().to_string()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      match value {
         Value::Text(s) => Uuid::parse_str(&s).map_err(|e| FieldError::new(e.to_string())),
         Value::Blob(b) => Uuid::from_slice(&b).map_err(|e| FieldError::new(e.to_string())),
         other => Err(FieldError::mismatch("TEXT", &other)),
      }
   }
}

impl SqlField for serde_json::Value {
   const SQL_TYPE: SqlType = SqlType::Text;

   fn to_value(&self) -> Result<Value, FieldError> {
      Ok(Value::Text(self.to_string()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      let text = String::from_value(value)?;
      serde_json::from_str(&text).map_err(|e| FieldError::new(e.to_string()))
   }
}

/// Field wrapper that stores any serde type as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> SqlField for Json<T>
where
   T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
   const SQL_TYPE: SqlType = SqlType::Text;

   fn to_value(&self) -> Result<Value, FieldError> {
      serde_json::to_string(&self.0)
         .map(Value::Text)
         .map_err(|e| FieldError::new(e.to_string()))
   }

   fn from_value(value: Value) -> Result<Self, FieldError> {
      let text = String::from_value(value)?;
      serde_json::from_str(&text)
         .map(Json)
         .map_err(|e| FieldError::new(e.to_string()))
   }
}

/// Reference from one record to another mapped record.
///
/// The column stores the referenced record's id. When a query joins the
/// referenced table (see [`Selector::join`](crate::Selector::join)) the
/// materialized record is attached as well; otherwise only the key is set.
pub struct Foreign<U> {
   key: Value,
   record: Option<Arc<U>>,
}

impl<U> Foreign<U> {
   /// Reference by id without a loaded record.
   pub fn to(key: impl Into<Value>) -> Self {
      Self {
         key: key.into(),
         record: None,
      }
   }

   /// No reference (NULL column).
   pub fn none() -> Self {
      Self {
         key: Value::Null,
         record: None,
      }
   }

   pub fn loaded(key: impl Into<Value>, record: U) -> Self {
      Self {
         key: key.into(),
         record: Some(Arc::new(record)),
      }
   }

   pub fn key(&self) -> &Value {
      &self.key
   }

   pub fn is_none(&self) -> bool {
      self.key.is_null()
   }

   /// The referenced record, if the query joined it.
   pub fn get(&self) -> Option<&U> {
      self.record.as_deref()
   }
}

impl<U> Default for Foreign<U> {
   fn default() -> Self {
      Self::none()
   }
}

impl<U> Clone for Foreign<U> {
   fn clone(&self) -> Self {
      Self {
         key: self.key.clone(),
         record: self.record.clone(),
      }
   }
}

// References are equal when they point at the same key, loaded or not.
impl<U> PartialEq for Foreign<U> {
   fn eq(&self, other: &Self) -> bool {
      self.key == other.key
   }
}

impl<U: fmt::Debug> fmt::Debug for Foreign<U> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Foreign")
         .field("key", &self.key)
         .field("record", &self.record)
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde::Deserialize;

   #[test]
   fn test_bool_is_stored_as_integer() {
      assert_eq!(true.to_value().unwrap(), Value::Integer(1));
      assert!(bool::from_value(Value::Integer(5)).unwrap());
      assert!(!bool::from_value(Value::Integer(0)).unwrap());
   }

   #[test]
   fn test_narrow_integer_out_of_range() {
      let err = u8::from_value(Value::Integer(300)).unwrap_err();
      assert!(err.message().contains("out of range"));
      assert_eq!(i32::from_value(Value::Integer(-4)).unwrap(), -4);
   }

   #[test]
   fn test_type_mismatch_is_reported() {
      let err = String::from_value(Value::Integer(1)).unwrap_err();
      assert_eq!(err.message(), "expected TEXT, found INTEGER");
      assert!(i64::from_value(Value::Null).is_err());
   }

   #[test]
   fn test_option_maps_null() {
      assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
      assert_eq!(None::<i64>.to_value().unwrap(), Value::Null);
      assert!(<Option<i64> as SqlField>::NULLABLE);
      assert_eq!(<Option<i64> as SqlField>::SQL_TYPE, SqlType::Integer);
   }

   #[test]
   fn test_real_accepts_integer_storage() {
      assert_eq!(f64::from_value(Value::Integer(3)).unwrap(), 3.0);
   }

   #[test]
   fn test_datetime_round_trip() {
      let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
      let stored = now.to_value().unwrap();
      assert_eq!(stored, Value::Text("2023-11-14T22:13:20Z".into()));
      assert_eq!(OffsetDateTime::from_value(stored).unwrap(), now);
   }

   #[test]
   fn test_uuid_accepts_text_and_blob() {
      let id = Uuid::new_v4();
      assert_eq!(Uuid::from_value(id.to_value().unwrap()).unwrap(), id);
      assert_eq!(Uuid::from_value(Value::Blob(id.as_bytes().to_vec())).unwrap(), id);
   }

   #[test]
   fn test_json_wrapper() {
      #[derive(Debug, PartialEq, Serialize, Deserialize)]
      struct Prefs {
         theme: String,
      }

      let prefs = Json(Prefs {
         theme: "dark".into(),
      });
      let stored = prefs.to_value().unwrap();
      assert_eq!(stored, Value::Text(r#"{"theme":"dark"}"#.into()));
      assert_eq!(Json::<Prefs>::from_value(stored).unwrap(), prefs);
   }

   #[test]
   fn test_foreign_equality_ignores_loaded_record() {
      let a: Foreign<String> = Foreign::to(3);
      let b = Foreign::loaded(3, "three".to_string());
      assert_eq!(a, b);
      assert_eq!(b.get().map(String::as_str), Some("three"));
      assert!(a.get().is_none());
      assert!(Foreign::<String>::default().is_none());
   }
}
