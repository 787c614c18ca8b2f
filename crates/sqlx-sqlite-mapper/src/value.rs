//! Column values exchanged with SQLite

use base64::Engine;
use serde_json::Value as JsonValue;

/// A single SQLite value, one variant per storage class.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
   #[default]
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   pub fn as_i64(&self) -> Option<i64> {
      match self {
         Value::Integer(i) => Some(*i),
         _ => None,
      }
   }

   /// Numeric view of the value; integers are widened.
   pub fn as_f64(&self) -> Option<f64> {
      match self {
         Value::Integer(i) => Some(*i as f64),
         Value::Real(f) => Some(*f),
         _ => None,
      }
   }

   pub fn as_str(&self) -> Option<&str> {
      match self {
         Value::Text(s) => Some(s),
         _ => None,
      }
   }

   pub fn as_bytes(&self) -> Option<&[u8]> {
      match self {
         Value::Blob(b) => Some(b),
         _ => None,
      }
   }

   /// SQLite storage class name of this value.
   pub fn type_name(&self) -> &'static str {
      match self {
         Value::Null => "NULL",
         Value::Integer(_) => "INTEGER",
         Value::Real(_) => "REAL",
         Value::Text(_) => "TEXT",
         Value::Blob(_) => "BLOB",
      }
   }

   /// Render the value as a SQL literal for caller-supplied predicates.
   ///
   /// Text is single-quoted with embedded quotes doubled, blobs use the
   /// `X'..'` hex form. Non-finite reals have no literal form and render
   /// as `NULL`.
   pub fn to_sql_literal(&self) -> String {
      match self {
         Value::Null => "NULL".to_string(),
         Value::Integer(i) => i.to_string(),
         Value::Real(f) if f.is_finite() => format!("{f:?}"),
         Value::Real(_) => "NULL".to_string(),
         Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
         Value::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
         }
      }
   }

   /// JSON view of the value. Blobs become base64 strings.
   pub fn to_json(&self) -> JsonValue {
      match self {
         Value::Null => JsonValue::Null,
         Value::Integer(i) => JsonValue::from(*i),
         Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
         Value::Text(s) => JsonValue::String(s.clone()),
         Value::Blob(b) => JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b)),
      }
   }
}

macro_rules! integer_from {
   ($($ty:ty),*) => {
      $(
         impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
               Value::Integer(i64::from(v))
            }
         }
      )*
   };
}

integer_from!(i64, i32, i16, i8, u32, u16, u8);

impl From<bool> for Value {
   fn from(v: bool) -> Self {
      Value::Integer(i64::from(v))
   }
}

impl From<f64> for Value {
   fn from(v: f64) -> Self {
      Value::Real(v)
   }
}

impl From<f32> for Value {
   fn from(v: f32) -> Self {
      Value::Real(f64::from(v))
   }
}

impl From<String> for Value {
   fn from(v: String) -> Self {
      Value::Text(v)
   }
}

impl From<&str> for Value {
   fn from(v: &str) -> Self {
      Value::Text(v.to_string())
   }
}

impl From<Vec<u8>> for Value {
   fn from(v: Vec<u8>) -> Self {
      Value::Blob(v)
   }
}

impl From<&[u8]> for Value {
   fn from(v: &[u8]) -> Self {
      Value::Blob(v.to_vec())
   }
}

impl<V: Into<Value>> From<Option<V>> for Value {
   fn from(v: Option<V>) -> Self {
      v.map(Into::into).unwrap_or(Value::Null)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn test_text_literal_escapes_quotes() {
      assert_eq!(Value::from("O'Brien").to_sql_literal(), "'O''Brien'");
   }

   #[test]
   fn test_blob_literal_is_hex() {
      assert_eq!(Value::from(b"Hello".as_slice()).to_sql_literal(), "X'48656C6C6F'");
   }

   #[test]
   fn test_numeric_literals() {
      assert_eq!(Value::from(42).to_sql_literal(), "42");
      assert_eq!(Value::from(1.5).to_sql_literal(), "1.5");
      assert_eq!(Value::from(2.0).to_sql_literal(), "2.0");
      assert_eq!(Value::Real(f64::NAN).to_sql_literal(), "NULL");
      assert_eq!(Value::from(true).to_sql_literal(), "1");
   }

   #[test]
   fn test_option_conversion() {
      assert_eq!(Value::from(None::<i64>), Value::Null);
      assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
   }

   #[test]
   fn test_to_json() {
      assert_eq!(Value::Null.to_json(), JsonValue::Null);
      assert_eq!(Value::from(7).to_json(), json!(7));
      assert_eq!(Value::from("x").to_json(), json!("x"));
      assert_eq!(Value::from(b"Hello".to_vec()).to_json(), json!("SGVsbG8="));
   }

   #[test]
   fn test_accessors() {
      assert_eq!(Value::from(3).as_f64(), Some(3.0));
      assert_eq!(Value::from(3.5).as_i64(), None);
      assert_eq!(Value::from("t").as_str(), Some("t"));
      assert_eq!(Value::Null.type_name(), "NULL");
   }
}
