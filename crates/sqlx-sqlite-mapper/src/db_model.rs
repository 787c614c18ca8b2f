//! Untyped result rows

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::value::Value;

/// One result row as an ordered `column -> value` map.
///
/// Column order follows the SELECT projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbModel {
   columns: IndexMap<String, Value>,
}

impl DbModel {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn insert(&mut self, column: impl Into<String>, value: Value) {
      self.columns.insert(column.into(), value);
   }

   pub fn get(&self, column: &str) -> Option<&Value> {
      self.columns.get(column)
   }

   pub fn get_i64(&self, column: &str) -> Option<i64> {
      self.get(column).and_then(Value::as_i64)
   }

   pub fn get_f64(&self, column: &str) -> Option<f64> {
      self.get(column).and_then(Value::as_f64)
   }

   pub fn get_str(&self, column: &str) -> Option<&str> {
      self.get(column).and_then(Value::as_str)
   }

   pub fn get_bool(&self, column: &str) -> Option<bool> {
      self.get_i64(column).map(|i| i != 0)
   }

   /// True when the column is NULL or absent.
   pub fn is_null(&self, column: &str) -> bool {
      self.get(column).is_none_or(Value::is_null)
   }

   pub fn len(&self) -> usize {
      self.columns.len()
   }

   pub fn is_empty(&self) -> bool {
      self.columns.is_empty()
   }

   pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
      self.columns.iter().map(|(k, v)| (k.as_str(), v))
   }

   /// Columns named `<prefix><name>`, re-keyed as `<name>`.
   ///
   /// Joined tables are projected as `"<column>.<field>"`; this recovers the
   /// referenced record's own row.
   pub fn strip_prefix(&self, prefix: &str) -> DbModel {
      let columns = self
         .columns
         .iter()
         .filter_map(|(name, value)| {
            name
               .strip_prefix(prefix)
               .map(|field| (field.to_string(), value.clone()))
         })
         .collect();
      DbModel { columns }
   }

   /// JSON object view, in column order.
   pub fn to_json(&self) -> IndexMap<String, JsonValue> {
      self
         .columns
         .iter()
         .map(|(name, value)| (name.clone(), value.to_json()))
         .collect()
   }
}

impl FromIterator<(String, Value)> for DbModel {
   fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
      DbModel {
         columns: iter.into_iter().collect(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn row() -> DbModel {
      [
         ("id".to_string(), Value::Integer(1)),
         ("name".to_string(), Value::from("a")),
         ("author.id".to_string(), Value::Integer(9)),
         ("author.name".to_string(), Value::Null),
      ]
      .into_iter()
      .collect()
   }

   #[test]
   fn typed_getters() {
      let row = row();
      assert_eq!(row.get_i64("id"), Some(1));
      assert_eq!(row.get_f64("id"), Some(1.0));
      assert_eq!(row.get_str("name"), Some("a"));
      assert_eq!(row.get_bool("id"), Some(true));
      assert_eq!(row.get_str("id"), None);
      assert!(row.is_null("author.name"));
      assert!(row.is_null("missing"));
   }

   #[test]
   fn strip_prefix_keeps_order() {
      let joined = row().strip_prefix("author.");
      let names: Vec<&str> = joined.columns().map(|(name, _)| name).collect();
      assert_eq!(names, vec!["id", "name"]);
      assert_eq!(joined.get_i64("id"), Some(9));
   }

   #[test]
   fn to_json_preserves_column_order() {
      let json = serde_json::to_value(row().to_json()).unwrap();
      assert_eq!(
         json,
         json!({"id": 1, "name": "a", "author.id": 9, "author.name": null})
      );
      let keys: Vec<String> = row().to_json().keys().cloned().collect();
      assert_eq!(keys, vec!["id", "name", "author.id", "author.name"]);
   }
}
