//! Per-store table descriptor registry

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sqlx_sqlite_mapper::{Record, TableDescriptor};
use tracing::debug;

use crate::error::Result;

struct Registered {
   table_name: String,
   descriptor: Arc<dyn Any + Send + Sync>,
}

/// Descriptors derived from record schemas, built once per record type.
#[derive(Default)]
pub struct TableRegistry {
   tables: RwLock<HashMap<TypeId, Registered>>,
}

impl TableRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Descriptor for `T`, built from [`Record::schema`] on first use.
   pub fn describe<T: Record>(&self) -> Result<Arc<TableDescriptor<T>>> {
      let type_id = TypeId::of::<T>();

      if let Some(descriptor) = self.lookup::<T>(&self.tables.read(), type_id) {
         return Ok(descriptor);
      }

      let descriptor = Arc::new(T::schema().build()?);

      let mut tables = self.tables.write();
      // Another caller may have registered it while the schema was built
      if let Some(existing) = self.lookup::<T>(&tables, type_id) {
         return Ok(existing);
      }

      debug!("Registered table descriptor for {}", descriptor.table_name());
      tables.insert(
         type_id,
         Registered {
            table_name: descriptor.table_name().to_string(),
            descriptor: Arc::clone(&descriptor) as Arc<dyn Any + Send + Sync>,
         },
      );
      Ok(descriptor)
   }

   /// Evict every descriptor mapped to `table_name`, so the next access
   /// rebuilds it and probes the database again.
   pub fn forget(&self, table_name: &str) {
      self
         .tables
         .write()
         .retain(|_, registered| registered.table_name != table_name);
   }

   pub fn len(&self) -> usize {
      self.tables.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   fn lookup<T: Record>(
      &self,
      tables: &HashMap<TypeId, Registered>,
      type_id: TypeId,
   ) -> Option<Arc<TableDescriptor<T>>> {
      let registered = tables.get(&type_id)?;
      Arc::clone(&registered.descriptor)
         .downcast::<TableDescriptor<T>>()
         .ok()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use sqlx_sqlite_mapper::Schema;

   #[derive(Debug, Default)]
   struct Item {
      id: Option<i64>,
      name: String,
   }

   impl Record for Item {
      fn schema() -> Schema<Self> {
         Schema::<Self>::new("items")
            .auto_id("id", |i| i.id, |i, v| i.id = v)
            .column("name", |i| i.name.clone(), |i, v| i.name = v)
      }
   }

   #[derive(Debug, Default)]
   struct Broken;

   impl Record for Broken {
      fn schema() -> Schema<Self> {
         Schema::new("broken")
      }
   }

   #[test]
   fn test_describe_is_cached() {
      let registry = TableRegistry::new();
      let first = registry.describe::<Item>().unwrap();
      let second = registry.describe::<Item>().unwrap();

      assert!(Arc::ptr_eq(&first, &second));
      assert_eq!(registry.len(), 1);
   }

   #[test]
   fn test_forget_rebuilds_with_fresh_existence_flag() {
      let registry = TableRegistry::new();
      let first = registry.describe::<Item>().unwrap();
      first.confirm_existence();

      registry.forget("items");
      assert!(registry.is_empty());

      let second = registry.describe::<Item>().unwrap();
      assert!(!Arc::ptr_eq(&first, &second));
      assert!(!second.is_existence_confirmed());
   }

   #[test]
   fn test_invalid_schema_is_reported() {
      let registry = TableRegistry::new();
      let err = registry.describe::<Broken>().unwrap_err();
      assert_eq!(err.error_code(), "INVALID_SCHEMA");
      assert!(registry.is_empty());
   }
}
