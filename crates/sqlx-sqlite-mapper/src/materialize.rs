//! Result rows to typed records

use tracing::trace;

use crate::db_model::DbModel;
use crate::error::Result;
use crate::table::TableDescriptor;

/// Build a record from one result row.
///
/// Columns are assigned in declaration order. Columns missing from the
/// projection keep their default. A foreign column with a non-null key also
/// materializes the referenced record when the row carries its joined
/// `"<column>.<field>"` values.
///
/// `seq` is the read generation the row belongs to and is passed down to
/// nested materialization unchanged.
pub fn materialize<T: Default>(table: &TableDescriptor<T>, row: &DbModel, seq: u64) -> Result<T> {
   let mut record = T::default();

   for column in table.columns() {
      let Some(value) = row.get(column.name()) else {
         continue;
      };

      column.assign(&mut record, value.clone())?;

      if let Some(link) = column.foreign_link()
         && !value.is_null()
      {
         let joined = row.strip_prefix(&format!("{}.", column.name()));
         if !joined.is_empty() {
            link.resolve(&mut record, value.clone(), &joined, seq)?;
         }
      }
   }

   trace!(table = table.table_name(), seq, "materialized row");
   Ok(record)
}

/// Materialize every row, stopping at the first conversion failure.
pub fn materialize_all<T: Default>(
   table: &TableDescriptor<T>,
   rows: &[DbModel],
   seq: u64,
) -> Result<Vec<T>> {
   rows.iter().map(|row| materialize(table, row, seq)).collect()
}
