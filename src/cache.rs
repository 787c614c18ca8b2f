//! Invalidation-sequenced read cache
//!
//! Every store caches materialized find results keyed by their SELECT text.
//! Validity is tracked with one [`FindSequence`] shared by all stores in a
//! registry: each mutating statement, and the end of each write critical
//! section, advances it. A read draws the current value first; when it is newer
//! than the value the cache last saw, the whole cache is dropped. A write in
//! any store therefore drains every store's cache.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

/// Process-wide invalidation counter.
#[derive(Debug, Default)]
pub struct FindSequence(AtomicU64);

impl FindSequence {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn current(&self) -> u64 {
      self.0.load(Ordering::Acquire)
   }

   /// Start a new generation; cached results from earlier ones become unreachable.
   pub fn advance(&self) -> u64 {
      self.0.fetch_add(1, Ordering::AcqRel) + 1
   }
}

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct CacheState {
   seq: u64,
   entries: HashMap<String, Entry>,
}

impl CacheState {
   /// Move to generation `seq`. The generation never goes backwards, so a
   /// late reader cannot drop entries cached by a newer one.
   fn adopt(&mut self, seq: u64) {
      if seq <= self.seq {
         return;
      }
      trace!(
         from = self.seq,
         to = seq,
         dropped = self.entries.len(),
         "find cache invalidated"
      );
      self.entries.clear();
      self.seq = seq;
   }
}

/// Per-store cache of find results.
pub struct FindCache {
   sequence: Arc<FindSequence>,
   state: Mutex<CacheState>,
}

impl FindCache {
   pub fn new(sequence: Arc<FindSequence>) -> Self {
      let seq = sequence.current();
      Self {
         sequence,
         state: Mutex::new(CacheState {
            seq,
            entries: HashMap::new(),
         }),
      }
   }

   /// Draw the current generation, clearing the cache when it moved on.
   pub fn begin_read(&self) -> u64 {
      let mut state = self.state.lock();
      let seq = self.sequence.current();
      state.adopt(seq);
      seq
   }

   /// Cached result for `sql`, if present and of type `R`.
   pub fn get<R: Any + Send + Sync>(&self, sql: &str) -> Option<Arc<R>> {
      let entry = self.state.lock().entries.get(sql).cloned()?;
      entry.downcast::<R>().ok()
   }

   /// Cache a result read in generation `seq`.
   ///
   /// Ignored when `sql` is empty or the generation has moved on since the
   /// read began, so a result can never outlive a write it may predate.
   pub fn put<R: Any + Send + Sync>(&self, sql: &str, seq: u64, result: Arc<R>) {
      if sql.is_empty() {
         return;
      }

      let mut state = self.state.lock();
      if state.seq == seq && self.sequence.current() == seq {
         state.entries.insert(sql.to_string(), result);
      }
   }

   pub fn len(&self) -> usize {
      self.state.lock().entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   pub fn clear(&self) {
      self.state.lock().entries.clear();
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn cache() -> (Arc<FindSequence>, FindCache) {
      let sequence = Arc::new(FindSequence::new());
      let cache = FindCache::new(Arc::clone(&sequence));
      (sequence, cache)
   }

   #[test]
   fn test_hit_within_generation() {
      let (_, cache) = cache();
      let seq = cache.begin_read();
      let value = Arc::new(vec![1, 2, 3]);
      cache.put("SELECT 1", seq, Arc::clone(&value));

      assert_eq!(cache.begin_read(), seq);
      let hit = cache.get::<Vec<i32>>("SELECT 1").unwrap();
      assert!(Arc::ptr_eq(&hit, &value));
   }

   #[test]
   fn test_advance_clears_on_next_read() {
      let (sequence, cache) = cache();
      let seq = cache.begin_read();
      cache.put("SELECT 1", seq, Arc::new(1u8));
      assert_eq!(cache.len(), 1);

      sequence.advance();
      let next = cache.begin_read();
      assert_eq!(next, seq + 1);
      assert!(cache.is_empty());
      assert!(cache.get::<u8>("SELECT 1").is_none());
   }

   #[test]
   fn test_put_from_stale_generation_is_dropped() {
      let (sequence, cache) = cache();
      let seq = cache.begin_read();
      sequence.advance();

      cache.put("SELECT 1", seq, Arc::new(1u8));
      assert!(cache.is_empty());
   }

   #[test]
   fn test_older_generation_keeps_newer_entries() {
      let (sequence, cache) = cache();
      sequence.advance();
      let seq = cache.begin_read();
      cache.put("SELECT 1", seq, Arc::new(1u8));

      cache.state.lock().adopt(seq - 1);
      assert_eq!(cache.state.lock().seq, seq);
      assert_eq!(cache.len(), 1);
      assert_eq!(cache.begin_read(), seq);
      assert!(cache.get::<u8>("SELECT 1").is_some());
   }

   #[test]
   fn test_type_mismatch_is_a_miss() {
      let (_, cache) = cache();
      let seq = cache.begin_read();
      cache.put("SELECT 1", seq, Arc::new(String::from("x")));
      assert!(cache.get::<u64>("SELECT 1").is_none());
      assert!(cache.get::<String>("SELECT 1").is_some());
   }

   #[test]
   fn test_empty_sql_is_ignored() {
      let (_, cache) = cache();
      let seq = cache.begin_read();
      cache.put("", seq, Arc::new(1u8));
      assert!(cache.is_empty());
   }

   #[test]
   fn test_shared_sequence_invalidates_every_cache() {
      let sequence = Arc::new(FindSequence::new());
      let a = FindCache::new(Arc::clone(&sequence));
      let b = FindCache::new(Arc::clone(&sequence));

      let seq_a = a.begin_read();
      let seq_b = b.begin_read();
      a.put("q", seq_a, Arc::new(1u8));
      b.put("q", seq_b, Arc::new(2u8));

      sequence.advance();
      a.begin_read();
      b.begin_read();
      assert!(a.is_empty());
      assert!(b.is_empty());
   }
}
