//! In-memory storage engine over an ordered map.
//!
//! `MemEngine` is the reference [`Engine`] implementation: a
//! `RwLock<BTreeMap>` with the same ordering and scan-bound semantics a
//! persistent engine must provide. It backs every test in the workspace and
//! is suitable as the store for bootstrap metadata in single-process runs.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use bytes::Bytes;
use olivine_types::{Key, KeyValue};

use crate::{Engine, EngineError};

/// An ordered, fully in-memory storage engine.
#[derive(Debug, Default)]
pub struct MemEngine {
    data: RwLock<BTreeMap<Key, Bytes>>,
}

impl MemEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.read_data().len()
    }

    /// Returns true if the engine holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read_data().is_empty()
    }

    fn read_data(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Key, Bytes>> {
        // Poisoning only occurs if a writer panicked; the map itself is
        // never left mid-mutation, so the data is still coherent.
        self.data.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_data(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Key, Bytes>> {
        self.data.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Engine for MemEngine {
    fn get(&self, key: &Key) -> Result<Option<Bytes>, EngineError> {
        Ok(self.read_data().get(key).cloned())
    }

    fn put(&self, key: Key, value: Bytes) -> Result<(), EngineError> {
        self.write_data().insert(key, value);
        Ok(())
    }

    fn clear(&self, key: &Key) -> Result<(), EngineError> {
        self.write_data().remove(key);
        Ok(())
    }

    fn scan(
        &self,
        start: &Key,
        end: &Key,
        max_results: u64,
    ) -> Result<Vec<KeyValue>, EngineError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let data = self.read_data();
        let range = (Bound::Included(start.clone()), Bound::Excluded(end.clone()));
        let mut results = Vec::new();
        for (key, value) in data.range(range) {
            if max_results > 0 && results.len() as u64 >= max_results {
                break;
            }
            results.push(KeyValue::new(key.clone(), value.clone()));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use olivine_types::keys;

    use super::*;

    fn engine_with(entries: &[(&'static str, &'static str)]) -> MemEngine {
        let engine = MemEngine::new();
        for (key, value) in entries {
            engine
                .put(Key::from(*key), Bytes::from_static(value.as_bytes()))
                .unwrap();
        }
        engine
    }

    #[test]
    fn get_absent_key_is_none_not_error() {
        let engine = MemEngine::new();
        assert_eq!(engine.get(&Key::from("missing")).unwrap(), None);
    }

    #[test]
    fn put_overwrites_existing_value() {
        let engine = engine_with(&[("k", "v1")]);
        engine.put(Key::from("k"), Bytes::from_static(b"v2")).unwrap();
        assert_eq!(engine.get(&Key::from("k")).unwrap().unwrap(), "v2");
    }

    #[test]
    fn clear_removes_and_is_idempotent() {
        let engine = engine_with(&[("k", "v")]);
        engine.clear(&Key::from("k")).unwrap();
        assert_eq!(engine.get(&Key::from("k")).unwrap(), None);
        engine.clear(&Key::from("k")).unwrap();
    }

    #[test]
    fn scan_returns_ordered_half_open_interval() {
        let engine = engine_with(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let rows = engine.scan(&Key::from("b"), &Key::from("d"), 0).unwrap();
        let keys: Vec<_> = rows.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec![Key::from("b"), Key::from("c")]);
    }

    #[test]
    fn scan_honors_max_results() {
        let engine = engine_with(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let rows = engine.scan(&keys::KEY_MIN, &keys::KEY_MAX, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, Key::from("a"));
    }

    #[test]
    fn scan_of_empty_or_inverted_interval_is_empty() {
        let engine = engine_with(&[("a", "1")]);
        assert!(engine.scan(&Key::from("b"), &Key::from("b"), 0).unwrap().is_empty());
        assert!(engine.scan(&Key::from("c"), &Key::from("b"), 0).unwrap().is_empty());
    }

    #[test]
    fn prefix_scan_with_prefix_end_key() {
        let engine = engine_with(&[("\u{0}zonea", "1"), ("\u{0}zoneb", "2"), ("\u{1}other", "3")]);
        let prefix = keys::KEY_CONFIG_ZONE_PREFIX;
        let rows = engine
            .scan(&prefix, &keys::prefix_end_key(&prefix), 0)
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
