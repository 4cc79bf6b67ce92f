//! In-memory key/value storage.

use std::collections::HashMap;

/// The node's local slice of the keyspace.
///
/// A plain map: no interior locking, because the store lives inside
/// the node's single readers/writer lock alongside the routing table.
#[derive(Debug, Default)]
pub struct KvStore {
    pairs: HashMap<String, Vec<u8>>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one pair.
    pub fn set(&mut self, key: String, value: Vec<u8>) {
        self.pairs.insert(key, value);
    }

    /// Merge a batch of pairs, last writer winning per key.
    pub fn set_batch(&mut self, data: HashMap<String, Vec<u8>>) {
        for (key, value) in data {
            self.pairs.insert(key, value);
        }
    }

    /// Look up one key.
    pub fn get(&self, key: &str) -> Option<&Vec<u8>> {
        self.pairs.get(key)
    }

    /// Delete the given keys. Absent keys are ignored.
    pub fn remove_keys(&mut self, keys: &[String]) {
        for key in keys {
            self.pairs.remove(key);
        }
    }

    /// Split the store by predicate: pairs for which `leaves` is true
    /// are returned as a transfer batch together with their keys, and
    /// remain in place until the caller deletes them after a
    /// successful handoff.
    pub fn partition<F>(&self, leaves: F) -> (Vec<String>, HashMap<String, Vec<u8>>)
    where
        F: Fn(&str) -> bool,
    {
        let mut del_keys = Vec::new();
        let mut batch = HashMap::new();
        for (key, value) in &self.pairs {
            if leaves(key) {
                del_keys.push(key.clone());
                batch.insert(key.clone(), value.clone());
            }
        }
        (del_keys, batch)
    }

    /// All keys currently held.
    pub fn keys(&self) -> Vec<String> {
        self.pairs.keys().cloned().collect()
    }

    /// Number of pairs held.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_overwrite() {
        let mut store = KvStore::new();
        store.set("k".to_string(), b"v1".to_vec());
        assert_eq!(store.get("k"), Some(&b"v1".to_vec()));

        store.set("k".to_string(), b"v2".to_vec());
        assert_eq!(store.get("k"), Some(&b"v2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_merge_is_last_writer_wins() {
        let mut store = KvStore::new();
        store.set("a".to_string(), b"old".to_vec());

        store.set_batch(HashMap::from([
            ("a".to_string(), b"new".to_vec()),
            ("b".to_string(), b"fresh".to_vec()),
        ]));

        assert_eq!(store.get("a"), Some(&b"new".to_vec()));
        assert_eq!(store.get("b"), Some(&b"fresh".to_vec()));
    }

    #[test]
    fn remove_ignores_absent_keys() {
        let mut store = KvStore::new();
        store.set("a".to_string(), vec![1]);
        store.remove_keys(&["a".to_string(), "ghost".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn partition_keeps_pairs_until_deleted() {
        let mut store = KvStore::new();
        store.set("stay".to_string(), vec![1]);
        store.set("go-1".to_string(), vec![2]);
        store.set("go-2".to_string(), vec![3]);

        let (del_keys, batch) = store.partition(|k| k.starts_with("go"));
        assert_eq!(del_keys.len(), 2);
        assert_eq!(batch.len(), 2);
        // Nothing removed yet.
        assert_eq!(store.len(), 3);

        store.remove_keys(&del_keys);
        assert_eq!(store.keys(), vec!["stay".to_string()]);
    }
}
