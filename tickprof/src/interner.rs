use parking_lot::Mutex;
use profdata::{Key, StringId};
use std::collections::HashMap;

struct Table {
    ids: HashMap<String, u32>,
    names: Vec<String>,
}

impl Table {
    fn new() -> Self {
        Table {
            ids: HashMap::new(),
            names: Vec::new(),
        }
    }

    fn get_or_add(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }
}

/// Process-wide scope-name table. Identical names map to identical keys
/// within one run; keys are never reused. Persisted recordings carry the
/// snapshot, so keys never need to be portable across runs.
pub struct KeyCache {
    table: Mutex<Table>,
}

impl KeyCache {
    pub fn new() -> Self {
        KeyCache {
            table: Mutex::new(Table::new()),
        }
    }

    /// Existing key for `name`, or the next one. The lock is held only for
    /// the lookup; groups keep a local cache to skip it once warmed.
    pub fn get_or_add(&self, name: &str) -> Key {
        Key(self.table.lock().get_or_add(name))
    }

    pub fn resolve(&self, key: Key) -> Option<String> {
        self.table.lock().names.get(key.0 as usize).cloned()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.table.lock().names.clone()
    }

    pub fn len(&self) -> usize {
        self.table.lock().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide table for generic payload strings (category labels and the
/// like). Same contract as [`KeyCache`].
pub struct StringCache {
    table: Mutex<Table>,
}

impl StringCache {
    pub fn new() -> Self {
        StringCache {
            table: Mutex::new(Table::new()),
        }
    }

    pub fn get_or_add(&self, s: &str) -> StringId {
        StringId(self.table.lock().get_or_add(s))
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.table.lock().names.clone()
    }
}

impl Default for StringCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[fixture]
    fn keys() -> KeyCache {
        KeyCache::new()
    }

    #[rstest]
    fn test_identical_names_identical_keys(keys: KeyCache) {
        let a = keys.get_or_add("Update");
        let b = keys.get_or_add("Render");
        let a2 = keys.get_or_add("Update");

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(keys.len(), 2);
    }

    #[rstest]
    fn test_keys_are_sequential_and_never_reused(keys: KeyCache) {
        for n in 0..100u32 {
            let key = keys.get_or_add(&format!("scope-{n}"));
            assert_eq!(key, Key(n));
        }
        assert_eq!(keys.get_or_add("scope-7"), Key(7));
        assert_eq!(keys.len(), 100);
    }

    #[rstest]
    fn test_snapshot_resolves_names(keys: KeyCache) {
        let update = keys.get_or_add("Update");
        keys.get_or_add("Render");

        let snapshot = keys.snapshot();
        assert_eq!(snapshot[update.0 as usize], "Update");
        assert_eq!(keys.resolve(update).as_deref(), Some("Update"));
        assert_eq!(keys.resolve(Key(99)), None);
    }

    #[rstest]
    fn test_string_cache_interning() {
        let strings = StringCache::new();
        let a = strings.get_or_add("Physics");
        let b = strings.get_or_add("Physics");
        assert_eq!(a, b);
        assert_eq!(strings.snapshot(), vec!["Physics".to_string()]);
    }

    #[rstest]
    fn test_contention_from_many_threads(keys: KeyCache) {
        let keys = std::sync::Arc::new(keys);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = keys.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    for n in 0..50 {
                        seen.push(keys.get_or_add(&format!("shared-{n}")));
                    }
                    seen
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
        assert_eq!(keys.len(), 50);
    }
}
