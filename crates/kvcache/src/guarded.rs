//! Thread-safe wrapper serializing every call behind one lock

use parking_lot::Mutex;

use crate::storage::{SharedStorage, Storage};

/// Exposes any [`Storage`] as [`SharedStorage`]
///
/// Each operation holds the lock from lookup to the last eviction, so callers
/// observe a single sequential history and never a half-evicted store.
#[derive(Debug, Default)]
pub struct Guarded<S> {
    inner: Mutex<S>,
}

impl<S> Guarded<S> {
    /// Wrap `store`
    pub fn new(store: S) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    /// Unwrap the store, e.g. to inspect it once all callers are gone
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<S: Storage + Send> SharedStorage for Guarded<S> {
    fn put(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put(key, value)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().put_if_absent(key, value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> bool {
        self.inner.lock().set(key, value)
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.inner.lock().delete(key)
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LruStore;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guarded_contract() {
        let store = Guarded::new(LruStore::new(10));

        assert!(store.put(b"a", b"aaaa"));
        assert!(store.put(b"b", b"bbbb"));
        assert!(!store.put_if_absent(b"a", b"x"));
        assert!(store.set(b"b", b"bb"));
        assert!(!store.set(b"zz", b"x"));
        assert_eq!(store.get(b"b"), Some(b"bb".to_vec()));
        assert!(store.delete(b"a"));
        assert!(!store.delete(b"a"));

        let inner = store.into_inner();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner.current_size(), 3);
        inner.check_invariants().unwrap();
    }

    #[test]
    fn test_usable_as_trait_object() {
        let store: Arc<dyn SharedStorage> = Arc::new(Guarded::new(LruStore::default()));
        assert!(store.put(b"k", b"v"));
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_disjoint_keys_no_lost_updates() {
        const THREADS: usize = 8;
        const KEYS_PER_THREAD: usize = 200;

        // Large enough that nothing is evicted
        let store = Guarded::new(LruStore::new(1 << 20));

        thread::scope(|s| {
            for t in 0..THREADS {
                let store = &store;
                s.spawn(move || {
                    for i in 0..KEYS_PER_THREAD {
                        let key = format!("t{}-k{}", t, i);
                        let value = format!("v{}", i);
                        assert!(store.put(key.as_bytes(), value.as_bytes()));
                        assert_eq!(store.get(key.as_bytes()), Some(value.into_bytes()));
                        if i % 3 == 0 {
                            assert!(store.delete(key.as_bytes()));
                            assert!(!store.delete(key.as_bytes()));
                        }
                    }
                });
            }
        });

        let inner = store.into_inner();
        inner.check_invariants().unwrap();

        let deleted_per_thread = (0..KEYS_PER_THREAD).filter(|i| i % 3 == 0).count();
        assert_eq!(inner.len(), THREADS * (KEYS_PER_THREAD - deleted_per_thread));

        for t in 0..THREADS {
            for i in 0..KEYS_PER_THREAD {
                let key = format!("t{}-k{}", t, i);
                assert_eq!(inner.contains(key.as_bytes()), i % 3 != 0);
            }
        }
    }

    #[test]
    fn test_contended_eviction_keeps_budget() {
        const THREADS: usize = 8;

        // Small budget forces evictions from every thread
        let store = Arc::new(Guarded::new(LruStore::new(64)));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        let key = format!("{}:{}", t, i % 17);
                        match i % 4 {
                            0 => {
                                store.put(key.as_bytes(), b"value");
                            }
                            1 => {
                                store.put_if_absent(key.as_bytes(), b"v");
                            }
                            2 => {
                                store.set(key.as_bytes(), b"longer-value");
                            }
                            _ => {
                                store.get(key.as_bytes());
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let inner = Arc::try_unwrap(store).unwrap().into_inner();
        inner.check_invariants().unwrap();
        assert!(inner.current_size() <= 64);
    }
}
