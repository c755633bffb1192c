//! In-process exclusivity markers with RAII release.
//!
//! A [`LockRegistry`] hands out guards over sets of keys. Acquisition is
//! all-or-nothing and the guard releases its keys on drop, so every exit
//! path of a sync run (success, error, deadline) frees the markers.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

pub struct LockRegistry<K: Eq + Hash + Clone> {
    held: Arc<Mutex<HashSet<K>>>,
}

/// Clones share the same marker set.
impl<K: Eq + Hash + Clone> Clone for LockRegistry<K> {
    fn clone(&self) -> Self {
        LockRegistry {
            held: Arc::clone(&self.held),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for LockRegistry<K> {
    fn default() -> Self {
        LockRegistry {
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> LockRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take every key at once. Returns `None` when any key is
    /// already held by another guard.
    pub fn try_acquire(&self, keys: Vec<K>) -> Option<LockGuard<K>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if keys.iter().any(|k| held.contains(k)) {
            return None;
        }
        for key in &keys {
            held.insert(key.clone());
        }
        Some(LockGuard {
            registry: Arc::clone(&self.held),
            keys,
        })
    }

    /// Whether any of the keys is currently held.
    pub fn is_held(&self, key: &K) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

/// Holds a set of keys until dropped.
pub struct LockGuard<K: Eq + Hash + Clone> {
    registry: Arc<Mutex<HashSet<K>>>,
    keys: Vec<K>,
}

impl<K: Eq + Hash + Clone> Drop for LockGuard<K> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.registry.lock() {
            for key in &self.keys {
                held.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_is_all_or_nothing() {
        let registry: LockRegistry<&str> = LockRegistry::new();
        let guard = registry.try_acquire(vec!["a", "b"]).unwrap();

        assert!(registry.try_acquire(vec!["b", "c"]).is_none());
        assert!(!registry.is_held(&"c"));

        drop(guard);
        assert!(registry.try_acquire(vec!["b", "c"]).is_some());
    }

    #[test]
    fn guard_releases_on_drop() {
        let registry: LockRegistry<u32> = LockRegistry::new();
        {
            let _guard = registry.try_acquire(vec![1]).unwrap();
            assert!(registry.is_held(&1));
        }
        assert!(!registry.is_held(&1));
    }
}
