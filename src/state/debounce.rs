use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Per-key "last value wins" bookkeeping behind debounced writes.
///
/// Each `schedule` supersedes the previous pending value and hands out a new
/// generation; the caller arms a timer with it. When a timer elapses only the
/// generation that is still current yields a value, so superseded timers
/// fire into nothing. `take` is the explicit flush.
#[derive(Debug)]
pub(crate) struct Debouncer<K, V> {
    pending: HashMap<K, (u64, V)>,
    generation: u64,
}

impl<K, V> Default for Debouncer<K, V> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            generation: 0,
        }
    }
}

impl<K: Eq + Hash, V> Debouncer<K, V> {
    pub fn schedule(&mut self, key: K, value: V) -> u64 {
        self.generation += 1;
        self.pending.insert(key, (self.generation, value));
        self.generation
    }

    /// Timer for `generation` elapsed.
    pub fn fire<Q>(&mut self, key: &Q, generation: u64) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        match self.pending.get(key) {
            Some((current, _)) if *current == generation => {
                self.pending.remove(key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Flush or cancel: the pending value, if any, and disarm.
    pub fn take<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.pending.remove(key).map(|(_, v)| v)
    }

    pub fn pending<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.pending.get(key).map(|(_, v)| v)
    }
}
