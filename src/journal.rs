// 1.3 journal.rs: keyed state that can be rolled back. while a transaction is open the
// first write to each key saves the value it replaces; rollback puts those back. a
// transaction costs what it touches, however large the maps have grown.

use std::collections::HashMap;
use std::hash::Hash;

/// Transaction hooks implemented by every piece of engine state.
pub trait Journaled {
    fn begin(&mut self);
    fn commit(&mut self);
    fn rollback(&mut self);
}

/// HashMap with an undo log. keys written during a transaction keep their prior value
/// (or its absence) until commit.
#[derive(Debug, Clone)]
pub struct JournaledMap<K, V> {
    entries: HashMap<K, V>,
    undo: Option<HashMap<K, Option<V>>>,
}

impl<K, V> Default for JournaledMap<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            undo: None,
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> JournaledMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn save(&mut self, key: &K) {
        if let Some(undo) = self.undo.as_mut() {
            if !undo.contains_key(key) {
                undo.insert(key.clone(), self.entries.get(key).cloned());
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.save(key);
        self.entries.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.save(&key);
        self.entries.insert(key, value)
    }

    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.save(&key);
        self.entries.entry(key).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys saved by the open transaction.
    pub fn touched(&self) -> usize {
        self.undo.as_ref().map(|u| u.len()).unwrap_or(0)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Journaled for JournaledMap<K, V> {
    fn begin(&mut self) {
        self.undo = Some(HashMap::new());
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        for (key, prior) in undo {
            match prior {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n: u32) -> JournaledMap<u32, u64> {
        let mut map = JournaledMap::new();
        for k in 0..n {
            map.insert(k, k as u64);
        }
        map
    }

    #[test]
    fn rollback_restores_overwritten_and_removes_new() {
        let mut map = seeded(3);
        map.begin();
        map.insert(1, 100);
        *map.get_mut(&2).unwrap() += 5;
        *map.get_or_default(7) += 1;
        map.rollback();

        assert_eq!(map.get(&1), Some(&1));
        assert_eq!(map.get(&2), Some(&2));
        assert!(!map.contains_key(&7));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn first_write_wins_the_undo_slot() {
        let mut map = seeded(1);
        map.begin();
        map.insert(0, 10);
        map.insert(0, 20);
        map.rollback();
        assert_eq!(map.get(&0), Some(&0));
    }

    #[test]
    fn commit_keeps_writes_and_drops_the_log() {
        let mut map = seeded(2);
        map.begin();
        map.insert(5, 50);
        map.commit();
        assert_eq!(map.touched(), 0);

        // nothing left to undo
        map.rollback();
        assert_eq!(map.get(&5), Some(&50));
    }

    #[test]
    fn log_only_holds_touched_keys() {
        let mut map = seeded(10_000);
        map.begin();
        map.get_mut(&42);
        map.insert(9_999, 0);
        map.get(&7);
        assert_eq!(map.touched(), 2);
    }

    #[test]
    fn writes_outside_a_transaction_are_not_logged() {
        let mut map = seeded(2);
        map.insert(3, 3);
        assert_eq!(map.touched(), 0);
    }
}
