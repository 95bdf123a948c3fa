use std::collections::HashMap;

use crate::types::ChunkId;

/// Id-keyed storage that iterates in first-insertion order.
///
/// Replacing an existing id keeps its original position, so candidate order
/// (and therefore tie-breaking between equal scores) is reproducible.
#[derive(Debug, Clone)]
pub struct OrderedStore<V> {
    order: Vec<ChunkId>,
    items: HashMap<ChunkId, V>,
}

impl<V> Default for OrderedStore<V> {
    fn default() -> Self { Self { order: Vec::new(), items: HashMap::new() } }
}

impl<V> OrderedStore<V> {
    pub fn new() -> Self { Self::default() }

    /// Insert or replace. Returns the previous value for `id`, if any.
    pub fn insert(&mut self, id: ChunkId, value: V) -> Option<V> {
        if !self.items.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.items.insert(id, value)
    }

    /// Remove every listed id that is present; returns how many were removed.
    pub fn remove_many<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let mut removed = 0;
        for id in ids {
            let id: &str = id.as_ref();
            if self.items.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let items = &self.items;
            self.order.retain(|id| items.contains_key(id));
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&V> { self.items.get(id) }

    pub fn contains(&self, id: &str) -> bool { self.items.contains_key(id) }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&ChunkId, &V)> + '_ {
        self.order.iter().filter_map(|id| self.items.get(id).map(|v| (id, v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ { self.iter().map(|(_, v)| v) }
}
