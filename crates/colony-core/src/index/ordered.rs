//! Ordered index: members sorted ascending by key.
//!
//! Lookups are binary searches. Insertion and removal shift the tail of the
//! backing vector, so they cost O(n) in the worst case.

use crate::agent::AgentId;

use super::IndexKey;

/// `(key, id)` pairs kept in ascending key order.
///
/// Equal keys keep insertion order: a new member goes after every existing
/// member with the same key.
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex {
    entries: Vec<(IndexKey, AgentId)>,
}

impl OrderedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First position whose key is not less than `key`
    pub fn lower_bound(&self, key: &IndexKey) -> usize {
        self.entries.partition_point(|(k, _)| k < key)
    }

    /// First position whose key is greater than `key`
    pub fn upper_bound(&self, key: &IndexKey) -> usize {
        self.entries.partition_point(|(k, _)| k <= key)
    }

    /// Leftmost position holding `key`, if any member has it.
    pub fn position_of(&self, key: &IndexKey) -> Option<usize> {
        let pos = self.lower_bound(key);
        match self.entries.get(pos) {
            Some((k, _)) if k == key => Some(pos),
            _ => None,
        }
    }

    pub fn insert(&mut self, id: AgentId, key: IndexKey) {
        let pos = self.upper_bound(&key);
        self.entries.insert(pos, (key, id));
    }

    /// Remove `id`, which must currently be stored under `key`.
    ///
    /// Keys are not unique, so the equal-key run is scanned for the id.
    pub fn remove(&mut self, id: AgentId, key: &IndexKey) -> bool {
        match self.locate(id, key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move `id` from `old` to `new`.
    pub fn reposition(&mut self, id: AgentId, old: &IndexKey, new: IndexKey) -> bool {
        if !self.remove(id, old) {
            return false;
        }
        self.insert(id, new);
        true
    }

    fn locate(&self, id: AgentId, key: &IndexKey) -> Option<usize> {
        let start = self.lower_bound(key);
        self.entries[start..]
            .iter()
            .take_while(|(k, _)| k == key)
            .position(|(_, member)| *member == id)
            .map(|offset| start + offset)
    }

    /// Members with `lo <= key <= hi`, ascending.
    pub fn range<'a>(
        &'a self,
        lo: &IndexKey,
        hi: &IndexKey,
    ) -> impl Iterator<Item = (&'a IndexKey, AgentId)> + 'a {
        let start = self.lower_bound(lo);
        let end = self.upper_bound(hi).max(start);
        self.entries[start..end].iter().map(|(k, id)| (k, *id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, AgentId)> + '_ {
        self.entries.iter().map(|(k, id)| (k, *id))
    }

    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }

    pub fn get(&self, position: usize) -> Option<(&IndexKey, AgentId)> {
        self.entries.get(position).map(|(k, id)| (k, *id))
    }

    /// Member with the smallest key
    pub fn first(&self) -> Option<(&IndexKey, AgentId)> {
        self.get(0)
    }

    /// Member with the largest key
    pub fn last(&self) -> Option<(&IndexKey, AgentId)> {
        self.entries.last().map(|(k, id)| (k, *id))
    }

    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].0 <= w[1].0)
    }
}
