//! Partition index: members grouped by key.

use indexmap::{IndexMap, IndexSet};

use crate::agent::AgentId;

use super::IndexKey;

/// Key -> ordered set of members sharing that key.
///
/// Groups are created on first insertion and, unless `shrink_on_empty` is
/// set, kept as empty groups after their last member leaves. Groups and
/// members both iterate in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PartitionIndex {
    groups: IndexMap<IndexKey, IndexSet<AgentId>>,
    shrink_on_empty: bool,
    len: usize,
}

impl PartitionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shrink_on_empty(mut self, shrink: bool) -> Self {
        self.shrink_on_empty = shrink;
        self
    }

    /// Total number of members across all groups
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, id: AgentId, key: IndexKey) {
        if self.groups.entry(key).or_default().insert(id) {
            self.len += 1;
        }
    }

    pub fn remove(&mut self, id: AgentId, key: &IndexKey) -> bool {
        let Some(group) = self.groups.get_mut(key) else {
            return false;
        };
        if !group.shift_remove(&id) {
            return false;
        }
        self.len -= 1;
        if self.shrink_on_empty && group.is_empty() {
            self.groups.shift_remove(key);
        }
        true
    }

    pub fn reposition(&mut self, id: AgentId, old: &IndexKey, new: IndexKey) -> bool {
        if !self.remove(id, old) {
            return false;
        }
        self.insert(id, new);
        true
    }

    /// Keys of every group, including empty ones
    pub fn groups(&self) -> impl Iterator<Item = &IndexKey> + '_ {
        self.groups.keys()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_size(&self, key: &IndexKey) -> usize {
        self.groups.get(key).map_or(0, IndexSet::len)
    }

    /// Members of `key`; empty if the group does not exist.
    pub fn group(&self, key: &IndexKey) -> impl Iterator<Item = AgentId> + '_ {
        self.groups
            .get(key)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    pub fn contains(&self, key: &IndexKey, id: AgentId) -> bool {
        self.groups.get(key).is_some_and(|members| members.contains(&id))
    }
}
