//! Identity map: agent id <-> storage slot.
//!
//! Slots are dense (`0..len`). Removal swaps the last id into the freed slot,
//! so every operation is O(1) and the map never needs renumbering.

use indexmap::IndexSet;

use crate::agent::AgentId;

/// Result of removing an id from the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    /// Slot the removed id occupied
    pub slot: usize,
    /// Id that was moved from the tail into `slot`, if any
    pub moved: Option<AgentId>,
}

/// Bidirectional mapping between agent ids and dense slot positions.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    ids: IndexSet<AgentId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: IndexSet::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.ids.contains(&id)
    }

    /// Slot currently holding `id`
    pub fn slot(&self, id: AgentId) -> Option<usize> {
        self.ids.get_index_of(&id)
    }

    /// Id stored at `slot`
    pub fn id_at(&self, slot: usize) -> Option<AgentId> {
        self.ids.get_index(slot).copied()
    }

    /// Append `id` at the tail. Returns its slot, or `None` if already present.
    pub fn push(&mut self, id: AgentId) -> Option<usize> {
        let (slot, inserted) = self.ids.insert_full(id);
        inserted.then_some(slot)
    }

    /// Remove `id`, backfilling its slot with the tail id.
    pub fn swap_remove(&mut self, id: AgentId) -> Option<Removed> {
        let (slot, _) = self.ids.swap_remove_full(&id)?;
        let moved = self.ids.get_index(slot).copied();
        Some(Removed { slot, moved })
    }

    /// Ids in slot order
    pub fn iter(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_dense_slots() {
        let mut map = IdentityMap::new();
        assert_eq!(map.push(AgentId(10)), Some(0));
        assert_eq!(map.push(AgentId(11)), Some(1));
        assert_eq!(map.push(AgentId(10)), None);
        assert_eq!(map.len(), 2);
        assert_eq!(map.slot(AgentId(11)), Some(1));
        assert_eq!(map.id_at(0), Some(AgentId(10)));
    }

    #[test]
    fn test_swap_remove_backfills_from_tail() {
        let mut map = IdentityMap::new();
        for i in 0..4 {
            map.push(AgentId(i));
        }

        let removed = map.swap_remove(AgentId(1)).unwrap();
        assert_eq!(
            removed,
            Removed {
                slot: 1,
                moved: Some(AgentId(3))
            }
        );
        assert_eq!(map.slot(AgentId(3)), Some(1));
        assert_eq!(map.slot(AgentId(1)), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_remove_tail_moves_nothing() {
        let mut map = IdentityMap::new();
        map.push(AgentId(0));
        map.push(AgentId(1));

        let removed = map.swap_remove(AgentId(1)).unwrap();
        assert_eq!(removed.moved, None);
        assert!(map.swap_remove(AgentId(1)).is_none());
    }
}
