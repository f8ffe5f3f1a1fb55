//! Interned agent category names shared by grids and networks.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a category registered on a grid or network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub(crate) usize);

impl CategoryId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of category names in registration order.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    names: IndexSet<String>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. Returns `None` if it is already registered.
    pub fn register(&mut self, name: &str) -> Option<CategoryId> {
        let (index, inserted) = self.names.insert_full(name.to_string());
        inserted.then_some(CategoryId(index))
    }

    pub fn lookup(&self, name: &str) -> Option<CategoryId> {
        self.names.get_index_of(name).map(CategoryId)
    }

    pub fn name(&self, id: CategoryId) -> Option<&str> {
        self.names.get_index(id.0).map(String::as_str)
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        id.0 < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (CategoryId(i), name.as_str()))
    }
}
