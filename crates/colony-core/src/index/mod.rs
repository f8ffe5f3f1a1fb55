//! Derived indices over a container.
//!
//! An index is computed from a key function of one agent and kept in sync by
//! the owning [`Container`](crate::Container): every write that goes through
//! `Container::set` on a watched attribute, or through `Container::modify`,
//! repositions the agent before the call returns.
//!
//! Two structures are provided:
//! - [`OrderedIndex`]: all members sorted ascending by key
//! - [`PartitionIndex`]: members grouped by equal key

pub mod ordered;
pub mod partition;

pub use ordered::OrderedIndex;
pub use partition::PartitionIndex;

use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use colony_table::Value;

use crate::agent::AgentId;

/// Comparable, hashable key derived from an agent.
///
/// Only integers, non-NaN floats, strings and tuples of those qualify.
/// Keys of different variants order by variant first (`Int < Float < Str <
/// Tuple`), so a key function should return one variant consistently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Tuple(Vec<IndexKey>),
}

/// A value that cannot serve as an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{actual} is not a valid index key")]
pub struct IndexKeyError {
    pub actual: &'static str,
}

impl TryFrom<&Value> for IndexKey {
    type Error = IndexKeyError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(v) => Ok(IndexKey::Int(*v)),
            Value::Float(v) if v.is_nan() => Err(IndexKeyError { actual: "NaN" }),
            Value::Float(v) => Ok(IndexKey::Float(OrderedFloat(*v))),
            Value::Str(v) => Ok(IndexKey::Str(v.clone())),
            Value::Tuple(items) => items
                .iter()
                .map(IndexKey::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(IndexKey::Tuple),
            Value::Null | Value::Bool(_) => Err(IndexKeyError {
                actual: value.type_name(),
            }),
        }
    }
}

impl From<&IndexKey> for Value {
    fn from(key: &IndexKey) -> Self {
        match key {
            IndexKey::Int(v) => Value::Int(*v),
            IndexKey::Float(v) => Value::Float(v.into_inner()),
            IndexKey::Str(v) => Value::Str(v.clone()),
            IndexKey::Tuple(items) => Value::Tuple(items.iter().map(Value::from).collect()),
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::Int(v)
    }
}

impl From<i32> for IndexKey {
    fn from(v: i32) -> Self {
        IndexKey::Int(i64::from(v))
    }
}

impl From<f64> for IndexKey {
    fn from(v: f64) -> Self {
        IndexKey::Float(OrderedFloat(v))
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::Str(v.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(v: String) -> Self {
        IndexKey::Str(v)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

type KeyFn<A> = Box<dyn Fn(&A) -> Value + Send + Sync>;

/// Registration request for a derived index.
///
/// The watch list names every attribute the key function reads. It is
/// validated against [`Agent::ATTRIBUTES`](crate::Agent::ATTRIBUTES) at
/// registration and drives which `Container::set` calls reposition members.
pub struct IndexSpec<A> {
    name: String,
    watches: Vec<String>,
    key: KeyFn<A>,
    shrink_on_empty: bool,
}

impl<A> IndexSpec<A> {
    pub fn new<F>(name: impl Into<String>, watches: &[&str], key: F) -> Self
    where
        F: Fn(&A) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            watches: watches.iter().map(|w| w.to_string()).collect(),
            key: Box::new(key),
            shrink_on_empty: false,
        }
    }

    /// Drop partition groups as soon as they become empty. Ignored by
    /// ordered indices. Off by default: groups persist once created.
    pub fn shrink_on_empty(mut self, shrink: bool) -> Self {
        self.shrink_on_empty = shrink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn watches(&self) -> &[String] {
        &self.watches
    }

    pub(crate) fn key_of(&self, agent: &A) -> Result<IndexKey, IndexKeyError> {
        IndexKey::try_from(&(self.key)(agent))
    }
}

impl<A> fmt::Debug for IndexSpec<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSpec")
            .field("name", &self.name)
            .field("watches", &self.watches)
            .field("shrink_on_empty", &self.shrink_on_empty)
            .finish()
    }
}

/// Handle to an ordered index registered on a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderedIndexId(pub(crate) usize);

/// Handle to a partition index registered on a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionIndexId(pub(crate) usize);

#[derive(Debug)]
pub(crate) enum Structure {
    Ordered(OrderedIndex),
    Partition(PartitionIndex),
}

impl Structure {
    fn insert(&mut self, id: AgentId, key: IndexKey) {
        match self {
            Structure::Ordered(index) => index.insert(id, key),
            Structure::Partition(index) => index.insert(id, key),
        }
    }

    fn remove(&mut self, id: AgentId, key: &IndexKey) -> bool {
        match self {
            Structure::Ordered(index) => index.remove(id, key),
            Structure::Partition(index) => index.remove(id, key),
        }
    }

    fn reposition(&mut self, id: AgentId, old: &IndexKey, new: IndexKey) -> bool {
        match self {
            Structure::Ordered(index) => index.reposition(id, old, new),
            Structure::Partition(index) => index.reposition(id, old, new),
        }
    }

    fn len(&self) -> usize {
        match self {
            Structure::Ordered(index) => index.len(),
            Structure::Partition(index) => index.len(),
        }
    }
}

/// An index attached to a container, with the current key of every member.
#[derive(Debug)]
pub(crate) struct DerivedIndex<A> {
    pub(crate) spec: IndexSpec<A>,
    pub(crate) structure: Structure,
    keys: HashMap<AgentId, IndexKey>,
}

impl<A> DerivedIndex<A> {
    pub(crate) fn ordered(spec: IndexSpec<A>) -> Self {
        Self {
            spec,
            structure: Structure::Ordered(OrderedIndex::new()),
            keys: HashMap::new(),
        }
    }

    pub(crate) fn partition(spec: IndexSpec<A>) -> Self {
        let shrink = spec.shrink_on_empty;
        Self {
            spec,
            structure: Structure::Partition(PartitionIndex::new().with_shrink_on_empty(shrink)),
            keys: HashMap::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn key_of(&self, agent: &A) -> Result<IndexKey, IndexKeyError> {
        self.spec.key_of(agent)
    }

    pub(crate) fn current_key(&self, id: AgentId) -> Option<&IndexKey> {
        self.keys.get(&id)
    }

    pub(crate) fn insert(&mut self, id: AgentId, key: IndexKey) {
        self.structure.insert(id, key.clone());
        self.keys.insert(id, key);
    }

    /// Drop `id`. A member without a cached key means the index is corrupt.
    pub(crate) fn remove(&mut self, id: AgentId) {
        let Some(key) = self.keys.remove(&id) else {
            panic!("index '{}' has no entry for agent {}", self.spec.name, id);
        };
        if !self.structure.remove(id, &key) {
            panic!(
                "index '{}' lost agent {} under key {}",
                self.spec.name, id, key
            );
        }
    }

    /// Move `id` to `key` if it changed. Returns whether a move happened.
    pub(crate) fn update(&mut self, id: AgentId, key: IndexKey) -> bool {
        let Some(old) = self.keys.get(&id) else {
            panic!("index '{}' has no entry for agent {}", self.spec.name, id);
        };
        if *old == key {
            return false;
        }
        let old = old.clone();
        if !self.structure.reposition(id, &old, key.clone()) {
            panic!(
                "index '{}' lost agent {} under key {}",
                self.spec.name, id, old
            );
        }
        self.keys.insert(id, key);
        true
    }

    pub(crate) fn member_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn structure_len(&self) -> usize {
        self.structure.len()
    }
}
