//! Agent container.
//!
//! A `Container` owns a population of agents, their identities, and every
//! derived index registered on it. All structural changes (add, remove,
//! attribute writes, bulk loads) update the indices before returning, so an
//! index can never be observed out of sync with the population.
//!
//! Iteration borrows the container, which rules out adding or removing agents
//! mid-loop at compile time. Loops that mutate should iterate a snapshot from
//! [`Container::ids`].

use indexmap::IndexMap;
use rand::Rng;
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace, warn};

use colony_table::{Table, TableError, Value};

use crate::agent::{Agent, AgentId, AttrError};
use crate::identity::IdentityMap;
use crate::index::{
    DerivedIndex, IndexKey, IndexSpec, OrderedIndex, OrderedIndexId, PartitionIndex,
    PartitionIndexId, Structure,
};

/// A structure that agents can be placed on, such as a grid or network.
pub trait Detach {
    /// Drop `id` of `category` from the structure. Returns whether it was
    /// placed there. Unknown categories are not an error.
    fn detach(&mut self, category: &str, id: AgentId) -> bool;
}

/// Errors raised by container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("agent {0} already exists")]
    DuplicateIdentity(AgentId),
    #[error("no agent with id {0}")]
    UnknownAgent(AgentId),
    #[error("agent id {0} is above the largest supported id {max}", max = AgentId::MAX)]
    IdentityOutOfRange(AgentId),
    #[error("requested {requested} agents but only {available} are live")]
    InsufficientPopulation { requested: usize, available: usize },
    #[error("column '{0}' is not an attribute of this agent type")]
    SchemaMismatch(String),
    #[error("table has {actual} rows but the container holds {expected} agents")]
    RowCountMismatch { expected: usize, actual: usize },
    #[error("cannot export an empty container")]
    EmptyContainer,
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("index '{index}' produced a {actual} key for agent {agent}; keys must be int, float, str or tuple")]
    IndexKeyType {
        index: String,
        agent: AgentId,
        actual: &'static str,
    },
    #[error("no index registered under handle {0}")]
    UnknownIndex(usize),
    #[error("column '{column}' holds {value}, which is not an agent id")]
    InvalidIdentity { column: String, value: Value },
    #[error(transparent)]
    Attribute(#[from] AttrError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// How a table is matched onto a container by [`Container::bulk_load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Column holding agent ids. Without it rows match agents by position.
    pub key_column: Option<String>,
    /// Keep only rows where `column == value`; the column is not loaded.
    pub scenario_filter: Option<(String, Value)>,
    /// Create agents for rows whose id is not in the container
    pub create_missing: bool,
}

impl LoadOptions {
    /// Match rows by the id stored in `column`.
    pub fn keyed(column: impl Into<String>) -> Self {
        Self {
            key_column: Some(column.into()),
            ..Self::default()
        }
    }

    /// Match rows by position.
    pub fn positional() -> Self {
        Self::default()
    }

    pub fn with_scenario(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scenario_filter = Some((column.into(), value.into()));
        self
    }

    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }
}

/// Owning collection of agents with O(1) identity-based access.
pub struct Container<A> {
    agents: Vec<A>,
    identities: IdentityMap,
    next_id: u64,
    indices: Vec<DerivedIndex<A>>,
    /// attribute name -> positions in `indices` watching it
    watchers: IndexMap<String, Vec<usize>>,
}

impl<A> Default for Container<A> {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            identities: IdentityMap::new(),
            next_id: 0,
            indices: Vec::new(),
            watchers: IndexMap::new(),
        }
    }
}

impl<A> fmt::Debug for Container<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("len", &self.agents.len())
            .field("next_id", &self.next_id)
            .field(
                "indices",
                &self.indices.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<A: Agent> Container<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            agents: Vec::with_capacity(capacity),
            identities: IdentityMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Create `count` agents from a factory called with each agent's ordinal.
    pub fn populate<F>(count: usize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> A,
    {
        let mut container = Self::with_capacity(count);
        for i in 0..count {
            // No indices exist yet, so insertion cannot fail
            let id = container.allocate_id();
            container.commit_new(id, factory(i), Vec::new());
        }
        container
    }

    /// Create a container pre-populated from a table of initial attributes.
    ///
    /// With a key column the ids come from the table; otherwise agents get
    /// fresh ids in row order.
    pub fn from_table(table: &Table, options: &LoadOptions) -> Result<Self, ContainerError>
    where
        A: Clone + Default,
    {
        let mut container = Self::new();
        match options.key_column {
            Some(_) => {
                let options = options.clone().create_missing(true);
                container.bulk_load(table, &options)?;
            }
            None => {
                let rows = filter_rows(table, options)?;
                let count = rows.len();
                for _ in 0..count {
                    let id = container.allocate_id();
                    container.commit_new(id, A::default(), Vec::new());
                }
                container.bulk_load(table, options)?;
            }
        }
        Ok(container)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.identities.contains(id)
    }

    /// O(1) lookup. Returns `None` for unknown ids.
    pub fn get(&self, id: AgentId) -> Option<&A> {
        self.identities.slot(id).map(|slot| &self.agents[slot])
    }

    /// Current storage slot of `id`. Slots change when other agents are removed.
    pub fn slot_of(&self, id: AgentId) -> Option<usize> {
        self.identities.slot(id)
    }

    /// The id the next call to [`add`](Self::add) will assign
    pub fn next_id(&self) -> AgentId {
        AgentId(self.next_id)
    }

    /// Snapshot of live ids, in slot order.
    pub fn ids(&self) -> Vec<AgentId> {
        self.identities.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &A)> + '_ {
        self.identities.iter().zip(self.agents.iter())
    }

    /// Ids of agents satisfying `predicate`.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<AgentId>
    where
        P: FnMut(&A) -> bool,
    {
        self.iter()
            .filter(|(_, agent)| predicate(agent))
            .map(|(id, _)| id)
            .collect()
    }

    /// Add an agent under a fresh id.
    ///
    /// Fails if an attached index rejects the agent's key, or once the id
    /// counter has passed [`AgentId::MAX`].
    pub fn add(&mut self, agent: A) -> Result<AgentId, ContainerError> {
        let id = AgentId(self.next_id);
        if id > AgentId::MAX {
            return Err(ContainerError::IdentityOutOfRange(id));
        }
        let keys = keys_for(&self.indices, id, &agent)?;
        self.next_id += 1;
        self.commit_new(id, agent, keys);
        Ok(id)
    }

    /// Add an agent under a caller-chosen id. Fresh ids handed out later
    /// always exceed every id inserted this way.
    pub fn insert(&mut self, id: AgentId, agent: A) -> Result<AgentId, ContainerError> {
        if id > AgentId::MAX {
            return Err(ContainerError::IdentityOutOfRange(id));
        }
        if self.identities.contains(id) {
            return Err(ContainerError::DuplicateIdentity(id));
        }
        let keys = keys_for(&self.indices, id, &agent)?;
        self.next_id = self.next_id.max(id.0 + 1);
        self.commit_new(id, agent, keys);
        Ok(id)
    }

    /// Remove an agent, backfilling its slot with the last agent.
    ///
    /// Grid and network placements are not touched; use
    /// [`remove_detached`](Self::remove_detached) to clear those too.
    pub fn remove(&mut self, id: AgentId) -> Result<A, ContainerError> {
        let removed = self
            .identities
            .swap_remove(id)
            .ok_or(ContainerError::UnknownAgent(id))?;
        let agent = self.agents.swap_remove(removed.slot);
        for index in &mut self.indices {
            index.remove(id);
        }
        trace!(agent = %id, moved = ?removed.moved, "removed agent");
        Ok(agent)
    }

    /// Remove an agent and detach it from every grid or network it is placed on.
    pub fn remove_detached(
        &mut self,
        id: AgentId,
        category: &str,
        placements: &mut [&mut dyn Detach],
    ) -> Result<A, ContainerError> {
        let agent = self.remove(id)?;
        for placement in placements.iter_mut() {
            placement.detach(category, id);
        }
        Ok(agent)
    }

    /// Write one attribute and reposition the agent in every index.
    ///
    /// Every index key is recomputed, not only those of indices that list
    /// `attr` in their watch list. A key that moves without being watched is
    /// logged as a warning. A write whose new key is rejected is rolled back.
    pub fn set(&mut self, id: AgentId, attr: &str, value: Value) -> Result<(), ContainerError> {
        let slot = self.require_slot(id)?;
        let previous = self.agents[slot]
            .attr(attr)
            .ok_or_else(|| ContainerError::UnknownAttribute(attr.to_string()))?;
        self.agents[slot].set_attr(attr, value)?;
        if self.indices.is_empty() {
            return Ok(());
        }

        let keys = match keys_for(&self.indices, id, &self.agents[slot]) {
            Ok(keys) => keys,
            Err(e) => {
                if let Err(restore) = self.agents[slot].set_attr(attr, previous) {
                    panic!("could not restore '{}' on agent {}: {}", attr, id, restore);
                }
                return Err(e);
            }
        };
        let watching = self.watchers.get(attr).map(Vec::as_slice).unwrap_or(&[]);
        for (i, (index, key)) in self.indices.iter_mut().zip(keys).enumerate() {
            if index.update(id, key) && !watching.contains(&i) {
                warn!(
                    index = index.name(),
                    attribute = attr,
                    agent = %id,
                    "index key changed through an attribute missing from its watch list"
                );
            }
        }
        Ok(())
    }

    /// Apply an arbitrary mutation, then refresh the agent in every index.
    ///
    /// Use this for compound writes. If any index rejects the resulting key
    /// the agent is restored to its state before `f` ran.
    pub fn modify<R, F>(&mut self, id: AgentId, f: F) -> Result<R, ContainerError>
    where
        A: Clone,
        F: FnOnce(&mut A) -> R,
    {
        let slot = self.require_slot(id)?;
        if self.indices.is_empty() {
            return Ok(f(&mut self.agents[slot]));
        }
        let backup = self.agents[slot].clone();
        let out = f(&mut self.agents[slot]);
        match keys_for(&self.indices, id, &self.agents[slot]) {
            Ok(keys) => {
                for (index, key) in self.indices.iter_mut().zip(keys) {
                    index.update(id, key);
                }
                Ok(out)
            }
            Err(e) => {
                self.agents[slot] = backup;
                Err(e)
            }
        }
    }

    /// `n` distinct agent ids drawn uniformly without replacement.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<AgentId>, ContainerError> {
        if n > self.len() {
            return Err(ContainerError::InsufficientPopulation {
                requested: n,
                available: self.len(),
            });
        }
        Ok(rand::seq::index::sample(rng, self.len(), n)
            .into_iter()
            .map(|slot| self.agent_id_at(slot))
            .collect())
    }

    /// Like [`sample`](Self::sample) but returns the agents.
    pub fn sample_agents<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<(AgentId, &A)>, ContainerError> {
        let ids = self.sample(n, rng)?;
        Ok(ids.into_iter().map(|id| (id, self.expect_agent(id))).collect())
    }

    /// Overwrite agent attributes from a table.
    ///
    /// Rows match agents by id when `options.key_column` is set, otherwise by
    /// position. Every row is validated and applied to a staged copy first;
    /// nothing is written unless the whole table is accepted. Returns the
    /// number of rows applied.
    pub fn bulk_load(&mut self, table: &Table, options: &LoadOptions) -> Result<usize, ContainerError>
    where
        A: Clone + Default,
    {
        let rows = filter_rows(table, options)?;
        let skip: Vec<&str> = options
            .key_column
            .iter()
            .chain(options.scenario_filter.iter().map(|(c, _)| c))
            .map(String::as_str)
            .collect();
        let attributes: Vec<&str> = rows
            .columns()
            .iter()
            .map(String::as_str)
            .filter(|c| !skip.contains(c))
            .collect();
        if let Some(unknown) = attributes.iter().find(|c| !A::declares(c)) {
            return Err(ContainerError::SchemaMismatch(unknown.to_string()));
        }

        // id -> (staged agent, already live)
        let mut staged: IndexMap<AgentId, (A, bool)> = IndexMap::new();
        match &options.key_column {
            Some(column) => {
                if !rows.has_column(column) {
                    return Err(TableError::UnknownColumn(column.clone()).into());
                }
                for row in rows.rows() {
                    let cell = row.get(column).cloned().unwrap_or_default();
                    let id = cell
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .map(AgentId)
                        .ok_or_else(|| ContainerError::InvalidIdentity {
                            column: column.clone(),
                            value: cell.clone(),
                        })?;
                    if !staged.contains_key(&id) {
                        let entry = match self.get(id) {
                            Some(agent) => (agent.clone(), true),
                            None if options.create_missing => (A::default(), false),
                            None => return Err(ContainerError::UnknownAgent(id)),
                        };
                        staged.insert(id, entry);
                    }
                    if let Some((agent, _)) = staged.get_mut(&id) {
                        for attr in &attributes {
                            if let Some(value) = row.get(attr) {
                                agent.set_attr(attr, value.clone())?;
                            }
                        }
                    }
                }
            }
            None => {
                if rows.len() != self.len() {
                    return Err(ContainerError::RowCountMismatch {
                        expected: self.len(),
                        actual: rows.len(),
                    });
                }
                for (slot, row) in rows.rows().enumerate() {
                    let mut agent = self.agents[slot].clone();
                    for attr in &attributes {
                        if let Some(value) = row.get(attr) {
                            agent.set_attr(attr, value.clone())?;
                        }
                    }
                    staged.insert(self.agent_id_at(slot), (agent, true));
                }
            }
        }

        let mut keyed = Vec::with_capacity(staged.len());
        for (id, (agent, live)) in staged {
            let keys = keys_for(&self.indices, id, &agent)?;
            keyed.push((id, agent, live, keys));
        }
        let applied = rows.len();
        let mut created = 0usize;
        for (id, agent, live, keys) in keyed {
            if live {
                let slot = self.identities.slot(id).unwrap_or_else(|| {
                    panic!("staged agent {} vanished during bulk load", id)
                });
                self.agents[slot] = agent;
                for (index, key) in self.indices.iter_mut().zip(keys) {
                    index.update(id, key);
                }
            } else {
                self.next_id = self.next_id.max(id.0 + 1);
                self.commit_new(id, agent, keys);
                created += 1;
            }
        }
        debug!(rows = applied, created, "bulk loaded agent attributes");
        Ok(applied)
    }

    /// Project `columns` of every agent into a table. The first column is `id`.
    pub fn export(&self, columns: &[&str]) -> Result<Table, ContainerError> {
        let Some(sample) = self.agents.first() else {
            return Err(ContainerError::EmptyContainer);
        };
        let columns: Vec<&str> = columns.iter().copied().filter(|c| *c != "id").collect();
        if let Some(missing) = columns.iter().find(|c| sample.attr(c).is_none()) {
            return Err(ContainerError::UnknownAttribute(missing.to_string()));
        }

        let mut table = Table::new(std::iter::once("id").chain(columns.iter().copied()))?;
        for (id, agent) in self.iter() {
            let mut row = Vec::with_capacity(columns.len() + 1);
            row.push(Value::from(id));
            for column in &columns {
                let value = agent
                    .attr(column)
                    .ok_or_else(|| ContainerError::UnknownAttribute(column.to_string()))?;
                row.push(value);
            }
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Attach an ordered index and fill it with the current population.
    pub fn register_ordered(&mut self, spec: IndexSpec<A>) -> Result<OrderedIndexId, ContainerError> {
        self.register(DerivedIndex::ordered(spec)).map(OrderedIndexId)
    }

    /// Attach a partition index and fill it with the current population.
    pub fn register_partition(
        &mut self,
        spec: IndexSpec<A>,
    ) -> Result<PartitionIndexId, ContainerError> {
        self.register(DerivedIndex::partition(spec)).map(PartitionIndexId)
    }

    fn register(&mut self, mut index: DerivedIndex<A>) -> Result<usize, ContainerError> {
        if let Some(unknown) = index.spec.watches().iter().find(|w| !A::declares(w)) {
            return Err(ContainerError::UnknownAttribute(unknown.clone()));
        }
        for (id, agent) in self.identities.iter().zip(self.agents.iter()) {
            let key = index.key_of(agent).map_err(|e| ContainerError::IndexKeyType {
                index: index.name().to_string(),
                agent: id,
                actual: e.actual,
            })?;
            index.insert(id, key);
        }

        let position = self.indices.len();
        for attr in index.spec.watches() {
            self.watchers.entry(attr.clone()).or_default().push(position);
        }
        debug!(
            index = index.name(),
            watches = ?index.spec.watches(),
            members = index.member_count(),
            "registered index"
        );
        self.indices.push(index);
        Ok(position)
    }

    pub fn ordered_index(&self, handle: OrderedIndexId) -> Result<&OrderedIndex, ContainerError> {
        match self.indices.get(handle.0).map(|i| &i.structure) {
            Some(Structure::Ordered(index)) => Ok(index),
            _ => Err(ContainerError::UnknownIndex(handle.0)),
        }
    }

    pub fn partition_index(
        &self,
        handle: PartitionIndexId,
    ) -> Result<&PartitionIndex, ContainerError> {
        match self.indices.get(handle.0).map(|i| &i.structure) {
            Some(Structure::Partition(index)) => Ok(index),
            _ => Err(ContainerError::UnknownIndex(handle.0)),
        }
    }

    /// Agents with `lo <= key <= hi`, ascending by key.
    pub fn range_query(
        &self,
        handle: OrderedIndexId,
        lo: impl Into<IndexKey>,
        hi: impl Into<IndexKey>,
    ) -> Result<impl Iterator<Item = (AgentId, &A)> + '_, ContainerError> {
        let index = self.ordered_index(handle)?;
        let (lo, hi) = (lo.into(), hi.into());
        Ok(index
            .range(&lo, &hi)
            .map(move |(_, id)| (id, self.expect_agent(id))))
    }

    /// Agents in ascending key order.
    pub fn sorted_by(
        &self,
        handle: OrderedIndexId,
    ) -> Result<impl Iterator<Item = (AgentId, &A)> + '_, ContainerError> {
        let index = self.ordered_index(handle)?;
        Ok(index.ids().map(move |id| (id, self.expect_agent(id))))
    }

    /// Agents whose key equals `key`, in the order they joined the group.
    pub fn group(
        &self,
        handle: PartitionIndexId,
        key: impl Into<IndexKey>,
    ) -> Result<impl Iterator<Item = (AgentId, &A)> + '_, ContainerError> {
        let index = self.partition_index(handle)?;
        let key = key.into();
        let ids: Vec<AgentId> = index.group(&key).collect();
        Ok(ids.into_iter().map(move |id| (id, self.expect_agent(id))))
    }

    pub fn group_size(
        &self,
        handle: PartitionIndexId,
        key: impl Into<IndexKey>,
    ) -> Result<usize, ContainerError> {
        Ok(self.partition_index(handle)?.group_size(&key.into()))
    }

    /// Current key of `id` in the given index
    pub fn key_in(&self, handle: OrderedIndexId, id: AgentId) -> Option<&IndexKey> {
        self.indices.get(handle.0).and_then(|i| i.current_key(id))
    }

    /// Panic if the identity map or any index disagrees with the population.
    ///
    /// A failure here is a defect in this crate, not caller misuse.
    pub fn check_invariants(&self) {
        assert_eq!(
            self.identities.len(),
            self.agents.len(),
            "identity map and agent storage differ in length"
        );
        for (slot, id) in self.identities.iter().enumerate() {
            assert_eq!(
                self.identities.slot(id),
                Some(slot),
                "identity map points agent {} at a stale slot",
                id
            );
        }
        for index in &self.indices {
            assert_eq!(
                index.member_count(),
                self.len(),
                "index '{}' tracks {} members for {} agents",
                index.name(),
                index.member_count(),
                self.len()
            );
            assert_eq!(
                index.structure_len(),
                self.len(),
                "index '{}' structure is out of sync",
                index.name()
            );
            if let Structure::Ordered(ordered) = &index.structure {
                assert!(ordered.is_sorted(), "index '{}' is not sorted", index.name());
            }
            for (id, agent) in self.iter() {
                let expected = index.key_of(agent).ok();
                assert_eq!(
                    index.current_key(id),
                    expected.as_ref(),
                    "index '{}' holds a stale key for agent {}",
                    index.name(),
                    id
                );
            }
        }
    }

    fn allocate_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    fn commit_new(&mut self, id: AgentId, agent: A, keys: Vec<IndexKey>) {
        if self.identities.push(id).is_none() {
            panic!("agent {} committed twice", id);
        }
        self.agents.push(agent);
        for (index, key) in self.indices.iter_mut().zip(keys) {
            index.insert(id, key);
        }
        trace!(agent = %id, "added agent");
    }

    fn require_slot(&self, id: AgentId) -> Result<usize, ContainerError> {
        self.identities
            .slot(id)
            .ok_or(ContainerError::UnknownAgent(id))
    }

    fn agent_id_at(&self, slot: usize) -> AgentId {
        self.identities
            .id_at(slot)
            .unwrap_or_else(|| panic!("no agent id at slot {}", slot))
    }

    fn expect_agent(&self, id: AgentId) -> &A {
        self.get(id)
            .unwrap_or_else(|| panic!("index refers to agent {} which is not live", id))
    }
}

/// Keys of `agent` for every index, in index order.
fn keys_for<A>(
    indices: &[DerivedIndex<A>],
    id: AgentId,
    agent: &A,
) -> Result<Vec<IndexKey>, ContainerError> {
    indices
        .iter()
        .map(|index| {
            index.key_of(agent).map_err(|e| ContainerError::IndexKeyType {
                index: index.name().to_string(),
                agent: id,
                actual: e.actual,
            })
        })
        .collect()
}

fn filter_rows<'t>(
    table: &'t Table,
    options: &LoadOptions,
) -> Result<std::borrow::Cow<'t, Table>, ContainerError> {
    match &options.scenario_filter {
        Some((column, value)) => Ok(std::borrow::Cow::Owned(table.filter_eq(column, value)?)),
        None => Ok(std::borrow::Cow::Borrowed(table)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Person {
        age: i64,
        wealth: f64,
        city: String,
    }

    crate::agent_attributes!(Person { age, wealth, city });

    fn person(age: i64, city: &str) -> Person {
        Person {
            age,
            wealth: 0.0,
            city: city.to_string(),
        }
    }

    fn by_age() -> IndexSpec<Person> {
        IndexSpec::new("by_age", &["age"], |p: &Person| Value::Int(p.age))
    }

    fn by_city() -> IndexSpec<Person> {
        IndexSpec::new("by_city", &["city"], |p: &Person| Value::from(p.city.as_str()))
    }

    #[test]
    fn test_add_assigns_monotonic_ids() {
        let mut people = Container::new();
        let a = people.add(person(30, "rome")).unwrap();
        let b = people.add(person(40, "oslo")).unwrap();
        people.remove(a).unwrap();
        let c = people.add(person(50, "lima")).unwrap();

        assert_eq!((a, b, c), (AgentId(0), AgentId(1), AgentId(2)));
        assert_eq!(people.len(), 2);
        assert!(people.get(a).is_none());
    }

    #[test]
    fn test_insert_duplicate_identity() {
        let mut people = Container::new();
        people.insert(AgentId(5), person(1, "x")).unwrap();
        let err = people.insert(AgentId(5), person(2, "y")).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateIdentity(AgentId(5))));
        assert_eq!(people.add(person(3, "z")).unwrap(), AgentId(6));
    }

    #[test]
    fn test_insert_rejects_id_without_table_form() {
        let mut people = Container::new();
        people.insert(AgentId(2), person(1, "x")).unwrap();

        let err = people.insert(AgentId(u64::MAX), person(2, "y")).unwrap_err();
        assert!(matches!(err, ContainerError::IdentityOutOfRange(AgentId(u64::MAX))));
        let err = people.insert(AgentId(1 << 63), person(2, "y")).unwrap_err();
        assert!(matches!(err, ContainerError::IdentityOutOfRange(_)));

        assert_eq!(people.len(), 1);
        assert_eq!(people.next_id(), AgentId(3));
        people.check_invariants();
    }

    /// The largest id is usable, after which the counter refuses to hand out more
    #[test]
    fn test_counter_stops_at_largest_id() {
        let mut people = Container::new();
        people.insert(AgentId::MAX, person(7, "rome")).unwrap();

        let err = people.add(person(8, "oslo")).unwrap_err();
        assert!(matches!(err, ContainerError::IdentityOutOfRange(_)));
        assert_eq!(people.len(), 1);

        let exported = people.export(&["age", "city"]).unwrap();
        assert_eq!(exported.value(0, "id"), Some(&Value::Int(i64::MAX)));
        let reloaded: Container<Person> =
            Container::from_table(&exported, &LoadOptions::keyed("id")).unwrap();
        assert_eq!(reloaded.get(AgentId::MAX), people.get(AgentId::MAX));
    }

    #[test]
    fn test_remove_backfills_and_keeps_lookup() {
        let mut people = Container::populate(4, |i| person(i as i64, "x"));
        people.remove(AgentId(1)).unwrap();

        assert_eq!(people.slot_of(AgentId(3)), Some(1));
        assert_eq!(people.get(AgentId(3)).unwrap().age, 3);
        assert!(matches!(
            people.remove(AgentId(1)),
            Err(ContainerError::UnknownAgent(AgentId(1)))
        ));
        people.check_invariants();
    }

    #[test]
    fn test_set_repositions_ordered_index() {
        let mut people = Container::populate(3, |i| person(10 * i as i64, "x"));
        let ages = people.register_ordered(by_age()).unwrap();

        people.set(AgentId(0), "age", Value::Int(99)).unwrap();

        let order: Vec<AgentId> = people.sorted_by(ages).unwrap().map(|(id, _)| id).collect();
        assert_eq!(order, vec![AgentId(1), AgentId(2), AgentId(0)]);
        people.check_invariants();
    }

    #[test]
    fn test_set_unwatched_attribute_leaves_index() {
        let mut people = Container::populate(2, |i| person(i as i64, "x"));
        people.register_ordered(by_age()).unwrap();
        people.set(AgentId(1), "wealth", Value::Float(3.5)).unwrap();

        assert_eq!(people.get(AgentId(1)).unwrap().wealth, 3.5);
        people.check_invariants();
    }

    #[test]
    fn test_set_unknown_attribute() {
        let mut people = Container::populate(1, |_| person(1, "x"));
        let err = people.set(AgentId(0), "height", Value::Int(2)).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownAttribute(a) if a == "height"));
    }

    #[test]
    fn test_partition_moves_between_groups() {
        let mut people = Container::new();
        people.add(person(1, "rome")).unwrap();
        people.add(person(2, "rome")).unwrap();
        let cities = people.register_partition(by_city()).unwrap();

        people.set(AgentId(0), "city", Value::from("oslo")).unwrap();

        assert_eq!(people.group_size(cities, "rome").unwrap(), 1);
        assert_eq!(people.group_size(cities, "oslo").unwrap(), 1);
        let romans: Vec<AgentId> = people.group(cities, "rome").unwrap().map(|(id, _)| id).collect();
        assert_eq!(romans, vec![AgentId(1)]);
    }

    #[test]
    fn test_index_registered_before_agents() {
        let mut people = Container::new();
        let ages = people.register_ordered(by_age()).unwrap();
        for age in [5, 3, 9] {
            people.add(person(age, "x")).unwrap();
        }
        let sorted: Vec<i64> = people.sorted_by(ages).unwrap().map(|(_, p)| p.age).collect();
        assert_eq!(sorted, vec![3, 5, 9]);
    }

    #[test]
    fn test_watch_list_validated() {
        let mut people: Container<Person> = Container::new();
        let spec = IndexSpec::new("bad", &["height"], |p: &Person| Value::Int(p.age));
        let err = people.register_ordered(spec).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownAttribute(a) if a == "height"));
    }

    #[test]
    fn test_invalid_key_type_at_registration() {
        let mut people = Container::populate(2, |i| person(i as i64, "x"));
        let spec = IndexSpec::new("flag", &["age"], |p: &Person| Value::Bool(p.age > 0));
        let err = people.register_partition(spec).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::IndexKeyType { actual: "bool", .. }
        ));
    }

    #[test]
    fn test_rejected_key_rolls_back_write() {
        let mut people = Container::populate(1, |_| person(1, "x"));
        let spec = IndexSpec::new("ratio", &["wealth"], |p: &Person| Value::Float(p.wealth / p.wealth));
        people.set(AgentId(0), "wealth", Value::Float(2.0)).unwrap();
        people.register_ordered(spec).unwrap();

        let err = people.set(AgentId(0), "wealth", Value::Float(0.0)).unwrap_err();
        assert!(matches!(err, ContainerError::IndexKeyType { actual: "NaN", .. }));
        assert_eq!(people.get(AgentId(0)).unwrap().wealth, 2.0);
        people.check_invariants();
    }

    #[test]
    fn test_modify_refreshes_all_indices() {
        let mut people = Container::populate(3, |i| person(i as i64, "rome"));
        let ages = people.register_ordered(by_age()).unwrap();
        let cities = people.register_partition(by_city()).unwrap();

        let previous = people
            .modify(AgentId(0), |p| {
                p.age = 50;
                p.city = "oslo".to_string();
                p.age
            })
            .unwrap();

        assert_eq!(previous, 50);
        assert_eq!(people.ordered_index(ages).unwrap().last().unwrap().1, AgentId(0));
        assert_eq!(people.group_size(cities, "oslo").unwrap(), 1);
        people.check_invariants();
    }

    #[test]
    fn test_handles_are_typed() {
        let mut people = Container::populate(1, |_| person(1, "x"));
        let ages = people.register_ordered(by_age()).unwrap();
        let bogus = PartitionIndexId(ages.0);
        assert!(matches!(
            people.partition_index(bogus),
            Err(ContainerError::UnknownIndex(0))
        ));
    }

    #[test]
    fn test_sample_without_replacement() {
        let people = Container::populate(10, |i| person(i as i64, "x"));
        let mut rng = SmallRng::seed_from_u64(7);

        let mut picked = people.sample(10, &mut rng).unwrap();
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 10);

        let err = people.sample(11, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::InsufficientPopulation {
                requested: 11,
                available: 10
            }
        ));
    }

    #[test]
    fn test_export_rows_and_errors() {
        let empty: Container<Person> = Container::new();
        assert!(matches!(
            empty.export(&["age"]),
            Err(ContainerError::EmptyContainer)
        ));

        let people = Container::populate(2, |i| person(20 + i as i64, "rome"));
        let table = people.export(&["age", "city"]).unwrap();
        assert_eq!(table.columns(), &["id", "age", "city"]);
        assert_eq!(table.value(1, "age"), Some(&Value::Int(21)));
        assert_eq!(table.value(1, "id"), Some(&Value::Int(1)));

        assert!(matches!(
            people.export(&["height"]),
            Err(ContainerError::UnknownAttribute(c)) if c == "height"
        ));
    }

    #[test]
    fn test_positional_bulk_load() {
        let mut people = Container::populate(2, |_| person(0, "x"));
        let mut table = Table::new(["age", "city"]).unwrap();
        table.push_row(vec![Value::Int(7), Value::from("rome")]).unwrap();
        table.push_row(vec![Value::Int(8), Value::from("oslo")]).unwrap();

        assert_eq!(people.bulk_load(&table, &LoadOptions::positional()).unwrap(), 2);
        assert_eq!(people.get(AgentId(1)).unwrap(), &person(8, "oslo"));
    }

    #[test]
    fn test_positional_row_count_mismatch() {
        let mut people = Container::populate(3, |_| person(0, "x"));
        let mut table = Table::new(["age"]).unwrap();
        table.push_row(vec![Value::Int(1)]).unwrap();

        let err = people.bulk_load(&table, &LoadOptions::positional()).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::RowCountMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_bulk_load_schema_mismatch() {
        let mut people = Container::populate(1, |_| person(0, "x"));
        let mut table = Table::new(["id", "height"]).unwrap();
        table.push_row(vec![Value::Int(0), Value::Int(180)]).unwrap();

        let err = people.bulk_load(&table, &LoadOptions::keyed("id")).unwrap_err();
        assert!(matches!(err, ContainerError::SchemaMismatch(c) if c == "height"));
    }

    #[test]
    fn test_keyed_bulk_load_is_atomic() {
        let mut people = Container::populate(2, |_| person(0, "x"));
        let ages = people.register_ordered(by_age()).unwrap();
        let mut table = Table::new(["id", "age"]).unwrap();
        table.push_row(vec![Value::Int(0), Value::Int(40)]).unwrap();
        table.push_row(vec![Value::Int(9), Value::Int(50)]).unwrap();

        let err = people.bulk_load(&table, &LoadOptions::keyed("id")).unwrap_err();
        assert!(matches!(err, ContainerError::UnknownAgent(AgentId(9))));
        assert_eq!(people.get(AgentId(0)).unwrap().age, 0);

        let loaded = people
            .bulk_load(&table, &LoadOptions::keyed("id").create_missing(true))
            .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(people.len(), 3);
        assert_eq!(people.get(AgentId(9)).unwrap().age, 50);
        assert_eq!(people.ordered_index(ages).unwrap().last().unwrap().1, AgentId(9));
        assert_eq!(people.add(person(1, "y")).unwrap(), AgentId(10));
        people.check_invariants();
    }

    #[test]
    fn test_bulk_load_type_mismatch_writes_nothing() {
        let mut people = Container::populate(2, |_| person(0, "x"));
        let mut table = Table::new(["age"]).unwrap();
        table.push_row(vec![Value::Int(5)]).unwrap();
        table.push_row(vec![Value::from("old")]).unwrap();

        let err = people.bulk_load(&table, &LoadOptions::positional()).unwrap_err();
        assert!(matches!(err, ContainerError::Attribute(AttrError::TypeMismatch { .. })));
        assert_eq!(people.get(AgentId(0)).unwrap().age, 0);
    }

    #[derive(Debug, Clone, Default)]
    struct Pair {
        a: i64,
        b: i64,
    }

    crate::agent_attributes!(Pair { a, b });

    /// A key reading `b` stays correct even though only `a` is declared
    #[test]
    fn test_set_refreshes_key_missing_from_watch_list() {
        let mut pairs = Container::populate(4, |i| Pair { a: i as i64, b: 0 });
        let sums = pairs
            .register_ordered(IndexSpec::new("sum", &["a"], |p: &Pair| Value::Int(p.a + p.b)))
            .unwrap();

        pairs.set(AgentId(0), "b", Value::Int(10)).unwrap();
        pairs.set(AgentId(3), "b", Value::Int(-10)).unwrap();

        let order: Vec<AgentId> = pairs.sorted_by(sums).unwrap().map(|(id, _)| id).collect();
        assert_eq!(order, vec![AgentId(3), AgentId(1), AgentId(2), AgentId(0)]);
        pairs.check_invariants();
    }

    #[test]
    fn test_invalid_identity_cell() {
        let mut people = Container::populate(1, |_| person(0, "x"));
        let mut table = Table::new(["id", "age"]).unwrap();
        table.push_row(vec![Value::Int(-1), Value::Int(5)]).unwrap();

        let err = people.bulk_load(&table, &LoadOptions::keyed("id")).unwrap_err();
        assert!(matches!(err, ContainerError::InvalidIdentity { .. }));
    }

    #[test]
    fn test_from_table_positional() {
        let mut table = Table::new(["age", "city"]).unwrap();
        table.push_row(vec![Value::Int(3), Value::from("a")]).unwrap();
        table.push_row(vec![Value::Int(4), Value::from("b")]).unwrap();

        let people: Container<Person> = Container::from_table(&table, &LoadOptions::positional()).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people.get(AgentId(1)).unwrap().city, "b");
    }

    #[test]
    fn test_filter() {
        let people = Container::populate(6, |i| person(i as i64, "x"));
        let even = people.filter(|p| p.age % 2 == 0);
        assert_eq!(even, vec![AgentId(0), AgentId(2), AgentId(4)]);
    }
}
