//! Relationship network over `(category, id)` nodes.
//!
//! Nodes reference agents, they never own them. Edges carry a payload `E`,
//! by default a bag of named [`Value`]s. Undirected networks store each edge
//! once and list it in the adjacency of both endpoints.

pub mod generators;

pub use generators::{FnGenerator, GraphGenerator, GraphModel};

use indexmap::{IndexMap, IndexSet};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use colony_table::Value;

use crate::agent::AgentId;
use crate::category::{CategoryId, CategoryRegistry};
use crate::container::Detach;

/// Named edge attributes.
pub type Attributes = IndexMap<String, Value>;

/// Errors raised by network operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("category '{0}' already exists")]
    CategoryAlreadyExists(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("node {0} already exists")]
    DuplicateNode(Node),
    #[error("node {0} does not exist")]
    UnknownNode(Node),
    #[error("no edge from {from} to {to}")]
    NoSuchEdge { from: Node, to: Node },
    #[error("unknown graph generator '{0}'")]
    UnknownGenerator(String),
    #[error("invalid parameters for '{generator}': {reason}")]
    InvalidGeneratorParams { generator: String, reason: String },
}

/// A network vertex: one agent of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    pub category: CategoryId,
    pub id: AgentId,
}

impl Node {
    pub fn new(category: CategoryId, id: AgentId) -> Self {
        Self { category, id }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

/// Graph over agents, directed or undirected.
#[derive(Debug, Clone)]
pub struct Network<E = Attributes> {
    directed: bool,
    categories: CategoryRegistry,
    /// Successors, or all neighbours when undirected
    outgoing: IndexMap<Node, IndexSet<Node>>,
    /// Predecessors; only maintained when directed
    incoming: IndexMap<Node, IndexSet<Node>>,
    edges: HashMap<(Node, Node), E>,
}

impl<E> Network<E> {
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            categories: CategoryRegistry::new(),
            outgoing: IndexMap::new(),
            incoming: IndexMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn undirected() -> Self {
        Self::new(false)
    }

    pub fn directed() -> Self {
        Self::new(true)
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn add_category(&mut self, name: &str) -> Result<CategoryId, NetworkError> {
        let id = self
            .categories
            .register(name)
            .ok_or_else(|| NetworkError::CategoryAlreadyExists(name.to_string()))?;
        debug!(category = name, "registered network category");
        Ok(id)
    }

    pub fn category(&self, name: &str) -> Result<CategoryId, NetworkError> {
        self.categories
            .lookup(name)
            .ok_or_else(|| NetworkError::UnknownCategory(name.to_string()))
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), NetworkError> {
        if !self.categories.contains(node.category) {
            return Err(NetworkError::UnknownCategory(node.category.to_string()));
        }
        if self.outgoing.contains_key(&node) {
            return Err(NetworkError::DuplicateNode(node));
        }
        self.outgoing.insert(node, IndexSet::new());
        if self.directed {
            self.incoming.insert(node, IndexSet::new());
        }
        Ok(())
    }

    pub fn has_node(&self, node: Node) -> bool {
        self.outgoing.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.outgoing.len()
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.outgoing.keys().copied()
    }

    pub fn nodes_in(&self, category: CategoryId) -> impl Iterator<Item = Node> + '_ {
        self.nodes().filter(move |n| n.category == category)
    }

    /// Insert an edge, or replace the payload of an existing one. Returns
    /// the replaced payload.
    pub fn add_edge(&mut self, from: Node, to: Node, payload: E) -> Result<Option<E>, NetworkError> {
        self.require(from)?;
        self.require(to)?;
        let key = self.edge_key(from, to);
        if let Some(previous) = self.edges.insert(key, payload) {
            return Ok(Some(previous));
        }
        self.link(from, to);
        Ok(None)
    }

    pub fn remove_edge(&mut self, from: Node, to: Node) -> Result<E, NetworkError> {
        let key = self.edge_key(from, to);
        let payload = self
            .edges
            .remove(&key)
            .ok_or(NetworkError::NoSuchEdge { from, to })?;
        self.unlink(from, to);
        Ok(payload)
    }

    /// Remove a node and every edge touching it. Returns the number of edges
    /// removed.
    pub fn remove_node(&mut self, node: Node) -> Result<usize, NetworkError> {
        let successors = self
            .outgoing
            .shift_remove(&node)
            .ok_or(NetworkError::UnknownNode(node))?;
        let predecessors = if self.directed {
            self.incoming.shift_remove(&node).unwrap_or_default()
        } else {
            IndexSet::new()
        };

        let mut removed = 0;
        for other in successors {
            let key = self.edge_key(node, other);
            if self.edges.remove(&key).is_some() {
                removed += 1;
            }
            let back = if self.directed {
                self.incoming.get_mut(&other)
            } else {
                self.outgoing.get_mut(&other)
            };
            if let Some(set) = back {
                set.shift_remove(&node);
            }
        }
        for other in predecessors {
            if self.edges.remove(&(other, node)).is_some() {
                removed += 1;
            }
            if let Some(set) = self.outgoing.get_mut(&other) {
                set.shift_remove(&node);
            }
        }
        Ok(removed)
    }

    /// Adjacent nodes; successors when directed.
    pub fn neighbors(&self, node: Node) -> Result<impl Iterator<Item = Node> + '_, NetworkError> {
        Ok(self.require(node)?.iter().copied())
    }

    /// Nodes with an edge into `node`; same as `neighbors` when undirected.
    pub fn predecessors(&self, node: Node) -> Result<impl Iterator<Item = Node> + '_, NetworkError> {
        let set = if self.directed {
            self.incoming
                .get(&node)
                .ok_or(NetworkError::UnknownNode(node))?
        } else {
            self.require(node)?
        };
        Ok(set.iter().copied())
    }

    pub fn degree(&self, node: Node) -> Result<usize, NetworkError> {
        Ok(self.require(node)?.len())
    }

    pub fn in_degree(&self, node: Node) -> Result<usize, NetworkError> {
        self.predecessors(node).map(Iterator::count)
    }

    pub fn has_edge(&self, from: Node, to: Node) -> bool {
        self.edges.contains_key(&self.edge_key(from, to))
    }

    pub fn edge(&self, from: Node, to: Node) -> Result<&E, NetworkError> {
        self.edges
            .get(&self.edge_key(from, to))
            .ok_or(NetworkError::NoSuchEdge { from, to })
    }

    pub fn edge_mut(&mut self, from: Node, to: Node) -> Result<&mut E, NetworkError> {
        let key = self.edge_key(from, to);
        self.edges
            .get_mut(&key)
            .ok_or(NetworkError::NoSuchEdge { from, to })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges in arbitrary order. Undirected edges appear once.
    pub fn edges(&self) -> impl Iterator<Item = (Node, Node, &E)> + '_ {
        self.edges.iter().map(|((a, b), e)| (*a, *b, e))
    }

    /// Wire up populations with a graph generator.
    ///
    /// Populations are laid out in order, so generator position `i` maps to
    /// the `i`-th agent of the concatenated lists. Missing nodes are created;
    /// new edges get `E::default()`. Returns the number of edges added.
    pub fn build_from_generator(
        &mut self,
        populations: &[(CategoryId, Vec<AgentId>)],
        generator: &dyn GraphGenerator,
        rng: &mut dyn RngCore,
    ) -> Result<usize, NetworkError>
    where
        E: Default,
    {
        let nodes: Vec<Node> = populations
            .iter()
            .flat_map(|(category, ids)| ids.iter().map(move |&id| Node::new(*category, id)))
            .collect();
        if let Some(node) = nodes.iter().find(|n| !self.categories.contains(n.category)) {
            return Err(NetworkError::UnknownCategory(node.category.to_string()));
        }

        let pairs = generator.generate(nodes.len(), rng)?;
        if let Some(&(a, b)) = pairs.iter().find(|(a, b)| *a >= nodes.len() || *b >= nodes.len()) {
            return Err(NetworkError::InvalidGeneratorParams {
                generator: generator.name().to_string(),
                reason: format!("edge ({}, {}) is outside 0..{}", a, b, nodes.len()),
            });
        }

        for &node in &nodes {
            if !self.has_node(node) {
                self.add_node(node)?;
            }
        }
        let mut added = 0;
        for (a, b) in pairs {
            if self.add_edge(nodes[a], nodes[b], E::default())?.is_none() {
                added += 1;
            }
        }
        debug!(
            generator = generator.name(),
            nodes = nodes.len(),
            edges = added,
            "built network"
        );
        Ok(added)
    }

    /// [`build_from_generator`](Self::build_from_generator) with a built-in
    /// model looked up by name.
    pub fn build_by_name(
        &mut self,
        populations: &[(CategoryId, Vec<AgentId>)],
        name: &str,
        params: &IndexMap<String, Value>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, NetworkError>
    where
        E: Default,
    {
        let model = GraphModel::from_name(name, params)?;
        self.build_from_generator(populations, &model, rng)
    }

    fn require(&self, node: Node) -> Result<&IndexSet<Node>, NetworkError> {
        self.outgoing
            .get(&node)
            .ok_or(NetworkError::UnknownNode(node))
    }

    fn edge_key(&self, from: Node, to: Node) -> (Node, Node) {
        if self.directed || from <= to {
            (from, to)
        } else {
            (to, from)
        }
    }

    fn link(&mut self, from: Node, to: Node) {
        if let Some(set) = self.outgoing.get_mut(&from) {
            set.insert(to);
        }
        let back = if self.directed {
            self.incoming.get_mut(&to)
        } else {
            self.outgoing.get_mut(&to)
        };
        if let Some(set) = back {
            set.insert(from);
        }
    }

    fn unlink(&mut self, from: Node, to: Node) {
        if let Some(set) = self.outgoing.get_mut(&from) {
            set.shift_remove(&to);
        }
        let back = if self.directed {
            self.incoming.get_mut(&to)
        } else {
            self.outgoing.get_mut(&to)
        };
        if let Some(set) = back {
            set.shift_remove(&from);
        }
    }
}

impl<E> Default for Network<E> {
    fn default() -> Self {
        Self::undirected()
    }
}

impl<E> Detach for Network<E> {
    fn detach(&mut self, category: &str, id: AgentId) -> bool {
        match self.categories.lookup(category) {
            Some(cat) => self.remove_node(Node::new(cat, id)).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn network(directed: bool, n: u64) -> (Network, CategoryId) {
        let mut net = Network::new(directed);
        let agents = net.add_category("agents").unwrap();
        for i in 0..n {
            net.add_node(Node::new(agents, AgentId(i))).unwrap();
        }
        (net, agents)
    }

    #[test]
    fn test_node_serde_round_trip() {
        let (_, agents) = network(false, 0);
        let node = Node::new(agents, AgentId(4));
        let text = serde_json::to_string(&node).unwrap();
        assert_eq!(serde_json::from_str::<Node>(&text).unwrap(), node);
    }

    fn node(cat: CategoryId, id: u64) -> Node {
        Node::new(cat, AgentId(id))
    }

    fn sorted(iter: impl Iterator<Item = Node>) -> Vec<u64> {
        let mut ids: Vec<u64> = iter.map(|n| n.id.0).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_undirected_neighbors_and_removal() {
        let (mut net, a) = network(false, 10);
        net.add_edge(node(a, 0), node(a, 1), Attributes::new()).unwrap();
        net.add_edge(node(a, 0), node(a, 2), Attributes::new()).unwrap();
        net.add_edge(node(a, 1), node(a, 2), Attributes::new()).unwrap();
        net.add_edge(node(a, 3), node(a, 4), Attributes::new()).unwrap();

        assert_eq!(sorted(net.neighbors(node(a, 0)).unwrap()), vec![1, 2]);
        assert_eq!(sorted(net.neighbors(node(a, 2)).unwrap()), vec![0, 1]);

        net.add_node(node(a, 11)).unwrap();
        assert_eq!(net.node_count(), 11);

        assert_eq!(net.remove_node(node(a, 0)).unwrap(), 2);
        assert_eq!(net.degree(node(a, 1)).unwrap(), 1);
        assert_eq!(net.edge_count(), 2);
        assert!(!net.has_edge(node(a, 2), node(a, 0)));
    }

    #[test]
    fn test_duplicate_and_unknown_nodes() {
        let (mut net, a) = network(false, 2);
        assert_eq!(
            net.add_node(node(a, 1)),
            Err(NetworkError::DuplicateNode(node(a, 1)))
        );
        assert_eq!(
            net.add_edge(node(a, 0), node(a, 5), Attributes::new()),
            Err(NetworkError::UnknownNode(node(a, 5)))
        );
        assert!(net.neighbors(node(a, 5)).is_err());
        assert!(net.add_node(Node::new(CategoryId(3), AgentId(0))).is_err());
    }

    #[test]
    fn test_edge_attributes() {
        let (mut net, a) = network(false, 2);
        let mut attrs = Attributes::new();
        attrs.insert("weight".to_string(), Value::Float(12.0));
        net.add_edge(node(a, 0), node(a, 1), attrs).unwrap();

        assert_eq!(
            net.edge(node(a, 1), node(a, 0)).unwrap().get("weight"),
            Some(&Value::Float(12.0))
        );
        net.edge_mut(node(a, 0), node(a, 1))
            .unwrap()
            .insert("trust".to_string(), Value::Int(3));
        assert_eq!(net.edge(node(a, 0), node(a, 1)).unwrap().len(), 2);

        let previous = net
            .add_edge(node(a, 1), node(a, 0), Attributes::new())
            .unwrap();
        assert_eq!(previous.map(|p| p.len()), Some(2));
        assert_eq!(net.edge_count(), 1);
    }

    #[test]
    fn test_missing_edge() {
        let (mut net, a) = network(false, 3);
        assert_eq!(
            net.edge(node(a, 0), node(a, 2)).unwrap_err(),
            NetworkError::NoSuchEdge {
                from: node(a, 0),
                to: node(a, 2)
            }
        );
        assert!(net.remove_edge(node(a, 0), node(a, 2)).is_err());
    }

    #[test]
    fn test_directed_edges_are_one_way() {
        let (mut net, a) = network(true, 3);
        net.add_edge(node(a, 0), node(a, 1), Attributes::new()).unwrap();
        net.add_edge(node(a, 2), node(a, 1), Attributes::new()).unwrap();

        assert_eq!(sorted(net.neighbors(node(a, 0)).unwrap()), vec![1]);
        assert_eq!(net.degree(node(a, 1)).unwrap(), 0);
        assert_eq!(sorted(net.predecessors(node(a, 1)).unwrap()), vec![0, 2]);
        assert!(net.edge(node(a, 1), node(a, 0)).is_err());

        assert_eq!(net.remove_node(node(a, 1)).unwrap(), 2);
        assert_eq!(net.degree(node(a, 0)).unwrap(), 0);
        assert_eq!(net.edge_count(), 0);
    }

    #[test]
    fn test_remove_edge_updates_both_sides() {
        let (mut net, a) = network(false, 2);
        net.add_edge(node(a, 0), node(a, 1), Attributes::new()).unwrap();
        net.remove_edge(node(a, 1), node(a, 0)).unwrap();
        assert_eq!(net.degree(node(a, 0)).unwrap(), 0);
        assert_eq!(net.degree(node(a, 1)).unwrap(), 0);
    }

    #[test]
    fn test_build_across_categories() {
        let mut net: Network = Network::undirected();
        let wolves = net.add_category("wolves").unwrap();
        let sheep = net.add_category("sheep").unwrap();
        let populations: Vec<(CategoryId, Vec<AgentId>)> = vec![
            (wolves, (0..3).map(AgentId).collect()),
            (sheep, (0..3).map(AgentId).collect()),
        ];
        let mut rng = SmallRng::seed_from_u64(9);

        let added = net
            .build_from_generator(&populations, &GraphModel::Complete, &mut rng)
            .unwrap();

        assert_eq!(added, 15);
        assert_eq!(net.node_count(), 6);
        assert!(net.has_edge(node(wolves, 2), node(sheep, 0)));
        assert_eq!(net.nodes_in(sheep).count(), 3);
    }

    #[test]
    fn test_build_by_name() {
        let (mut net, a) = network(false, 0);
        let populations: Vec<(CategoryId, Vec<AgentId>)> = vec![(a, (0..10).map(AgentId).collect())];
        let mut params = IndexMap::new();
        params.insert("m".to_string(), Value::Int(3));
        let mut rng = SmallRng::seed_from_u64(1);

        let added = net
            .build_by_name(&populations, "barabasi_albert_graph", &params, &mut rng)
            .unwrap();
        assert_eq!(added, 21);
        assert_eq!(net.node_count(), 10);

        let err = net
            .build_by_name(&populations, "lattice", &params, &mut rng)
            .unwrap_err();
        assert_eq!(err, NetworkError::UnknownGenerator("lattice".to_string()));
    }

    #[test]
    fn test_out_of_range_generator_output() {
        let (mut net, a) = network(false, 0);
        let bad = FnGenerator::new("bad", |n, _rng: &mut dyn RngCore| vec![(0, n)]);
        let populations: Vec<(CategoryId, Vec<AgentId>)> = vec![(a, vec![AgentId(0), AgentId(1)])];
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            net.build_from_generator(&populations, &bad, &mut rng),
            Err(NetworkError::InvalidGeneratorParams { .. })
        ));
        assert_eq!(net.node_count(), 0);
    }

    #[test]
    fn test_detach_removes_node() {
        let (mut net, a) = network(false, 2);
        net.add_edge(node(a, 0), node(a, 1), Attributes::new()).unwrap();
        assert!(net.detach("agents", AgentId(0)));
        assert!(!net.detach("agents", AgentId(0)));
        assert!(!net.detach("plants", AgentId(1)));
        assert_eq!(net.degree(node(a, 1)).unwrap(), 0);
    }
}
