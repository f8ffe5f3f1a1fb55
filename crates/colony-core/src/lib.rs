//! Colony core: agent populations with derived views.
//!
//! An agent population lives in a [`Container`], which gives O(1) identity
//! based add, remove and lookup and keeps every registered derived index in
//! sync with attribute writes. Agents can be placed on a spatial [`Grid`] and
//! linked in a relationship [`Network`]; both reference agents by id and
//! never own them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  bulk_load / export   ┌───────────────────────────────┐
//! │ colony-table │ ◀──────────────────▶  │ Container ── OrderedIndex      │
//! └──────────────┘                       │     │      └─ PartitionIndex   │
//!                                        │     ├── Grid (category, id)    │
//!                                        │     └── Network (category, id) │
//!                                        └───────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`agent`]: Agent ids and by-name attribute access
//! - [`identity`]: Id to storage slot mapping
//! - [`container`]: The owning agent collection
//! - [`index`]: Ordered and partition indices
//! - [`category`]: Category names shared by grids and networks
//! - [`grid`]: 2-D lattice with neighbourhood queries
//! - [`network`]: Graph over agents and random graph generators
//! - [`config`]: TOML run configuration
//! - [`output`]: JSON Lines snapshot logging
//! - [`model`]: Wealth exchange model driven by the `colony_sim` binary

pub mod agent;
pub mod category;
pub mod config;
pub mod container;
pub mod grid;
pub mod identity;
pub mod index;
pub mod model;
pub mod network;
pub mod output;

// Re-export the table types agents are read and written through
pub use colony_table::{FromValue, Table, TableError, Value};

pub use agent::{Agent, AgentId, AttrError};
#[doc(hidden)]
pub use agent::__field_expected;

pub use category::{CategoryId, CategoryRegistry};
pub use config::{default_config_toml, ConfigError, SimConfig};
pub use container::{Container, ContainerError, Detach, LoadOptions};
pub use grid::{Coord, Grid, GridConfig, GridError, Topology};
pub use identity::IdentityMap;
pub use index::{
    IndexKey, IndexKeyError, IndexSpec, OrderedIndex, OrderedIndexId, PartitionIndex,
    PartitionIndexId,
};
pub use model::{StepSummary, Trader, WealthModel};
pub use network::{Attributes, GraphGenerator, GraphModel, Network, NetworkError, Node};
pub use output::TableLogger;

use thiserror::Error;

/// Errors that can occur while setting up or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("grid error: {0}")]
    Grid(#[from] GridError),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("table error: {0}")]
    Table(#[from] TableError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
