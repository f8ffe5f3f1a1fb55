//! Configuration loading for simulation runs.
//!
//! All run settings are loaded from a TOML configuration file. Every section
//! is optional and falls back to its defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use colony_table::Value;

use crate::grid::{GridConfig, Topology};

/// Complete run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Step count, seed and exchange rules
    #[serde(default)]
    pub run: RunConfig,
    /// Initial trader population
    #[serde(default)]
    pub population: PopulationConfig,
    /// Spatial layout
    #[serde(default)]
    pub grid: GridSection,
    /// Trading relationships
    #[serde(default)]
    pub network: NetworkSection,
    /// Snapshot output
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges that the TOML types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.run.rich_win_prob) {
            return Err(ConfigError::Invalid(format!(
                "run.rich_win_prob must be in [0, 1], got {}",
                self.run.rich_win_prob
            )));
        }
        if self.population.count == 0 && self.population.params_file.is_none() {
            return Err(ConfigError::Invalid(
                "population.count must be at least 1".to_string(),
            ));
        }
        if self.population.bracket_width <= 0 {
            return Err(ConfigError::Invalid(
                "population.bracket_width must be positive".to_string(),
            ));
        }
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "grid dimensions {}x{} must be positive",
                self.grid.width, self.grid.height
            )));
        }
        if self.output.export_interval == 0 {
            return Err(ConfigError::Invalid(
                "output.export_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for SimConfig {
    type Err = ConfigError;

    /// Parses and validates configuration from a TOML string.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of steps to simulate
    pub steps: u64,
    /// Pairwise trades attempted per step
    pub trade_num: usize,
    /// Probability that the richer trader wins a trade
    pub rich_win_prob: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 200,
            trade_num: 100,
            rich_win_prob: 0.5,
        }
    }
}

/// Initial population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Traders created when no parameter table is given
    pub count: usize,
    pub initial_account: i64,
    /// Chance per step that a trader earns one unit
    pub productivity: f64,
    /// Width of the account brackets used for grouping
    pub bracket_width: i64,
    /// JSON Lines table of per-trader attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_file: Option<PathBuf>,
    /// Rows of `params_file` to keep, matched on `id_scenario`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<i64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            count: 100,
            initial_account: 10,
            productivity: 0.5,
            bracket_width: 10,
            params_file: None,
            scenario: None,
        }
    }
}

/// Grid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSection {
    pub width: usize,
    pub height: usize,
    pub wrap: bool,
    pub multi: bool,
    /// Largest step along each axis per move
    pub move_range: usize,
    /// Neighbourhood used for local trades when a trader has no contacts
    pub topology: Topology,
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
            wrap: true,
            multi: true,
            move_range: 1,
            topology: Topology::Moore,
        }
    }
}

impl GridSection {
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            width: self.width,
            height: self.height,
            wrap: self.wrap,
            multi: self.multi,
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub directed: bool,
    /// Graph model name, e.g. `watts_strogatz_graph`
    pub generator: String,
    /// Parameters passed to the graph model
    pub params: IndexMap<String, Value>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let mut params = IndexMap::new();
        params.insert("k".to_string(), Value::Int(4));
        params.insert("p".to_string(), Value::Float(0.1));
        Self {
            directed: false,
            generator: "watts_strogatz_graph".to_string(),
            params,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON Lines file receiving population snapshots
    pub path: PathBuf,
    /// Steps between snapshots
    pub export_interval: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output/traders.jsonl"),
            export_interval: 10,
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Colony Configuration

[run]
seed = 42
steps = 200
trade_num = 100
rich_win_prob = 0.5

[population]
count = 100
initial_account = 10
productivity = 0.5
bracket_width = 10
# params_file = "traders.jsonl"
# scenario = 0

[grid]
width = 20
height = 20
wrap = true
multi = true
move_range = 1
topology = "moore"

[network]
directed = false
generator = "watts_strogatz_graph"

[network.params]
k = 4
p = 0.1

[output]
path = "output/traders.jsonl"
export_interval = 10
"#
    .to_string()
}
