//! Wealth exchange model.
//!
//! Traders earn money at random and trade single units with their contacts.
//! A trade is won by the richer party with probability `rich_win_prob`; the
//! loser pays one unit if it has any. Over time the accounts spread out and
//! the Gini coefficient rises.
//!
//! Traders live in a [`Container`] with an ordered index on `account` (used
//! for the Gini coefficient and rankings) and a partition index on wealth
//! bracket. Contacts come from a generated [`Network`]; traders without
//! contacts trade with whoever stands nearby on the [`Grid`].

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use colony_table::{Table, Value};

use crate::agent::AgentId;
use crate::category::CategoryId;
use crate::config::{ConfigError, RunConfig, SimConfig};
use crate::container::{Container, ContainerError, LoadOptions};
use crate::grid::{Grid, GridError, Topology};
use crate::index::{IndexKey, IndexSpec, OrderedIndexId, PartitionIndexId};
use crate::network::{Network, Node};
use crate::output::TableLogger;
use crate::SimError;

/// Category name traders are registered under on the grid and network
pub const TRADERS: &str = "traders";

/// Attributes written to snapshots, after `id`
pub const SNAPSHOT_COLUMNS: &[&str] = &["account", "productivity"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trader {
    pub account: i64,
    /// Chance per step of earning one unit
    pub productivity: f64,
}

crate::agent_attributes!(Trader { account, productivity });

/// Population statistics after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: u64,
    pub population: usize,
    pub total_wealth: i64,
    pub gini: f64,
}

/// Gini coefficient of accounts sorted ascending. Zero for an empty or
/// penniless population.
pub fn gini(sorted: &[i64]) -> f64 {
    let n = sorted.len() as f64;
    let total: i64 = sorted.iter().sum();
    if sorted.is_empty() || total == 0 {
        return 0.0;
    }
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| x as f64 * (n - i as f64))
        .sum();
    let b = weighted / (n * total as f64);
    1.0 + 1.0 / n - 2.0 * b
}

pub struct WealthModel {
    traders: Container<Trader>,
    by_account: OrderedIndexId,
    by_bracket: PartitionIndexId,
    grid: Grid,
    grid_category: CategoryId,
    network: Network,
    node_category: CategoryId,
    run: RunConfig,
    move_range: usize,
    topology: Topology,
    rng: SmallRng,
    step: u64,
}

impl WealthModel {
    /// Build the population described by `config`, either from its parameter
    /// table or from the uniform defaults.
    pub fn new(config: &SimConfig) -> Result<Self, SimError> {
        let population = &config.population;
        let traders = match &population.params_file {
            Some(path) => {
                let table = Table::read_jsonl(path)?;
                traders_from_table(&table, population.scenario)?
            }
            None => Container::populate(population.count, |_| Trader {
                account: population.initial_account,
                productivity: population.productivity,
            }),
        };
        Self::with_traders(config, traders)
    }

    /// Wire an existing population onto a fresh grid and network.
    pub fn with_traders(config: &SimConfig, mut traders: Container<Trader>) -> Result<Self, SimError> {
        if traders.is_empty() {
            return Err(ConfigError::Invalid("population has no traders".to_string()).into());
        }
        let mut rng = SmallRng::seed_from_u64(config.run.seed);

        let by_account = traders.register_ordered(IndexSpec::new(
            "account",
            &["account"],
            |t: &Trader| Value::Int(t.account),
        ))?;
        let width = config.population.bracket_width;
        let by_bracket = traders.register_partition(IndexSpec::new(
            "bracket",
            &["account"],
            move |t: &Trader| Value::Int(t.account.div_euclid(width)),
        ))?;

        let ids = traders.ids();
        let mut grid = Grid::new(config.grid.grid_config())?;
        let grid_category = grid.add_category(TRADERS)?;
        if grid.config().multi {
            let (w, h) = (grid.width() as i64, grid.height() as i64);
            for &id in &ids {
                let (x, y) = (rng.gen_range(0..w), rng.gen_range(0..h));
                grid.place(grid_category, id, x, y)?;
            }
        } else {
            grid.place_randomly(grid_category, &ids, &mut rng)?;
        }

        let mut network = Network::new(config.network.directed);
        let node_category = network.add_category(TRADERS)?;
        network.build_by_name(
            &[(node_category, ids.clone())],
            &config.network.generator,
            &config.network.params,
            &mut rng,
        )?;

        info!(
            traders = traders.len(),
            edges = network.edge_count(),
            "wealth model ready"
        );
        Ok(Self {
            traders,
            by_account,
            by_bracket,
            grid,
            grid_category,
            network,
            node_category,
            run: config.run.clone(),
            move_range: config.grid.move_range,
            topology: config.grid.topology,
            rng,
            step: 0,
        })
    }

    pub fn traders(&self) -> &Container<Trader> {
        &self.traders
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }

    /// Advance one period: production, trading, then movement.
    pub fn step(&mut self) -> Result<StepSummary, SimError> {
        self.produce()?;
        self.trade()?;
        self.wander()?;
        self.step += 1;
        let summary = self.summary()?;
        debug!(
            step = summary.step,
            wealth = summary.total_wealth,
            gini = summary.gini,
            "step complete"
        );
        Ok(summary)
    }

    /// Run `steps` periods, logging a snapshot every `export_interval` steps
    /// and once before the first step.
    pub fn run(
        &mut self,
        steps: u64,
        export_interval: u64,
        logger: &mut TableLogger,
    ) -> Result<Vec<StepSummary>, SimError> {
        let interval = export_interval.max(1);
        logger.log_snapshot(self.step, &self.snapshot()?)?;
        let mut summaries = Vec::new();
        for _ in 0..steps {
            let summary = self.step()?;
            if self.step % interval == 0 {
                logger.log_snapshot(self.step, &self.snapshot()?)?;
                info!(
                    step = summary.step,
                    total_wealth = summary.total_wealth,
                    gini = summary.gini,
                    "snapshot"
                );
            }
            summaries.push(summary);
        }
        logger.flush()?;
        Ok(summaries)
    }

    fn produce(&mut self) -> Result<(), SimError> {
        for id in self.traders.ids() {
            let Some(trader) = self.traders.get(id) else {
                continue;
            };
            let (account, productivity) = (trader.account, trader.productivity);
            if self.rng.gen::<f64>() <= productivity {
                self.traders.set(id, "account", Value::Int(account + 1))?;
            }
        }
        Ok(())
    }

    fn trade(&mut self) -> Result<(), SimError> {
        if self.traders.len() < 2 {
            return Ok(());
        }
        for _ in 0..self.run.trade_num {
            let a = self.traders.sample(1, &mut self.rng)?[0];
            let b = match self.partner(a)? {
                Some(b) => b,
                None => loop {
                    let pick = self.traders.sample(1, &mut self.rng)?[0];
                    if pick != a {
                        break pick;
                    }
                },
            };
            self.exchange(a, b)?;
        }
        Ok(())
    }

    /// A random network contact of `id`, or failing that a random trader on
    /// a neighbouring spot.
    fn partner(&mut self, id: AgentId) -> Result<Option<AgentId>, SimError> {
        let node = Node::new(self.node_category, id);
        let contacts: Vec<AgentId> = self
            .network
            .neighbors(node)?
            .filter(|n| self.traders.contains(n.id))
            .map(|n| n.id)
            .collect();
        if let Some(&pick) = contacts.choose(&mut self.rng) {
            return Ok(Some(pick));
        }
        let nearby: Vec<AgentId> = self
            .grid
            .neighbor_agents(self.grid_category, id, 1, self.topology, true)?
            .into_iter()
            .filter(|(cat, _)| *cat == self.grid_category)
            .map(|(_, other)| other)
            .collect();
        Ok(nearby.choose(&mut self.rng).copied())
    }

    fn exchange(&mut self, a: AgentId, b: AgentId) -> Result<(), SimError> {
        let account_a = self.account(a)?;
        let account_b = self.account(b)?;
        let rich_wins = self.rng.gen::<f64>() <= self.run.rich_win_prob;
        let (winner, loser, loser_account, winner_account) = if (account_a >= account_b) == rich_wins {
            (a, b, account_b, account_a)
        } else {
            (b, a, account_a, account_b)
        };
        if loser_account == 0 {
            return Ok(());
        }
        self.traders.set(loser, "account", Value::Int(loser_account - 1))?;
        self.traders.set(winner, "account", Value::Int(winner_account + 1))?;
        Ok(())
    }

    fn wander(&mut self) -> Result<(), SimError> {
        if self.move_range == 0 {
            return Ok(());
        }
        for id in self.traders.ids() {
            match self.grid.random_move(
                self.grid_category,
                id,
                self.move_range,
                self.move_range,
                &mut self.rng,
            ) {
                // Single-occupancy grids: the trader stays put
                Ok(_) | Err(GridError::SpotOccupied(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn account(&self, id: AgentId) -> Result<i64, ContainerError> {
        self.traders
            .get(id)
            .map(|t| t.account)
            .ok_or(ContainerError::UnknownAgent(id))
    }

    /// Accounts in ascending order, read from the account index
    pub fn sorted_accounts(&self) -> Result<Vec<i64>, ContainerError> {
        Ok(self
            .traders
            .sorted_by(self.by_account)?
            .map(|(_, t)| t.account)
            .collect())
    }

    pub fn gini(&self) -> Result<f64, ContainerError> {
        Ok(gini(&self.sorted_accounts()?))
    }

    pub fn total_wealth(&self) -> i64 {
        self.traders.iter().map(|(_, t)| t.account).sum()
    }

    /// The `n` richest traders, richest first.
    pub fn richest(&self, n: usize) -> Result<Vec<(AgentId, i64)>, ContainerError> {
        let index = self.traders.ordered_index(self.by_account)?;
        let len = index.len();
        Ok((0..n.min(len))
            .filter_map(|k| index.get(len - 1 - k))
            .filter_map(|(_, id)| self.traders.get(id).map(|t| (id, t.account)))
            .collect())
    }

    /// Traders per wealth bracket, in order of first appearance. Brackets
    /// that emptied out are reported with zero members.
    pub fn bracket_sizes(&self) -> Result<Vec<(i64, usize)>, ContainerError> {
        let index = self.traders.partition_index(self.by_bracket)?;
        Ok(index
            .groups()
            .filter_map(|key| match key {
                IndexKey::Int(bracket) => Some((*bracket, index.group_size(key))),
                _ => None,
            })
            .collect())
    }

    pub fn summary(&self) -> Result<StepSummary, ContainerError> {
        Ok(StepSummary {
            step: self.step,
            population: self.traders.len(),
            total_wealth: self.total_wealth(),
            gini: self.gini()?,
        })
    }

    /// Export every trader's snapshot columns.
    pub fn snapshot(&self) -> Result<Table, ContainerError> {
        self.traders.export(SNAPSHOT_COLUMNS)
    }

    /// Remove a trader along with its grid position and network contacts.
    pub fn remove_trader(&mut self, id: AgentId) -> Result<Trader, SimError> {
        let trader = self.traders.remove_detached(
            id,
            TRADERS,
            &mut [&mut self.grid, &mut self.network],
        )?;
        Ok(trader)
    }
}

/// Load traders from a parameter table. Rows are matched on `id` when the
/// table has one, and restricted to `id_scenario == scenario` when given.
pub fn traders_from_table(
    table: &Table,
    scenario: Option<i64>,
) -> Result<Container<Trader>, ContainerError> {
    let mut options = if table.has_column("id") {
        LoadOptions::keyed("id")
    } else {
        LoadOptions::positional()
    };
    if let Some(scenario) = scenario {
        options = options.with_scenario("id_scenario", scenario);
    }
    Container::from_table(table, &options)
}
