//! Spatial grid.
//!
//! A `width x height` lattice of spots. Each spot carries a user payload `S`
//! and, per registered category, the set of agents placed on it. Agents are
//! referenced by id only; the owning container is not consulted.
//!
//! Coordinates passed in are signed. A wrapped grid maps them back into range
//! with true modulo, a bounded grid rejects anything outside
//! `0 <= x < width`, `0 <= y < height`.

use indexmap::IndexSet;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::agent::AgentId;
use crate::category::{CategoryId, CategoryRegistry};
use crate::container::Detach;

/// Errors raised by grid operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid dimensions {width}x{height} are invalid; both must be positive")]
    InvalidDimensions { width: usize, height: usize },
    #[error("coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    CoordinateOutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },
    #[error("agent {agent} of category '{category}' is already on the grid")]
    DuplicateAgentOnGrid { category: String, agent: AgentId },
    #[error("spot {0} is already occupied")]
    SpotOccupied(Coord),
    #[error("category '{0}' already exists")]
    CategoryAlreadyExists(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("agent {agent} of category '{category}' is not on the grid")]
    NotOnGrid { category: String, agent: AgentId },
    #[error("no empty spot left")]
    NoEmptySpot,
}

/// A resolved, in-range grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Neighbourhood shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Square neighbourhood: `max(|dx|, |dy|) <= radius`
    #[default]
    Moore,
    /// Diamond neighbourhood: `|dx| + |dy| <= radius`
    VonNeumann,
}

/// Fixed shape of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    /// Toroidal coordinates
    pub wrap: bool,
    /// Allow several agents on one spot
    pub multi: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            wrap: true,
            multi: true,
        }
    }
}

impl GridConfig {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }
}

type NeighborKey = (Coord, usize, Topology, bool);

/// Placements of one category.
#[derive(Debug, Clone)]
struct Layer {
    cells: Vec<IndexSet<AgentId>>,
    positions: HashMap<AgentId, usize>,
}

impl Layer {
    fn new(spots: usize) -> Self {
        Self {
            cells: vec![IndexSet::new(); spots],
            positions: HashMap::new(),
        }
    }
}

/// 2-D lattice of spots hosting agents of several categories.
pub struct Grid<S = ()> {
    config: GridConfig,
    spots: Vec<S>,
    categories: CategoryRegistry,
    layers: Vec<Layer>,
    /// Agents on each spot across all categories
    occupancy: Vec<usize>,
    empty: IndexSet<usize>,
    neighbor_cache: RefCell<HashMap<NeighborKey, Arc<[Coord]>>>,
}

impl<S> fmt::Debug for Grid<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("config", &self.config)
            .field("categories", &self.categories)
            .field("empty_spots", &self.empty.len())
            .finish()
    }
}

impl Grid<()> {
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        Self::with_spots(config, |_| ())
    }
}

impl<S> Grid<S> {
    /// Build a grid whose spot payloads come from `init`, called once per
    /// coordinate in row-major order.
    pub fn with_spots<F>(config: GridConfig, mut init: F) -> Result<Self, GridError>
    where
        F: FnMut(Coord) -> S,
    {
        if config.width == 0 || config.height == 0 {
            return Err(GridError::InvalidDimensions {
                width: config.width,
                height: config.height,
            });
        }
        let count = config.width * config.height;
        let spots = (0..count)
            .map(|i| init(Coord::new(i % config.width, i / config.width)))
            .collect();
        debug!(
            width = config.width,
            height = config.height,
            wrap = config.wrap,
            multi = config.multi,
            "created grid"
        );
        Ok(Self {
            config,
            spots,
            categories: CategoryRegistry::new(),
            layers: Vec::new(),
            occupancy: vec![0; count],
            empty: (0..count).collect(),
            neighbor_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn height(&self) -> usize {
        self.config.height
    }

    pub fn add_category(&mut self, name: &str) -> Result<CategoryId, GridError> {
        let id = self
            .categories
            .register(name)
            .ok_or_else(|| GridError::CategoryAlreadyExists(name.to_string()))?;
        self.layers.push(Layer::new(self.spots.len()));
        debug!(category = name, "registered grid category");
        Ok(id)
    }

    pub fn category(&self, name: &str) -> Result<CategoryId, GridError> {
        self.categories
            .lookup(name)
            .ok_or_else(|| GridError::UnknownCategory(name.to_string()))
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.categories
    }

    /// Map signed coordinates onto the grid according to its wrap policy.
    pub fn resolve(&self, x: i64, y: i64) -> Result<Coord, GridError> {
        let (w, h) = (self.config.width as i64, self.config.height as i64);
        if self.config.wrap {
            return Ok(Coord::new(x.rem_euclid(w) as usize, y.rem_euclid(h) as usize));
        }
        if (0..w).contains(&x) && (0..h).contains(&y) {
            Ok(Coord::new(x as usize, y as usize))
        } else {
            Err(GridError::CoordinateOutOfBounds {
                x,
                y,
                width: self.config.width,
                height: self.config.height,
            })
        }
    }

    /// Place an agent. An agent can hold one position per category.
    pub fn place(
        &mut self,
        category: CategoryId,
        id: AgentId,
        x: i64,
        y: i64,
    ) -> Result<Coord, GridError> {
        let coord = self.resolve(x, y)?;
        let slot = self.slot(coord);
        let layer = self.layer(category)?;
        if layer.positions.contains_key(&id) {
            return Err(GridError::DuplicateAgentOnGrid {
                category: self.category_name(category),
                agent: id,
            });
        }
        if !self.config.multi && self.occupancy[slot] > 0 {
            return Err(GridError::SpotOccupied(coord));
        }
        self.insert_at(category, id, slot);
        Ok(coord)
    }

    /// Take an agent off the grid, returning where it was.
    pub fn remove(&mut self, category: CategoryId, id: AgentId) -> Result<Coord, GridError> {
        let slot = self.position_slot(category, id)?;
        self.remove_at(category, id, slot);
        Ok(self.coord(slot))
    }

    /// Move an agent. Either the move happens or the agent keeps its
    /// previous position.
    pub fn move_agent(
        &mut self,
        category: CategoryId,
        id: AgentId,
        x: i64,
        y: i64,
    ) -> Result<Coord, GridError> {
        let from = self.position_slot(category, id)?;
        let target = self.resolve(x, y)?;
        let to = self.slot(target);
        if from == to {
            return Ok(target);
        }
        if !self.config.multi && self.occupancy[to] > 0 {
            return Err(GridError::SpotOccupied(target));
        }
        self.remove_at(category, id, from);
        self.insert_at(category, id, to);
        Ok(target)
    }

    /// Move by a uniform random offset in `[-range_x, range_x] x [-range_y, range_y]`.
    ///
    /// On a bounded grid the target is clamped to the border.
    pub fn random_move<R: Rng + ?Sized>(
        &mut self,
        category: CategoryId,
        id: AgentId,
        range_x: usize,
        range_y: usize,
        rng: &mut R,
    ) -> Result<Coord, GridError> {
        let from = self.coord(self.position_slot(category, id)?);
        let (rx, ry) = (range_x as i64, range_y as i64);
        let mut x = from.x as i64 + rng.gen_range(-rx..=rx);
        let mut y = from.y as i64 + rng.gen_range(-ry..=ry);
        if !self.config.wrap {
            x = x.clamp(0, self.config.width as i64 - 1);
            y = y.clamp(0, self.config.height as i64 - 1);
        }
        self.move_agent(category, id, x, y)
    }

    /// Place each agent on a distinct random empty spot. Nothing is placed
    /// unless every agent fits.
    pub fn place_randomly<R: Rng + ?Sized>(
        &mut self,
        category: CategoryId,
        ids: &[AgentId],
        rng: &mut R,
    ) -> Result<Vec<Coord>, GridError> {
        let layer = self.layer(category)?;
        let mut seen = IndexSet::with_capacity(ids.len());
        for &id in ids {
            if layer.positions.contains_key(&id) || !seen.insert(id) {
                return Err(GridError::DuplicateAgentOnGrid {
                    category: self.category_name(category),
                    agent: id,
                });
            }
        }
        if ids.len() > self.empty.len() {
            return Err(GridError::NoEmptySpot);
        }

        let mut placed = Vec::with_capacity(ids.len());
        for &id in ids {
            let slot = self.random_empty_slot(rng)?;
            self.insert_at(category, id, slot);
            placed.push(self.coord(slot));
        }
        Ok(placed)
    }

    pub fn position(&self, category: CategoryId, id: AgentId) -> Result<Coord, GridError> {
        self.position_slot(category, id).map(|slot| self.coord(slot))
    }

    pub fn is_placed(&self, category: CategoryId, id: AgentId) -> bool {
        self.layers
            .get(category.0)
            .is_some_and(|layer| layer.positions.contains_key(&id))
    }

    /// Agents of `category` on spot `(x, y)`, in placement order.
    pub fn agents_at(
        &self,
        category: CategoryId,
        x: i64,
        y: i64,
    ) -> Result<impl Iterator<Item = AgentId> + '_, GridError> {
        let slot = self.slot(self.resolve(x, y)?);
        let layer = self.layer(category)?;
        Ok(layer.cells[slot].iter().copied())
    }

    /// Every agent on spot `(x, y)` across all categories
    pub fn spot_agents(&self, x: i64, y: i64) -> Result<Vec<(CategoryId, AgentId)>, GridError> {
        let slot = self.slot(self.resolve(x, y)?);
        Ok(self.occupants(slot).collect())
    }

    pub fn is_empty_spot(&self, x: i64, y: i64) -> Result<bool, GridError> {
        Ok(self.occupancy[self.slot(self.resolve(x, y)?)] == 0)
    }

    /// Coordinates around `(x, y)` under the grid's wrap policy.
    ///
    /// Each coordinate appears once, even on a wrapped grid small enough for
    /// offsets to land on the same spot. With `include_self = false` the
    /// centre spot is never returned. Results depend only on geometry and are
    /// cached for the life of the grid.
    pub fn neighbors(
        &self,
        x: i64,
        y: i64,
        radius: usize,
        topology: Topology,
        include_self: bool,
    ) -> Result<Arc<[Coord]>, GridError> {
        let centre = self.resolve(x, y)?;
        let key = (centre, radius, topology, include_self);
        if let Some(hit) = self.neighbor_cache.borrow().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let r = radius as i64;
        let mut found: IndexSet<Coord> = IndexSet::new();
        for dx in -r..=r {
            for dy in -r..=r {
                if topology == Topology::VonNeumann && dx.abs() + dy.abs() > r {
                    continue;
                }
                let Ok(coord) = self.resolve(centre.x as i64 + dx, centre.y as i64 + dy) else {
                    continue;
                };
                if coord == centre && !include_self {
                    continue;
                }
                found.insert(coord);
            }
        }
        let result: Arc<[Coord]> = found.into_iter().collect();
        self.neighbor_cache
            .borrow_mut()
            .insert(key, Arc::clone(&result));
        Ok(result)
    }

    /// Agents of any category on the spots around an agent. The agent itself
    /// is never included.
    pub fn neighbor_agents(
        &self,
        category: CategoryId,
        id: AgentId,
        radius: usize,
        topology: Topology,
        include_self: bool,
    ) -> Result<Vec<(CategoryId, AgentId)>, GridError> {
        let at = self.position(category, id)?;
        let around = self.neighbors(at.x as i64, at.y as i64, radius, topology, include_self)?;
        Ok(around
            .iter()
            .flat_map(|c| self.occupants(self.slot(*c)))
            .filter(|&(cat, other)| !(cat == category && other == id))
            .collect())
    }

    /// A uniformly chosen spot hosting no agents.
    pub fn find_empty_spot<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Coord, GridError> {
        self.random_empty_slot(rng).map(|slot| self.coord(slot))
    }

    pub fn empty_spots(&self) -> Vec<Coord> {
        self.empty.iter().map(|&slot| self.coord(slot)).collect()
    }

    pub fn empty_count(&self) -> usize {
        self.empty.len()
    }

    pub fn spot(&self, x: i64, y: i64) -> Result<&S, GridError> {
        let slot = self.slot(self.resolve(x, y)?);
        Ok(&self.spots[slot])
    }

    pub fn spot_mut(&mut self, x: i64, y: i64) -> Result<&mut S, GridError> {
        let slot = self.slot(self.resolve(x, y)?);
        Ok(&mut self.spots[slot])
    }

    /// Spot payloads in row-major order
    pub fn spots(&self) -> impl Iterator<Item = (Coord, &S)> + '_ {
        self.spots
            .iter()
            .enumerate()
            .map(|(slot, s)| (self.coord(slot), s))
    }

    /// Number of agents of `category` on the grid
    pub fn placed_count(&self, category: CategoryId) -> Result<usize, GridError> {
        Ok(self.layer(category)?.positions.len())
    }

    fn slot(&self, coord: Coord) -> usize {
        coord.y * self.config.width + coord.x
    }

    fn coord(&self, slot: usize) -> Coord {
        Coord::new(slot % self.config.width, slot / self.config.width)
    }

    fn layer(&self, category: CategoryId) -> Result<&Layer, GridError> {
        self.layers
            .get(category.0)
            .ok_or_else(|| GridError::UnknownCategory(category.to_string()))
    }

    fn category_name(&self, category: CategoryId) -> String {
        self.categories
            .name(category)
            .map_or_else(|| category.to_string(), str::to_string)
    }

    fn position_slot(&self, category: CategoryId, id: AgentId) -> Result<usize, GridError> {
        self.layer(category)?
            .positions
            .get(&id)
            .copied()
            .ok_or_else(|| GridError::NotOnGrid {
                category: self.category_name(category),
                agent: id,
            })
    }

    fn occupants(&self, slot: usize) -> impl Iterator<Item = (CategoryId, AgentId)> + '_ {
        self.layers.iter().enumerate().flat_map(move |(cat, layer)| {
            layer.cells[slot]
                .iter()
                .map(move |&id| (CategoryId(cat), id))
        })
    }

    fn random_empty_slot<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize, GridError> {
        if self.empty.is_empty() {
            return Err(GridError::NoEmptySpot);
        }
        let pick = rng.gen_range(0..self.empty.len());
        self.empty
            .get_index(pick)
            .copied()
            .ok_or(GridError::NoEmptySpot)
    }

    // Callers have validated category, bounds and occupancy.
    fn insert_at(&mut self, category: CategoryId, id: AgentId, slot: usize) {
        let layer = &mut self.layers[category.0];
        layer.cells[slot].insert(id);
        layer.positions.insert(id, slot);
        self.occupancy[slot] += 1;
        self.empty.swap_remove(&slot);
    }

    fn remove_at(&mut self, category: CategoryId, id: AgentId, slot: usize) {
        let layer = &mut self.layers[category.0];
        if !layer.cells[slot].shift_remove(&id) || layer.positions.remove(&id).is_none() {
            panic!("grid lost agent {} of category {}", id, category);
        }
        self.occupancy[slot] -= 1;
        if self.occupancy[slot] == 0 {
            self.empty.insert(slot);
        }
    }
}

impl<S> Detach for Grid<S> {
    fn detach(&mut self, category: &str, id: AgentId) -> bool {
        match self.categories.lookup(category) {
            Some(cat) => self.remove(cat, id).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn grid(width: usize, height: usize, wrap: bool) -> (Grid, CategoryId) {
        let mut grid = Grid::new(GridConfig::new(width, height).wrap(wrap)).unwrap();
        let sheep = grid.add_category("sheep").unwrap();
        (grid, sheep)
    }

    #[test]
    fn test_invalid_dimensions() {
        let err = Grid::new(GridConfig::new(0, 4)).unwrap_err();
        assert_eq!(
            err,
            GridError::InvalidDimensions {
                width: 0,
                height: 4
            }
        );
    }

    #[test]
    fn test_wrap_uses_true_modulo() {
        let (grid, _) = grid(5, 4, true);
        assert_eq!(grid.resolve(-1, -1).unwrap(), Coord::new(4, 3));
        assert_eq!(grid.resolve(-11, 9).unwrap(), Coord::new(4, 1));
        assert_eq!(grid.resolve(5, 4).unwrap(), Coord::new(0, 0));
    }

    #[test]
    fn test_bounded_rejects_both_axes() {
        let (grid, _) = grid(5, 3, false);
        assert!(grid.resolve(4, 2).is_ok());
        assert!(matches!(
            grid.resolve(0, 3),
            Err(GridError::CoordinateOutOfBounds { x: 0, y: 3, .. })
        ));
        assert!(grid.resolve(-1, 0).is_err());
    }

    #[test]
    fn test_category_registration() {
        let (mut grid, sheep) = grid(3, 3, true);
        assert_eq!(
            grid.add_category("sheep"),
            Err(GridError::CategoryAlreadyExists("sheep".to_string()))
        );
        assert_eq!(grid.category("sheep").unwrap(), sheep);
        assert!(grid.category("wolves").is_err());
        assert!(grid.place(CategoryId(7), AgentId(0), 0, 0).is_err());
    }

    #[test]
    fn test_place_and_query() {
        let (mut grid, sheep) = grid(3, 3, true);
        let wolves = grid.add_category("wolves").unwrap();
        grid.place(sheep, AgentId(1), 1, 1).unwrap();
        grid.place(wolves, AgentId(1), 1, 1).unwrap();
        grid.place(sheep, AgentId(2), 1, 1).unwrap();

        let at: Vec<AgentId> = grid.agents_at(sheep, 1, 1).unwrap().collect();
        assert_eq!(at, vec![AgentId(1), AgentId(2)]);
        assert_eq!(grid.spot_agents(1, 1).unwrap().len(), 3);
        assert_eq!(grid.empty_count(), 8);
        assert_eq!(grid.position(wolves, AgentId(1)).unwrap(), Coord::new(1, 1));
    }

    #[test]
    fn test_duplicate_placement_rejected() {
        let (mut grid, sheep) = grid(3, 3, true);
        grid.place(sheep, AgentId(1), 0, 0).unwrap();
        assert!(matches!(
            grid.place(sheep, AgentId(1), 2, 2),
            Err(GridError::DuplicateAgentOnGrid { .. })
        ));
        assert_eq!(grid.position(sheep, AgentId(1)).unwrap(), Coord::new(0, 0));
    }

    #[test]
    fn test_single_occupancy() {
        let mut grid = Grid::new(GridConfig::new(3, 3).multi(false)).unwrap();
        let sheep = grid.add_category("sheep").unwrap();
        grid.place(sheep, AgentId(1), 0, 0).unwrap();
        grid.place(sheep, AgentId(2), 1, 0).unwrap();

        assert_eq!(
            grid.place(sheep, AgentId(3), 0, 0),
            Err(GridError::SpotOccupied(Coord::new(0, 0)))
        );
        assert_eq!(
            grid.move_agent(sheep, AgentId(2), 0, 0),
            Err(GridError::SpotOccupied(Coord::new(0, 0)))
        );
        assert_eq!(grid.position(sheep, AgentId(2)).unwrap(), Coord::new(1, 0));
    }

    #[test]
    fn test_move_is_atomic() {
        let (mut grid, sheep) = grid(4, 4, false);
        grid.place(sheep, AgentId(1), 1, 1).unwrap();

        assert!(grid.move_agent(sheep, AgentId(1), 9, 9).is_err());
        assert_eq!(grid.position(sheep, AgentId(1)).unwrap(), Coord::new(1, 1));

        grid.move_agent(sheep, AgentId(1), 3, 2).unwrap();
        assert!(grid.is_empty_spot(1, 1).unwrap());
        assert!(!grid.is_empty_spot(3, 2).unwrap());
    }

    #[test]
    fn test_remove_restores_empty_spot() {
        let (mut grid, sheep) = grid(2, 2, true);
        grid.place(sheep, AgentId(1), 0, 1).unwrap();
        assert_eq!(grid.remove(sheep, AgentId(1)).unwrap(), Coord::new(0, 1));
        assert_eq!(grid.empty_count(), 4);
        assert!(matches!(
            grid.remove(sheep, AgentId(1)),
            Err(GridError::NotOnGrid { .. })
        ));
    }

    #[test]
    fn test_von_neumann_neighbors() {
        let (grid, _) = grid(7, 7, false);
        let around = grid.neighbors(3, 3, 1, Topology::VonNeumann, false).unwrap();
        assert_eq!(around.len(), 4);
        let around = grid.neighbors(3, 3, 2, Topology::VonNeumann, true).unwrap();
        assert_eq!(around.len(), 13);
    }

    #[test]
    fn test_neighbors_deduplicated_on_small_wrapped_grid() {
        let (grid, _) = grid(2, 2, true);
        let around = grid.neighbors(0, 0, 1, Topology::Moore, false).unwrap();
        let mut coords: Vec<Coord> = around.to_vec();
        coords.sort();
        assert_eq!(
            coords,
            vec![Coord::new(0, 1), Coord::new(1, 0), Coord::new(1, 1)]
        );
    }

    #[test]
    fn test_neighbor_cache_returns_same_result() {
        let (grid, _) = grid(5, 5, true);
        let first = grid.neighbors(0, 0, 2, Topology::Moore, false).unwrap();
        let second = grid.neighbors(5, 5, 2, Topology::Moore, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 24);
    }

    #[test]
    fn test_neighbor_agents_excludes_self() {
        let (mut grid, sheep) = grid(5, 5, true);
        grid.place(sheep, AgentId(1), 2, 2).unwrap();
        grid.place(sheep, AgentId(2), 2, 2).unwrap();
        grid.place(sheep, AgentId(3), 3, 3).unwrap();
        grid.place(sheep, AgentId(4), 0, 0).unwrap();

        let mut near = grid
            .neighbor_agents(sheep, AgentId(1), 1, Topology::Moore, true)
            .unwrap();
        near.sort();
        assert_eq!(near, vec![(sheep, AgentId(2)), (sheep, AgentId(3))]);

        let near = grid
            .neighbor_agents(sheep, AgentId(1), 1, Topology::Moore, false)
            .unwrap();
        assert_eq!(near, vec![(sheep, AgentId(3))]);
    }

    #[test]
    fn test_find_empty_spot() {
        let (mut grid, sheep) = grid(2, 1, true);
        let mut rng = SmallRng::seed_from_u64(3);
        grid.place(sheep, AgentId(0), 0, 0).unwrap();
        assert_eq!(grid.find_empty_spot(&mut rng).unwrap(), Coord::new(1, 0));

        grid.place(sheep, AgentId(1), 1, 0).unwrap();
        assert_eq!(grid.find_empty_spot(&mut rng), Err(GridError::NoEmptySpot));
    }

    #[test]
    fn test_place_randomly_uses_distinct_spots() {
        let (mut grid, sheep) = grid(3, 3, true);
        let mut rng = SmallRng::seed_from_u64(11);
        let ids: Vec<AgentId> = (0..9).map(AgentId).collect();

        let mut coords = grid.place_randomly(sheep, &ids, &mut rng).unwrap();
        coords.sort();
        coords.dedup();
        assert_eq!(coords.len(), 9);
        assert_eq!(
            grid.place_randomly(sheep, &[AgentId(9)], &mut rng),
            Err(GridError::NoEmptySpot)
        );
    }

    #[test]
    fn test_random_move_stays_in_bounds() {
        let (mut grid, sheep) = grid(3, 3, false);
        let mut rng = SmallRng::seed_from_u64(5);
        grid.place(sheep, AgentId(0), 0, 0).unwrap();
        for _ in 0..50 {
            let at = grid.random_move(sheep, AgentId(0), 2, 2, &mut rng).unwrap();
            assert!(at.x < 3 && at.y < 3);
        }
        assert_eq!(grid.placed_count(sheep).unwrap(), 1);
    }

    #[test]
    fn test_spot_payloads() {
        let mut grid = Grid::with_spots(GridConfig::new(3, 2), |c| c.x * 10 + c.y).unwrap();
        assert_eq!(*grid.spot(2, 1).unwrap(), 21);
        *grid.spot_mut(0, 0).unwrap() = 99;
        assert_eq!(grid.spots().next(), Some((Coord::new(0, 0), &99)));
    }

    #[test]
    fn test_detach() {
        let (mut grid, sheep) = grid(3, 3, true);
        grid.place(sheep, AgentId(4), 1, 2).unwrap();
        assert!(grid.detach("sheep", AgentId(4)));
        assert!(!grid.detach("sheep", AgentId(4)));
        assert!(!grid.detach("wolves", AgentId(4)));
        assert!(!grid.is_placed(sheep, AgentId(4)));
    }
}
