//! Random graph models used to wire up a network in bulk.
//!
//! A generator only sees node positions `0..n`; the network maps positions
//! back onto `(category, id)` nodes.

use indexmap::{IndexMap, IndexSet};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use colony_table::Value;

use super::NetworkError;

/// Produces undirected edges between node positions `0..n`.
pub trait GraphGenerator {
    fn name(&self) -> &str;

    fn generate(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<(usize, usize)>, NetworkError>;
}

/// The built-in random graph models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GraphModel {
    /// Every pair connected
    Complete,
    /// Each pair connected independently with probability `p`
    ErdosRenyi { p: f64 },
    /// Ring lattice of degree `k`, each edge rewired with probability `p`
    WattsStrogatz { k: usize, p: f64 },
    /// Preferential attachment, `m` edges per new node
    BarabasiAlbert { m: usize },
}

impl GraphModel {
    /// Look up a model by its graph-library name, e.g. `"barabasi_albert_graph"`.
    pub fn from_name(name: &str, params: &IndexMap<String, Value>) -> Result<Self, NetworkError> {
        let model = match name {
            "complete_graph" => GraphModel::Complete,
            "erdos_renyi_graph" | "gnp_random_graph" => GraphModel::ErdosRenyi {
                p: float_param(name, params, "p")?,
            },
            "watts_strogatz_graph" => GraphModel::WattsStrogatz {
                k: count_param(name, params, "k")?,
                p: float_param(name, params, "p")?,
            },
            "barabasi_albert_graph" => GraphModel::BarabasiAlbert {
                m: count_param(name, params, "m")?,
            },
            other => return Err(NetworkError::UnknownGenerator(other.to_string())),
        };
        Ok(model)
    }
}

fn invalid(generator: &str, reason: impl Into<String>) -> NetworkError {
    NetworkError::InvalidGeneratorParams {
        generator: generator.to_string(),
        reason: reason.into(),
    }
}

fn float_param(generator: &str, params: &IndexMap<String, Value>, key: &str) -> Result<f64, NetworkError> {
    params
        .get(key)
        .ok_or_else(|| invalid(generator, format!("missing parameter '{}'", key)))?
        .as_f64()
        .ok_or_else(|| invalid(generator, format!("parameter '{}' must be a number", key)))
}

fn count_param(generator: &str, params: &IndexMap<String, Value>, key: &str) -> Result<usize, NetworkError> {
    params
        .get(key)
        .ok_or_else(|| invalid(generator, format!("missing parameter '{}'", key)))?
        .as_i64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| invalid(generator, format!("parameter '{}' must be a non-negative integer", key)))
}

fn check_probability(generator: &str, p: f64) -> Result<(), NetworkError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(invalid(generator, format!("probability {} is outside [0, 1]", p)))
    }
}

impl GraphGenerator for GraphModel {
    fn name(&self) -> &str {
        match self {
            GraphModel::Complete => "complete_graph",
            GraphModel::ErdosRenyi { .. } => "erdos_renyi_graph",
            GraphModel::WattsStrogatz { .. } => "watts_strogatz_graph",
            GraphModel::BarabasiAlbert { .. } => "barabasi_albert_graph",
        }
    }

    fn generate(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<(usize, usize)>, NetworkError> {
        match *self {
            GraphModel::Complete => Ok(complete_graph(n)),
            GraphModel::ErdosRenyi { p } => {
                check_probability(self.name(), p)?;
                Ok(erdos_renyi_graph(n, p, rng))
            }
            GraphModel::WattsStrogatz { k, p } => {
                check_probability(self.name(), p)?;
                if k > n {
                    return Err(invalid(self.name(), format!("k = {} exceeds n = {}", k, n)));
                }
                if k == n {
                    return Ok(complete_graph(n));
                }
                Ok(watts_strogatz_graph(n, k, p, rng))
            }
            GraphModel::BarabasiAlbert { m } => {
                if m < 1 || m >= n {
                    return Err(invalid(
                        self.name(),
                        format!("m must satisfy 1 <= m < n, got m = {}, n = {}", m, n),
                    ));
                }
                Ok(barabasi_albert_graph(n, m, rng))
            }
        }
    }
}

/// Adapter turning a closure into a [`GraphGenerator`].
pub struct FnGenerator<F> {
    name: String,
    f: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(usize, &mut dyn RngCore) -> Vec<(usize, usize)>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> GraphGenerator for FnGenerator<F>
where
    F: Fn(usize, &mut dyn RngCore) -> Vec<(usize, usize)>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<(usize, usize)>, NetworkError> {
        Ok((self.f)(n, rng))
    }
}

pub fn complete_graph(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect()
}

pub fn erdos_renyi_graph<R: Rng + ?Sized>(n: usize, p: f64, rng: &mut R) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if rng.gen::<f64>() < p {
                edges.push((i, j));
            }
        }
    }
    edges
}

fn canonical(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Small-world graph. Requires `k < n`.
pub fn watts_strogatz_graph<R: Rng + ?Sized>(
    n: usize,
    k: usize,
    p: f64,
    rng: &mut R,
) -> Vec<(usize, usize)> {
    let half = k / 2;
    let mut edges: IndexSet<(usize, usize)> = IndexSet::new();
    let mut degree = vec![0usize; n];
    for j in 1..=half {
        for u in 0..n {
            let v = (u + j) % n;
            if edges.insert(canonical(u, v)) {
                degree[u] += 1;
                degree[v] += 1;
            }
        }
    }

    for j in 1..=half {
        for u in 0..n {
            let v = (u + j) % n;
            if rng.gen::<f64>() >= p || !edges.contains(&canonical(u, v)) {
                continue;
            }
            // u is already linked to everyone
            if degree[u] >= n - 1 {
                continue;
            }
            let mut w = rng.gen_range(0..n);
            while w == u || edges.contains(&canonical(u, w)) {
                w = rng.gen_range(0..n);
            }
            edges.swap_remove(&canonical(u, v));
            degree[v] -= 1;
            edges.insert(canonical(u, w));
            degree[w] += 1;
        }
    }

    let mut edges: Vec<(usize, usize)> = edges.into_iter().collect();
    edges.sort_unstable();
    edges
}

/// Preferential attachment graph. Requires `1 <= m < n`.
pub fn barabasi_albert_graph<R: Rng + ?Sized>(n: usize, m: usize, rng: &mut R) -> Vec<(usize, usize)> {
    let mut edges = Vec::with_capacity((n - m) * m);
    let mut targets: Vec<usize> = (0..m).collect();
    // Each node appears once per incident edge
    let mut repeated: Vec<usize> = Vec::with_capacity(2 * (n - m) * m);

    for source in m..n {
        for &t in &targets {
            edges.push((t, source));
        }
        repeated.extend(targets.iter().copied());
        repeated.extend(std::iter::repeat(source).take(m));

        let mut chosen: IndexSet<usize> = IndexSet::with_capacity(m);
        while chosen.len() < m {
            if let Some(&pick) = repeated.choose(rng) {
                chosen.insert(pick);
            }
        }
        targets = chosen.into_iter().collect();
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn params(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn assert_simple(edges: &[(usize, usize)], n: usize) {
        let mut seen = HashSet::new();
        for &(a, b) in edges {
            assert!(a < n && b < n);
            assert_ne!(a, b, "self loop");
            assert!(seen.insert(canonical(a, b)), "parallel edge {:?}", (a, b));
        }
    }

    #[test]
    fn test_complete_graph() {
        let edges = complete_graph(5);
        assert_eq!(edges.len(), 10);
        assert_simple(&edges, 5);
    }

    #[test]
    fn test_erdos_renyi_extremes() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(erdos_renyi_graph(6, 0.0, &mut rng).is_empty());
        assert_eq!(erdos_renyi_graph(6, 1.0, &mut rng).len(), 15);
    }

    #[test]
    fn test_watts_strogatz_preserves_edge_count() {
        let mut rng = SmallRng::seed_from_u64(2);
        for p in [0.0, 0.3, 1.0] {
            let edges = watts_strogatz_graph(20, 4, p, &mut rng);
            assert_eq!(edges.len(), 40);
            assert_simple(&edges, 20);
        }
    }

    #[test]
    fn test_watts_strogatz_without_rewiring_is_ring() {
        let mut rng = SmallRng::seed_from_u64(2);
        let edges = watts_strogatz_graph(6, 2, 0.0, &mut rng);
        assert_eq!(edges, vec![(0, 1), (0, 5), (1, 2), (2, 3), (3, 4), (4, 5)]);
    }

    #[test]
    fn test_barabasi_albert_edge_count() {
        let mut rng = SmallRng::seed_from_u64(3);
        let edges = barabasi_albert_graph(10, 3, &mut rng);
        assert_eq!(edges.len(), 21);
        assert_simple(&edges, 10);
    }

    #[test]
    fn test_from_name() {
        let model = GraphModel::from_name(
            "watts_strogatz_graph",
            &params(&[("k", Value::Int(4)), ("p", Value::Float(0.1))]),
        )
        .unwrap();
        assert_eq!(model, GraphModel::WattsStrogatz { k: 4, p: 0.1 });
        assert_eq!(model.name(), "watts_strogatz_graph");

        let err = GraphModel::from_name("star_graph", &IndexMap::new()).unwrap_err();
        assert!(matches!(err, NetworkError::UnknownGenerator(name) if name == "star_graph"));

        let err = GraphModel::from_name("barabasi_albert_graph", &IndexMap::new()).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidGeneratorParams { .. }));
    }

    #[test]
    fn test_invalid_params_rejected_at_generation() {
        let mut rng = SmallRng::seed_from_u64(4);
        assert!(GraphModel::BarabasiAlbert { m: 5 }.generate(5, &mut rng).is_err());
        assert!(GraphModel::ErdosRenyi { p: 1.5 }.generate(5, &mut rng).is_err());
        assert!(GraphModel::WattsStrogatz { k: 6, p: 0.1 }.generate(5, &mut rng).is_err());
        assert_eq!(
            GraphModel::WattsStrogatz { k: 5, p: 0.1 }
                .generate(5, &mut rng)
                .unwrap()
                .len(),
            10
        );
    }

    #[test]
    fn test_fn_generator() {
        let star = FnGenerator::new("star", |n, _rng: &mut dyn RngCore| {
            (1..n).map(|i| (0, i)).collect()
        });
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(star.generate(4, &mut rng).unwrap(), vec![(0, 1), (0, 2), (0, 3)]);
        assert_eq!(star.name(), "star");
    }
}
