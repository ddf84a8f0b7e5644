//! Compatibility graph of legal direct successions.
//!
//! Nodes are service indices; an arc `u -> v` exists when `v` may directly
//! follow `u` in the pricing context. Services are stably sorted by start time
//! and only pairs `(i, j)` with `i` before `j` are tested, so the graph is
//! acyclic and the sorted order is a topological order.

use crate::instance::{ServiceIdx, ServiceRegistry};
use crate::legality::{LegalityOracle, Succession, SuccessionContext};
use serde::{Deserialize, Serialize};

/// Outgoing arc of the compatibility graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arc {
    pub to: ServiceIdx,
    pub kind: Succession,
}

#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    order: Vec<ServiceIdx>,
    rank: Vec<usize>,
    successors: Vec<Vec<Arc>>,
    in_degree: Vec<usize>,
    num_arcs: usize,
}

impl CompatibilityGraph {
    /// Test every ordered pair of the start-time order. O(n^2) predicate calls.
    pub fn build(registry: &ServiceRegistry, oracle: &LegalityOracle) -> Self {
        let n = registry.len();
        let order = registry.by_start_time();
        let mut rank = vec![0; n];
        for (position, &idx) in order.iter().enumerate() {
            rank[idx] = position;
        }

        let mut successors = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];
        let mut num_arcs = 0;

        for (i, &u) in order.iter().enumerate() {
            let from = registry.service(u);
            for &v in &order[i + 1..] {
                if let Some(kind) = oracle.succession(from, registry.service(v), SuccessionContext::Pricing) {
                    successors[u].push(Arc { to: v, kind });
                    in_degree[v] += 1;
                    num_arcs += 1;
                }
            }
        }

        log::debug!("Compatibility graph: {} nodes, {} arcs", n, num_arcs);

        CompatibilityGraph {
            order,
            rank,
            successors,
            in_degree,
            num_arcs,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    /// Services in topological (start time) order.
    pub fn topological_order(&self) -> &[ServiceIdx] {
        &self.order
    }

    /// Position of a service in the topological order.
    #[inline]
    pub fn rank(&self, idx: ServiceIdx) -> usize {
        self.rank[idx]
    }

    #[inline]
    pub fn successors(&self, idx: ServiceIdx) -> &[Arc] {
        &self.successors[idx]
    }

    pub fn has_arc(&self, from: ServiceIdx, to: ServiceIdx) -> bool {
        self.successors[from].iter().any(|arc| arc.to == to)
    }

    pub fn in_degree(&self, idx: ServiceIdx) -> usize {
        self.in_degree[idx]
    }

    pub fn statistics(&self) -> GraphStatistics {
        let out: Vec<usize> = self.successors.iter().map(Vec::len).collect();
        let same_vehicle = self
            .successors
            .iter()
            .flatten()
            .filter(|arc| arc.kind == Succession::SameVehicle)
            .count();
        let n = self.num_nodes();
        GraphStatistics {
            nodes: n,
            arcs: self.num_arcs,
            same_vehicle_arcs: same_vehicle,
            vehicle_change_arcs: self.num_arcs - same_vehicle,
            max_out_degree: out.iter().copied().max().unwrap_or(0),
            avg_out_degree: if n == 0 { 0.0 } else { self.num_arcs as f64 / n as f64 },
            sources: self.in_degree.iter().filter(|&&d| d == 0).count(),
            sinks: out.iter().filter(|&&d| d == 0).count(),
        }
    }
}

/// Summary of a compatibility graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub nodes: usize,
    pub arcs: usize,
    pub same_vehicle_arcs: usize,
    pub vehicle_change_arcs: usize,
    pub max_out_degree: usize,
    pub avg_out_degree: f64,
    /// Services without a legal predecessor
    pub sources: usize,
    /// Services without a legal successor
    pub sinks: usize,
}

impl std::fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Compatibility graph:")?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(
            f,
            "  Arcs: {} ({} same train, {} train change)",
            self.arcs, self.same_vehicle_arcs, self.vehicle_change_arcs
        )?;
        writeln!(f, "  Out-degree: max {}, avg {:.2}", self.max_out_degree, self.avg_out_degree)?;
        writeln!(f, "  Sources: {}, sinks: {}", self.sources, self.sinks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::service;

    fn registry() -> ServiceRegistry {
        // File order differs from time order on purpose
        ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "B", "08:05", "A", "09:00", None),
                service(2, "101", "A", "07:00", "B", "08:00", None),
                service(3, "202", "A", "09:40", "B", "10:30", None),
                service(4, "303", "C", "09:40", "D", "10:30", None),
            ],
        )
    }

    #[test]
    fn test_arcs_follow_legality() {
        let registry = registry();
        let graph = CompatibilityGraph::build(&registry, &LegalityOracle::default());

        assert_eq!(graph.topological_order(), &[1, 0, 2, 3]);
        assert!(graph.has_arc(1, 0));
        assert_eq!(graph.successors(1)[0].kind, Succession::SameVehicle);
        assert!(graph.has_arc(0, 2));
        assert_eq!(graph.successors(0)[0].kind, Succession::VehicleChange);
        assert!(!graph.has_arc(0, 3));
        assert_eq!(graph.num_arcs(), 2);
        assert_eq!(graph.in_degree(2), 1);
    }

    #[test]
    fn test_graph_is_acyclic_without_self_loops() {
        let registry = registry();
        let graph = CompatibilityGraph::build(&registry, &LegalityOracle::default());

        for (idx, _) in registry.iter() {
            for arc in graph.successors(idx) {
                assert_ne!(arc.to, idx);
                assert!(graph.rank(arc.to) > graph.rank(idx));
            }
        }
    }

    #[test]
    fn test_statistics() {
        let registry = registry();
        let stats = CompatibilityGraph::build(&registry, &LegalityOracle::default()).statistics();
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.arcs, 2);
        assert_eq!(stats.same_vehicle_arcs, 1);
        assert_eq!(stats.vehicle_change_arcs, 1);
        assert_eq!(stats.sources, 2);
        assert_eq!(stats.sinks, 2);
    }
}
