//! Pricing: search for duties with negative reduced cost.
//!
//! For each source service a label-setting search walks the compatibility
//! graph in topological order. A label carries the accumulated `-dual` cost of
//! its path and the resource state of the partial duty. At a node, label `a`
//! dominates `b` when `a` costs no more and its lineage started no earlier
//! (both share first start and last end, so `a` can be extended wherever `b`
//! can). Labels per node are capped; when over the cap the most expensive one
//! is dropped, which makes the search a heuristic.
//!
//! Any label at a node whose path signs off in the sign-on jurisdiction is a
//! candidate duty with reduced cost `DUTY_COST + cost`.

use super::master::DUTY_COST;
use crate::graph::CompatibilityGraph;
use crate::instance::{ServiceIdx, ServiceRegistry};
use crate::legality::{DutyProgress, LegalityOracle};
use crate::solution::Duty;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// A duty found by pricing together with its reduced cost
#[derive(Debug, Clone, PartialEq)]
pub struct PricedColumn {
    pub duty: Duty,
    pub reduced_cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct Label {
    node: ServiceIdx,
    cost: f64,
    progress: DutyProgress,
    parent: Option<usize>,
}

impl Label {
    fn dominates(&self, other: &Label) -> bool {
        self.cost <= other.cost && self.progress.lineage_start >= other.progress.lineage_start
    }
}

pub struct DutyPricer<'a> {
    registry: &'a ServiceRegistry,
    graph: &'a CompatibilityGraph,
    oracle: &'a LegalityOracle,
    /// Maximum number of non-dominated labels kept per node
    pub max_labels_per_node: usize,
    /// Columns must price below `-tolerance`
    pub tolerance: f64,
    pub parallel: bool,
}

impl<'a> DutyPricer<'a> {
    pub fn new(registry: &'a ServiceRegistry, graph: &'a CompatibilityGraph, oracle: &'a LegalityOracle) -> Self {
        DutyPricer {
            registry,
            graph,
            oracle,
            max_labels_per_node: 16,
            tolerance: 1e-6,
            parallel: true,
        }
    }

    /// Find up to `max_columns` improving duties, best first.
    ///
    /// At most one duty per source service is returned. Duties for which
    /// `is_known` holds are skipped, so a source yields its best duty not
    /// already in the master.
    pub fn price<F>(&self, duals: &[f64], max_columns: usize, is_known: F) -> Vec<PricedColumn>
    where
        F: Fn(&Duty) -> bool + Sync,
    {
        debug_assert_eq!(duals.len(), self.registry.len());

        let sources = self.graph.topological_order();
        let mut columns: Vec<PricedColumn> = if self.parallel {
            sources
                .par_iter()
                .filter_map(|&source| self.best_from_source(source, duals, &is_known))
                .collect()
        } else {
            sources
                .iter()
                .filter_map(|&source| self.best_from_source(source, duals, &is_known))
                .collect()
        };

        columns.sort_by(|a, b| {
            OrderedFloat(a.reduced_cost)
                .cmp(&OrderedFloat(b.reduced_cost))
                .then_with(|| a.duty.legs().cmp(b.duty.legs()))
        });
        let mut seen = HashSet::new();
        columns.retain(|c| seen.insert(c.duty.clone()));
        columns.truncate(max_columns);

        log::debug!(
            "Pricing: {} improving columns, best reduced cost {:?}",
            columns.len(),
            columns.first().map(|c| c.reduced_cost)
        );
        columns
    }

    /// Best new boundary-valid duty starting at `source` with reduced cost
    /// below `-tolerance`.
    fn best_from_source<F>(&self, source: ServiceIdx, duals: &[f64], is_known: &F) -> Option<PricedColumn>
    where
        F: Fn(&Duty) -> bool,
    {
        let rules = &self.oracle.rules;
        let first = self.registry.service(source);
        let horizon = first.start_time + rules.max_duty_elapsed;

        let mut labels = vec![Label {
            node: source,
            cost: -duals[source],
            progress: DutyProgress::start(first),
            parent: None,
        }];
        let mut open: HashMap<ServiceIdx, Vec<usize>> = HashMap::new();
        open.insert(source, vec![0]);
        let mut candidates: Vec<(f64, usize)> = Vec::new();

        for &node in &self.graph.topological_order()[self.graph.rank(source)..] {
            if self.registry.service(node).start_time > horizon {
                break;
            }
            let Some(bucket) = open.remove(&node) else {
                continue;
            };

            let signs_off_home = node == source
                || self
                    .oracle
                    .jurisdictions
                    .same_jurisdiction(&first.start_station, &self.registry.service(node).end_station);

            for id in bucket {
                let label = labels[id];
                let reduced_cost = DUTY_COST + label.cost;
                if signs_off_home && reduced_cost < -self.tolerance {
                    candidates.push((reduced_cost, id));
                }

                for arc in self.graph.successors(node) {
                    let next = self.registry.service(arc.to);
                    let Some(progress) = label.progress.extend(next, arc.kind, rules) else {
                        continue;
                    };
                    let extended = Label {
                        node: arc.to,
                        cost: label.cost - duals[arc.to],
                        progress,
                        parent: Some(id),
                    };
                    self.insert(&mut labels, open.entry(arc.to).or_default(), extended);
                }
            }
        }

        candidates.sort_by_key(|&(reduced_cost, id)| (OrderedFloat(reduced_cost), id));
        candidates.into_iter().find_map(|(reduced_cost, id)| {
            let duty = Self::path(&labels, id);
            (!is_known(&duty)).then_some(PricedColumn { duty, reduced_cost })
        })
    }

    /// Add a label to a node's bucket unless it is dominated, evicting the
    /// labels it dominates.
    fn insert(&self, labels: &mut Vec<Label>, bucket: &mut Vec<usize>, label: Label) {
        if bucket.iter().any(|&id| labels[id].dominates(&label)) {
            return;
        }
        bucket.retain(|&id| !label.dominates(&labels[id]));
        labels.push(label);
        bucket.push(labels.len() - 1);

        if bucket.len() > self.max_labels_per_node {
            let worst = bucket
                .iter()
                .enumerate()
                .max_by_key(|&(_, &id)| OrderedFloat(labels[id].cost))
                .map(|(position, _)| position);
            if let Some(position) = worst {
                bucket.swap_remove(position);
            }
        }
    }

    fn path(labels: &[Label], mut id: usize) -> Duty {
        let mut legs = vec![labels[id].node];
        while let Some(parent) = labels[id].parent {
            legs.push(labels[parent].node);
            id = parent;
        }
        legs.reverse();
        Duty::new(legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::service;
    use crate::legality::{JurisdictionGroup, JurisdictionMap, LegalityRules, SuccessionContext};
    use crate::optimization::master::MasterProblem;

    fn chain_registry() -> ServiceRegistry {
        ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "07:00", "B", "08:00", None),
                service(2, "101", "B", "08:10", "A", "09:00", None),
                service(3, "202", "A", "09:40", "B", "10:30", None),
            ],
        )
    }

    fn pricer<'a>(
        registry: &'a ServiceRegistry,
        graph: &'a CompatibilityGraph,
        oracle: &'a LegalityOracle,
    ) -> DutyPricer<'a> {
        let mut pricer = DutyPricer::new(registry, graph, oracle);
        pricer.parallel = false;
        pricer
    }

    #[test]
    fn test_finds_full_chain() {
        let registry = chain_registry();
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let columns = pricer(&registry, &graph, &oracle).price(&[1.0, 1.0, 1.0], 10, |_| false);

        assert_eq!(columns[0].duty.legs(), &[0, 1, 2]);
        assert!((columns[0].reduced_cost + 2.0).abs() < 1e-12);
        for column in &columns {
            assert!(column.reduced_cost < -1e-6);
            assert!(oracle.is_legal_duty(&registry, column.duty.legs(), SuccessionContext::Pricing));
            let expected = MasterProblem::reduced_cost(&column.duty, &[1.0, 1.0, 1.0]);
            assert!((column.reduced_cost - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_no_column_when_duals_are_small() {
        let registry = chain_registry();
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let columns = pricer(&registry, &graph, &oracle).price(&[0.3, 0.3, 0.3], 10, |_| false);
        assert!(columns.is_empty());
    }

    #[test]
    fn test_skips_known_duties() {
        let registry = chain_registry();
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let known = Duty::new(vec![0, 1, 2]);
        let columns = pricer(&registry, &graph, &oracle).price(&[1.0, 1.0, 1.0], 10, |d| *d == known);

        assert!(columns.iter().all(|c| c.duty != known));
        // Source 0 falls back to its next best path
        assert!(columns.iter().any(|c| c.duty.first() == 0));
    }

    #[test]
    fn test_respects_jurisdiction_boundary() {
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "07:00", "B", "08:00", None),
                service(2, "101", "B", "08:05", "C", "09:00", None),
            ],
        );
        let oracle = LegalityOracle::new(
            LegalityRules::default(),
            JurisdictionMap::new(vec![
                JurisdictionGroup { name: "CC1".into(), stations: vec!["A".into()] },
                JurisdictionGroup { name: "CC2".into(), stations: vec!["B".into(), "C".into()] },
            ]),
        );
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let columns = pricer(&registry, &graph, &oracle).price(&[1.5, 1.5], 10, |_| false);

        // [0, 1] signs on in CC1 and off in CC2
        assert_eq!(columns.len(), 2);
        assert!(columns.iter().all(|c| c.duty.len() == 1));
    }

    #[test]
    fn test_respects_elapsed_limit() {
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "06:00", "B", "08:00", None),
                service(2, "202", "B", "09:00", "A", "11:00", None),
                service(3, "303", "A", "12:00", "B", "13:30", None),
            ],
        );
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let columns = pricer(&registry, &graph, &oracle).price(&[1.0, 1.0, 1.0], 10, |_| false);

        // 06:00 to 13:30 is 450 minutes
        assert!(columns.iter().all(|c| c.duty.legs() != [0, 1, 2]));
        assert!(columns.iter().any(|c| c.duty.legs() == [0, 1]));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let registry = chain_registry();
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let duals = [0.9, 0.7, 0.8];

        let sequential = pricer(&registry, &graph, &oracle).price(&duals, 10, |_| false);
        let mut parallel = DutyPricer::new(&registry, &graph, &oracle);
        parallel.parallel = true;
        assert_eq!(parallel.price(&duals, 10, |_| false), sequential);
    }

    #[test]
    fn test_column_limit() {
        let registry = chain_registry();
        let oracle = LegalityOracle::default();
        let graph = CompatibilityGraph::build(&registry, &oracle);
        let columns = pricer(&registry, &graph, &oracle).price(&[1.0, 1.0, 1.0], 1, |_| false);
        assert_eq!(columns.len(), 1);
    }
}
