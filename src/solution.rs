//! Duty and schedule representation.
//!
//! A [`Duty`] is an immutable ordered chain of services worked by one crew. A
//! [`DutySchedule`] is a set of duties produced by one algorithm together with
//! its evaluation (duty count, partition feasibility, timing).

use crate::instance::{ServiceIdx, ServiceRegistry};
use crate::legality::{LegalityOracle, SuccessionContext};
use serde::{Deserialize, Serialize};

/// An ordered chain of services assigned to one crew shift
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duty {
    legs: Vec<ServiceIdx>,
}

impl Duty {
    /// Create a duty from a non-empty leg sequence.
    pub fn new(legs: Vec<ServiceIdx>) -> Self {
        debug_assert!(!legs.is_empty(), "a duty needs at least one leg");
        Duty { legs }
    }

    pub fn singleton(idx: ServiceIdx) -> Self {
        Duty { legs: vec![idx] }
    }

    #[inline]
    pub fn legs(&self) -> &[ServiceIdx] {
        &self.legs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn first(&self) -> ServiceIdx {
        self.legs[0]
    }

    pub fn last(&self) -> ServiceIdx {
        self.legs[self.legs.len() - 1]
    }

    pub fn covers(&self, idx: ServiceIdx) -> bool {
        self.legs.contains(&idx)
    }

    /// Break before each following leg, in minutes.
    pub fn breaks(&self, registry: &ServiceRegistry) -> Vec<i32> {
        self.legs
            .windows(2)
            .map(|w| registry.service(w[1]).start_time - registry.service(w[0]).end_time)
            .collect()
    }

    /// Sum of intrinsic service durations.
    pub fn driving_duration(&self, registry: &ServiceRegistry) -> i32 {
        self.legs.iter().map(|&i| registry.service(i).duration).sum()
    }

    /// Last arrival minus first departure.
    pub fn elapsed(&self, registry: &ServiceRegistry) -> i32 {
        registry.service(self.last()).end_time - registry.service(self.first()).start_time
    }

    /// Sign-on and sign-off stations lie in the same jurisdiction.
    ///
    /// Unlike the boundary rule this is a reporting flag, so singletons are
    /// judged by their stations too.
    pub fn same_jurisdiction(&self, registry: &ServiceRegistry, oracle: &LegalityOracle) -> bool {
        oracle.jurisdictions.same_jurisdiction(
            &registry.service(self.first()).start_station,
            &registry.service(self.last()).end_station,
        )
    }

    /// Service file identifiers of the legs.
    pub fn service_ids(&self, registry: &ServiceRegistry) -> Vec<u32> {
        self.legs.iter().map(|&i| registry.service(i).id).collect()
    }
}

/// Represents a set of duties covering a timetable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutySchedule {
    pub duties: Vec<Duty>,
    /// Number of duties
    pub objective: f64,
    /// Every service covered exactly once and every duty legal
    pub feasible: bool,
    /// Algorithm that generated this schedule
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl DutySchedule {
    pub fn new() -> Self {
        DutySchedule {
            duties: Vec::new(),
            objective: f64::INFINITY,
            feasible: false,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a schedule from duties and evaluate it.
    pub fn from_duties(
        registry: &ServiceRegistry,
        oracle: &LegalityOracle,
        duties: Vec<Duty>,
        algorithm: &str,
    ) -> Self {
        let mut schedule = DutySchedule {
            duties,
            algorithm: algorithm.to_string(),
            ..Self::new()
        };
        schedule.validate(registry, oracle);
        schedule
    }

    /// Recompute objective and feasibility.
    ///
    /// Legality is checked in the pricing context, whose rest-break window
    /// contains the construction window.
    pub fn validate(&mut self, registry: &ServiceRegistry, oracle: &LegalityOracle) {
        self.objective = self.duties.len() as f64;
        self.feasible = self.is_partition(registry)
            && self
                .duties
                .iter()
                .all(|d| oracle.is_legal_duty(registry, d.legs(), SuccessionContext::Pricing));
    }

    /// Number of duties covering each service.
    pub fn coverage(&self, registry: &ServiceRegistry) -> Vec<usize> {
        let mut counts = vec![0; registry.len()];
        for duty in &self.duties {
            for &leg in duty.legs() {
                counts[leg] += 1;
            }
        }
        counts
    }

    /// Check if all services are covered exactly once
    pub fn is_partition(&self, registry: &ServiceRegistry) -> bool {
        self.coverage(registry).iter().all(|&c| c == 1)
    }

    pub fn num_duties(&self) -> usize {
        self.duties.len()
    }

    /// Share of duties whose sign-on and sign-off share a jurisdiction, in percent.
    pub fn same_jurisdiction_share(&self, registry: &ServiceRegistry, oracle: &LegalityOracle) -> f64 {
        if self.duties.is_empty() {
            return 0.0;
        }
        let same = self
            .duties
            .iter()
            .filter(|d| d.same_jurisdiction(registry, oracle))
            .count();
        100.0 * same as f64 / self.duties.len() as f64
    }

    /// Duties as lists of service file identifiers.
    pub fn to_service_ids(&self, registry: &ServiceRegistry) -> Vec<Vec<u32>> {
        self.duties.iter().map(|d| d.service_ids(registry)).collect()
    }
}

impl Default for DutySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DutySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schedule ({})", self.algorithm)?;
        writeln!(f, "  Duties: {}", self.duties.len())?;
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::service;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "07:00", "B", "08:00", None),
                service(2, "101", "B", "08:10", "A", "09:00", None),
                service(3, "303", "A", "10:00", "B", "10:45", None),
            ],
        )
    }

    #[test]
    fn test_duty_derived_values() {
        let registry = registry();
        let duty = Duty::new(vec![0, 1, 2]);

        assert_eq!(duty.breaks(&registry), vec![10, 60]);
        assert_eq!(duty.driving_duration(&registry), 60 + 50 + 45);
        assert_eq!(duty.elapsed(&registry), 225);
        assert_eq!(duty.service_ids(&registry), vec![1, 2, 3]);
        assert!(duty.covers(2));
        assert!(!Duty::singleton(0).covers(1));
    }

    #[test]
    fn test_schedule_feasibility() {
        let registry = registry();
        let oracle = LegalityOracle::default();

        let good = DutySchedule::from_duties(
            &registry,
            &oracle,
            vec![Duty::new(vec![0, 1, 2])],
            "manual",
        );
        assert!(good.feasible);
        assert_eq!(good.objective, 1.0);

        let missing = DutySchedule::from_duties(&registry, &oracle, vec![Duty::new(vec![0, 1])], "manual");
        assert!(!missing.feasible);

        let twice = DutySchedule::from_duties(
            &registry,
            &oracle,
            vec![Duty::new(vec![0, 1]), Duty::new(vec![1]), Duty::singleton(2)],
            "manual",
        );
        assert!(!twice.feasible);
        assert_eq!(twice.coverage(&registry), vec![1, 2, 1]);
    }

    #[test]
    fn test_schedule_rejects_illegal_duty() {
        let registry = registry();
        let oracle = LegalityOracle::default();
        // Service 1 departs before service 3 arrives
        let schedule = DutySchedule::from_duties(
            &registry,
            &oracle,
            vec![Duty::new(vec![2, 0]), Duty::singleton(1)],
            "manual",
        );
        assert!(schedule.is_partition(&registry));
        assert!(!schedule.feasible);
    }
}
