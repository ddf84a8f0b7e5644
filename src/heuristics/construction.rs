use crate::instance::{ServiceIdx, ServiceRegistry};
use crate::legality::{DutyProgress, LegalityOracle, SuccessionContext};
use crate::solution::{Duty, DutySchedule};

pub trait ConstructionHeuristic {
    fn construct(&self, registry: &ServiceRegistry) -> DutySchedule;
    fn name(&self) -> &str;
}

/// Owned record of which services already belong to a duty.
///
/// Kept outside the service records so the registry stays immutable; the
/// constructor takes a tracker and hands it back when done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTracker {
    assigned: Vec<bool>,
    count: usize,
}

impl AssignmentTracker {
    pub fn new(num_services: usize) -> Self {
        AssignmentTracker {
            assigned: vec![false; num_services],
            count: 0,
        }
    }

    /// Tracker with the given services already marked.
    pub fn with_assigned(num_services: usize, assigned: impl IntoIterator<Item = ServiceIdx>) -> Self {
        let mut tracker = Self::new(num_services);
        for idx in assigned {
            tracker.assign(idx);
        }
        tracker
    }

    /// Mark a service; returns false if it was already marked.
    pub fn assign(&mut self, idx: ServiceIdx) -> bool {
        if self.assigned[idx] {
            return false;
        }
        self.assigned[idx] = true;
        self.count += 1;
        true
    }

    pub fn unassign(&mut self, idx: ServiceIdx) {
        if self.assigned[idx] {
            self.assigned[idx] = false;
            self.count -= 1;
        }
    }

    #[inline]
    pub fn is_assigned(&self, idx: ServiceIdx) -> bool {
        self.assigned[idx]
    }

    pub fn num_assigned(&self) -> usize {
        self.count
    }

    pub fn is_complete(&self) -> bool {
        self.count == self.assigned.len()
    }

    pub fn unassigned(&self) -> impl Iterator<Item = ServiceIdx> + '_ {
        self.assigned
            .iter()
            .enumerate()
            .filter(|(_, &a)| !a)
            .map(|(i, _)| i)
    }
}

/// Greedy duty construction with boundary backtracking
///
/// Takes services in file order. Each unassigned service opens a duty, which is
/// extended by sweeping the unassigned services in start-time order and
/// appending every legal successor of the current last leg, until a sweep
/// appends nothing. Trailing legs are then popped until the duty signs on and
/// off in one jurisdiction.
pub struct GreedyDutyConstructor<'a> {
    oracle: &'a LegalityOracle,
}

impl<'a> GreedyDutyConstructor<'a> {
    pub fn new(oracle: &'a LegalityOracle) -> Self {
        GreedyDutyConstructor { oracle }
    }

    /// Build duties for every service not yet marked in `tracker`.
    pub fn construct_with(
        &self,
        registry: &ServiceRegistry,
        mut tracker: AssignmentTracker,
    ) -> (Vec<Duty>, AssignmentTracker) {
        let by_start = registry.by_start_time();
        let mut duties = Vec::new();

        for (idx, _) in registry.iter() {
            if tracker.is_assigned(idx) {
                continue;
            }
            duties.push(self.build_duty(registry, idx, &by_start, &mut tracker));
        }

        (duties, tracker)
    }

    fn build_duty(
        &self,
        registry: &ServiceRegistry,
        first: ServiceIdx,
        by_start: &[ServiceIdx],
        tracker: &mut AssignmentTracker,
    ) -> Duty {
        tracker.assign(first);
        let mut stack = vec![(first, DutyProgress::start(registry.service(first)))];

        loop {
            let mut appended = false;
            for &candidate in by_start {
                if tracker.is_assigned(candidate) {
                    continue;
                }
                let (last, progress) = stack[stack.len() - 1];
                if let Some(next) = self.try_append(registry, last, &progress, candidate) {
                    stack.push((candidate, next));
                    tracker.assign(candidate);
                    appended = true;
                }
            }
            if !appended {
                break;
            }
        }

        self.repair_boundary(registry, &mut stack, tracker);
        Duty::new(stack.into_iter().map(|(idx, _)| idx).collect())
    }

    fn try_append(
        &self,
        registry: &ServiceRegistry,
        last: ServiceIdx,
        progress: &DutyProgress,
        candidate: ServiceIdx,
    ) -> Option<DutyProgress> {
        let next = registry.service(candidate);
        let kind = self
            .oracle
            .succession(registry.service(last), next, SuccessionContext::Construction)?;
        progress.extend(next, kind, &self.oracle.rules)
    }

    /// Pop trailing legs until sign-on and sign-off stations share a
    /// jurisdiction. Popped legs are released back to the tracker.
    ///
    /// Terminates: every pop shrinks the stack and a singleton is accepted.
    fn repair_boundary(
        &self,
        registry: &ServiceRegistry,
        stack: &mut Vec<(ServiceIdx, DutyProgress)>,
        tracker: &mut AssignmentTracker,
    ) {
        let sign_on = &registry.service(stack[0].0).start_station;
        while stack.len() > 1 {
            let (last, _) = stack[stack.len() - 1];
            if self
                .oracle
                .jurisdictions
                .same_jurisdiction(sign_on, &registry.service(last).end_station)
            {
                break;
            }
            stack.pop();
            tracker.unassign(last);
        }
    }
}

impl ConstructionHeuristic for GreedyDutyConstructor<'_> {
    fn construct(&self, registry: &ServiceRegistry) -> DutySchedule {
        let start = std::time::Instant::now();

        let (duties, tracker) = self.construct_with(registry, AssignmentTracker::new(registry.len()));
        debug_assert!(tracker.is_complete());

        let mut schedule = DutySchedule::from_duties(registry, self.oracle, duties, self.name());
        schedule.computation_time = start.elapsed().as_secs_f64();
        log::info!(
            "Greedy construction: {} duties for {} services in {:.3}s",
            schedule.num_duties(),
            registry.len(),
            schedule.computation_time
        );
        schedule
    }

    fn name(&self) -> &str {
        "Greedy"
    }
}
