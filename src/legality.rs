//! Legality rules for chaining services into duties.
//!
//! Two levels of checks exist:
//!
//! - pair level: may service `b` directly follow service `a` in a duty
//!   ([`LegalityOracle::succession`]),
//! - duty level: does a chain respect the elapsed-time limits
//!   ([`DutyProgress`]) and start and end inside one crew jurisdiction
//!   ([`LegalityOracle::is_boundary_valid`]).
//!
//! The greedy constructor and the pricing search use different minimum rest
//! breaks; callers choose through [`SuccessionContext`].

use crate::instance::{Service, ServiceIdx, ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numeric thresholds of the legality rules, all in minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalityRules {
    /// Longest allowed turnaround when staying on the same train
    pub max_same_vehicle_gap: i32,
    /// Shortest rest break before changing trains (graph and pricing)
    pub min_break_pricing: i32,
    /// Shortest rest break before changing trains (greedy construction)
    pub min_break_construction: i32,
    /// Longest allowed rest break before changing trains
    pub max_break: i32,
    /// Longest span from the first departure to the last arrival of a duty
    pub max_duty_elapsed: i32,
    /// Longest continuous stretch on one train lineage
    pub max_lineage_elapsed: i32,
    /// Number of leading characters that identify a station group
    pub station_prefix_len: usize,
}

impl Default for LegalityRules {
    fn default() -> Self {
        LegalityRules {
            max_same_vehicle_gap: 15,
            min_break_pricing: 30,
            min_break_construction: 50,
            max_break: 150,
            max_duty_elapsed: 445,
            max_lineage_elapsed: 180,
            station_prefix_len: 4,
        }
    }
}

/// Which component asks for a succession check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuccessionContext {
    /// Compatibility graph and column generation pricing
    Pricing,
    /// Greedy duty construction
    Construction,
}

/// How a crew gets from one service to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Succession {
    /// Continue on the same train (or its stepback train) after a short turnaround
    SameVehicle,
    /// Take a rest break and pick up a different train
    VehicleChange,
}

/// A named set of stations controlled by one crew depot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionGroup {
    pub name: String,
    pub stations: Vec<String>,
}

/// Station to jurisdiction lookup
#[derive(Debug, Clone, Default)]
pub struct JurisdictionMap {
    groups: Vec<JurisdictionGroup>,
    membership: HashMap<String, Vec<usize>>,
}

impl JurisdictionMap {
    pub fn new(groups: Vec<JurisdictionGroup>) -> Self {
        let mut membership: HashMap<String, Vec<usize>> = HashMap::new();
        for (g, group) in groups.iter().enumerate() {
            for station in &group.stations {
                let entry = membership.entry(station.trim().to_string()).or_default();
                if !entry.contains(&g) {
                    entry.push(g);
                }
            }
        }
        JurisdictionMap { groups, membership }
    }

    /// True when no jurisdiction is configured; every boundary is then accepted.
    pub fn is_unrestricted(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[JurisdictionGroup] {
        &self.groups
    }

    /// Whether both stations belong to one common jurisdiction group.
    pub fn same_jurisdiction(&self, a: &str, b: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        match (self.membership.get(a.trim()), self.membership.get(b.trim())) {
            (Some(ga), Some(gb)) => ga.iter().any(|g| gb.contains(g)),
            _ => false,
        }
    }

    /// Name of the first group the station belongs to.
    pub fn jurisdiction_of(&self, station: &str) -> Option<&str> {
        self.membership
            .get(station.trim())
            .and_then(|groups| groups.first())
            .map(|&g| self.groups[g].name.as_str())
    }
}

/// Compare the station-group prefixes of two station codes.
pub fn same_station_group(a: &str, b: &str, prefix_len: usize) -> bool {
    a.chars().take(prefix_len).eq(b.chars().take(prefix_len))
}

/// Resource state of a partial duty, extended one leg at a time.
///
/// Frames are plain values: extending returns a new frame and leaves the
/// current one untouched, so callers can keep a stack of them and pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyProgress {
    /// Start time of the first leg
    pub first_start: i32,
    /// Start time of the first leg on the current train lineage
    pub lineage_start: i32,
    /// End time of the last leg
    pub last_end: i32,
    pub legs: usize,
}

impl DutyProgress {
    /// Progress of the singleton duty made of `first`.
    pub fn start(first: &Service) -> Self {
        DutyProgress {
            first_start: first.start_time,
            lineage_start: first.start_time,
            last_end: first.end_time,
            legs: 1,
        }
    }

    /// Minutes from sign-on leg start to the last arrival.
    pub fn elapsed(&self) -> i32 {
        self.last_end - self.first_start
    }

    /// Try to append `next`, reached from the current last leg by `kind`.
    ///
    /// Returns `None` when the extended duty would exceed the elapsed-time or
    /// lineage limits.
    pub fn extend(&self, next: &Service, kind: Succession, rules: &LegalityRules) -> Option<Self> {
        if next.end_time - self.first_start > rules.max_duty_elapsed {
            return None;
        }
        let lineage_start = match kind {
            Succession::SameVehicle => {
                if next.end_time - self.lineage_start > rules.max_lineage_elapsed {
                    return None;
                }
                self.lineage_start
            }
            Succession::VehicleChange => next.start_time,
        };
        Some(DutyProgress {
            first_start: self.first_start,
            lineage_start,
            last_end: next.end_time,
            legs: self.legs + 1,
        })
    }
}

/// Decides which services may be chained and which duties are legal
#[derive(Debug, Clone, Default)]
pub struct LegalityOracle {
    pub rules: LegalityRules,
    pub jurisdictions: JurisdictionMap,
}

impl LegalityOracle {
    pub fn new(rules: LegalityRules, jurisdictions: JurisdictionMap) -> Self {
        LegalityOracle { rules, jurisdictions }
    }

    fn min_break(&self, context: SuccessionContext) -> i32 {
        match context {
            SuccessionContext::Pricing => self.rules.min_break_pricing,
            SuccessionContext::Construction => self.rules.min_break_construction,
        }
    }

    /// How `b` may directly follow `a`, if at all.
    pub fn succession(&self, a: &Service, b: &Service, context: SuccessionContext) -> Option<Succession> {
        let gap = b.start_time - a.end_time;

        if b.vehicle == a.successor_vehicle() {
            let continues = a.end_station == b.start_station
                && (0..=self.rules.max_same_vehicle_gap).contains(&gap);
            return continues.then_some(Succession::SameVehicle);
        }

        let after_break = same_station_group(&a.end_station, &b.start_station, self.rules.station_prefix_len)
            && (self.min_break(context)..=self.rules.max_break).contains(&gap);
        after_break.then_some(Succession::VehicleChange)
    }

    pub fn can_directly_succeed(&self, a: &Service, b: &Service, context: SuccessionContext) -> bool {
        self.succession(a, b, context).is_some()
    }

    /// Pairwise succession plus elapsed-time and lineage limits over the whole chain.
    pub fn is_duty_valid(&self, registry: &ServiceRegistry, legs: &[ServiceIdx], context: SuccessionContext) -> bool {
        let Some((&first, rest)) = legs.split_first() else {
            return false;
        };
        let mut last = registry.service(first);
        let mut progress = DutyProgress::start(last);
        for &idx in rest {
            let next = registry.service(idx);
            let Some(kind) = self.succession(last, next, context) else {
                return false;
            };
            match progress.extend(next, kind, &self.rules) {
                Some(p) => progress = p,
                None => return false,
            }
            last = next;
        }
        true
    }

    /// Sign-on and sign-off stations share a jurisdiction, or the duty is a singleton.
    pub fn is_boundary_valid(&self, registry: &ServiceRegistry, legs: &[ServiceIdx]) -> bool {
        match legs {
            [] => false,
            [_] => true,
            [first, .., last] => self.jurisdictions.same_jurisdiction(
                &registry.service(*first).start_station,
                &registry.service(*last).end_station,
            ),
        }
    }

    pub fn is_legal_duty(&self, registry: &ServiceRegistry, legs: &[ServiceIdx], context: SuccessionContext) -> bool {
        self.is_duty_valid(registry, legs, context) && self.is_boundary_valid(registry, legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::service;

    fn oracle() -> LegalityOracle {
        LegalityOracle::default()
    }

    #[test]
    fn test_same_vehicle_within_window() {
        let a = service(1, "101", "PVGW", "07:20", "XYZW", "08:00", None);
        let b = service(2, "101", "XYZW", "08:10", "PVGW", "08:50", None);

        assert_eq!(
            oracle().succession(&a, &b, SuccessionContext::Pricing),
            Some(Succession::SameVehicle)
        );
        assert!(oracle().can_directly_succeed(&a, &b, SuccessionContext::Construction));
    }

    #[test]
    fn test_same_vehicle_gap_too_long_is_rejected() {
        let a = service(1, "101", "PVGW", "07:20", "XYZW", "08:00", None);
        let b = service(2, "101", "XYZW", "08:20", "PVGW", "09:00", None);

        assert!(!oracle().can_directly_succeed(&a, &b, SuccessionContext::Pricing));
        assert!(!oracle().can_directly_succeed(&a, &b, SuccessionContext::Construction));

        // Even on another train a 20 minute gap is shorter than any rest break
        let c = service(3, "999", "XYZW", "08:20", "PVGW", "09:00", None);
        assert!(!oracle().can_directly_succeed(&a, &c, SuccessionContext::Pricing));
    }

    #[test]
    fn test_same_vehicle_requires_same_station() {
        let a = service(1, "101", "A", "07:20", "XYZW UP", "08:00", None);
        let b = service(2, "101", "XYZW DN", "08:05", "A", "08:50", None);
        assert!(!oracle().can_directly_succeed(&a, &b, SuccessionContext::Pricing));
    }

    #[test]
    fn test_stepback_train_continues_lineage() {
        let a = service(1, "101", "A", "07:20", "B", "08:00", Some("202"));
        let on_stepback = service(2, "202", "B", "08:00", "A", "08:40", None);
        let same_train = service(3, "101", "B", "08:05", "A", "08:45", None);

        assert_eq!(
            oracle().succession(&a, &on_stepback, SuccessionContext::Pricing),
            Some(Succession::SameVehicle)
        );
        // The original train is no longer the crew's lineage after a stepback
        assert_eq!(oracle().succession(&a, &same_train, SuccessionContext::Pricing), None);
    }

    #[test]
    fn test_vehicle_change_thresholds_depend_on_context() {
        let a = service(1, "101", "A", "07:00", "KKDA DN", "08:00", None);
        let b = service(2, "305", "KKDA UP", "08:40", "C", "09:00", None);

        // 40 minute break: enough for pricing, too short for construction
        assert_eq!(
            oracle().succession(&a, &b, SuccessionContext::Pricing),
            Some(Succession::VehicleChange)
        );
        assert_eq!(oracle().succession(&a, &b, SuccessionContext::Construction), None);

        let late = service(3, "305", "KKDA UP", "10:31", "C", "11:00", None);
        assert!(!oracle().can_directly_succeed(&a, &late, SuccessionContext::Pricing));

        let edge = service(4, "305", "KKDA UP", "10:30", "C", "11:00", None);
        assert!(oracle().can_directly_succeed(&a, &edge, SuccessionContext::Construction));
    }

    #[test]
    fn test_vehicle_change_requires_station_group() {
        let a = service(1, "101", "A", "07:00", "KKDA DN", "08:00", None);
        let b = service(2, "305", "MUPR", "09:00", "C", "09:30", None);
        assert!(!oracle().can_directly_succeed(&a, &b, SuccessionContext::Pricing));
    }

    #[test]
    fn test_duty_elapsed_limit_is_inclusive() {
        let a = service(1, "101", "A", "06:00", "B", "08:00", None);
        let exactly = service(2, "202", "B", "09:00", "A", "13:25", None);
        let over = service(3, "303", "B", "09:00", "A", "13:26", None);
        let registry = ServiceRegistry::new("t", vec![a, exactly, over]);
        let o = oracle();

        assert!(o.is_duty_valid(&registry, &[0, 1], SuccessionContext::Construction));
        assert!(!o.is_duty_valid(&registry, &[0, 2], SuccessionContext::Construction));
    }

    #[test]
    fn test_lineage_limit_resets_after_vehicle_change() {
        // Three legs on train 101: 07:00-10:05 exceeds 180 minutes on one lineage
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "07:00", "B", "08:00", None),
                service(2, "101", "B", "08:05", "A", "09:05", None),
                service(3, "101", "A", "09:05", "B", "10:05", None),
                service(4, "404", "B", "09:00", "A", "10:00", None),
                service(5, "404", "A", "10:00", "B", "11:00", None),
            ],
        );
        let o = oracle();

        assert!(o.is_duty_valid(&registry, &[0, 1], SuccessionContext::Pricing));
        assert!(!o.is_duty_valid(&registry, &[0, 1, 2], SuccessionContext::Pricing));
        // Break at B then a fresh lineage on 404
        assert!(o.is_duty_valid(&registry, &[0, 3, 4], SuccessionContext::Pricing));
    }

    #[test]
    fn test_singleton_is_always_valid() {
        let registry = ServiceRegistry::new(
            "t",
            vec![service(1, "101", "A", "05:00", "B", "13:00", None)],
        );
        let o = LegalityOracle::new(
            LegalityRules::default(),
            JurisdictionMap::new(vec![JurisdictionGroup {
                name: "CC1".into(),
                stations: vec!["X".into()],
            }]),
        );
        assert!(o.is_legal_duty(&registry, &[0], SuccessionContext::Construction));
        assert!(!o.is_legal_duty(&registry, &[], SuccessionContext::Construction));
    }

    #[test]
    fn test_jurisdiction_boundary() {
        let map = JurisdictionMap::new(vec![
            JurisdictionGroup { name: "CC1".into(), stations: vec!["MKPR UP".into(), "MKPD ".into()] },
            JurisdictionGroup { name: "CC2".into(), stations: vec!["KKDA".into()] },
        ]);
        assert!(map.same_jurisdiction("MKPR UP", "MKPD"));
        assert!(!map.same_jurisdiction("MKPR UP", "KKDA"));
        assert!(!map.same_jurisdiction("MKPR UP", "NOWHERE"));
        assert_eq!(map.jurisdiction_of("KKDA"), Some("CC2"));
        assert!(JurisdictionMap::default().same_jurisdiction("A", "B"));

        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "MKPR UP", "07:00", "KKDA", "08:00", None),
                service(2, "101", "KKDA", "08:05", "MKPD", "09:00", None),
            ],
        );
        let o = LegalityOracle::new(LegalityRules::default(), map);
        assert!(o.is_boundary_valid(&registry, &[0]));
        assert!(o.is_boundary_valid(&registry, &[0, 1]));
        assert!(o.is_legal_duty(&registry, &[0, 1], SuccessionContext::Pricing));
    }
}
