//! Random timetable generator.
//!
//! Produces a line of stations worked by a fleet of trains shuttling between
//! random stations with short turnarounds. Output is fully determined by the
//! configuration and the seed, which makes it suitable for tests and
//! benchmarks.

use crate::instance::{Service, ServiceRegistry};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const LAST_ARRIVAL: i32 = 23 * 60 + 59;

/// Timetable generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of trains
    pub vehicles: usize,
    /// Services per train, fewer if the day ends first
    pub legs_per_vehicle: usize,
    /// Stations in line order
    pub stations: Vec<String>,
    /// Running time between adjacent stations in minutes
    pub minutes_per_hop: i32,
    /// Earliest first departure, minutes since midnight
    pub first_departure: i32,
    /// First departures are spread over this many minutes
    pub departure_spread: i32,
    pub min_turnaround: i32,
    pub max_turnaround: i32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            vehicles: 10,
            legs_per_vehicle: 6,
            stations: ["PVGW", "MKPR", "MUPR", "KKDA"].iter().map(|s| s.to_string()).collect(),
            minutes_per_hop: 20,
            first_departure: 5 * 60,
            departure_spread: 4 * 60,
            min_turnaround: 2,
            max_turnaround: 12,
        }
    }
}

pub struct TimetableGenerator {
    pub config: GeneratorConfig,
}

impl TimetableGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        TimetableGenerator { config }
    }

    /// Jurisdiction label of a station: the first half of the line is `CC1`.
    fn jurisdiction(&self, station: usize) -> &'static str {
        if station < self.config.stations.len().div_ceil(2) {
            "CC1"
        } else {
            "CC2"
        }
    }

    pub fn generate(&self, seed: u64) -> ServiceRegistry {
        let config = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_stations = config.stations.len();
        let mut services = Vec::with_capacity(config.vehicles * config.legs_per_vehicle);

        if num_stations < 2 {
            log::warn!("Generator needs at least two stations, got {}", num_stations);
            return ServiceRegistry::new(format!("generated-{}", seed), services);
        }

        for v in 0..config.vehicles {
            let vehicle = format!("{:03}", 101 + v);
            let mut station = rng.gen_range(0..num_stations);
            let mut departure = config.first_departure + rng.gen_range(0..=config.departure_spread.max(0));

            for _ in 0..config.legs_per_vehicle {
                let mut destination = rng.gen_range(0..num_stations - 1);
                if destination >= station {
                    destination += 1;
                }
                let hops = station.abs_diff(destination) as i32;
                let duration = (hops * config.minutes_per_hop + rng.gen_range(-2..=2)).max(1);
                let arrival = departure + duration;
                if arrival > LAST_ARRIVAL {
                    break;
                }

                services.push(Service {
                    id: services.len() as u32 + 1,
                    vehicle: vehicle.clone(),
                    start_station: config.stations[station].clone(),
                    start_time: departure,
                    end_station: config.stations[destination].clone(),
                    end_time: arrival,
                    direction: if destination > station { "UP" } else { "DN" }.to_string(),
                    duration,
                    jurisdiction: self.jurisdiction(station).to_string(),
                    stepback: None,
                });

                station = destination;
                departure = arrival + rng.gen_range(config.min_turnaround..=config.max_turnaround);
            }
        }

        log::debug!("Generated {} services for {} vehicles (seed {})", services.len(), config.vehicles, seed);
        ServiceRegistry::new(format!("generated-{}", seed), services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legality::{LegalityOracle, Succession, SuccessionContext};

    #[test]
    fn test_generation_is_deterministic() {
        let generator = TimetableGenerator::new(GeneratorConfig::default());
        let a = generator.generate(42);
        let b = generator.generate(42);
        let c = generator.generate(43);

        assert_eq!(a.services(), b.services());
        assert_ne!(a.services(), c.services());
    }

    #[test]
    fn test_generated_services_are_well_formed() {
        let config = GeneratorConfig {
            vehicles: 4,
            legs_per_vehicle: 5,
            ..GeneratorConfig::default()
        };
        let registry = TimetableGenerator::new(config).generate(7);
        assert_eq!(registry.len(), 20);

        for service in registry.services() {
            assert!(service.end_time > service.start_time);
            assert_eq!(service.duration, service.end_time - service.start_time);
            assert_ne!(service.start_station, service.end_station);
        }
    }

    #[test]
    fn test_consecutive_legs_continue_on_the_same_train() {
        let registry = TimetableGenerator::new(GeneratorConfig::default()).generate(3);
        let oracle = LegalityOracle::default();

        for pair in registry.services().windows(2) {
            if pair[0].vehicle == pair[1].vehicle {
                assert_eq!(
                    oracle.succession(&pair[0], &pair[1], SuccessionContext::Construction),
                    Some(Succession::SameVehicle)
                );
            }
        }
    }

    #[test]
    fn test_round_trip_through_service_file() {
        let registry = TimetableGenerator::new(GeneratorConfig::default()).generate(5);
        let mut buffer = Vec::new();
        registry.write_csv(&mut buffer).unwrap();

        let (loaded, errors) = ServiceRegistry::from_reader(buffer.as_slice()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(loaded.services(), registry.services());
    }
}
