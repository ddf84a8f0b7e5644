//! Module for parsing and representing timetable instances.
//!
//! A timetable is a list of atomic services (one train movement between two
//! stations) read from a CSV service file. Services are stored in an arena and
//! addressed by a dense [`ServiceIdx`] for the lifetime of a run; the file's own
//! identifiers are kept for reporting and lookup.

use crate::error::{LoadError, RecordError};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Dense index of a service inside a [`ServiceRegistry`].
pub type ServiceIdx = usize;

/// Literal used by service files for "no stepback vehicle".
pub const NO_STEPBACK: &str = "No StepBack";

/// Number of fields in a service record.
pub const SERVICE_FIELDS: usize = 10;

const MINUTES_PER_DAY: i32 = 24 * 60;

/// Represents one scheduled train movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Identifier from the service file
    pub id: u32,
    /// Train (rake) number operating the service
    pub vehicle: String,
    pub start_station: String,
    /// Minutes since midnight
    pub start_time: i32,
    pub end_station: String,
    /// Minutes since midnight
    pub end_time: i32,
    pub direction: String,
    /// Intrinsic running time in minutes
    pub duration: i32,
    pub jurisdiction: String,
    /// Train the crew steps back onto at the end of this service, if any
    pub stepback: Option<String>,
}

impl Service {
    /// Vehicle a crew stays with when continuing without a break: the stepback
    /// train when one is declared, otherwise the service's own train.
    pub fn successor_vehicle(&self) -> &str {
        self.stepback.as_deref().unwrap_or(&self.vehicle)
    }

    /// Parse a service from the ten fields of a record.
    pub fn from_fields(fields: &[&str], line: usize) -> Result<Self, RecordError> {
        if fields.len() != SERVICE_FIELDS {
            return Err(RecordError::FieldCount { line, found: fields.len() });
        }

        let id = fields[0].parse::<u32>().map_err(|_| RecordError::InvalidField {
            line,
            field: "identifier",
            value: fields[0].to_string(),
        })?;
        let start_time = parse_hhmm(fields[3]).ok_or_else(|| RecordError::InvalidField {
            line,
            field: "start time",
            value: fields[3].to_string(),
        })?;
        let end_time = parse_hhmm(fields[5]).ok_or_else(|| RecordError::InvalidField {
            line,
            field: "end time",
            value: fields[5].to_string(),
        })?;
        if end_time < start_time {
            return Err(RecordError::NegativeDuration {
                line,
                start: fields[3].to_string(),
                end: fields[5].to_string(),
            });
        }
        let duration = fields[7].parse::<i32>().map_err(|_| RecordError::InvalidField {
            line,
            field: "duration",
            value: fields[7].to_string(),
        })?;

        let non_empty = |value: &str, field: &'static str| {
            if value.is_empty() {
                Err(RecordError::InvalidField { line, field, value: String::new() })
            } else {
                Ok(value.to_string())
            }
        };

        let stepback = match fields[9] {
            "" | NO_STEPBACK => None,
            train => Some(train.to_string()),
        };

        Ok(Service {
            id,
            vehicle: non_empty(fields[1], "vehicle")?,
            start_station: non_empty(fields[2], "start station")?,
            start_time,
            end_station: non_empty(fields[4], "end station")?,
            end_time,
            direction: fields[6].to_string(),
            duration,
            jurisdiction: fields[8].to_string(),
            stepback,
        })
    }

    /// Serialize back to the ten service-file fields.
    pub fn to_fields(&self) -> [String; SERVICE_FIELDS] {
        [
            self.id.to_string(),
            self.vehicle.clone(),
            self.start_station.clone(),
            format_hhmm(self.start_time),
            self.end_station.clone(),
            format_hhmm(self.end_time),
            self.direction.clone(),
            self.duration.to_string(),
            self.jurisdiction.clone(),
            self.stepback.clone().unwrap_or_else(|| NO_STEPBACK.to_string()),
        ]
    }
}

/// Parse a zero-padded 24-hour `HH:MM` clock time into minutes since midnight.
pub fn parse_hhmm(value: &str) -> Option<i32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some((time.hour() * 60 + time.minute()) as i32)
}

/// Format minutes since midnight as `HH:MM`, wrapping around midnight.
pub fn format_hhmm(minutes: i32) -> String {
    let wrapped = minutes.rem_euclid(MINUTES_PER_DAY) as u32;
    NaiveTime::from_hms_opt(wrapped / 60, wrapped % 60, 0)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Format a duration in minutes as `HH:MM` without wrapping.
pub fn format_duration(minutes: i32) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let minutes = minutes.abs();
    format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}

/// The immutable set of services of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRegistry {
    /// Name of the timetable (file stem when loaded from disk)
    pub name: String,
    services: Vec<Service>,
    #[serde(skip)]
    by_id: HashMap<u32, ServiceIdx>,
    #[serde(skip)]
    rejected: Vec<String>,
}

impl ServiceRegistry {
    /// Build a registry from already-validated services.
    ///
    /// Services keep their input order; a duplicate identifier keeps the first
    /// occurrence.
    pub fn new(name: impl Into<String>, services: Vec<Service>) -> Self {
        let mut registry = ServiceRegistry {
            name: name.into(),
            ..Default::default()
        };
        for service in services {
            if registry.by_id.contains_key(&service.id) {
                log::warn!("Dropping duplicate service identifier {}", service.id);
                registry.rejected.push(format!("duplicate service identifier {}", service.id));
                continue;
            }
            registry.by_id.insert(service.id, registry.services.len());
            registry.services.push(service);
        }
        registry
    }

    /// Load a service file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = File::open(&path)?;
        let (mut registry, errors) = Self::from_reader(file)?;
        registry.name = name;
        if registry.is_empty() {
            return Err(LoadError::Empty { rejected: errors.len() });
        }
        Ok(registry)
    }

    /// Parse services from CSV data with one header row.
    ///
    /// Returns the registry built from every valid record together with the
    /// per-record errors of the rejected ones.
    pub fn from_reader<R: Read>(reader: R) -> Result<(Self, Vec<RecordError>), LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut services = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (i, record) in csv_reader.records().enumerate() {
            let fallback_line = i + 2;
            let record = match record {
                Ok(record) => record,
                Err(source) => {
                    let line = source
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(fallback_line);
                    errors.push(RecordError::Csv { line, source });
                    continue;
                }
            };
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line);

            // Blank separator rows
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }

            let fields: Vec<&str> = record.iter().collect();
            match Service::from_fields(&fields, line) {
                Ok(service) if !seen.insert(service.id) => {
                    errors.push(RecordError::DuplicateIdentifier { line, id: service.id });
                }
                Ok(service) => services.push(service),
                Err(e) => errors.push(e),
            }
        }

        for error in &errors {
            log::warn!("Rejected service record: {}", error);
        }

        let mut registry = Self::new(String::new(), services);
        registry.rejected = errors.iter().map(|e| e.to_string()).collect();
        Ok((registry, errors))
    }

    /// Write the registry in service-file format.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record([
            "Serial Number",
            "Rake Num",
            "Start Station",
            "Start Time",
            "End Station",
            "End Time",
            "Direction",
            "Service Time",
            "Jurisdiction",
            "StepBack Rake",
        ])?;
        for service in &self.services {
            writer.write_record(service.to_fields())?;
        }
        writer.flush()?;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    #[inline]
    pub fn service(&self, idx: ServiceIdx) -> &Service {
        &self.services[idx]
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Iterate services with their dense index, in input order.
    pub fn iter(&self) -> impl Iterator<Item = (ServiceIdx, &Service)> + '_ {
        self.services.iter().enumerate()
    }

    /// Dense index of the service with the given file identifier.
    pub fn index_of(&self, id: u32) -> Option<ServiceIdx> {
        self.by_id.get(&id).copied()
    }

    /// Descriptions of the records rejected while loading.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Service indices stably sorted by start time.
    pub fn by_start_time(&self) -> Vec<ServiceIdx> {
        let mut order: Vec<ServiceIdx> = (0..self.services.len()).collect();
        order.sort_by_key(|&i| self.services[i].start_time);
        order
    }

    /// Get statistics about the timetable
    pub fn statistics(&self) -> RegistryStatistics {
        let vehicles: HashSet<&str> = self.services.iter().map(|s| s.vehicle.as_str()).collect();
        let stations: HashSet<&str> = self
            .services
            .iter()
            .flat_map(|s| [s.start_station.as_str(), s.end_station.as_str()])
            .collect();
        let total_driving: i32 = self.services.iter().map(|s| s.duration).sum();

        RegistryStatistics {
            name: self.name.clone(),
            num_services: self.services.len(),
            num_vehicles: vehicles.len(),
            num_stations: stations.len(),
            num_stepbacks: self.services.iter().filter(|s| s.stepback.is_some()).count(),
            first_departure: self.services.iter().map(|s| s.start_time).min().unwrap_or(0),
            last_arrival: self.services.iter().map(|s| s.end_time).max().unwrap_or(0),
            total_driving,
            avg_duration: if self.services.is_empty() {
                0.0
            } else {
                total_driving as f64 / self.services.len() as f64
            },
            num_rejected: self.rejected.len(),
        }
    }
}

/// Statistics about a timetable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub name: String,
    pub num_services: usize,
    pub num_vehicles: usize,
    pub num_stations: usize,
    pub num_stepbacks: usize,
    pub first_departure: i32,
    pub last_arrival: i32,
    pub total_driving: i32,
    pub avg_duration: f64,
    pub num_rejected: usize,
}

impl std::fmt::Display for RegistryStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Timetable: {}", self.name)?;
        writeln!(f, "  Services: {} ({} rejected)", self.num_services, self.num_rejected)?;
        writeln!(f, "  Trains: {}", self.num_vehicles)?;
        writeln!(f, "  Stations: {}", self.num_stations)?;
        writeln!(f, "  Stepback services: {}", self.num_stepbacks)?;
        writeln!(
            f,
            "  Operating window: {} - {}",
            format_hhmm(self.first_departure),
            format_hhmm(self.last_arrival)
        )?;
        writeln!(f, "  Total driving: {}", format_duration(self.total_driving))?;
        writeln!(f, "  Avg service duration: {:.1} min", self.avg_duration)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a service for tests from clock strings.
    pub(crate) fn service(
        id: u32,
        vehicle: &str,
        start_station: &str,
        start: &str,
        end_station: &str,
        end: &str,
        stepback: Option<&str>,
    ) -> Service {
        let start_time = parse_hhmm(start).unwrap();
        let end_time = parse_hhmm(end).unwrap();
        Service {
            id,
            vehicle: vehicle.to_string(),
            start_station: start_station.to_string(),
            start_time,
            end_station: end_station.to_string(),
            end_time,
            direction: "UP".to_string(),
            duration: end_time - start_time,
            jurisdiction: "J1".to_string(),
            stepback: stepback.map(str::to_string),
        }
    }

    const HEADER: &str = "Serial,Rake,Start Stn,Start,End Stn,End,Dir,Dur,Juris,StepBack\n";

    #[test]
    fn test_time_conversion() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("08:05"), Some(485));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:10"), None);
        assert_eq!(parse_hhmm("ab:cd"), None);

        assert_eq!(format_hhmm(485), "08:05");
        assert_eq!(format_hhmm(-15), "23:45");
        assert_eq!(format_duration(445), "07:25");
    }

    #[test]
    fn test_parse_valid_file() {
        let data = format!(
            "{}1,101,MKPR UP,08:00,KKDA DN,08:40,UP,40,J1,No StepBack\n\
             2,101,KKDA DN,08:50,MKPR DN,09:30,DN,40,J1,102\n",
            HEADER
        );
        let (registry, errors) = ServiceRegistry::from_reader(data.as_bytes()).unwrap();

        assert!(errors.is_empty());
        assert_eq!(registry.len(), 2);
        let first = registry.service(0);
        assert_eq!(first.start_time, 480);
        assert_eq!(first.stepback, None);
        assert_eq!(first.successor_vehicle(), "101");
        let second = registry.service(registry.index_of(2).unwrap());
        assert_eq!(second.stepback.as_deref(), Some("102"));
        assert_eq!(second.successor_vehicle(), "102");
    }

    #[test]
    fn test_malformed_records_are_excluded() {
        let data = format!(
            "{}1,101,A,08:00,B,08:40,UP,40,J1,No StepBack\n\
             2,101,B,8h50,A,09:30,DN,40,J1,No StepBack\n\
             3,101,B,09:50,A,09:30,DN,40,J1,No StepBack\n\
             4,101,B,09:50\n\
             1,101,B,10:00,A,10:30,DN,30,J1,No StepBack\n\
             x,101,B,10:00,A,10:30,DN,30,J1,No StepBack\n\
             5,101,B,10:00,A,10:30,DN,30,J1,No StepBack\n",
            HEADER
        );
        let (registry, errors) = ServiceRegistry::from_reader(data.as_bytes()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], RecordError::InvalidField { line: 3, field: "start time", .. }));
        assert!(matches!(errors[1], RecordError::NegativeDuration { line: 4, .. }));
        assert!(matches!(errors[2], RecordError::FieldCount { line: 5, found: 4 }));
        assert!(matches!(errors[3], RecordError::DuplicateIdentifier { line: 6, id: 1 }));
        assert!(matches!(errors[4], RecordError::InvalidField { field: "identifier", .. }));
        assert_eq!(registry.rejected().len(), 5);
    }

    #[test]
    fn test_csv_roundtrip_preserves_services() {
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(7, "101", "A", "06:00", "B", "06:30", Some("202")),
                service(3, "202", "B", "06:30", "A", "07:00", None),
            ],
        );
        let mut buffer = Vec::new();
        registry.write_csv(&mut buffer).unwrap();
        let (reloaded, errors) = ServiceRegistry::from_reader(buffer.as_slice()).unwrap();

        assert!(errors.is_empty());
        assert_eq!(reloaded.services(), registry.services());
    }

    #[test]
    fn test_statistics() {
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "06:00", "B", "06:30", None),
                service(2, "102", "B", "07:00", "C", "08:00", Some("101")),
            ],
        );
        let stats = registry.statistics();
        assert_eq!(stats.num_services, 2);
        assert_eq!(stats.num_vehicles, 2);
        assert_eq!(stats.num_stations, 3);
        assert_eq!(stats.num_stepbacks, 1);
        assert_eq!(stats.first_departure, 360);
        assert_eq!(stats.last_arrival, 480);
        assert_eq!(stats.total_driving, 90);
    }

    #[test]
    fn test_by_start_time_is_stable() {
        let registry = ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "A", "07:00", "B", "07:30", None),
                service(2, "102", "A", "06:00", "B", "06:30", None),
                service(3, "103", "A", "07:00", "B", "07:20", None),
            ],
        );
        assert_eq!(registry.by_start_time(), vec![1, 0, 2]);
    }
}
