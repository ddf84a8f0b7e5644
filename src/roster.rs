//! Roster reporting.
//!
//! Turns a schedule into per-duty records with sign-on and sign-off times,
//! driving and duty hours and per-leg breaks, and writes them as a roster CSV
//! (one line per leg, duty fields on the first line, blank row between duties)
//! or as JSON.

use crate::config::SolverConfig;
use crate::instance::{format_duration, format_hhmm, ServiceRegistry, NO_STEPBACK};
use crate::solution::DutySchedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;

const DUTY_FIELDS: usize = 8;
const LEG_FIELDS: usize = 8;

const HEADER: [&str; DUTY_FIELDS + LEG_FIELDS] = [
    "Duty No",
    "Sign On Time",
    "Sign On Loc",
    "Sign Off Loc",
    "Sign Off Time",
    "Driving Hrs",
    "Duty Hrs",
    "Same Jurisdiction",
    "Rake Num",
    "Start Stn",
    "Start Time",
    "End Stn",
    "End Time",
    "Service Duration",
    "Break",
    "StepBack Rake",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterLeg {
    pub service_id: u32,
    pub vehicle: String,
    pub start_station: String,
    pub start_time: i32,
    pub end_station: String,
    pub end_time: i32,
    pub duration: i32,
    /// Minutes until the next leg starts, 0 for the last leg
    pub break_after: i32,
    pub stepback: Option<String>,
}

impl RosterLeg {
    fn fields(&self) -> [String; LEG_FIELDS] {
        [
            self.vehicle.clone(),
            self.start_station.clone(),
            format_hhmm(self.start_time),
            self.end_station.clone(),
            format_hhmm(self.end_time),
            self.duration.to_string(),
            self.break_after.to_string(),
            self.stepback.clone().unwrap_or_else(|| NO_STEPBACK.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// 1-based duty number
    pub duty_no: usize,
    pub sign_on_time: i32,
    pub sign_on_station: String,
    pub sign_off_station: String,
    pub sign_off_time: i32,
    /// Sum of service durations in minutes
    pub driving: i32,
    /// Sign-off minus sign-on in minutes
    pub duty_hours: i32,
    pub same_jurisdiction: bool,
    pub legs: Vec<RosterLeg>,
}

impl RosterEntry {
    fn fields(&self) -> [String; DUTY_FIELDS] {
        [
            self.duty_no.to_string(),
            format_hhmm(self.sign_on_time),
            self.sign_on_station.clone(),
            self.sign_off_station.clone(),
            format_hhmm(self.sign_off_time),
            format_duration(self.driving),
            format_duration(self.duty_hours),
            if self.same_jurisdiction { "Yes" } else { "No" }.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    pub algorithm: String,
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn build(registry: &ServiceRegistry, config: &SolverConfig, schedule: &DutySchedule) -> Self {
        let oracle = config.oracle();
        let crew = &config.crew_control;

        let entries = schedule
            .duties
            .iter()
            .filter(|duty| !duty.is_empty())
            .enumerate()
            .map(|(i, duty)| {
                let first = registry.service(duty.first());
                let last = registry.service(duty.last());
                let sign_on_time = crew.sign_on(&first.start_station, first.start_time);
                let sign_off_time = crew.sign_off(&last.end_station, last.end_time);

                let mut breaks = duty.breaks(registry);
                breaks.push(0);
                let legs = duty
                    .legs()
                    .iter()
                    .zip(breaks)
                    .map(|(&idx, break_after)| {
                        let service = registry.service(idx);
                        RosterLeg {
                            service_id: service.id,
                            vehicle: service.vehicle.clone(),
                            start_station: service.start_station.clone(),
                            start_time: service.start_time,
                            end_station: service.end_station.clone(),
                            end_time: service.end_time,
                            duration: service.duration,
                            break_after,
                            stepback: service.stepback.clone(),
                        }
                    })
                    .collect();

                RosterEntry {
                    duty_no: i + 1,
                    sign_on_time,
                    sign_on_station: first.start_station.clone(),
                    sign_off_station: last.end_station.clone(),
                    sign_off_time,
                    driving: duty.driving_duration(registry),
                    duty_hours: sign_off_time - sign_on_time,
                    same_jurisdiction: duty.same_jurisdiction(registry, &oracle),
                    legs,
                }
            })
            .collect();

        Roster {
            algorithm: schedule.algorithm.clone(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Percentage of duties signing on and off in the same jurisdiction.
    pub fn same_jurisdiction_share(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let same = self.entries.iter().filter(|e| e.same_jurisdiction).count();
        100.0 * same as f64 / self.entries.len() as f64
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(HEADER)?;

        let blank = vec![""; HEADER.len()];
        for entry in &self.entries {
            for (i, leg) in entry.legs.iter().enumerate() {
                let duty_fields = if i == 0 {
                    entry.fields()
                } else {
                    Default::default()
                };
                writer.write_record(duty_fields.iter().chain(leg.fields().iter()))?;
            }
            writer.write_record(&blank)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> csv::Result<()> {
        self.write_csv(File::create(path)?)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Roster ({})", self.algorithm)?;
        writeln!(f, "  Duties: {}", self.entries.len())?;
        let driving: i32 = self.entries.iter().map(|e| e.driving).sum();
        let paid: i32 = self.entries.iter().map(|e| e.duty_hours).sum();
        writeln!(f, "  Driving: {}", format_duration(driving))?;
        writeln!(f, "  Duty hours: {}", format_duration(paid))?;
        writeln!(f, "  Same jurisdiction: {:.1}%", self.same_jurisdiction_share())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrewControl;
    use crate::instance::tests::service;
    use crate::legality::{JurisdictionGroup, LegalityOracle};
    use crate::solution::Duty;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(
            "t",
            vec![
                service(1, "101", "KKDA UP", "07:00", "MUPR", "08:00", None),
                service(2, "101", "MUPR", "08:10", "KKDA DN", "09:00", Some("205")),
                service(3, "303", "MUPR", "10:00", "PVGW", "10:45", None),
            ],
        )
    }

    fn config() -> SolverConfig {
        SolverConfig {
            jurisdictions: vec![
                JurisdictionGroup {
                    name: "CC2".to_string(),
                    stations: vec!["KKDA UP".to_string(), "KKDA DN".to_string(), "MUPR".to_string()],
                },
                JurisdictionGroup {
                    name: "CC1".to_string(),
                    stations: vec!["PVGW".to_string()],
                },
            ],
            crew_control: CrewControl {
                stations: vec!["KKDA".to_string(), "PVGW".to_string()],
                ..CrewControl::default()
            },
            ..SolverConfig::default()
        }
    }

    fn schedule(registry: &ServiceRegistry) -> DutySchedule {
        DutySchedule::from_duties(
            registry,
            &LegalityOracle::default(),
            vec![Duty::new(vec![0, 1]), Duty::singleton(2)],
            "manual",
        )
    }

    #[test]
    fn test_sign_on_and_off_buffers() {
        let registry = registry();
        let roster = Roster::build(&registry, &config(), &schedule(&registry));
        assert_eq!(roster.len(), 2);

        let first = &roster.entries[0];
        assert_eq!(first.duty_no, 1);
        assert_eq!(first.sign_on_time, 7 * 60 - 15);
        assert_eq!(first.sign_off_time, 9 * 60 + 10);
        assert_eq!(first.driving, 110);
        assert_eq!(first.duty_hours, 145);
        assert!(first.same_jurisdiction);
        assert_eq!(first.legs[0].break_after, 10);
        assert_eq!(first.legs[1].break_after, 0);

        // MUPR is not a crew-control depot
        let second = &roster.entries[1];
        assert_eq!(second.sign_on_time, 10 * 60 - 25);
        assert_eq!(second.sign_off_time, 10 * 60 + 45 + 10);
        assert!(!second.same_jurisdiction);

        assert!((roster.same_jurisdiction_share() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_layout() {
        let registry = registry();
        let roster = Roster::build(&registry, &config(), &schedule(&registry));
        let mut buffer = Vec::new();
        roster.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 1 + 2 + 1 + 1 + 1);
        assert!(lines[0].starts_with("Duty No,Sign On Time"));
        assert_eq!(
            lines[1],
            "1,06:45,KKDA UP,KKDA DN,09:10,01:50,02:25,Yes,101,KKDA UP,07:00,MUPR,08:00,60,10,No StepBack"
        );
        assert_eq!(lines[2], ",,,,,,,,101,MUPR,08:10,KKDA DN,09:00,50,0,205");
        assert_eq!(lines[3], ",".repeat(HEADER.len() - 1));
        assert!(lines[4].starts_with("2,09:35,MUPR,PVGW,10:55,00:45,01:20,No,303"));
    }

    #[test]
    fn test_json_export() {
        let registry = registry();
        let roster = Roster::build(&registry, &config(), &schedule(&registry));
        let json = roster.to_json().unwrap();
        let parsed: Roster = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.entries, roster.entries);
    }
}
