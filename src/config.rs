//! Solver configuration read from JSON.
//!
//! Every section is optional and falls back to its defaults:
//!
//! ```json
//! {
//!   "legality": { "min_break_construction": 50 },
//!   "jurisdictions": [ { "name": "CC1", "stations": ["PVGW", "MKPR"] } ],
//!   "crew_control": { "stations": ["PVGW", "KKDA"] },
//!   "column_generation": { "max_iterations": 200 }
//! }
//! ```

use crate::error::ConfigError;
use crate::legality::{same_station_group, JurisdictionGroup, JurisdictionMap, LegalityOracle, LegalityRules};
use crate::optimization::ColumnGenerationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Crew depots and the reporting buffers around a duty, in minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrewControl {
    /// Station codes of crew-control depots, matched on their prefix
    pub stations: Vec<String>,
    pub sign_on_buffer: i32,
    pub sign_on_buffer_other: i32,
    pub sign_off_buffer: i32,
    pub sign_off_buffer_other: i32,
    pub station_prefix_len: usize,
}

impl Default for CrewControl {
    fn default() -> Self {
        CrewControl {
            stations: Vec::new(),
            sign_on_buffer: 15,
            sign_on_buffer_other: 25,
            sign_off_buffer: 10,
            sign_off_buffer_other: 20,
            station_prefix_len: 4,
        }
    }
}

impl CrewControl {
    pub fn is_crew_control(&self, station: &str) -> bool {
        let station = station.trim();
        self.stations
            .iter()
            .any(|depot| same_station_group(depot.trim(), station, self.station_prefix_len))
    }

    /// Sign-on time for a duty whose first service departs `station` at `start`.
    pub fn sign_on(&self, station: &str, start: i32) -> i32 {
        if self.is_crew_control(station) {
            start - self.sign_on_buffer
        } else {
            start - self.sign_on_buffer_other
        }
    }

    /// Sign-off time for a duty whose last service arrives at `station` at `end`.
    pub fn sign_off(&self, station: &str, end: i32) -> i32 {
        if self.is_crew_control(station) {
            end + self.sign_off_buffer
        } else {
            end + self.sign_off_buffer_other
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub legality: LegalityRules,
    pub jurisdictions: Vec<JurisdictionGroup>,
    pub crew_control: CrewControl,
    pub column_generation: ColumnGenerationConfig,
}

impl SolverConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Legality oracle for the configured rules and jurisdictions.
    pub fn oracle(&self) -> LegalityOracle {
        LegalityOracle::new(self.legality.clone(), JurisdictionMap::new(self.jurisdictions.clone()))
    }
}
