use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, time::SystemTime};

use crate::error::{RelayError, Result};

/// Named telemetry field exposed by the rower's memory map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Datapoint {
    /// Distance rowed in meters
    #[serde(rename = "ms_distance")]
    MsDistance,
    /// Current speed in centimeters per second
    #[serde(rename = "m_s_total")]
    MsTotal,
    /// Average speed in centimeters per second
    #[serde(rename = "m_s_average")]
    MsAverage,
    /// Energy spent, in thousandths of a calorie
    #[serde(rename = "total_kcal")]
    TotalKcal,
}

impl Datapoint {
    /// Wire name of the datapoint
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MsDistance => "ms_distance",
            Self::MsTotal => "m_s_total",
            Self::MsAverage => "m_s_average",
            Self::TotalKcal => "total_kcal",
        }
    }
}

impl fmt::Display for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of datapoint values keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatapointValues(HashMap<Datapoint, f64>);

impl DatapointValues {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of a datapoint
    pub fn insert(&mut self, datapoint: Datapoint, value: f64) {
        self.0.insert(datapoint, value);
    }

    /// Value of a datapoint, if present
    #[must_use]
    pub fn get(&self, datapoint: Datapoint) -> Option<f64> {
        self.0.get(&datapoint).copied()
    }

    /// Value of a datapoint that must be present
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingDatapoint`] if the snapshot has no value for it.
    pub fn require(&self, datapoint: Datapoint) -> Result<f64> {
        self.get(datapoint)
            .ok_or(RelayError::MissingDatapoint(datapoint))
    }

    /// Number of values in the snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot holds no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Datapoint, f64)> for DatapointValues {
    fn from_iter<I: IntoIterator<Item = (Datapoint, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A datapoint update published by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatapointEvent {
    /// Which datapoint changed
    pub name: Datapoint,
    /// Raw value in device units
    pub value: f64,
    /// When the value was read
    pub time: SystemTime,
}

impl DatapointEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn now(name: Datapoint, value: f64) -> Self {
        Self {
            name,
            value,
            time: SystemTime::now(),
        }
    }
}

/// Console log severity, ordered from most to least verbose
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-message tracing, including every stroke sent
    Debug,
    /// Normal operational messages
    #[default]
    #[serde(alias = "info")]
    #[value(alias = "info")]
    Information,
    /// Something unexpected that the relay recovered from
    #[serde(alias = "warn")]
    #[value(alias = "warn")]
    Warning,
    /// A failed operation
    Error,
    /// A failure that stops the process
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "Debug"),
            Self::Information => write!(f, "Information"),
            Self::Warning => write!(f, "Warning"),
            Self::Error => write!(f, "Error"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datapoint_names() {
        assert_eq!(Datapoint::MsDistance.as_str(), "ms_distance");
        assert_eq!(Datapoint::MsTotal.to_string(), "m_s_total");
        assert_eq!(
            serde_json::to_string(&Datapoint::TotalKcal).unwrap(),
            "\"total_kcal\""
        );
    }

    #[test]
    fn test_datapoint_values_require() {
        let values: DatapointValues = [(Datapoint::MsDistance, 12.5)].into_iter().collect();
        assert_eq!(values.require(Datapoint::MsDistance).unwrap(), 12.5);
        assert!(matches!(
            values.require(Datapoint::MsAverage),
            Err(RelayError::MissingDatapoint(Datapoint::MsAverage))
        ));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Information);
        assert!(LogLevel::Information < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert_eq!(LogLevel::default(), LogLevel::Information);
    }

    #[test]
    fn test_log_level_aliases() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warning);
        let level: LogLevel = serde_json::from_str("\"fatal\"").unwrap();
        assert_eq!(level, LogLevel::Fatal);
    }
}
