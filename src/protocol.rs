use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::{
    error::Result,
    types::{Datapoint, DatapointValues},
};

/// Datapoints read from the rower on every update
pub const TRACKED_DATAPOINTS: [Datapoint; 4] = [
    Datapoint::MsDistance,
    Datapoint::MsTotal,
    Datapoint::MsAverage,
    Datapoint::TotalKcal,
];

/// Centimeters per meter, for the speed registers
pub const CENTIMETERS_PER_METER: f64 = 100.0;

/// Device energy units per calorie
pub const ENERGY_UNITS_PER_CALORIE: f64 = 1000.0;

/// Stroke telemetry sent to the server on every datapoint update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeMessage {
    /// Rower display name
    pub name: String,
    /// Distance in meters
    pub ms_distance: f64,
    /// Current speed in meters per second
    pub m_s_total: f64,
    /// Average speed in meters per second
    pub m_s_average: f64,
    /// Energy in calories
    pub total_kcal: f64,
}

impl StrokeMessage {
    /// Build a stroke message from raw device values
    ///
    /// Speeds are converted from cm/s to m/s and energy from device units to
    /// calories. `distance_factor` scales the distance and is `1.0` unless
    /// boost is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::MissingDatapoint`] if any tracked value is absent.
    pub fn from_values(
        name: impl Into<String>,
        values: &DatapointValues,
        distance_factor: f64,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            ms_distance: values.require(Datapoint::MsDistance)? * distance_factor,
            m_s_total: values.require(Datapoint::MsTotal)? / CENTIMETERS_PER_METER,
            m_s_average: values.require(Datapoint::MsAverage)? / CENTIMETERS_PER_METER,
            total_kcal: values.require(Datapoint::TotalKcal)? / ENERGY_UNITS_PER_CALORIE,
        })
    }
}

/// Messages this client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum OutboundMessage {
    /// Announces the rower so the server can list it
    #[serde(rename = "rower-checkin")]
    Checkin {
        /// Rower display name
        name: String,
    },
    /// Live stroke telemetry
    #[serde(rename = "strokedata")]
    StrokeData(StrokeMessage),
}

impl OutboundMessage {
    /// Create a check-in message
    pub fn checkin(name: impl Into<String>) -> Self {
        Self::Checkin { name: name.into() }
    }

    /// Serialize to the JSON text sent on the wire
    ///
    /// # Errors
    ///
    /// Returns [`crate::RelayError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum InboundMessage {
    /// Start a distance workout
    #[serde(rename = "session-start")]
    SessionStart {
        /// Workout distance in meters
        #[serde(deserialize_with = "workout_distance")]
        distance: u32,
    },
    /// Any other message; ignored
    #[serde(other)]
    Other,
}

/// Accept any JSON number (or numeric string) of meters, rounded to the nearest meter
///
/// Distances that round below one meter, exceed `u32::MAX` or are not finite
/// are rejected.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn workout_distance<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDistance {
        Number(f64),
        Text(String),
    }

    let meters = match RawDistance::deserialize(deserializer)? {
        RawDistance::Number(meters) => meters,
        RawDistance::Text(text) => text.trim().parse::<f64>().map_err(de::Error::custom)?,
    };

    let rounded = meters.round();
    if !rounded.is_finite() || rounded < 1.0 || rounded > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!(
            "invalid workout distance: {meters}"
        )));
    }

    Ok(rounded as u32)
}

impl InboundMessage {
    /// Parse a server frame, returning `None` for anything undecodable
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        match serde_json::from_slice(data) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("Ignoring undecodable server message: {e}");
                None
            }
        }
    }
}
