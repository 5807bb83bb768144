//! Telemetry samples as delivered by the soil sensor service.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Device id stamped on synthesized readings.  Real sensors never use it.
pub const PLACEHOLDER_DEVICE_ID: &str = "soilsense-placeholder";

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One sample from the soil sensor device.
///
/// Field names on the wire follow the sensor service (`n_value`, `p_value`,
/// `k_value`); in Rust they are spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    #[serde(with = "timestamp")]
    pub timestamp: OffsetDateTime,
    pub soil_type: String,
    /// °C
    pub temperature: f64,
    /// Volumetric soil moisture, %.
    pub moisture: f64,
    #[serde(rename = "n_value")]
    pub nitrogen: f64,
    #[serde(rename = "p_value")]
    pub phosphorus: f64,
    #[serde(rename = "k_value")]
    pub potassium: f64,
    #[serde(default)]
    pub user_texture: String,
    #[serde(default)]
    pub user_color: String,
    #[serde(default)]
    pub recommendation: String,
}

impl Reading {
    /// Nominal plot values used when the sensor service is healthy but has
    /// not produced a sample yet.
    pub fn placeholder(now: OffsetDateTime) -> Self {
        Self {
            device_id: PLACEHOLDER_DEVICE_ID.to_string(),
            timestamp: now,
            soil_type: "Loamy".to_string(),
            temperature: 24.5,
            moisture: 45.2,
            nitrogen: 78.0,
            phosphorus: 42.0,
            potassium: 156.0,
            user_texture: "Loamy".to_string(),
            user_color: "Brown".to_string(),
            recommendation: "Waiting for the first sensor reading".to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.device_id == PLACEHOLDER_DEVICE_ID
    }

    /// Reject physically implausible samples: temperature outside
    /// -40..=100 °C or moisture outside 0..=100 %.
    pub fn check_ranges(&self) -> Result<(), String> {
        if !(-40.0..=100.0).contains(&self.temperature) {
            return Err(format!("temperature {} out of range [-40, 100]", self.temperature));
        }
        if !(0.0..=100.0).contains(&self.moisture) {
            return Err(format!("moisture {} out of range [0, 100]", self.moisture));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading state
// ---------------------------------------------------------------------------

/// What the hub currently has to show for the plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reading", rename_all = "lowercase")]
pub enum ReadingState {
    /// Genuine telemetry accepted from the sensor service.
    Real(Reading),
    /// Display fallback while the service reports "no data yet".
    Placeholder(Reading),
    /// Nothing received so far.
    Absent,
}

impl ReadingState {
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Real(r) | Self::Placeholder(r) => Some(r),
            Self::Absent => None,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Self::Real(_))
    }
}

// ---------------------------------------------------------------------------
// User preferences
// ---------------------------------------------------------------------------

/// Soil texture and color as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub texture: String,
    pub color: String,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse an ISO-8601 timestamp.  The sensor service emits local wall-clock
/// time without an offset; those are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    let naive = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(raw, naive).map(PrimitiveDateTime::assume_utc)
}

mod timestamp {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(ts, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
