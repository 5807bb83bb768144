//! Decision engines for the SoilSense hub.
//!
//! Everything in this crate is synchronous and side-effect free: the
//! irrigation and nitrate engines are plain functions of the reading and
//! weather outlook handed to them, so callers can evaluate them as often as
//! they like without coordination.

pub mod irrigation;
pub mod nitrate;
pub mod reading;
pub mod weather;

pub use irrigation::{
    decide, forecast_hints, DayHint, IrrigationRecommendation, NextIrrigation, Urgency,
    WeatherImpact,
};
pub use nitrate::{assess, NitrateRisk, RiskLevel};
pub use reading::{parse_timestamp, Preferences, Reading, ReadingState, PLACEHOLDER_DEVICE_ID};
pub use weather::{CurrentConditions, ForecastDay, WeatherOutlook};
