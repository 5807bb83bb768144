//! Irrigation decision engine.
//!
//! Turns the latest soil reading and the weather outlook into a single
//! recommendation.  The decision ladder is evaluated top to bottom and the
//! first matching rung wins:
//!
//! ```text
//! moisture < CRITICAL                       → high,   irrigate
//! moisture < LOW  && !rain_expected         → medium, irrigate
//! moisture < LOW  &&  rain_expected         → low,    hold (rain delay)
//! otherwise                                 → low,    hold (optimal)
//! ```

use std::fmt;

use serde::{Serialize, Serializer};

use crate::reading::Reading;
use crate::weather::{ForecastDay, WeatherOutlook};

/// Below this the crop is in danger, irrigate regardless of the forecast.
pub const CRITICAL_MOISTURE: f64 = 20.0;
/// Below this irrigation is wanted unless rain is on the way.
pub const LOW_MOISTURE: f64 = 35.0;
/// Target level that water amounts are computed against.
pub const OPTIMAL_MOISTURE: f64 = 60.0;

/// Minimum gap reported before the next irrigation when holding.
const MIN_HOURS_UNTIL_NEXT: i64 = 6;
/// A forecast day with more rain than this ends a rain delay.
const RAIN_DAY_THRESHOLD: f64 = 20.0;
/// Rain outlook above which irrigation should be scaled back.
const HEAVY_RAIN_OUTLOOK: f64 = 60.0;

/// Days covered by the per-day forecast hints.
pub const HINT_WINDOW_DAYS: usize = 3;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// When the next irrigation should happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextIrrigation {
    Now,
    /// Hold until after the rain; `None` when no forecast day stands out.
    AfterRain(Option<String>),
    InHours(i64),
}

impl fmt::Display for NextIrrigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => write!(f, "Now"),
            Self::AfterRain(Some(day)) => write!(f, "After rain ({day})"),
            Self::AfterRain(None) => write!(f, "After rain (Soon)"),
            Self::InHours(h) => write!(f, "In {h} hours"),
        }
    }
}

impl Serialize for NextIrrigation {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// How the weather shifts the plot's water budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherImpact {
    RainDelay,
    HighTemperature,
    LowHumidity,
    HeavyRain,
}

impl fmt::Display for WeatherImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::RainDelay => "Rain expected - irrigation delayed",
            Self::HighTemperature => "High temperature increases water needs",
            Self::LowHumidity => "Low humidity increases evaporation",
            Self::HeavyRain => "Heavy rain expected - reduce irrigation",
        };
        f.write_str(text)
    }
}

impl Serialize for WeatherImpact {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationRecommendation {
    pub should_irrigate: bool,
    pub urgency: Urgency,
    pub reason: String,
    /// Litres per square metre.
    pub water_amount: u32,
    pub next_irrigation: NextIrrigation,
    pub weather_impact: Option<WeatherImpact>,
}

/// Advisory irrigate/skip flag for a single forecast day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHint {
    pub day: String,
    pub condition: String,
    pub high: f64,
    pub rain: f64,
    pub irrigate: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Hot soil loses water faster; scale the volume up accordingly.
pub fn temperature_multiplier(temperature: f64) -> f64 {
    if temperature > 30.0 {
        1.3
    } else if temperature > 25.0 {
        1.1
    } else {
        1.0
    }
}

fn water_amount(moisture: f64, factor: f64, multiplier: f64) -> u32 {
    ((OPTIMAL_MOISTURE - moisture) * factor * multiplier)
        .round()
        .max(0.0) as u32
}

/// Compute the irrigation recommendation for `reading` under `weather`.
pub fn decide(reading: &Reading, weather: &WeatherOutlook) -> IrrigationRecommendation {
    let moisture = reading.moisture;
    let multiplier = temperature_multiplier(reading.temperature);
    let rain_outlook = weather.rain_outlook();
    let rain_expected = weather.rain_expected();

    let (should_irrigate, urgency, reason, water, mut impact) = if moisture < CRITICAL_MOISTURE {
        (
            true,
            Urgency::High,
            format!(
                "Critical moisture level ({moisture}%, below {CRITICAL_MOISTURE}%). \
                 Immediate irrigation required."
            ),
            water_amount(moisture, 0.8, multiplier),
            None,
        )
    } else if moisture < LOW_MOISTURE && !rain_expected {
        (
            true,
            Urgency::Medium,
            format!("Low moisture level ({moisture}%) with no significant rain expected."),
            water_amount(moisture, 0.6, multiplier),
            None,
        )
    } else if moisture < LOW_MOISTURE {
        (
            false,
            Urgency::Low,
            format!(
                "Moisture is low ({moisture}%) but {rain_outlook}% rain expected in next 2 days."
            ),
            0,
            Some(WeatherImpact::RainDelay),
        )
    } else {
        (
            false,
            Urgency::Low,
            format!("Moisture level optimal ({moisture}%). No irrigation needed."),
            0,
            None,
        )
    };

    if impact.is_none() {
        impact = if weather.current.temp > 30.0 {
            Some(WeatherImpact::HighTemperature)
        } else if weather.current.humidity < 40.0 {
            Some(WeatherImpact::LowHumidity)
        } else if rain_outlook > HEAVY_RAIN_OUTLOOK {
            Some(WeatherImpact::HeavyRain)
        } else {
            None
        };
    }

    let next_irrigation = if should_irrigate {
        NextIrrigation::Now
    } else if rain_expected {
        NextIrrigation::AfterRain(
            weather
                .forecast
                .iter()
                .find(|d| d.rain > RAIN_DAY_THRESHOLD)
                .map(|d| d.day.clone()),
        )
    } else {
        let hours = ((moisture - LOW_MOISTURE) * 2.0).round() as i64;
        NextIrrigation::InHours(hours.max(MIN_HOURS_UNTIL_NEXT))
    };

    IrrigationRecommendation {
        should_irrigate,
        urgency,
        reason,
        water_amount: water,
        next_irrigation,
        weather_impact: impact,
    }
}

/// Per-day irrigate/skip hints for the first few forecast days.  Independent
/// of [`decide`]; a day is flagged when it is dry and either the soil is
/// already on the low side or the day runs hot.
pub fn forecast_hints(moisture: f64, forecast: &[ForecastDay]) -> Vec<DayHint> {
    forecast
        .iter()
        .take(HINT_WINDOW_DAYS)
        .map(|d| DayHint {
            day: d.day.clone(),
            condition: d.condition.clone(),
            high: d.high,
            rain: d.rain,
            irrigate: d.rain < 20.0 && (moisture < 40.0 || d.high > 28.0),
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::CurrentConditions;
    use proptest::prelude::*;
    use time::macros::datetime;

    fn reading(moisture: f64, temperature: f64) -> Reading {
        Reading {
            device_id: "ESP32_SoilSense_01".into(),
            timestamp: datetime!(2025-06-01 12:00 UTC),
            soil_type: "Loamy".into(),
            temperature,
            moisture,
            nitrogen: 50.0,
            phosphorus: 40.0,
            potassium: 150.0,
            user_texture: "Loamy".into(),
            user_color: "Brown".into(),
            recommendation: String::new(),
        }
    }

    /// Mild current weather (no secondary impact) with the given daily rain.
    fn weather(rain: &[f64]) -> WeatherOutlook {
        let days = ["Today", "Tomorrow", "Wed", "Thu", "Fri"];
        WeatherOutlook {
            current: CurrentConditions {
                temp: 22.0,
                humidity: 60.0,
                condition: "Clear".into(),
            },
            forecast: rain
                .iter()
                .zip(days)
                .map(|(&r, d)| ForecastDay::new(d, 25.0, 15.0, r, "Cloudy"))
                .collect(),
        }
    }

    // -- Scenarios ----------------------------------------------------------

    #[test]
    fn critical_moisture_mild_temp() {
        let rec = decide(&reading(15.0, 22.0), &weather(&[5.0, 5.0, 0.0, 0.0, 0.0]));
        assert!(rec.should_irrigate);
        assert_eq!(rec.urgency, Urgency::High);
        assert_eq!(rec.water_amount, 36);
        assert_eq!(rec.next_irrigation, NextIrrigation::Now);
        assert!(rec.reason.contains("20%"), "reason should cite critical value: {}", rec.reason);
    }

    #[test]
    fn low_moisture_hot_no_rain() {
        let rec = decide(&reading(30.0, 32.0), &weather(&[5.0, 5.0, 0.0, 0.0, 0.0]));
        assert!(rec.should_irrigate);
        assert_eq!(rec.urgency, Urgency::Medium);
        assert_eq!(rec.water_amount, 23);
        assert_eq!(rec.next_irrigation.to_string(), "Now");
    }

    #[test]
    fn warm_multiplier_applies() {
        // (60 - 10) * 0.8 * 1.1 = 44
        let rec = decide(&reading(10.0, 27.0), &weather(&[0.0, 0.0]));
        assert_eq!(rec.water_amount, 44);
    }

    #[test]
    fn low_moisture_rain_expected_delays() {
        let rec = decide(&reading(30.0, 22.0), &weather(&[10.0, 40.0, 0.0, 0.0, 0.0]));
        assert!(!rec.should_irrigate);
        assert_eq!(rec.urgency, Urgency::Low);
        assert_eq!(rec.water_amount, 0);
        assert_eq!(rec.weather_impact, Some(WeatherImpact::RainDelay));
        assert_eq!(
            rec.weather_impact.unwrap().to_string(),
            "Rain expected - irrigation delayed"
        );
        assert_eq!(rec.next_irrigation.to_string(), "After rain (Tomorrow)");
    }

    #[test]
    fn optimal_moisture_holds() {
        let rec = decide(&reading(50.0, 22.0), &weather(&[0.0, 0.0]));
        assert!(!rec.should_irrigate);
        assert_eq!(rec.urgency, Urgency::Low);
        assert_eq!(rec.water_amount, 0);
        assert!(rec.reason.contains("optimal"));
        // (50 - 35) * 2 = 30
        assert_eq!(rec.next_irrigation, NextIrrigation::InHours(30));
        assert_eq!(rec.weather_impact, None);
    }

    #[test]
    fn hours_until_next_has_floor() {
        let rec = decide(&reading(36.0, 22.0), &weather(&[0.0, 0.0]));
        assert_eq!(rec.next_irrigation, NextIrrigation::InHours(6));
        assert_eq!(rec.next_irrigation.to_string(), "In 6 hours");
    }

    #[test]
    fn next_irrigation_labels() {
        assert_eq!(NextIrrigation::AfterRain(None).to_string(), "After rain (Soon)");
        assert_eq!(
            NextIrrigation::AfterRain(Some("Thu".into())).to_string(),
            "After rain (Thu)"
        );
    }

    #[test]
    fn rain_delay_picks_first_wet_day_in_whole_forecast() {
        // Only the first two days count toward the outlook, but the resume
        // label looks at every day.
        let rec = decide(&reading(50.0, 22.0), &weather(&[21.0, 20.0, 90.0]));
        assert_eq!(rec.next_irrigation.to_string(), "After rain (Today)");
    }

    #[test]
    fn above_optimal_clamps_water_to_zero() {
        let rec = decide(&reading(85.0, 35.0), &weather(&[0.0, 0.0]));
        assert_eq!(rec.water_amount, 0);
    }

    // -- Secondary weather impact -------------------------------------------

    #[test]
    fn hot_day_impact() {
        let mut w = weather(&[0.0, 0.0]);
        w.current.temp = 31.0;
        w.current.humidity = 20.0;
        let rec = decide(&reading(50.0, 22.0), &w);
        assert_eq!(rec.weather_impact, Some(WeatherImpact::HighTemperature));
    }

    #[test]
    fn dry_air_impact() {
        let mut w = weather(&[0.0, 0.0]);
        w.current.humidity = 39.0;
        let rec = decide(&reading(50.0, 22.0), &w);
        assert_eq!(rec.weather_impact, Some(WeatherImpact::LowHumidity));
    }

    #[test]
    fn heavy_rain_impact() {
        let rec = decide(&reading(50.0, 22.0), &weather(&[40.0, 30.0]));
        assert_eq!(rec.weather_impact, Some(WeatherImpact::HeavyRain));
        assert_eq!(rec.next_irrigation.to_string(), "After rain (Today)");
    }

    #[test]
    fn rain_delay_is_not_overridden_by_heat() {
        let mut w = weather(&[50.0, 50.0]);
        w.current.temp = 35.0;
        let rec = decide(&reading(25.0, 22.0), &w);
        assert_eq!(rec.weather_impact, Some(WeatherImpact::RainDelay));
    }

    #[test]
    fn default_outlook_low_moisture_irrigates() {
        // Default outlook: 20 + 10 = 30% over two days, not enough to delay.
        let rec = decide(&reading(30.0, 22.0), &WeatherOutlook::default());
        assert_eq!(rec.urgency, Urgency::Medium);
    }

    // -- Forecast hints -----------------------------------------------------

    #[test]
    fn hints_cover_three_days() {
        let hints = forecast_hints(50.0, &WeatherOutlook::default().forecast);
        assert_eq!(hints.len(), 3);
        assert_eq!(hints[0].day, "Today");
        // Today: 20% rain is not < 20.
        assert!(!hints[0].irrigate);
        // Tomorrow: dry and 30 °C high.
        assert!(hints[1].irrigate);
        // Wed: 60% rain.
        assert!(!hints[2].irrigate);
    }

    #[test]
    fn hints_flag_dry_days_when_soil_low() {
        let forecast = vec![ForecastDay::new("Mon", 20.0, 10.0, 5.0, "Clear")];
        assert!(forecast_hints(39.0, &forecast)[0].irrigate);
        assert!(!forecast_hints(40.0, &forecast)[0].irrigate);
    }

    #[test]
    fn hints_short_forecast() {
        assert!(forecast_hints(30.0, &[]).is_empty());
    }

    // -- Serialization ------------------------------------------------------

    #[test]
    fn recommendation_serializes_text_fields() {
        let rec = decide(&reading(30.0, 22.0), &weather(&[10.0, 40.0]));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["urgency"], "low");
        assert_eq!(json["next_irrigation"], "After rain (Tomorrow)");
        assert_eq!(json["weather_impact"], "Rain expected - irrigation delayed");
    }

    // -- Properties ---------------------------------------------------------

    fn any_weather() -> impl Strategy<Value = WeatherOutlook> {
        (
            -10.0..50.0f64,
            0.0..=100.0f64,
            prop::collection::vec(0.0..=100.0f64, 0..=5),
        )
            .prop_map(|(temp, humidity, rain)| {
                let mut w = weather(&rain);
                w.current.temp = temp;
                w.current.humidity = humidity;
                w
            })
    }

    proptest! {
        #[test]
        fn critical_moisture_always_high(
            moisture in 0.0..20.0f64,
            temp in -10.0..50.0f64,
            w in any_weather(),
        ) {
            let rec = decide(&reading(moisture, temp), &w);
            prop_assert_eq!(rec.urgency, Urgency::High);
            prop_assert!(rec.should_irrigate);
        }

        #[test]
        fn adequate_moisture_with_rain_never_irrigates(
            moisture in 35.0..60.0f64,
            temp in -10.0..50.0f64,
            first in 0.0..=100.0f64,
            second in 0.0..=100.0f64,
        ) {
            prop_assume!(first + second > 40.0);
            let rec = decide(&reading(moisture, temp), &weather(&[first, second, 0.0]));
            prop_assert!(!rec.should_irrigate);
            prop_assert!(matches!(rec.next_irrigation, NextIrrigation::AfterRain(_)));
        }

        #[test]
        fn only_irrigating_recommendations_carry_water(
            moisture in -20.0..120.0f64,
            temp in -10.0..50.0f64,
            w in any_weather(),
        ) {
            let rec = decide(&reading(moisture, temp), &w);
            if !rec.should_irrigate {
                prop_assert_eq!(rec.water_amount, 0);
            }
            prop_assert_eq!(rec.should_irrigate, rec.next_irrigation == NextIrrigation::Now);
        }
    }
}
