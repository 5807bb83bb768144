//! Short-term weather outlook consumed by the irrigation engine.

use serde::{Deserialize, Serialize};

/// Number of leading forecast days summed into the rain outlook.
pub const RAIN_OUTLOOK_DAYS: usize = 2;

/// Rain outlook (summed %) above which rain counts as expected.
pub const RAIN_EXPECTED_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// °C
    pub temp: f64,
    /// Relative humidity, %.
    pub humidity: f64,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub day: String,
    pub high: f64,
    pub low: f64,
    /// Probability of rain, %.
    pub rain: f64,
    pub condition: String,
}

impl ForecastDay {
    pub fn new(day: &str, high: f64, low: f64, rain: f64, condition: &str) -> Self {
        Self {
            day: day.to_string(),
            high,
            low,
            rain,
            condition: condition.to_string(),
        }
    }
}

/// Current conditions plus an ordered multi-day forecast, today first.
/// Either half may be omitted when deserializing; it falls back to the
/// default outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherOutlook {
    pub current: CurrentConditions,
    pub forecast: Vec<ForecastDay>,
}

impl WeatherOutlook {
    /// Sum of rain probability over the first two forecast days.  Shorter
    /// forecasts sum what they have.
    pub fn rain_outlook(&self) -> f64 {
        self.forecast
            .iter()
            .take(RAIN_OUTLOOK_DAYS)
            .map(|d| d.rain)
            .sum()
    }

    pub fn rain_expected(&self) -> bool {
        self.rain_outlook() > RAIN_EXPECTED_THRESHOLD
    }
}

impl Default for WeatherOutlook {
    fn default() -> Self {
        Self {
            current: CurrentConditions {
                temp: 26.0,
                humidity: 68.0,
                condition: "Partly Cloudy".to_string(),
            },
            forecast: vec![
                ForecastDay::new("Today", 28.0, 18.0, 20.0, "Sunny"),
                ForecastDay::new("Tomorrow", 30.0, 20.0, 10.0, "Clear"),
                ForecastDay::new("Wed", 27.0, 19.0, 60.0, "Rainy"),
                ForecastDay::new("Thu", 25.0, 17.0, 80.0, "Storms"),
                ForecastDay::new("Fri", 29.0, 21.0, 15.0, "Sunny"),
            ],
        }
    }
}
