//! Stateful soil sensor simulator for running the hub without hardware.
//!
//! Models the behaviour of the field sensor closely enough for the decision
//! engines to move through their tiers:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Diurnal (day/night) temperature swing
//! - Occasional moisture spikes (sensor flakiness)
//! - Soil type and advice derived from the user's declared texture/color

use std::fmt;

use serde::Deserialize;
use soilsense_engine::{Preferences, Reading};
use time::OffsetDateTime;

/// Device id reported by simulated samples.
pub const SIM_DEVICE_ID: &str = "sim-soilsense-01";

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles, selected with `source.scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Starts mid-range and dries steadily.  Walks the irrigation engine
    /// from "optimal" down through "medium" and eventually "high".
    #[default]
    Drying,
    /// Hovers near the nominal values.  Good for UI work.
    Stable,
    /// High noise and frequent spikes.
    Flaky,
    /// Saturated, nitrogen-rich plot.  Exercises the nitrate risk tiers.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// One mean-reverting random walk, clamped to the sensor's range.
struct Channel {
    value: f64,
    center: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    min: f64,
    max: f64,
}

impl Channel {
    fn new(center: f64, walk_sigma: f64, mean_reversion: f64, min: f64, max: f64) -> Self {
        Self {
            value: center,
            center,
            walk_sigma,
            mean_reversion,
            min,
            max,
        }
    }

    fn step(&mut self, drift: f64) -> f64 {
        let pull = self.mean_reversion * (self.center - self.value);
        let walk = gaussian(0.0, self.walk_sigma);
        self.value = (self.value + drift + pull + walk).clamp(self.min, self.max);
        self.value
    }
}

// ---------------------------------------------------------------------------
// Main simulator
// ---------------------------------------------------------------------------

pub struct SoilSim {
    temperature: Channel,
    moisture: Channel,
    nitrogen: Channel,
    phosphorus: Channel,
    potassium: Channel,

    /// Moisture change per sample (negative = drying).
    moisture_drift: f64,

    spike_prob: f32,
    spike_sigma: f64,

    diurnal_amplitude: f64,
    diurnal_period_s: f64,
}

impl SoilSim {
    /// `diurnal_period_s` controls the day/night cycle length.  Use 600
    /// (10 min) for fast dev iteration or 86400 for real-time.
    pub fn new(scenario: Scenario, diurnal_period_s: f64) -> Self {
        // (moisture center, moisture drift, walk sigma, mean reversion,
        //  spike prob, spike sigma, nitrogen center)
        let (m_center, drift, walk, rev, spike_prob, spike_sigma, n_center) = match scenario {
            Scenario::Drying => (45.2, -0.4, 0.6, 0.002, 0.02_f32, 4.0, 78.0),
            Scenario::Stable => (45.2, 0.0, 0.3, 0.05, 0.005, 2.0, 78.0),
            Scenario::Flaky => (45.2, -0.1, 1.5, 0.02, 0.10, 10.0, 78.0),
            Scenario::Wet => (72.0, -0.05, 0.4, 0.05, 0.01, 3.0, 105.0),
        };

        Self {
            temperature: Channel::new(24.5, 0.3, 0.05, -10.0, 55.0),
            moisture: Channel::new(m_center, walk, rev, 0.0, 100.0),
            nitrogen: Channel::new(n_center, 1.5, 0.05, 0.0, 400.0),
            phosphorus: Channel::new(42.0, 1.0, 0.05, 0.0, 300.0),
            potassium: Channel::new(156.0, 2.0, 0.05, 0.0, 600.0),
            moisture_drift: drift,
            spike_prob,
            spike_sigma,
            diurnal_amplitude: 4.0,
            diurnal_period_s,
        }
    }

    /// Inform the simulator that water was applied; soil moisture jumps by
    /// `amount` percentage points.
    pub fn add_water(&mut self, amount: f64) {
        self.moisture.value = (self.moisture.value + amount).clamp(0.0, 100.0);
    }

    /// Produce the next reading.  Each call advances every channel one step.
    pub fn sample(&mut self, prefs: &Preferences, now: OffsetDateTime) -> Reading {
        let phase =
            2.0 * std::f64::consts::PI * now.unix_timestamp() as f64 / self.diurnal_period_s;
        let temperature = self.temperature.step(0.0) + self.diurnal_amplitude * phase.sin();

        let mut moisture = self.moisture.step(self.moisture_drift);
        if fastrand::f32() < self.spike_prob {
            moisture += gaussian(0.0, self.spike_sigma);
        }

        let moisture = round1(moisture.clamp(0.0, 100.0));
        let soil_type = soil_type_for_texture(&prefs.texture);

        Reading {
            device_id: SIM_DEVICE_ID.to_string(),
            timestamp: now,
            soil_type: soil_type.to_string(),
            temperature: round1(temperature),
            moisture,
            nitrogen: round1(self.nitrogen.step(0.0)),
            phosphorus: round1(self.phosphorus.step(0.0)),
            potassium: round1(self.potassium.step(0.0)),
            user_texture: prefs.texture.clone(),
            user_color: prefs.color.clone(),
            recommendation: advice(soil_type, &prefs.color, moisture),
        }
    }
}

/// Map the texture a user feels between their fingers to a soil class.
fn soil_type_for_texture(texture: &str) -> &'static str {
    match texture.to_ascii_lowercase().as_str() {
        "gritty" | "sandy" => "Sandy",
        "fine" | "clayey" => "Clayey",
        "smooth-powdery" | "silty" => "Silty",
        _ => "Loamy",
    }
}

fn advice(soil_type: &str, color: &str, moisture: f64) -> String {
    let base = match soil_type {
        "Sandy" => "Sunflower/Millet. Good drainage, needs frequent irrigation.",
        "Clayey" => "Rice/Spinach. Poor drainage, careful irrigation needed.",
        "Silty" => "Wheat/Barley. Fertile but may compact easily.",
        _ => "Maize/Soybean. Balanced soil, moderate irrigation.",
    };
    let note = match color.to_ascii_lowercase().as_str() {
        "brown" => " Good organic content.",
        "black" => " High organic matter, very fertile.",
        "red" => " Iron-rich soil, may need pH adjustment.",
        "yellow" => " Possible drainage issues, may need improvement.",
        "white" => " May be saline or leached, test pH.",
        "grey" => " Poor drainage, may need soil amendments.",
        _ => "",
    };
    format!("{base}{note}{}", moisture_alert(soil_type, moisture))
}

/// Urgency suffix for the advice text.  Sandy and silty soils drain fast,
/// clay holds water but needs it kept higher.
fn moisture_alert(soil_type: &str, moisture: f64) -> &'static str {
    if moisture < 20.0 {
        " CRITICAL - IRRIGATE IMMEDIATELY!"
    } else if moisture < 30.0 {
        " IRRIGATE NOW!"
    } else if (moisture < 50.0 && matches!(soil_type, "Sandy" | "Silty"))
        || (moisture < 60.0 && soil_type == "Clayey")
    {
        " Irrigation recommended."
    } else {
        ""
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn prefs() -> Preferences {
        Preferences {
            texture: "Loamy".into(),
            color: "Brown".into(),
        }
    }

    fn collect_moisture(sim: &mut SoilSim, n: usize) -> Vec<f64> {
        let now = datetime!(2025-06-01 12:00 UTC);
        (0..n).map(|_| sim.sample(&prefs(), now).moisture).collect()
    }

    #[test]
    fn readings_within_sensor_range() {
        let mut sim = SoilSim::new(Scenario::Flaky, 600.0);
        let now = datetime!(2025-06-01 12:00 UTC);
        for _ in 0..500 {
            let r = sim.sample(&prefs(), now);
            assert!((0.0..=100.0).contains(&r.moisture), "moisture out of range: {}", r.moisture);
            assert!(r.nitrogen >= 0.0 && r.phosphorus >= 0.0 && r.potassium >= 0.0);
        }
    }

    #[test]
    fn temporal_coherence() {
        let mut sim = SoilSim::new(Scenario::Stable, 600.0);
        let samples = collect_moisture(&mut sim, 100);
        let max_jump = samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f64::max);
        // Allow for the rare spike.
        assert!(max_jump < 15.0, "max consecutive jump too large: {max_jump}");
    }

    #[test]
    fn drying_scenario_trends_down() {
        let mut sim = SoilSim::new(Scenario::Drying, 600.0);
        let early: f64 = collect_moisture(&mut sim, 10).iter().sum::<f64>() / 10.0;
        collect_moisture(&mut sim, 60);
        let late: f64 = collect_moisture(&mut sim, 10).iter().sum::<f64>() / 10.0;
        assert!(late < early, "drying should lower moisture: early={early:.1} late={late:.1}");
    }

    #[test]
    fn watering_raises_moisture() {
        let mut sim = SoilSim::new(Scenario::Stable, 600.0);
        let before = collect_moisture(&mut sim, 1)[0];
        sim.add_water(30.0);
        let after = collect_moisture(&mut sim, 1)[0];
        assert!(after > before + 15.0, "before={before} after={after}");
    }

    #[test]
    fn wet_scenario_starts_saturated() {
        let mut sim = SoilSim::new(Scenario::Wet, 600.0);
        let avg = collect_moisture(&mut sim, 10).iter().sum::<f64>() / 10.0;
        assert!(avg > 60.0, "wet scenario should start saturated: avg={avg:.1}");
    }

    #[test]
    fn values_rounded_to_one_decimal() {
        let mut sim = SoilSim::new(Scenario::Flaky, 600.0);
        let r = sim.sample(&prefs(), datetime!(2025-06-01 12:00 UTC));
        for v in [r.temperature, r.moisture, r.nitrogen, r.phosphorus, r.potassium] {
            assert!(((v * 10.0).round() - v * 10.0).abs() < 1e-6, "not rounded: {v}");
        }
    }

    #[test]
    fn preferences_flow_into_reading() {
        let mut sim = SoilSim::new(Scenario::Stable, 600.0);
        let p = Preferences {
            texture: "Gritty".into(),
            color: "Red".into(),
        };
        let r = sim.sample(&p, datetime!(2025-06-01 12:00 UTC));
        assert_eq!(r.soil_type, "Sandy");
        assert_eq!(r.user_texture, "Gritty");
        assert_eq!(r.user_color, "Red");
        assert!(r.recommendation.contains("Iron-rich"));
        assert_eq!(r.device_id, SIM_DEVICE_ID);
        assert!(!r.is_placeholder());
    }

    #[test]
    fn advice_alerts_follow_moisture() {
        assert!(advice("Loamy", "Brown", 15.0).ends_with("CRITICAL - IRRIGATE IMMEDIATELY!"));
        assert!(advice("Loamy", "Brown", 25.0).ends_with(" IRRIGATE NOW!"));
        assert_eq!(
            advice("Loamy", "Brown", 45.0),
            "Maize/Soybean. Balanced soil, moderate irrigation. Good organic content."
        );
        assert!(advice("Sandy", "Red", 45.0).ends_with("Irrigation recommended."));
        assert!(advice("Silty", "", 49.9).ends_with("Irrigation recommended."));
        assert!(advice("Clayey", "Grey", 55.0).ends_with("Irrigation recommended."));
        assert!(!advice("Clayey", "Grey", 60.0).contains("Irrigation recommended"));
        assert!(!advice("Sandy", "Red", 50.0).contains("Irrigation recommended"));
    }

    #[test]
    fn drying_plot_advice_turns_urgent() {
        let mut sim = SoilSim::new(Scenario::Drying, 600.0);
        let now = datetime!(2025-06-01 12:00 UTC);
        let urgent = (0..200)
            .map(|_| sim.sample(&prefs(), now))
            .find(|r| r.moisture < 20.0)
            .expect("drying run should reach critical moisture");
        assert!(urgent.recommendation.contains("CRITICAL"), "{}", urgent.recommendation);
    }

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("drying"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy("STABLE"), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy("Flaky"), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("wet"), Scenario::Wet);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Drying);
    }

    #[test]
    fn scenario_display() {
        assert_eq!(Scenario::Drying.to_string(), "drying");
        assert_eq!(Scenario::Wet.to_string(), "wet");
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let n = 5000;
        let mean = (0..n).map(|_| approx_std_normal()).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.15, "mean should be near zero: {mean}");
    }
}
