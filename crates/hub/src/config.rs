//! TOML config file loading, validation, and environment overrides for the
//! telemetry source, polling cadence, weather outlook, and web server.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use soilsense_engine::weather::RAIN_OUTLOOK_DAYS;
use soilsense_engine::{ForecastDay, WeatherOutlook};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::acquisition::PollSettings;
use crate::sim::Scenario;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceSection,
    pub polling: PollingSection,
    pub weather: WeatherOutlook,
    pub web: WebSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Http,
    Sim,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub kind: SourceKind,
    pub base_url: String,
    pub scenario: Scenario,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: SourceKind::Http,
            base_url: "http://localhost:8000".to_string(),
            scenario: Scenario::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    /// 0 disables the recurring timer.
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            request_timeout_ms: 5000,
        }
    }
}

impl PollingSection {
    pub fn settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_source(&mut errors);
        self.validate_polling(&mut errors);
        self.validate_weather(&mut errors);

        if self.web.port == 0 {
            errors.push("web: port must not be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_source(&self, errors: &mut Vec<String>) {
        // The simulator never dials out, so its URL is irrelevant.
        if self.source.kind != SourceKind::Http {
            return;
        }
        let url = self.source.base_url.trim();
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"));
        match rest {
            None => errors.push(format!(
                "source: base_url '{url}' must start with http:// or https://"
            )),
            Some(host) if host.trim_matches('/').is_empty() => {
                errors.push(format!("source: base_url '{url}' has no host"));
            }
            Some(_) => {}
        }
    }

    fn validate_polling(&self, errors: &mut Vec<String>) {
        if self.polling.request_timeout_ms == 0 {
            errors.push("polling: request_timeout_ms must be > 0".to_string());
        }
    }

    fn validate_weather(&self, errors: &mut Vec<String>) {
        let current = &self.weather.current;
        if !(0.0..=100.0).contains(&current.humidity) {
            errors.push(format!(
                "weather.current: humidity {} out of range [0, 100]",
                current.humidity
            ));
        }

        if self.weather.forecast.len() < RAIN_OUTLOOK_DAYS {
            errors.push(format!(
                "weather: forecast has {} day(s), need at least {RAIN_OUTLOOK_DAYS}",
                self.weather.forecast.len()
            ));
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (i, d) in self.weather.forecast.iter().enumerate() {
            let ctx = || {
                if d.day.trim().is_empty() {
                    format!("weather.forecast[{i}]")
                } else {
                    format!("forecast day '{}'", d.day)
                }
            };

            if d.day.trim().is_empty() {
                errors.push(format!("{}: day label is empty", ctx()));
            } else if let Some(first) = seen.insert(&d.day, i) {
                errors.push(format!(
                    "{}: duplicate day label (also at index {first})",
                    ctx()
                ));
            }

            if !(0.0..=100.0).contains(&d.rain) {
                errors.push(format!(
                    "{}: rain {} out of range [0, 100]",
                    ctx(),
                    d.rain
                ));
            }
            if d.high < d.low {
                errors.push(format!(
                    "{}: high ({}) must be >= low ({})",
                    ctx(),
                    d.high,
                    d.low
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Like [`load`], but a missing file means "all defaults".  Environment
/// overrides are applied and the result validated again.
pub fn load_or_default(path: &str) -> Result<Config> {
    let mut config = if Path::new(path).exists() {
        load(path)?
    } else {
        tracing::info!(path, "config file not found, using defaults");
        Config::default()
    };

    let vars: HashMap<String, String> = std::env::vars().collect();
    apply_env_overrides(&mut config, &vars)?;
    config
        .validate()
        .context("invalid config after environment overrides")?;
    Ok(config)
}

/// Apply `SOURCE_URL`, `SOURCE_KIND`, `SIM_SCENARIO`, `POLL_INTERVAL_MS`,
/// `REQUEST_TIMEOUT_MS` and `WEB_PORT` on top of the file.
pub fn apply_env_overrides(config: &mut Config, vars: &HashMap<String, String>) -> Result<()> {
    if let Some(url) = vars.get("SOURCE_URL") {
        config.source.base_url = url.clone();
    }
    if let Some(kind) = vars.get("SOURCE_KIND") {
        config.source.kind = match kind.trim().to_ascii_lowercase().as_str() {
            "http" => SourceKind::Http,
            "sim" => SourceKind::Sim,
            other => bail!("SOURCE_KIND '{other}' is not one of http, sim"),
        };
    }
    if let Some(s) = vars.get("SIM_SCENARIO") {
        config.source.scenario = Scenario::from_str_lossy(s.trim());
    }
    if let Some(v) = vars.get("POLL_INTERVAL_MS") {
        config.polling.interval_ms = v
            .trim()
            .parse()
            .with_context(|| format!("POLL_INTERVAL_MS '{v}' is not a number"))?;
    }
    if let Some(v) = vars.get("REQUEST_TIMEOUT_MS") {
        config.polling.request_timeout_ms = v
            .trim()
            .parse()
            .with_context(|| format!("REQUEST_TIMEOUT_MS '{v}' is not a number"))?;
    }
    if let Some(v) = vars.get("WEB_PORT") {
        config.web.port = v
            .trim()
            .parse()
            .with_context(|| format!("WEB_PORT '{v}' is not a port number"))?;
    }
    Ok(())
}

/// Forecast days straight from config, for logging at startup.
pub fn forecast_labels(forecast: &[ForecastDay]) -> String {
    forecast
        .iter()
        .map(|d| d.day.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ===========================================================================
// Tests
// ===========================================================================
