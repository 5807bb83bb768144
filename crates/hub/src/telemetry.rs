//! Telemetry sources the acquisition controller can poll.
//!
//! The controller only sees the [`TelemetrySource`] trait.  `main` picks the
//! implementation from config: [`HttpSource`] talks to the sensor service,
//! [`SimulatedSource`] runs the in-process soil simulator.  Tests plug in
//! their own scripted fakes.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use soilsense_engine::irrigation::{CRITICAL_MOISTURE, OPTIMAL_MOISTURE};
use soilsense_engine::{Preferences, Reading};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::sim::{Scenario, SoilSim};

/// Message the sensor service returns from `/latest` before its first sample.
const NO_DATA_MESSAGE: &str = "No sensor data yet";

/// Transport-level failures talking to a telemetry source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// `Ok(false)` means reachable but reporting itself unhealthy.
    async fn health(&self) -> Result<bool, SourceError>;

    /// `Ok(None)` is the "no data yet" sentinel of a healthy source.
    async fn latest(&self) -> Result<Option<Reading>, SourceError>;

    async fn update_preferences(&self, prefs: &Preferences) -> Result<(), SourceError>;

    /// Short human-readable name for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// HTTP sensor service
// ---------------------------------------------------------------------------

pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn classify(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout)
        } else if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl TelemetrySource for HttpSource {
    async fn health(&self) -> Result<bool, SourceError> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        debug!(status = resp.status().as_u16(), "health check answered");
        Ok(resp.status().is_success())
    }

    async fn latest(&self) -> Result<Option<Reading>, SourceError> {
        let resp = self
            .client
            .get(self.url("/latest"))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await.map_err(|e| self.classify(e))?;
        parse_latest(body)
    }

    async fn update_preferences(&self, prefs: &Preferences) -> Result<(), SourceError> {
        let resp = self
            .client
            .post(self.url("/preferences"))
            .json(prefs)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}

/// Interpret a `/latest` body: a reading, the "no data yet" message, or junk.
pub(crate) fn parse_latest(body: Value) -> Result<Option<Reading>, SourceError> {
    if body.is_null() {
        return Ok(None);
    }
    if let Some(msg) = body.get("message").and_then(Value::as_str) {
        if msg.contains(NO_DATA_MESSAGE) {
            return Ok(None);
        }
        return Err(SourceError::Decode(format!("unexpected message '{msg}'")));
    }
    let reading: Reading =
        serde_json::from_value(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    reading.check_ranges().map_err(SourceError::Decode)?;
    Ok(Some(reading))
}

// ---------------------------------------------------------------------------
// In-process simulator
// ---------------------------------------------------------------------------

pub struct SimulatedSource {
    scenario: Scenario,
    sim: Mutex<SoilSim>,
    prefs: Mutex<Preferences>,
}

impl SimulatedSource {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            sim: Mutex::new(SoilSim::new(scenario, 600.0)),
            prefs: Mutex::new(Preferences {
                texture: "Loamy".to_string(),
                color: "Brown".to_string(),
            }),
        }
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    async fn health(&self) -> Result<bool, SourceError> {
        Ok(true)
    }

    async fn latest(&self) -> Result<Option<Reading>, SourceError> {
        let prefs = self
            .prefs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut sim = self.sim.lock().unwrap_or_else(PoisonError::into_inner);
        let reading = sim.sample(&prefs, OffsetDateTime::now_utc());
        // Simulated grower: water back to optimal once the plot goes critical.
        if reading.moisture < CRITICAL_MOISTURE {
            sim.add_water(OPTIMAL_MOISTURE - reading.moisture);
        }
        Ok(Some(reading))
    }

    async fn update_preferences(&self, prefs: &Preferences) -> Result<(), SourceError> {
        *self.prefs.lock().unwrap_or_else(PoisonError::into_inner) = prefs.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulator ({})", self.scenario)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
