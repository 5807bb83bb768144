use serde::Serialize;
use soilsense_engine::{
    assess, decide, forecast_hints, DayHint, IrrigationRecommendation, NitrateRisk, Reading,
    ReadingState, WeatherOutlook,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

/// Number of accepted readings kept for the trend charts.
pub const HISTORY_CAPACITY: usize = 20;

/// The sensor has no pH channel yet; history rows carry a fixed value.
pub const PH_PLACEHOLDER: f64 = 6.8;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<ControllerState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

pub struct ControllerState {
    pub started_at: Instant,
    pub reading: ReadingState,
    pub connectivity: Connectivity,
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<OffsetDateTime>,
    pub history: HistoryBuffer,
    pub events: VecDeque<SystemEvent>,
}

/// One point on the trend charts, derived from an accepted reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Wall-clock label, `HH:MM` UTC.
    pub time: String,
    pub temperature: f64,
    pub moisture: f64,
    pub ph: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

impl HistoryEntry {
    pub fn from_reading(r: &Reading) -> Self {
        let time = r
            .timestamp
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_else(|_| "--:--".to_string());
        Self {
            time,
            temperature: r.temperature,
            moisture: r.moisture,
            ph: PH_PLACEHOLDER,
            nitrogen: r.nitrogen,
            phosphorus: r.phosphorus,
            potassium: r.potassium,
        }
    }
}

/// FIFO of the most recent [`HISTORY_CAPACITY`] entries, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct HistoryBuffer(VecDeque<HistoryEntry>);

impl HistoryBuffer {
    /// Append an entry, returning the one evicted to stay within capacity.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.0.len() >= HISTORY_CAPACITY {
            self.0.pop_front()
        } else {
            None
        };
        self.0.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Placeholder,
    Preferences,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub reading: ReadingState,
    pub connectivity: Connectivity,
    pub loading: bool,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    pub history: HistoryBuffer,
    pub weather: WeatherOutlook,
    pub irrigation: Option<IrrigationRecommendation>,
    pub nitrate: Option<NitrateRisk>,
    pub forecast_hints: Vec<DayHint>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl ControllerState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            reading: ReadingState::Absent,
            connectivity: Connectivity::Disconnected,
            loading: true,
            error: None,
            last_updated: None,
            history: HistoryBuffer::default(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Accept genuine telemetry: replace the reading, stamp the update time
    /// and extend the history.
    pub fn accept_reading(&mut self, reading: Reading, now: OffsetDateTime) {
        let detail = format!(
            "{}: moisture={}% temp={}°C N={} P={} K={}",
            reading.device_id,
            reading.moisture,
            reading.temperature,
            reading.nitrogen,
            reading.phosphorus,
            reading.potassium
        );

        self.history.push(HistoryEntry::from_reading(&reading));
        self.reading = ReadingState::Real(reading);
        self.last_updated = Some(now);
        self.connectivity = Connectivity::Connected;

        self.push_event(EventKind::Reading, detail);
    }

    /// Show nominal values while the source has nothing yet.  Real data that
    /// was already accepted stays on screen.  Returns whether it was shown.
    pub fn show_placeholder(&mut self, now: OffsetDateTime) -> bool {
        self.connectivity = Connectivity::Connected;
        if self.reading.is_real() {
            return false;
        }
        let first = matches!(self.reading, ReadingState::Absent);
        self.reading = ReadingState::Placeholder(Reading::placeholder(now));
        if first {
            self.push_event(
                EventKind::Placeholder,
                "source has no data yet, showing nominal values".to_string(),
            );
        }
        true
    }

    /// Record a failed cycle.  The reading and history are left untouched.
    pub fn record_failure(&mut self, message: String) {
        self.connectivity = Connectivity::Disconnected;
        self.error = Some(message.clone());
        self.push_event(EventKind::Error, message);
    }

    /// Record an error that does not affect connectivity.
    pub fn record_error(&mut self, message: String) {
        self.error = Some(message.clone());
        self.push_event(EventKind::Error, message);
    }

    /// Record accepted user soil preferences.
    pub fn record_preferences(&mut self, texture: &str, color: &str) {
        self.push_event(
            EventKind::Preferences,
            format!("preferences set: texture={texture} color={color}"),
        );
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.  Recommendations are
    /// recomputed from the current reading on every call.
    pub fn to_status(&self, weather: &WeatherOutlook) -> StatusResponse {
        let reading = self.reading.reading();
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            reading: self.reading.clone(),
            connectivity: self.connectivity,
            loading: self.loading,
            error: self.error.clone(),
            last_updated: self.last_updated,
            history: self.history.clone(),
            weather: weather.clone(),
            irrigation: reading.map(|r| decide(r, weather)),
            nitrate: reading.map(|r| assess(r.nitrogen, r.moisture)),
            forecast_hints: reading
                .map(|r| forecast_hints(r.moisture, &weather.forecast))
                .unwrap_or_default(),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
