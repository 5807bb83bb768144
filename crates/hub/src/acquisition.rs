//! Acquisition controller: polls the telemetry source on a timer and keeps
//! the shared controller state current.
//!
//! Each cycle checks health, then fetches the latest reading and commits the
//! outcome.  Cycles never overlap: a timer tick that finds one in flight is
//! dropped, a manual refresh waits its turn.  Every state write goes through
//! [`Controller::commit`], which re-checks the active flag after acquiring
//! the lock so nothing lands once [`Controller::shutdown`] has run.
//!
//! ```text
//! tick ──▶ health ──ok──▶ latest ──reading──▶ accept (history, last_updated)
//!             │              ├──no data──▶ placeholder (display only)
//!             └──err─────────┴──err──────▶ error + Disconnected
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use soilsense_engine::{Preferences, WeatherOutlook};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::{ControllerState, SharedState, StatusResponse};
use crate::telemetry::{SourceError, TelemetrySource};

/// Failures surfaced to the user.  `Display` is the text shown in the UI.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Failed to fetch sensor data: {0}")]
    Network(SourceError),
    #[error("Failed to update preferences: {0}")]
    PreferenceUpdate(SourceError),
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Zero disables the recurring timer.
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            request_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct Controller {
    source: Arc<dyn TelemetrySource>,
    shared: SharedState,
    settings: PollSettings,
    cycle: Mutex<()>,
    active: watch::Sender<bool>,
}

impl Controller {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        shared: SharedState,
        settings: PollSettings,
    ) -> Arc<Self> {
        let (active, _) = watch::channel(true);
        Arc::new(Self {
            source,
            shared,
            settings,
            cycle: Mutex::new(()),
            active,
        })
    }

    /// Start polling: one immediate cycle, then one per interval until
    /// [`shutdown`](Self::shutdown).  With a zero interval the task ends
    /// after the first cycle; manual refreshes keep working.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut stop = self.active.subscribe();

        tokio::spawn(async move {
            let interval = this.settings.interval;
            info!(
                source = %this.source.describe(),
                interval_ms = interval.as_millis() as u64,
                request_timeout_ms = this.settings.request_timeout.as_millis() as u64,
                "poller started"
            );
            if !this.is_active() {
                return;
            }

            tokio::select! {
                _ = this.refresh() => {}
                _ = stop.changed() => return,
            }

            if interval.is_zero() {
                info!("recurring polling disabled, manual refresh only");
                return;
            }

            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.changed() => break,
                }
                // Dropping the cycle future aborts its in-flight request.
                tokio::select! {
                    _ = this.poll_once() => {}
                    _ = stop.changed() => break,
                }
            }

            info!("poller stopped");
        })
    }

    /// Timer entry point.  Skipped when a cycle is already running.
    pub async fn poll_once(&self) {
        let Ok(_guard) = self.cycle.try_lock() else {
            debug!("cycle in flight, skipping tick");
            return;
        };
        self.run_cycle().await;
    }

    /// Run one cycle now, after any cycle already in flight.  The loading
    /// flag is raised for the duration; the cycle's outcome commit lowers it,
    /// so a refresh dropped mid-cycle is cleared by the next completed cycle.
    pub async fn refresh(&self) {
        let _guard = self.cycle.lock().await;
        self.commit(|st| st.loading = true).await;
        self.run_cycle().await;
    }

    /// Push soil preferences to the source.  On success a refresh follows so
    /// the new recommendation text shows up; on failure the error is
    /// recorded and `false` returned.
    pub async fn update_preferences(&self, prefs: &Preferences) -> bool {
        let result = self.call(self.source.update_preferences(prefs)).await;
        match result {
            Ok(()) => {
                info!(texture = %prefs.texture, color = %prefs.color, "preferences updated");
                self.commit(|st| st.record_preferences(&prefs.texture, &prefs.color))
                    .await;
                self.refresh().await;
                true
            }
            Err(e) => {
                let err = AcquisitionError::PreferenceUpdate(e);
                warn!("{err}");
                self.commit(|st| st.record_error(err.to_string())).await;
                false
            }
        }
    }

    /// Stop the timer and block every later state write, including those of
    /// requests still in flight.
    pub fn shutdown(&self) {
        if self.active.send_replace(false) {
            info!("poller shutting down");
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub async fn snapshot(&self, weather: &WeatherOutlook) -> StatusResponse {
        self.shared.read().await.to_status(weather)
    }

    pub async fn last_error(&self) -> Option<String> {
        self.shared.read().await.error.clone()
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    async fn run_cycle(&self) {
        if !self.commit(|st| st.error = None).await {
            return;
        }

        let health = match self.call(self.source.health()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SourceError::Network("health check failed".to_string())),
            Err(e) => Err(e),
        };
        if let Err(e) = health {
            self.fail(e).await;
            return;
        }

        let latest = self.call(self.source.latest()).await;
        let now = OffsetDateTime::now_utc();
        match latest {
            Ok(Some(reading)) => {
                info!(
                    device = %reading.device_id,
                    moisture = reading.moisture,
                    temperature = reading.temperature,
                    nitrogen = reading.nitrogen,
                    "reading accepted"
                );
                self.commit(|st| {
                    st.accept_reading(reading, now);
                    st.loading = false;
                })
                .await;
            }
            Ok(None) => {
                debug!("source has no data yet");
                self.commit(|st| {
                    st.show_placeholder(now);
                    st.loading = false;
                })
                .await;
            }
            Err(e) => self.fail(e).await,
        }
    }

    async fn fail(&self, cause: SourceError) {
        let err = AcquisitionError::Network(cause);
        warn!("{err}");
        self.commit(|st| {
            st.record_failure(err.to_string());
            st.loading = false;
        })
        .await;
    }

    /// Bound a source call by the request timeout.
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        let limit = self.settings.request_timeout;
        tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(SourceError::Timeout(limit)))
    }

    /// Apply `f` to the shared state unless the controller was shut down.
    /// Returns whether the write happened.
    async fn commit(&self, f: impl FnOnce(&mut ControllerState)) -> bool {
        let mut st = self.shared.write().await;
        if !self.is_active() {
            debug!("controller inactive, dropping state update");
            return false;
        }
        f(&mut *st);
        true
    }
}

// ===========================================================================
// Tests
// ===========================================================================
