mod acquisition;
mod config;
mod sim;
mod state;
mod telemetry;
mod web;

use anyhow::Result;
use std::{env, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acquisition::Controller;
use config::SourceKind;
use state::ControllerState;
use telemetry::{HttpSource, SimulatedSource, TelemetrySource};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // ── Config file + env overrides ──────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load_or_default(&config_path)?;

    info!(
        path = %config_path,
        source = ?cfg.source.kind,
        interval_ms = cfg.polling.interval_ms,
        forecast = %config::forecast_labels(&cfg.weather.forecast),
        "config loaded"
    );

    // ── Telemetry source ─────────────────────────────────────────────
    let settings = cfg.polling.settings();
    let source: Arc<dyn TelemetrySource> = match cfg.source.kind {
        SourceKind::Http => Arc::new(HttpSource::new(
            &cfg.source.base_url,
            settings.request_timeout,
        )?),
        SourceKind::Sim => Arc::new(SimulatedSource::new(cfg.source.scenario)),
    };

    // ── Shared state + controller ────────────────────────────────────
    let shared = Arc::new(RwLock::new(ControllerState::new()));
    {
        let mut st = shared.write().await;
        st.record_system(format!("hub started, source: {}", source.describe()));
    }

    let controller = Controller::new(source, Arc::clone(&shared), settings);
    let poller = controller.spawn();

    // ── Web server ───────────────────────────────────────────────────
    let app = web::AppState {
        controller: Arc::clone(&controller),
        weather: Arc::new(cfg.weather),
    };
    let ctl = Arc::clone(&controller);
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
        info!("ctrl-c received, shutting down");
        ctl.shutdown();
    };

    web::serve(app, cfg.web.port, shutdown).await?;

    // Server only returns after shutdown (or on error); make sure the
    // poller is stopped either way.
    controller.shutdown();
    if let Err(e) = poller.await {
        tracing::warn!("poller task ended abnormally: {e}");
    }

    info!("hub stopped");
    Ok(())
}

/// Install the global subscriber.  `RUST_LOG` wins; otherwise `info`.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .compact()
        .init();
}
