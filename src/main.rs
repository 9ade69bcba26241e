//! Geoguard - real-time tourist safety monitoring engine
//!
//! Continuous location monitoring against registered safe zones, with
//! automatic alert escalation after sustained absence and a manual panic
//! path sharing the same persistence and broadcast infrastructure.
//!
//! Module structure:
//! - `domain/` - Core business types (SafeZone, Alert, SafetyStatus)
//! - `io/` - External interfaces (HTTP API, broadcast bus, store, notify)
//! - `services/` - Business logic (SafetyMonitor, PanicIntake, Escalation)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use geoguard::infra::{Config, Metrics};
use geoguard::io::http::{ApiState, StaticTokenAuth};
use geoguard::io::{
    EventBus, HttpNotifier, MemoryContacts, MemoryStore, NotificationSink, NullNotifier,
};
use geoguard::services::{
    AcknowledgmentHandler, EscalationEngine, IncidentHandler, PanicIntake, SafeZoneRegistry,
    SafetyMonitor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geoguard - tourist safety monitoring engine
#[derive(Parser, Debug)]
#[command(name = "geoguard", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(build = %env!("GIT_HASH"), "geoguard starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        http_port = %config.http_port(),
        status_ttl_secs = %config.status_ttl_secs(),
        rate_window_secs = %config.rate_window_secs(),
        notify_enabled = %config.notify_enabled(),
        seed_zones = %config.seed_zones().len(),
        auth_tokens = %config.auth_tokens().len(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let bus = EventBus::new(256).with_metrics(metrics.clone());
    let store = Arc::new(MemoryStore::new());
    let contacts = Arc::new(MemoryContacts::new());

    let notifier: Arc<dyn NotificationSink> = if config.notify_enabled() {
        Arc::new(HttpNotifier::new(config.notify_url().to_string(), config.notify_timeout_ms()))
    } else {
        Arc::new(NullNotifier)
    };

    // Seed safe zones from config; a bad seed zone is a startup error
    let registry = Arc::new(SafeZoneRegistry::new());
    registry.seed(config.seed_zones())?;

    let escalation = EscalationEngine::new(store.clone(), bus.clone(), notifier.clone(), metrics.clone());
    let monitor = SafetyMonitor::new(
        registry.clone(),
        escalation,
        bus.clone(),
        metrics.clone(),
        config.status_ttl_secs(),
    );

    let panic = Arc::new(PanicIntake::new(
        store.clone(),
        store.clone(),
        contacts,
        bus.clone(),
        notifier,
        metrics.clone(),
        config.rate_window_secs(),
    ));
    let ack = Arc::new(AcknowledgmentHandler::new(store.clone()));
    let incidents = Arc::new(IncidentHandler::new(store.clone(), bus.clone()));

    // Location sample channel (bounded for backpressure)
    let (sample_tx, sample_rx) = mpsc::channel(config.channel_capacity());

    // Start HTTP API server
    let addr: SocketAddr =
        format!("{}:{}", config.http_bind_address(), config.http_port()).parse()?;
    let api_state = ApiState {
        sample_tx,
        statuses: monitor.statuses(),
        registry,
        panic,
        ack,
        incidents,
        alerts: store,
        bus,
        auth: Arc::new(StaticTokenAuth::new(config.auth_tokens().clone())),
        metrics: metrics.clone(),
        site_id: Arc::new(config.site_id().to_string()),
    };
    let api_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = geoguard::io::http::start_api_server(addr, api_state, api_shutdown).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run monitor - consumes location samples until the channel closes
    info!("monitor_started");
    monitor.run(sample_rx).await;

    info!("geoguard shutdown complete");
    Ok(())
}
