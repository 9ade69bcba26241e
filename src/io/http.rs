//! HTTP API server
//!
//! Bearer-token authenticated JSON API over hyper, plus the unauthenticated
//! /health and /metrics endpoints. One spawned task per connection.

use crate::domain::error::EngineError;
use crate::domain::types::{Actor, GeoPoint, LocationSample, Role, SubjectId, ZoneId};
use crate::domain::alert::{AlertId, IncidentId};
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::io::store::AlertStore;
use crate::services::acknowledge::AcknowledgmentHandler;
use crate::services::incidents::IncidentHandler;
use crate::services::monitor::StatusMap;
use crate::services::panic::PanicIntake;
use crate::services::registry::{SafeZoneRegistry, ZoneSpec};
use crate::io::broadcast::EventBus;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Resolves bearer tokens to verified actors
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Actor>;
}

/// Static token table loaded from config
pub struct StaticTokenAuth {
    tokens: HashMap<String, Actor>,
}

impl StaticTokenAuth {
    pub fn new(tokens: HashMap<String, Actor>) -> Self {
        Self { tokens }
    }
}

impl Authenticator for StaticTokenAuth {
    fn authenticate(&self, token: &str) -> Option<Actor> {
        self.tokens.get(token).cloned()
    }
}

/// Shared handles for request handlers, cloned per connection
#[derive(Clone)]
pub struct ApiState {
    pub sample_tx: mpsc::Sender<LocationSample>,
    pub statuses: StatusMap,
    pub registry: Arc<SafeZoneRegistry>,
    pub panic: Arc<PanicIntake>,
    pub ack: Arc<AcknowledgmentHandler>,
    pub incidents: Arc<IncidentHandler>,
    pub alerts: Arc<dyn AlertStore>,
    pub bus: EventBus,
    pub auth: Arc<dyn Authenticator>,
    pub metrics: Arc<Metrics>,
    pub site_id: Arc<String>,
}

#[derive(Debug, Deserialize)]
struct LocationRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PanicRequest {
    lat: f64,
    lng: f64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

type ApiResponse = Response<Full<Bytes>>;

fn json_response(status: StatusCode, body: serde_json::Value) -> ApiResponse {
    let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .expect("static response should not fail")
}

fn error_response(err: &EngineError) -> ApiResponse {
    json_response(err.status(), serde_json::json!({ "error": err.to_string() }))
}

fn not_found() -> ApiResponse {
    json_response(StatusCode::NOT_FOUND, serde_json::json!({ "error": "not found" }))
}

/// Extract and verify the bearer token
fn authenticate(req: &Request<Incoming>, auth: &dyn Authenticator) -> Result<Actor, EngineError> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(EngineError::Auth)?;
    let token = header.strip_prefix("Bearer ").ok_or(EngineError::Auth)?;
    auth.authenticate(token).ok_or(EngineError::Auth)
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, EngineError> {
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| EngineError::Validation(format!("failed to read body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&body)
        .map_err(|e| EngineError::Validation(format!("invalid json body: {e}")))
}

/// Parse a query string of numeric parameters. No percent-decoding, the
/// accepted values are plain numbers.
fn query_params(uri: &hyper::Uri) -> HashMap<&str, &str> {
    uri.query()
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

async fn handle_location(state: &ApiState, actor: Actor, req: Request<Incoming>) -> ApiResponse {
    let body: LocationRequest = match read_json(req).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    let sample = LocationSample {
        subject_id: actor.id,
        point: GeoPoint::new(body.lat, body.lng),
        speed: body.speed,
        accuracy: body.accuracy,
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
    };

    if !sample.point.is_valid() {
        return error_response(&EngineError::Validation(
            "latitude/longitude out of range".to_string(),
        ));
    }

    match state.sample_tx.try_send(sample) {
        Ok(()) => json_response(StatusCode::ACCEPTED, serde_json::json!({ "accepted": true })),
        Err(_) => {
            warn!("sample_channel_full");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": "ingestion overloaded" }),
            )
        }
    }
}

fn handle_safety_status(state: &ApiState, subject: &str) -> ApiResponse {
    let statuses = state.statuses.read();
    match statuses.get(&SubjectId::from(subject)) {
        Some(status) => match serde_json::to_value(status) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                error!(error = %e, "status_serialize_failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "serialization failed" }),
                )
            }
        },
        None => error_response(&EngineError::NotFound(format!("no status for {subject}"))),
    }
}

async fn handle_panic(state: &ApiState, actor: Actor, req: Request<Incoming>) -> ApiResponse {
    let body: PanicRequest = match read_json(req).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    match state.panic.submit(actor.id, body.lat, body.lng, body.message, body.timestamp).await {
        Ok(outcome) => json_response(
            StatusCode::CREATED,
            serde_json::json!({
                "alert": outcome.alert,
                "incident": outcome.incident,
            }),
        ),
        Err(e) => error_response(&e),
    }
}

async fn handle_recent_alerts(state: &ApiState) -> ApiResponse {
    match state.alerts.recent_alerts(50).await {
        Ok(alerts) => json_response(StatusCode::OK, serde_json::json!({ "alerts": alerts })),
        Err(e) => error_response(&EngineError::Store(e)),
    }
}

/// Parse center and radius for the nearby query. A missing radius_m falls
/// back to 1000 m; a radius_m that is present but unparseable or non-positive
/// is an error, not a silent fallback.
fn parse_nearby_params(uri: &hyper::Uri) -> Result<(GeoPoint, f64), EngineError> {
    let params = query_params(uri);
    let lat = params.get("lat").and_then(|v| v.parse::<f64>().ok());
    let lng = params.get("lng").and_then(|v| v.parse::<f64>().ok());

    let (lat, lng) = match (lat, lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => {
            return Err(EngineError::Validation(
                "lat and lng query parameters are required".to_string(),
            ));
        }
    };

    let radius_m = match params.get("radius_m") {
        None => 1000.0,
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|r| *r > 0.0)
            .ok_or_else(|| {
                EngineError::Validation("radius_m must be a positive number".to_string())
            })?,
    };

    let center = GeoPoint::new(lat, lng);
    if !center.is_valid() {
        return Err(EngineError::Validation("latitude/longitude out of range".to_string()));
    }

    Ok((center, radius_m))
}

async fn handle_nearby_alerts(state: &ApiState, uri: &hyper::Uri) -> ApiResponse {
    let (center, radius_m) = match parse_nearby_params(uri) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(&e),
    };

    match state.alerts.find_within_radius(center, radius_m, 100).await {
        Ok(alerts) => json_response(StatusCode::OK, serde_json::json!({ "alerts": alerts })),
        Err(e) => error_response(&EngineError::Store(e)),
    }
}

async fn handle_ack(state: &ApiState, actor: Actor, id: &str) -> ApiResponse {
    let alert_id = match id.parse::<Uuid>() {
        Ok(uuid) => AlertId(uuid),
        Err(_) => {
            return error_response(&EngineError::Validation("invalid alert id".to_string()));
        }
    };

    match state.ack.acknowledge(alert_id, &actor).await {
        Ok(alert) => {
            state.metrics.record_ack();
            json_response(StatusCode::OK, serde_json::json!({ "alert": alert }))
        }
        Err(e) => error_response(&e),
    }
}

async fn handle_recent_incidents(state: &ApiState) -> ApiResponse {
    match state.incidents.recent(50).await {
        Ok(incidents) => {
            json_response(StatusCode::OK, serde_json::json!({ "incidents": incidents }))
        }
        Err(e) => error_response(&e),
    }
}

async fn handle_incident_transition(
    state: &ApiState,
    actor: Actor,
    id: &str,
    resolve: bool,
) -> ApiResponse {
    let incident_id = match id.parse::<Uuid>() {
        Ok(uuid) => IncidentId(uuid),
        Err(_) => {
            return error_response(&EngineError::Validation("invalid incident id".to_string()));
        }
    };

    let result = if resolve {
        state.incidents.resolve(incident_id, &actor).await
    } else {
        state.incidents.acknowledge(incident_id, &actor).await
    };

    match result {
        Ok(incident) => json_response(StatusCode::OK, serde_json::json!({ "incident": incident })),
        Err(e) => error_response(&e),
    }
}

fn handle_list_zones(state: &ApiState) -> ApiResponse {
    let zones = state.registry.list_active();
    json_response(StatusCode::OK, serde_json::json!({ "zones": zones }))
}

async fn handle_create_zone(
    state: &ApiState,
    actor: Actor,
    req: Request<Incoming>,
) -> ApiResponse {
    if actor.role != Role::Admin {
        return error_response(&EngineError::Forbidden);
    }

    let spec: ZoneSpec = match read_json(req).await {
        Ok(spec) => spec,
        Err(e) => return error_response(&e),
    };

    match state.registry.create(spec) {
        Ok(zone) => {
            state.bus.safe_zone_created(&zone);
            json_response(StatusCode::CREATED, serde_json::json!({ "zone": zone }))
        }
        Err(e) => error_response(&e),
    }
}

fn handle_delete_zone(state: &ApiState, actor: Actor, id: &str) -> ApiResponse {
    if actor.role != Role::Admin {
        return error_response(&EngineError::Forbidden);
    }

    let zone_id = match id.parse::<Uuid>() {
        Ok(uuid) => ZoneId(uuid),
        Err(_) => {
            return error_response(&EngineError::Validation("invalid zone id".to_string()));
        }
    };

    match state.registry.deactivate(zone_id) {
        Ok(()) => {
            state.bus.safe_zone_deleted(zone_id);
            json_response(StatusCode::OK, serde_json::json!({ "deleted": true }))
        }
        Err(e) => error_response(&e),
    }
}

async fn handle_request(req: Request<Incoming>, state: ApiState) -> Result<ApiResponse, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // Unauthenticated endpoints
    match (&method, path.as_str()) {
        (&Method::GET, "/health") => {
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("ok")))
                .expect("static response should not fail"));
        }
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&state.metrics, &state.site_id);
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"));
        }
        _ => {}
    }

    let actor = match authenticate(&req, state.auth.as_ref()) {
        Ok(actor) => actor,
        Err(e) => return Ok(error_response(&e)),
    };

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/api/location") => handle_location(&state, actor, req).await,
        (&Method::POST, "/api/panic") => handle_panic(&state, actor, req).await,
        (&Method::GET, "/api/panic-alerts") => handle_recent_alerts(&state).await,
        (&Method::GET, "/api/panic-alerts/near") => {
            handle_nearby_alerts(&state, req.uri()).await
        }
        (&Method::GET, "/api/incidents") => handle_recent_incidents(&state).await,
        (&Method::GET, "/api/safe-zones") => handle_list_zones(&state),
        (&Method::POST, "/api/safe-zones") => handle_create_zone(&state, actor, req).await,
        _ => {
            if let Some(subject) = path.strip_prefix("/api/safety-status/") {
                if method == Method::GET && !subject.is_empty() {
                    handle_safety_status(&state, subject)
                } else {
                    not_found()
                }
            } else if let Some(rest) = path.strip_prefix("/api/panic-alerts/") {
                match (method == Method::POST, rest.strip_suffix("/ack")) {
                    (true, Some(id)) => handle_ack(&state, actor, id).await,
                    _ => not_found(),
                }
            } else if let Some(rest) = path.strip_prefix("/api/incidents/") {
                match (method == Method::POST, rest.strip_suffix("/ack"), rest.strip_suffix("/resolve")) {
                    (true, Some(id), _) => {
                        handle_incident_transition(&state, actor, id, false).await
                    }
                    (true, None, Some(id)) => {
                        handle_incident_transition(&state, actor, id, true).await
                    }
                    _ => not_found(),
                }
            } else if let Some(id) = path.strip_prefix("/api/safe-zones/") {
                if method == Method::DELETE && !id.is_empty() {
                    handle_delete_zone(&state, actor, id)
                } else {
                    not_found()
                }
            } else {
                not_found()
            }
        }
    };

    Ok(response)
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_counter(
        &mut output,
        "geoguard_samples_total",
        "Total location samples processed",
        site_id,
        summary.samples_total,
    );
    let _ = writeln!(output, "# HELP geoguard_samples_per_sec Samples processed per second");
    let _ = writeln!(output, "# TYPE geoguard_samples_per_sec gauge");
    let _ = writeln!(
        output,
        "geoguard_samples_per_sec{{site=\"{site_id}\"}} {:.2}",
        summary.samples_per_sec
    );

    write_latency_histogram(&mut output, site_id, &summary);

    write_counter(
        &mut output,
        "geoguard_zone_exits_total",
        "Safe zone exit transitions observed",
        site_id,
        summary.zone_exits_total,
    );
    write_counter(
        &mut output,
        "geoguard_automatic_alerts_total",
        "Automatic alerts raised by dwell escalation",
        site_id,
        summary.automatic_alerts_total,
    );
    write_counter(
        &mut output,
        "geoguard_panic_alerts_total",
        "Manual panic alerts accepted",
        site_id,
        summary.panic_alerts_total,
    );
    write_counter(
        &mut output,
        "geoguard_panic_rate_limited_total",
        "Panic submissions rejected by the rate window",
        site_id,
        summary.panic_rate_limited_total,
    );
    write_counter(
        &mut output,
        "geoguard_acks_total",
        "Alert acknowledgments",
        site_id,
        summary.acks_total,
    );
    write_counter(
        &mut output,
        "geoguard_broadcast_drops_total",
        "Event publishes dropped for lack of subscribers",
        site_id,
        summary.broadcast_drops_total,
    );
    write_counter(
        &mut output,
        "geoguard_notify_failures_total",
        "Push notification failures",
        site_id,
        summary.notify_failures_total,
    );
    write_gauge(
        &mut output,
        "geoguard_active_subjects",
        "Subjects currently tracked",
        site_id,
        summary.active_subjects,
    );

    output
}

fn write_counter(output: &mut String, name: &str, help: &str, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_gauge(output: &mut String, name: &str, help: &str, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

fn write_latency_histogram(output: &mut String, site: &str, summary: &MetricsSummary) {
    let name = "geoguard_sample_latency_us";
    let _ = writeln!(output, "# HELP {name} Sample processing latency in microseconds");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += summary.lat_buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += summary.lat_buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = summary.lat_buckets.iter().sum();
    let sum = summary.avg_latency_us * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");

    write_gauge(
        output,
        "geoguard_sample_latency_p50_us",
        "50th percentile sample latency",
        site,
        summary.lat_p50_us,
    );
    write_gauge(
        output,
        "geoguard_sample_latency_p95_us",
        "95th percentile sample latency",
        site,
        summary.lat_p95_us,
    );
    write_gauge(
        output,
        "geoguard_sample_latency_p99_us",
        "99th percentile sample latency",
        site,
        summary.lat_p99_us,
    );
}

/// Start the HTTP API server
pub async fn start_api_server(
    addr: SocketAddr,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, site = %state.site_id, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
