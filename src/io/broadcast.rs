//! Real-time event fan-out
//!
//! Typed payloads published onto an in-process bus. Any real-time transport
//! (WebSocket, SSE, push gateway) subscribes and forwards; delivery mechanics
//! are outside this crate. Sends are non-blocking and best-effort: a bus with
//! no subscribers is not an error.

use crate::domain::alert::{Alert, AlertId, Incident};
use crate::domain::types::{GeoPoint, SafeZone, SafetyStatus, SubjectId, ZoneId};
use crate::infra::metrics::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

/// Delivery scope for an outbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// All connected dashboard/monitor clients
    All,
    /// A single subject's session
    Subject(SubjectId),
}

/// One event on the bus: name plus JSON payload
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub target: Target,
    pub name: &'static str,
    pub payload: serde_json::Value,
}

/// Payload for the manual `panic_alert` broadcast
#[derive(Debug, Clone, Serialize)]
pub struct PanicAlertPayload {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub subject_id: SubjectId,
}

/// Payload for the `user-safety-status` broadcast, published on every sample
#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatusPayload {
    pub subject_id: SubjectId,
    pub is_contained: bool,
    pub current_zone_ids: Vec<ZoneId>,
    pub last_update: DateTime<Utc>,
    pub alert_sent: bool,
}

impl From<&SafetyStatus> for SafetyStatusPayload {
    fn from(status: &SafetyStatus) -> Self {
        Self {
            subject_id: status.subject_id.clone(),
            is_contained: status.is_contained,
            current_zone_ids: status.current_zone_ids.clone(),
            last_update: status.last_update,
            alert_sent: status.alert_sent,
        }
    }
}

/// Latest-sample context attached to automatic alert broadcasts
#[derive(Debug, Clone, Serialize)]
pub struct SampleContext {
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub coordinates: [f64; 2],
}

/// Cloneable handle for publishing events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OutboundEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, metrics: None }
    }

    /// Count dropped publishes on the given collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe a transport (or test) to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }

    fn send(&self, target: Target, name: &'static str, payload: serde_json::Value) {
        if self.tx.send(OutboundEvent { target, name, payload }).is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_broadcast_drop();
            }
            debug!(event = %name, "broadcast_no_subscribers");
        }
    }

    /// Manual panic alert, fanned out to all clients
    pub fn panic_alert(&self, payload: &PanicAlertPayload) {
        self.send(Target::All, "panic_alert", json!(payload));
    }

    /// Emergency-contact notification summary (count only; the contact
    /// notification itself is an external collaborator's job)
    pub fn emergency_alert(
        &self,
        subject_id: &SubjectId,
        location: GeoPoint,
        message: &str,
        contacts_notified: usize,
        timestamp: DateTime<Utc>,
    ) {
        self.send(
            Target::All,
            "emergency_alert",
            json!({
                "subject_id": subject_id,
                "location": { "lat": location.lat, "lng": location.lng },
                "message": message,
                "contacts_notified": contacts_notified,
                "timestamp": timestamp,
            }),
        );
    }

    /// New incident record
    pub fn incident(&self, incident: &Incident) {
        self.send(Target::All, "incident", json!(incident));
    }

    /// Incident lifecycle transition (acknowledged, resolved)
    pub fn incident_updated(&self, incident: &Incident) {
        self.send(Target::All, "incident-updated", json!(incident));
    }

    /// Per-sample safety status update
    pub fn safety_status(&self, payload: &SafetyStatusPayload) {
        self.send(Target::All, "user-safety-status", json!(payload));
    }

    /// Automatic escalation alert with latest-sample context
    pub fn automatic_alert(&self, alert: &Alert, sample: &SampleContext) {
        self.send(
            Target::All,
            "emergency-alert",
            json!({
                "id": alert.id,
                "subject_id": alert.subject_id,
                "location": { "lat": alert.location.lat, "lng": alert.location.lng },
                "message": alert.message,
                "timestamp": alert.timestamp,
                "is_automatic": true,
                "kind": alert.kind,
                "sample": sample,
            }),
        );
    }

    /// Subject-targeted confirmation that an automatic alert was raised
    pub fn automatic_alert_sent(&self, subject_id: &SubjectId, alert_id: AlertId) {
        self.send(
            Target::Subject(subject_id.clone()),
            "automatic-alert-sent",
            json!({
                "message": "Emergency alert sent automatically - you have been outside safe zones for too long",
                "alert_id": alert_id,
            }),
        );
    }

    pub fn safe_zone_created(&self, zone: &SafeZone) {
        self.send(Target::All, "safe-zone-created", json!(zone));
    }

    pub fn safe_zone_deleted(&self, id: ZoneId) {
        self.send(Target::All, "safe-zone-deleted", json!({ "id": id }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_alert_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.panic_alert(&PanicAlertPayload {
            lat: 12.9716,
            lng: 77.5946,
            timestamp: Utc::now(),
            subject_id: SubjectId::from("u1"),
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name, "panic_alert");
        assert_eq!(event.target, Target::All);
        assert_eq!(event.payload["subject_id"], "u1");
    }

    #[test]
    fn test_send_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        // No receiver; must not panic or error
        bus.safe_zone_deleted(ZoneId::new());
    }

    #[test]
    fn test_dropped_publishes_are_counted() {
        let metrics = Arc::new(Metrics::new());
        let bus = EventBus::new(16).with_metrics(metrics.clone());

        // No subscriber: both publishes are dropped and counted
        bus.safe_zone_deleted(ZoneId::new());
        bus.automatic_alert_sent(&SubjectId::from("u1"), AlertId::new());
        assert_eq!(metrics.report().broadcast_drops_total, 2);

        // With a live subscriber the counter stays put
        let _rx = bus.subscribe();
        bus.safe_zone_deleted(ZoneId::new());
        assert_eq!(metrics.report().broadcast_drops_total, 2);
    }

    #[test]
    fn test_subject_targeted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.automatic_alert_sent(&SubjectId::from("u2"), AlertId::new());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name, "automatic-alert-sent");
        assert_eq!(event.target, Target::Subject(SubjectId::from("u2")));
    }
}
