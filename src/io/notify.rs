//! Push notification seam
//!
//! `NotificationSink` never returns an error: delivery failures are logged
//! and reported as `false` so callers can stay fire-and-forget. The HTTP
//! implementation posts to a configured push gateway; delivery mechanics
//! (device tokens, FCM/APNs, retries) live behind that gateway.

use crate::domain::alert::AlertKind;
use crate::domain::types::{GeoPoint, SubjectId};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send an emergency push to the subject. Returns whether the gateway
    /// accepted the notification.
    async fn send_emergency_alert(
        &self,
        subject_id: &SubjectId,
        kind: AlertKind,
        location: GeoPoint,
    ) -> bool;
}

/// Posts notifications to an external push gateway over HTTP
pub struct HttpNotifier {
    client: Option<reqwest::Client>,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .http1_only()
            .build()
            .ok();
        Self { client, url }
    }
}

#[async_trait]
impl NotificationSink for HttpNotifier {
    async fn send_emergency_alert(
        &self,
        subject_id: &SubjectId,
        kind: AlertKind,
        location: GeoPoint,
    ) -> bool {
        let Some(ref client) = self.client else {
            warn!(subject_id = %subject_id, "notifier_client_not_initialized");
            return false;
        };

        let body = json!({
            "subject_id": subject_id,
            "title": match kind {
                AlertKind::Manual => "PANIC ALERT",
                AlertKind::SafeZoneExit => "SAFE ZONE EXIT",
                AlertKind::Emergency => "SOS EMERGENCY",
            },
            "kind": kind,
            "location": { "lat": location.lat, "lng": location.lng },
            "priority": "high",
        });

        match client.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!(subject_id = %subject_id, kind = %kind.as_str(), "push_notification_sent");
                true
            }
            Ok(response) => {
                warn!(
                    subject_id = %subject_id,
                    status = %response.status().as_u16(),
                    "push_notification_rejected"
                );
                false
            }
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "push_notification_failed");
                false
            }
        }
    }
}

/// Sink used when push delivery is disabled; accepts everything
#[derive(Default)]
pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn send_emergency_alert(
        &self,
        subject_id: &SubjectId,
        kind: AlertKind,
        _location: GeoPoint,
    ) -> bool {
        info!(subject_id = %subject_id, kind = %kind.as_str(), "push_notification_skipped");
        true
    }
}
