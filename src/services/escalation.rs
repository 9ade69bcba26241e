//! Automatic alert escalation
//!
//! Invoked by the safety monitor when a subject's dwell outside all safe
//! zones crosses the threshold. Synthesizes the automatic alert and performs
//! the persist/broadcast/notify fan-out in a spawned task so a slow
//! collaborator never blocks sample ingestion. All side effects are
//! best-effort: failures are logged and never reach the monitor loop.

use crate::domain::alert::{Alert, AlertKind};
use crate::domain::types::{LocationSample, SubjectId};
use crate::infra::metrics::Metrics;
use crate::io::broadcast::{EventBus, SampleContext};
use crate::io::notify::NotificationSink;
use crate::io::store::AlertStore;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct EscalationEngine {
    alerts: Arc<dyn AlertStore>,
    bus: EventBus,
    notifier: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
}

impl EscalationEngine {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        bus: EventBus,
        notifier: Arc<dyn NotificationSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { alerts, bus, notifier, metrics }
    }

    /// Raise the automatic alert for one exit episode. The caller has
    /// already flipped `alert_sent`, so this fires at most once per episode
    /// regardless of side-effect outcomes.
    pub fn raise(&self, subject_id: SubjectId, dwell_secs: u64, sample: LocationSample) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(subject_id, dwell_secs, sample).await;
        });
    }

    async fn run(&self, subject_id: SubjectId, dwell_secs: u64, sample: LocationSample) {
        let alert = Alert::safe_zone_exit(subject_id.clone(), sample.point, dwell_secs);

        let alert = match self.alerts.create_alert(alert).await {
            Ok(alert) => alert,
            Err(e) => {
                // Without a durable alert there is nothing to broadcast
                error!(subject_id = %subject_id, error = %e, "automatic_alert_persist_failed");
                return;
            }
        };

        self.metrics.record_automatic_alert();
        info!(
            subject_id = %subject_id,
            alert_id = %alert.id,
            dwell_secs = %dwell_secs,
            "automatic_alert_raised"
        );

        let context = SampleContext {
            accuracy: sample.accuracy,
            speed: sample.speed,
            coordinates: [sample.point.lng, sample.point.lat],
        };
        self.bus.automatic_alert(&alert, &context);
        self.bus.automatic_alert_sent(&subject_id, alert.id);

        if !self
            .notifier
            .send_emergency_alert(&subject_id, AlertKind::SafeZoneExit, sample.point)
            .await
        {
            self.metrics.record_notify_failure();
        }
    }
}
