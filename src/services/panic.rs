//! Manual panic alert intake
//!
//! Validates, rate-limits and persists a subject-initiated alert, then runs
//! the best-effort fan-out: broadcast, emergency-contact summary, push
//! notification, linked incident. Only a failure of the primary alert write
//! fails the call; everything after that commit is logged and swallowed.

use crate::domain::alert::{Alert, Incident};
use crate::domain::error::EngineError;
use crate::domain::types::{GeoPoint, SubjectId};
use crate::infra::metrics::Metrics;
use crate::io::broadcast::{EventBus, PanicAlertPayload};
use crate::io::contacts::EmergencyContactProvider;
use crate::io::notify::NotificationSink;
use crate::io::store::{AlertStore, IncidentStore};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_PANIC_MESSAGE: &str = "Emergency panic alert triggered";

/// Result of an accepted submission. The incident is None only when its
/// write failed after the alert had already committed.
#[derive(Debug)]
pub struct PanicOutcome {
    pub alert: Alert,
    pub incident: Option<Incident>,
}

pub struct PanicIntake {
    alerts: Arc<dyn AlertStore>,
    incidents: Arc<dyn IncidentStore>,
    contacts: Arc<dyn EmergencyContactProvider>,
    bus: EventBus,
    notifier: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
    rate_window_secs: u64,
    /// Per-subject submission locks closing the check-then-insert race
    locks: Mutex<HashMap<SubjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl PanicIntake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        incidents: Arc<dyn IncidentStore>,
        contacts: Arc<dyn EmergencyContactProvider>,
        bus: EventBus,
        notifier: Arc<dyn NotificationSink>,
        metrics: Arc<Metrics>,
        rate_window_secs: u64,
    ) -> Self {
        Self {
            alerts,
            incidents,
            contacts,
            bus,
            notifier,
            metrics,
            rate_window_secs,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn subject_lock(&self, subject_id: &SubjectId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        // Drop locks nobody else is holding to keep the map bounded
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(subject_id.clone()).or_default().clone()
    }

    pub async fn submit(
        &self,
        subject_id: SubjectId,
        lat: f64,
        lng: f64,
        message: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PanicOutcome, EngineError> {
        let point = GeoPoint::new(lat, lng);
        if !point.is_valid() {
            return Err(EngineError::Validation(
                "latitude must be in [-90, 90] and longitude in [-180, 180]".to_string(),
            ));
        }

        let message = message.unwrap_or_else(|| DEFAULT_PANIC_MESSAGE.to_string());
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        // Rate check and insert are one critical section per subject
        let lock = self.subject_lock(&subject_id);
        let alert = {
            let _guard = lock.lock().await;

            let cutoff = Utc::now() - Duration::seconds(self.rate_window_secs as i64);
            if self.alerts.latest_alert_since(&subject_id, cutoff).await?.is_some() {
                self.metrics.record_panic_rate_limited();
                warn!(subject_id = %subject_id, "panic_rate_limited");
                return Err(EngineError::RateLimited);
            }

            // Primary write: a failure here aborts with nothing broadcast
            self.alerts
                .create_alert(Alert::manual(subject_id.clone(), point, message.clone(), timestamp))
                .await?
        };

        self.metrics.record_panic_alert();
        info!(subject_id = %subject_id, alert_id = %alert.id, "panic_alert_created");

        // Everything past the alert commit is best-effort
        self.bus.panic_alert(&PanicAlertPayload {
            lat,
            lng,
            timestamp,
            subject_id: subject_id.clone(),
        });

        let contacts = self.contacts.active_contacts(&subject_id).await;
        if !contacts.is_empty() {
            info!(
                subject_id = %subject_id,
                contacts = %contacts.len(),
                "emergency_contacts_notified"
            );
            self.bus.emergency_alert(&subject_id, point, &message, contacts.len(), timestamp);
        }

        if !self.notifier.send_emergency_alert(&subject_id, alert.kind, point).await {
            self.metrics.record_notify_failure();
        }

        let incident = match self
            .incidents
            .create_incident(Incident::panic(subject_id.clone(), alert.id, message, point))
            .await
        {
            Ok(incident) => {
                self.bus.incident(&incident);
                Some(incident)
            }
            Err(e) => {
                // Alert already committed; report success without the incident
                error!(subject_id = %subject_id, alert_id = %alert.id, error = %e, "incident_write_failed");
                None
            }
        };

        Ok(PanicOutcome { alert, incident })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::contacts::MemoryContacts;
    use crate::io::notify::NullNotifier;
    use crate::io::store::MemoryStore;

    fn create_intake() -> (PanicIntake, Arc<MemoryStore>, Arc<MemoryContacts>) {
        let store = Arc::new(MemoryStore::new());
        let contacts = Arc::new(MemoryContacts::new());
        let intake = PanicIntake::new(
            store.clone(),
            store.clone(),
            contacts.clone(),
            EventBus::new(64),
            Arc::new(NullNotifier),
            Arc::new(Metrics::new()),
            60,
        );
        (intake, store, contacts)
    }

    #[tokio::test]
    async fn test_submit_creates_alert_and_incident() {
        let (intake, _, _) = create_intake();

        let outcome = intake
            .submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None)
            .await
            .unwrap();

        assert_eq!(outcome.alert.message, DEFAULT_PANIC_MESSAGE);
        assert!(!outcome.alert.is_automatic);
        let incident = outcome.incident.unwrap();
        assert_eq!(incident.alert_id, Some(outcome.alert.id));
        assert_eq!(incident.kind, "panic");
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_coordinates() {
        let (intake, store, _) = create_intake();

        let err = intake.submit(SubjectId::from("u1"), 91.0, 0.0, None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = intake.submit(SubjectId::from("u1"), 0.0, 181.0, None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Nothing persisted
        assert!(store.recent_alerts(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_submission_within_window_rate_limited() {
        let (intake, store, _) = create_intake();

        intake.submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None).await.unwrap();
        let err =
            intake.submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None).await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited));

        // The rejected submission created no alert
        assert_eq!(store.recent_alerts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_window_is_per_subject() {
        let (intake, _, _) = create_intake();

        intake.submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None).await.unwrap();
        // Different subject is unaffected
        intake.submit(SubjectId::from("u2"), 12.9716, 77.5946, None, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_submission_allowed_after_window_expires() {
        let (intake, store, _) = create_intake();

        // Age an alert past the 60s window
        let mut old = Alert::manual(
            SubjectId::from("u1"),
            GeoPoint::new(12.9716, 77.5946),
            DEFAULT_PANIC_MESSAGE.to_string(),
            Utc::now(),
        );
        old.created_at = Utc::now() - Duration::seconds(61);
        store.create_alert(old).await.unwrap();

        intake.submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None).await.unwrap();
        assert_eq!(store.recent_alerts(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_single_alert() {
        let (intake, store, _) = create_intake();
        let intake = Arc::new(intake);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let intake = intake.clone();
                tokio::spawn(async move {
                    intake.submit(SubjectId::from("u1"), 12.9716, 77.5946, None, None).await
                })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.recent_alerts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_message_flows_to_incident() {
        let (intake, _, _) = create_intake();

        let outcome = intake
            .submit(
                SubjectId::from("u1"),
                12.9716,
                77.5946,
                Some("followed by stranger".to_string()),
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.alert.message, "followed by stranger");
        assert_eq!(outcome.incident.unwrap().description, "followed by stranger");
    }
}
