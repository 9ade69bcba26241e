//! Per-subject safety state machine
//!
//! The SafetyMonitor is the single writer of the subject status map. It
//! consumes location samples from a bounded channel, evaluates containment
//! against the active safe zones, maintains exit bookkeeping per subject,
//! and hands threshold breaches to the escalation engine.
//!
//! State per subject: Unknown -> { Contained, Uncontained }. The
//! contained -> uncontained transition starts an episode (`last_exit` set,
//! `alert_sent` cleared); crossing the dwell threshold during an episode
//! escalates exactly once; re-entry ends the episode.

#[cfg(test)]
mod tests;

use crate::domain::types::{LocationSample, SafetyStatus, SubjectId};
use crate::infra::metrics::Metrics;
use crate::io::broadcast::{EventBus, SafetyStatusPayload};
use crate::services::escalation::EscalationEngine;
use crate::services::geofence;
use crate::services::registry::SafeZoneRegistry;
use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

/// Shared view of per-subject statuses. Written only by the monitor loop;
/// HTTP status queries take brief read locks and tolerate staleness.
pub type StatusMap = Arc<RwLock<HashMap<SubjectId, SafetyStatus>>>;

pub struct SafetyMonitor {
    registry: Arc<SafeZoneRegistry>,
    statuses: StatusMap,
    escalation: EscalationEngine,
    bus: EventBus,
    metrics: Arc<Metrics>,
    status_ttl_secs: u64,
}

impl SafetyMonitor {
    pub fn new(
        registry: Arc<SafeZoneRegistry>,
        escalation: EscalationEngine,
        bus: EventBus,
        metrics: Arc<Metrics>,
        status_ttl_secs: u64,
    ) -> Self {
        Self {
            registry,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            escalation,
            bus,
            metrics,
            status_ttl_secs,
        }
    }

    /// Handle for read-side status queries
    pub fn statuses(&self) -> StatusMap {
        self.statuses.clone()
    }

    /// Consume samples until the channel closes. The eviction tick bounds
    /// the status map for subjects that stopped reporting.
    pub async fn run(&self, mut sample_rx: mpsc::Receiver<LocationSample>) {
        let mut tick = interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                sample = sample_rx.recv() => {
                    match sample {
                        Some(s) => self.process_sample(s),
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.evict_idle();
                }
            }
        }
    }

    /// Apply one sample to the subject's state machine and publish the
    /// resulting status. Escalation side effects run off-loop.
    pub fn process_sample(&self, sample: LocationSample) {
        let process_start = Instant::now();

        let zones = self.registry.list_active();
        let current_zone_ids = geofence::containing_zones(sample.point, &zones);
        let is_contained = !current_zone_ids.is_empty();
        let threshold_secs = self.registry.min_alert_threshold_secs();

        let mut escalate_dwell: Option<u64> = None;
        let payload;
        {
            let mut statuses = self.statuses.write();
            let status = statuses
                .entry(sample.subject_id.clone())
                .or_insert_with(|| SafetyStatus::new(sample.subject_id.clone(), sample.timestamp));

            let was_contained = status.is_contained;

            if was_contained && !is_contained {
                // Exit transition: new episode, bookkeeping reset
                status.last_exit = Some(sample.timestamp);
                status.alert_sent = false;
                self.metrics.record_zone_exit();
                info!(
                    subject_id = %sample.subject_id,
                    at = %sample.timestamp,
                    "safe_zone_exit"
                );
            }

            if !is_contained && !status.alert_sent {
                if let Some(last_exit) = status.last_exit {
                    let dwell = sample.timestamp.signed_duration_since(last_exit);
                    if dwell >= ChronoDuration::seconds(threshold_secs as i64) {
                        // Flip inside the write lock: exactly once per episode
                        status.alert_sent = true;
                        escalate_dwell = Some(dwell.num_seconds().max(0) as u64);
                    }
                }
            }

            status.is_contained = is_contained;
            status.current_zone_ids = current_zone_ids;
            status.last_update = sample.timestamp;
            payload = SafetyStatusPayload::from(&*status);
        }

        if let Some(dwell_secs) = escalate_dwell {
            self.escalation.raise(sample.subject_id.clone(), dwell_secs, sample);
        }

        // Published on every sample, whether or not escalation fired
        self.bus.safety_status(&payload);

        self.metrics.record_sample(process_start.elapsed().as_micros() as u64);
        self.metrics.set_active_subjects(self.statuses.read().len() as u64);
    }

    /// Drop statuses idle past the TTL. A re-appearing subject restarts at
    /// Unknown, which never escalates before an observed exit.
    fn evict_idle(&self) {
        let cutoff = chrono::Utc::now() - ChronoDuration::seconds(self.status_ttl_secs as i64);
        let mut statuses = self.statuses.write();
        let before = statuses.len();
        statuses.retain(|_, status| status.last_update >= cutoff);
        let evicted = before - statuses.len();
        if evicted > 0 {
            debug!(evicted = %evicted, remaining = %statuses.len(), "status_eviction");
        }
        self.metrics.set_active_subjects(statuses.len() as u64);
    }
}
