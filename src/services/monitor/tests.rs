//! Tests for the safety monitor state machine

use super::*;
use crate::domain::types::GeoPoint;
use crate::io::broadcast::OutboundEvent;
use crate::io::notify::NullNotifier;
use crate::io::store::{AlertStore, MemoryStore};
use crate::services::registry::ZoneSpec;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::time::timeout;

const BANGALORE: GeoPoint = GeoPoint { lat: 12.9716, lng: 77.5946 };
// ~2 km east of the zone center, outside a 500 m zone
const OUTSIDE: GeoPoint = GeoPoint { lat: 12.9716, lng: 77.6130 };

struct TestMonitor {
    monitor: SafetyMonitor,
    store: Arc<MemoryStore>,
    events: broadcast::Receiver<OutboundEvent>,
}

fn create_monitor(zones: &[(f64, u64)]) -> TestMonitor {
    let registry = Arc::new(SafeZoneRegistry::new());
    for (radius_m, threshold) in zones {
        registry
            .create(ZoneSpec {
                name: "test-zone".to_string(),
                lat: BANGALORE.lat,
                lng: BANGALORE.lng,
                radius_m: *radius_m,
                alert_threshold_secs: *threshold,
            })
            .unwrap();
    }

    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::new(256);
    let events = bus.subscribe();
    let metrics = Arc::new(Metrics::new());
    let escalation = EscalationEngine::new(
        store.clone(),
        bus.clone(),
        Arc::new(NullNotifier),
        metrics.clone(),
    );
    let monitor = SafetyMonitor::new(registry, escalation, bus, metrics, 3600);
    TestMonitor { monitor, store, events }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn sample(subject: &str, point: GeoPoint, at: DateTime<Utc>) -> LocationSample {
    LocationSample {
        subject_id: SubjectId::from(subject),
        point,
        speed: Some(1.2),
        accuracy: Some(8.0),
        timestamp: at,
    }
}

/// Await the next event with the given name, skipping others
async fn next_event(
    rx: &mut broadcast::Receiver<OutboundEvent>,
    name: &str,
) -> Option<OutboundEvent> {
    loop {
        match timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Ok(event)) if event.name == name => return Some(event),
            Ok(Ok(_)) => continue,
            _ => return None,
        }
    }
}

async fn automatic_alert_count(store: &MemoryStore) -> usize {
    store
        .recent_alerts(100)
        .await
        .unwrap()
        .iter()
        .filter(|a| a.is_automatic)
        .count()
}

#[tokio::test]
async fn test_contained_sample_publishes_status() {
    let mut harness = create_monitor(&[(500.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));

    let event = next_event(&mut harness.events, "user-safety-status").await.unwrap();
    assert_eq!(event.payload["subject_id"], "u1");
    assert_eq!(event.payload["is_contained"], true);
    assert_eq!(event.payload["alert_sent"], false);

    let statuses = harness.monitor.statuses();
    let status = statuses.read().get(&SubjectId::from("u1")).cloned().unwrap();
    assert!(status.is_contained);
    assert_eq!(status.current_zone_ids.len(), 1);
    assert!(status.last_exit.is_none());
}

#[tokio::test]
async fn test_no_alert_before_threshold() {
    let harness = create_monitor(&[(500.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(20)));

    // Dwell is 19s, under the 30s threshold
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(automatic_alert_count(&harness.store).await, 0);
}

#[tokio::test]
async fn test_exactly_one_alert_per_episode() {
    let mut harness = create_monitor(&[(500.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    // Threshold crossed: exit at t0+1, sample at t0+32 -> dwell 31s
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(32)));

    let event = next_event(&mut harness.events, "emergency-alert").await.unwrap();
    assert_eq!(event.payload["is_automatic"], true);
    assert_eq!(event.payload["subject_id"], "u1");
    assert_eq!(event.payload["kind"], "safe-zone-exit");
    assert_eq!(event.payload["sample"]["coordinates"][0], OUTSIDE.lng);

    // Subject also gets the targeted delivery ack
    assert!(next_event(&mut harness.events, "automatic-alert-sent").await.is_some());

    // Later samples in the same episode never re-escalate
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(90)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(300)));
    assert!(next_event(&mut harness.events, "emergency-alert").await.is_none());
    assert_eq!(automatic_alert_count(&harness.store).await, 1);
}

#[tokio::test]
async fn test_reentry_resets_episode() {
    let mut harness = create_monitor(&[(500.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    // First exit at t0+1
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    // Re-entry before the threshold elapses
    harness.monitor.process_sample(sample("u1", BANGALORE, t0() + ChronoDuration::seconds(10)));
    // Second exit at t0+20
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(20)));
    // 45s after t0 but only 25s into the second episode: first exit must not count
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(45)));
    assert!(next_event(&mut harness.events, "emergency-alert").await.is_none());
    assert_eq!(automatic_alert_count(&harness.store).await, 0);

    // 31s into the second episode
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(51)));
    assert!(next_event(&mut harness.events, "emergency-alert").await.is_some());
    assert_eq!(automatic_alert_count(&harness.store).await, 1);
}

#[tokio::test]
async fn test_reentry_clears_alert_sent_for_next_episode() {
    let mut harness = create_monitor(&[(500.0, 30)]);

    // Full episode with escalation
    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(32)));
    assert!(next_event(&mut harness.events, "emergency-alert").await.is_some());

    // Re-enter and exit again: a fresh episode escalates independently
    harness.monitor.process_sample(sample("u1", BANGALORE, t0() + ChronoDuration::seconds(60)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(61)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(95)));
    assert!(next_event(&mut harness.events, "emergency-alert").await.is_some());
    assert_eq!(automatic_alert_count(&harness.store).await, 2);
}

#[tokio::test]
async fn test_never_contained_subject_does_not_escalate() {
    let harness = create_monitor(&[(500.0, 30)]);

    // Subject starts outside and stays outside: no exit transition, no
    // last_exit, so no dwell and no alert
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(600)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(automatic_alert_count(&harness.store).await, 0);
}

#[tokio::test]
async fn test_threshold_is_min_across_zones() {
    let mut harness = create_monitor(&[(500.0, 120), (400.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    // 40s dwell exceeds the 30s minimum even though the other zone says 120s
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(41)));

    assert!(next_event(&mut harness.events, "emergency-alert").await.is_some());
}

#[tokio::test]
async fn test_subjects_are_independent() {
    let mut harness = create_monitor(&[(500.0, 30)]);

    harness.monitor.process_sample(sample("u1", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u2", BANGALORE, t0()));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(1)));
    harness.monitor.process_sample(sample("u1", OUTSIDE, t0() + ChronoDuration::seconds(40)));

    let event = next_event(&mut harness.events, "emergency-alert").await.unwrap();
    assert_eq!(event.payload["subject_id"], "u1");

    // u2 stayed contained
    let statuses = harness.monitor.statuses();
    let u2 = statuses.read().get(&SubjectId::from("u2")).cloned().unwrap();
    assert!(u2.is_contained);
    assert!(!u2.alert_sent);
}

#[tokio::test]
async fn test_eviction_drops_idle_subjects() {
    let harness = create_monitor(&[(500.0, 30)]);

    // Old sample, beyond the 3600s TTL relative to wall clock
    let stale = Utc::now() - ChronoDuration::seconds(7200);
    harness.monitor.process_sample(sample("idle", BANGALORE, stale));
    harness.monitor.process_sample(sample("fresh", BANGALORE, Utc::now()));

    harness.monitor.evict_idle();

    let statuses = harness.monitor.statuses();
    let statuses = statuses.read();
    assert!(!statuses.contains_key(&SubjectId::from("idle")));
    assert!(statuses.contains_key(&SubjectId::from("fresh")));
}
