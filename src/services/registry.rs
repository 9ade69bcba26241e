//! Safe-zone registry
//!
//! Holds the active set of circular safe zones. Seeded from config at
//! startup, mutable at runtime through the admin HTTP routes. Reads are
//! taken at evaluation time, so an in-flight episode always sees the zone
//! list as of the sample being processed.

use crate::domain::error::EngineError;
use crate::domain::types::{GeoPoint, SafeZone, ZoneId};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

/// Escalation threshold used when no zones are registered (seconds)
pub const DEFAULT_ALERT_THRESHOLD_SECS: u64 = 300;

pub const MIN_RADIUS_M: f64 = 10.0;
pub const MAX_RADIUS_M: f64 = 50_000.0;
pub const MIN_THRESHOLD_SECS: u64 = 10;
pub const MAX_THRESHOLD_SECS: u64 = 300;

/// Zone creation request, from config seed or the admin API
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
    #[serde(default = "default_threshold")]
    pub alert_threshold_secs: u64,
}

fn default_threshold() -> u64 {
    30
}

pub struct SafeZoneRegistry {
    zones: RwLock<Vec<SafeZone>>,
}

impl SafeZoneRegistry {
    pub fn new() -> Self {
        Self { zones: RwLock::new(Vec::new()) }
    }

    /// Seed zones from configuration. Invalid seeds abort startup.
    pub fn seed(&self, specs: &[ZoneSpec]) -> Result<(), EngineError> {
        for spec in specs {
            let zone = self.create(spec.clone())?;
            info!(zone_id = %zone.id, name = %zone.name, radius_m = %zone.radius_m, "safe_zone_seeded");
        }
        Ok(())
    }

    /// Validate and register a new zone
    pub fn create(&self, spec: ZoneSpec) -> Result<SafeZone, EngineError> {
        if spec.name.trim().is_empty() {
            return Err(EngineError::Validation("zone name is required".to_string()));
        }
        let center = GeoPoint::new(spec.lat, spec.lng);
        if !center.is_valid() {
            return Err(EngineError::Validation(
                "latitude must be in [-90, 90] and longitude in [-180, 180]".to_string(),
            ));
        }
        if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&spec.radius_m) {
            return Err(EngineError::Validation(format!(
                "radius_m must be in [{}, {}]",
                MIN_RADIUS_M, MAX_RADIUS_M
            )));
        }
        if !(MIN_THRESHOLD_SECS..=MAX_THRESHOLD_SECS).contains(&spec.alert_threshold_secs) {
            return Err(EngineError::Validation(format!(
                "alert_threshold_secs must be in [{}, {}]",
                MIN_THRESHOLD_SECS, MAX_THRESHOLD_SECS
            )));
        }

        let zone = SafeZone {
            id: ZoneId::new(),
            name: spec.name.trim().to_string(),
            center,
            radius_m: spec.radius_m,
            alert_threshold_secs: spec.alert_threshold_secs,
            active: true,
            created_at: Utc::now(),
        };
        self.zones.write().push(zone.clone());
        Ok(zone)
    }

    /// Soft delete: the zone stops participating in containment
    pub fn deactivate(&self, id: ZoneId) -> Result<(), EngineError> {
        let mut zones = self.zones.write();
        match zones.iter_mut().find(|z| z.id == id) {
            Some(zone) => {
                zone.active = false;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("safe zone {}", id))),
        }
    }

    /// Snapshot of currently active zones
    pub fn list_active(&self) -> Vec<SafeZone> {
        self.zones.read().iter().filter(|z| z.active).cloned().collect()
    }

    /// Minimum alert threshold across active zones, or the default when none
    /// are registered
    pub fn min_alert_threshold_secs(&self) -> u64 {
        self.zones
            .read()
            .iter()
            .filter(|z| z.active)
            .map(|z| z.alert_threshold_secs)
            .min()
            .unwrap_or(DEFAULT_ALERT_THRESHOLD_SECS)
    }
}

impl Default for SafeZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}
