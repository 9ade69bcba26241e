//! Shared types for the safety engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype wrapper for subject (monitored user) identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Newtype wrapper for safe-zone identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Coordinate range check: lat in [-90, 90], lng in [-180, 180]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Registered circular safe zone with a per-zone dwell-outside alert threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeZone {
    pub id: ZoneId,
    pub name: String,
    pub center: GeoPoint,
    /// Zone radius in meters, 10..=50_000
    pub radius_m: f64,
    /// Seconds a subject may remain outside all zones before escalation, 10..=300
    pub alert_threshold_secs: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One location sample from a subject's device. Transient input, not persisted.
#[derive(Debug, Clone)]
pub struct LocationSample {
    pub subject_id: SubjectId,
    pub point: GeoPoint,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Per-subject containment state, created lazily on first sample
#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatus {
    pub subject_id: SubjectId,
    pub is_contained: bool,
    pub current_zone_ids: Vec<ZoneId>,
    /// Set on the contained -> uncontained transition, start of the episode
    pub last_exit: Option<DateTime<Utc>>,
    /// At most one automatic alert per episode
    pub alert_sent: bool,
    pub last_update: DateTime<Utc>,
}

impl SafetyStatus {
    pub fn new(subject_id: SubjectId, now: DateTime<Utc>) -> Self {
        Self {
            subject_id,
            is_contained: false,
            current_zone_ids: Vec::new(),
            last_exit: None,
            alert_sent: false,
            last_update: now,
        }
    }
}

/// Actor role carried by verified credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tourist,
    Officer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tourist => "tourist",
            Role::Officer => "officer",
            Role::Admin => "admin",
        }
    }

    /// Roles allowed to acknowledge alerts
    pub fn can_acknowledge(&self) -> bool {
        matches!(self, Role::Officer | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tourist" => Ok(Role::Tourist),
            "officer" => Ok(Role::Officer),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// A verified caller: subject identity plus role
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: SubjectId,
    pub role: Role,
}

/// An active emergency contact, read from an external provider
#[derive(Debug, Clone)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}
