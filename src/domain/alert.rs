//! Alert and Incident entities
//!
//! An Alert is created either by a manual panic submission or by the
//! escalation engine when a subject dwells outside all safe zones past the
//! threshold. It is immutable after creation except for the acknowledgment
//! fields. An Incident is the operational record linked to an alert.

use crate::domain::types::{GeoPoint, SubjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    Manual,
    SafeZoneExit,
    Emergency,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Manual => "manual",
            AlertKind::SafeZoneExit => "safe-zone-exit",
            AlertKind::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub subject_id: SubjectId,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub acknowledged: bool,
    pub acknowledged_by: Option<SubjectId>,
    pub is_automatic: bool,
    pub kind: AlertKind,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Alert from a manual panic submission
    pub fn manual(
        subject_id: SubjectId,
        location: GeoPoint,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            subject_id,
            location,
            timestamp,
            message,
            acknowledged: false,
            acknowledged_by: None,
            is_automatic: false,
            kind: AlertKind::Manual,
            created_at: Utc::now(),
        }
    }

    /// Alert synthesized by the escalation engine after a dwell-outside breach
    pub fn safe_zone_exit(subject_id: SubjectId, location: GeoPoint, dwell_secs: u64) -> Self {
        Self {
            id: AlertId::new(),
            subject_id,
            location,
            timestamp: Utc::now(),
            message: format!(
                "AUTOMATIC ALERT: subject has been outside safe zones for {} seconds",
                dwell_secs
            ),
            acknowledged: false,
            acknowledged_by: None,
            is_automatic: true,
            kind: AlertKind::SafeZoneExit,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    /// Incident category, e.g. "panic"
    pub kind: String,
    pub subject_id: SubjectId,
    pub alert_id: Option<AlertId>,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub description: String,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Critical open incident linked to a panic alert
    pub fn panic(subject_id: SubjectId, alert_id: AlertId, description: String, location: GeoPoint) -> Self {
        Self {
            id: IncidentId::new(),
            kind: "panic".to_string(),
            subject_id,
            alert_id: Some(alert_id),
            severity: Severity::Critical,
            status: IncidentStatus::Open,
            description,
            location,
            created_at: Utc::now(),
        }
    }
}
