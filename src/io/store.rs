//! Persistence seams for alerts and incidents
//!
//! The engine only depends on the traits; any store offering a "points
//! within radius of center" primitive satisfies the contract. The shipped
//! implementation is in-memory, suitable for the single-process deployment
//! this service targets.

use crate::domain::alert::{Alert, AlertId, Incident, IncidentId, IncidentStatus};
use crate::domain::types::{GeoPoint, SubjectId};
use crate::services::geofence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("alert {0} not found")]
    AlertNotFound(AlertId),

    #[error("incident {0} not found")]
    IncidentNotFound(IncidentId),
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a new alert. The alert id must be durable when this returns.
    async fn create_alert(&self, alert: Alert) -> Result<Alert, StoreError>;

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, StoreError>;

    /// Most recent alert for the subject created at or after `cutoff`.
    /// Backs the manual-submission rate window.
    async fn latest_alert_since(
        &self,
        subject_id: &SubjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;

    /// Newest-first listing
    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Spherical-cap geospatial query
    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Set acknowledgment fields on an existing alert
    async fn acknowledge_alert(
        &self,
        id: AlertId,
        acknowledged_by: SubjectId,
    ) -> Result<Alert, StoreError>;
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create_incident(&self, incident: Incident) -> Result<Incident, StoreError>;

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError>;

    /// Newest-first listing
    async fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>, StoreError>;

    /// Overwrite the lifecycle status of an existing incident
    async fn update_incident_status(
        &self,
        id: IncidentId,
        status: IncidentStatus,
    ) -> Result<Incident, StoreError>;
}

/// In-memory store keyed by id, with insertion order retained for recency
/// queries. Interior mutability via parking_lot so reads stay cheap.
#[derive(Default)]
pub struct MemoryStore {
    alerts: RwLock<Vec<Alert>>,
    incidents: RwLock<Vec<Incident>>,
    index: RwLock<HashMap<AlertId, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create_alert(&self, alert: Alert) -> Result<Alert, StoreError> {
        let mut alerts = self.alerts.write();
        self.index.write().insert(alert.id, alerts.len());
        alerts.push(alert.clone());
        Ok(alert)
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, StoreError> {
        let idx = self.index.read().get(&id).copied();
        Ok(idx.and_then(|i| self.alerts.read().get(i).cloned()))
    }

    async fn latest_alert_since(
        &self,
        subject_id: &SubjectId,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .iter()
            .rev()
            .find(|a| &a.subject_id == subject_id && a.created_at >= cutoff)
            .cloned())
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        Ok(self.alerts.read().iter().rev().take(limit).cloned().collect())
    }

    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        limit: usize,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .iter()
            .filter(|a| geofence::within_cap(center, a.location, radius_m))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn acknowledge_alert(
        &self,
        id: AlertId,
        acknowledged_by: SubjectId,
    ) -> Result<Alert, StoreError> {
        let idx = self.index.read().get(&id).copied().ok_or(StoreError::AlertNotFound(id))?;
        let mut alerts = self.alerts.write();
        let alert = alerts.get_mut(idx).ok_or(StoreError::AlertNotFound(id))?;
        alert.acknowledged = true;
        alert.acknowledged_by = Some(acknowledged_by);
        Ok(alert.clone())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn create_incident(&self, incident: Incident) -> Result<Incident, StoreError> {
        self.incidents.write().push(incident.clone());
        Ok(incident)
    }

    async fn get_incident(&self, id: IncidentId) -> Result<Option<Incident>, StoreError> {
        Ok(self.incidents.read().iter().find(|i| i.id == id).cloned())
    }

    async fn recent_incidents(&self, limit: usize) -> Result<Vec<Incident>, StoreError> {
        Ok(self.incidents.read().iter().rev().take(limit).cloned().collect())
    }

    async fn update_incident_status(
        &self,
        id: IncidentId,
        status: IncidentStatus,
    ) -> Result<Incident, StoreError> {
        let mut incidents = self.incidents.write();
        let incident =
            incidents.iter_mut().find(|i| i.id == id).ok_or(StoreError::IncidentNotFound(id))?;
        incident.status = status;
        Ok(incident.clone())
    }
}
