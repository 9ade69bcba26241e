//! Incident lifecycle handling
//!
//! Incidents move open -> acknowledged -> resolved. Acknowledgment requires
//! an open incident; resolution is allowed from either earlier state, so an
//! operator can close out an incident without acknowledging it first. Both
//! transitions are restricted to officers and admins.

use crate::domain::alert::{Incident, IncidentId, IncidentStatus};
use crate::domain::error::EngineError;
use crate::domain::types::Actor;
use crate::io::broadcast::EventBus;
use crate::io::store::IncidentStore;
use std::sync::Arc;
use tracing::info;

pub struct IncidentHandler {
    incidents: Arc<dyn IncidentStore>,
    bus: EventBus,
}

impl IncidentHandler {
    pub fn new(incidents: Arc<dyn IncidentStore>, bus: EventBus) -> Self {
        Self { incidents, bus }
    }

    /// Newest-first incident listing
    pub async fn recent(&self, limit: usize) -> Result<Vec<Incident>, EngineError> {
        Ok(self.incidents.recent_incidents(limit).await?)
    }

    pub async fn acknowledge(
        &self,
        id: IncidentId,
        actor: &Actor,
    ) -> Result<Incident, EngineError> {
        self.transition(id, actor, IncidentStatus::Acknowledged).await
    }

    pub async fn resolve(&self, id: IncidentId, actor: &Actor) -> Result<Incident, EngineError> {
        self.transition(id, actor, IncidentStatus::Resolved).await
    }

    async fn transition(
        &self,
        id: IncidentId,
        actor: &Actor,
        to: IncidentStatus,
    ) -> Result<Incident, EngineError> {
        if !actor.role.can_acknowledge() {
            return Err(EngineError::Forbidden);
        }

        let incident = self
            .incidents
            .get_incident(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("incident {}", id)))?;

        match (incident.status, to) {
            (IncidentStatus::Open, IncidentStatus::Acknowledged) => {}
            (IncidentStatus::Open | IncidentStatus::Acknowledged, IncidentStatus::Resolved) => {}
            (from, to) => {
                return Err(EngineError::Validation(format!(
                    "incident is {:?}, cannot transition to {:?}",
                    from, to
                )));
            }
        }

        let updated = self.incidents.update_incident_status(id, to).await?;
        info!(
            incident_id = %id,
            status = ?to,
            actor = %actor.id,
            role = %actor.role.as_str(),
            "incident_status_changed"
        );
        self.bus.incident_updated(&updated);
        Ok(updated)
    }
}
