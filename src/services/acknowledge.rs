//! Role-gated alert acknowledgment

use crate::domain::alert::{Alert, AlertId};
use crate::domain::error::EngineError;
use crate::domain::types::Actor;
use crate::io::store::{AlertStore, StoreError};
use std::sync::Arc;
use tracing::info;

pub struct AcknowledgmentHandler {
    alerts: Arc<dyn AlertStore>,
}

impl AcknowledgmentHandler {
    pub fn new(alerts: Arc<dyn AlertStore>) -> Self {
        Self { alerts }
    }

    /// Mark the alert acknowledged by the actor. Officers and admins only.
    /// Re-acknowledgment by a different actor overwrites `acknowledged_by`.
    pub async fn acknowledge(&self, alert_id: AlertId, actor: &Actor) -> Result<Alert, EngineError> {
        if !actor.role.can_acknowledge() {
            return Err(EngineError::Forbidden);
        }

        match self.alerts.acknowledge_alert(alert_id, actor.id.clone()).await {
            Ok(alert) => {
                info!(
                    alert_id = %alert_id,
                    acknowledged_by = %actor.id,
                    role = %actor.role.as_str(),
                    "alert_acknowledged"
                );
                Ok(alert)
            }
            Err(StoreError::AlertNotFound(id)) => {
                Err(EngineError::NotFound(format!("alert {}", id)))
            }
            Err(e) => Err(EngineError::Store(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::Alert;
    use crate::domain::types::{GeoPoint, Role, SubjectId};
    use crate::io::store::MemoryStore;
    use chrono::Utc;

    fn actor(id: &str, role: Role) -> Actor {
        Actor { id: SubjectId::from(id), role }
    }

    async fn store_with_alert() -> (Arc<MemoryStore>, AlertId) {
        let store = Arc::new(MemoryStore::new());
        let alert = store
            .create_alert(Alert::manual(
                SubjectId::from("u1"),
                GeoPoint::new(12.9716, 77.5946),
                "help".to_string(),
                Utc::now(),
            ))
            .await
            .unwrap();
        (store, alert.id)
    }

    #[tokio::test]
    async fn test_officer_can_acknowledge() {
        let (store, alert_id) = store_with_alert().await;
        let handler = AcknowledgmentHandler::new(store);

        let alert = handler.acknowledge(alert_id, &actor("officer-1", Role::Officer)).await.unwrap();
        assert!(alert.acknowledged);
        assert_eq!(alert.acknowledged_by, Some(SubjectId::from("officer-1")));
    }

    #[tokio::test]
    async fn test_tourist_forbidden() {
        let (store, alert_id) = store_with_alert().await;
        let handler = AcknowledgmentHandler::new(store);

        let err = handler.acknowledge(alert_id, &actor("t1", Role::Tourist)).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));
    }

    #[tokio::test]
    async fn test_unknown_alert_not_found() {
        let (store, _) = store_with_alert().await;
        let handler = AcknowledgmentHandler::new(store);

        let err =
            handler.acknowledge(AlertId::new(), &actor("a1", Role::Admin)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reacknowledgment_overwrites_actor() {
        let (store, alert_id) = store_with_alert().await;
        let handler = AcknowledgmentHandler::new(store);

        handler.acknowledge(alert_id, &actor("officer-1", Role::Officer)).await.unwrap();
        let alert =
            handler.acknowledge(alert_id, &actor("admin-1", Role::Admin)).await.unwrap();
        assert_eq!(alert.acknowledged_by, Some(SubjectId::from("admin-1")));
    }
}
