//! Emergency-contact lookup seam
//!
//! Contact CRUD and the actual contact notification live in an external
//! service; the panic path only needs the active contacts for a subject to
//! report the notified count.

use crate::domain::types::{EmergencyContact, SubjectId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[async_trait]
pub trait EmergencyContactProvider: Send + Sync {
    async fn active_contacts(&self, subject_id: &SubjectId) -> Vec<EmergencyContact>;
}

/// In-memory contact table for the single-process deployment
#[derive(Default)]
pub struct MemoryContacts {
    contacts: RwLock<HashMap<SubjectId, Vec<EmergencyContact>>>,
}

impl MemoryContacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subject_id: SubjectId, contact: EmergencyContact) {
        self.contacts.write().entry(subject_id).or_default().push(contact);
    }
}

#[async_trait]
impl EmergencyContactProvider for MemoryContacts {
    async fn active_contacts(&self, subject_id: &SubjectId) -> Vec<EmergencyContact> {
        self.contacts.read().get(subject_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_empty_and_populated() {
        let contacts = MemoryContacts::new();
        assert!(contacts.active_contacts(&SubjectId::from("u1")).await.is_empty());

        contacts.add(
            SubjectId::from("u1"),
            EmergencyContact { name: "Asha".to_string(), phone: "+91-98".to_string() },
        );
        assert_eq!(contacts.active_contacts(&SubjectId::from("u1")).await.len(), 1);
    }
}
