//! IO modules - external system interfaces
//!
//! This module contains all external collaborator seams:
//! - `http` - API server (ingestion, panic, acknowledgment, zones, metrics)
//! - `broadcast` - real-time event fan-out bus
//! - `store` - alert/incident persistence with the geospatial query primitive
//! - `notify` - push notification gateway
//! - `contacts` - emergency-contact lookup

pub mod broadcast;
pub mod contacts;
pub mod http;
pub mod notify;
pub mod store;

// Re-export commonly used types
pub use broadcast::{EventBus, OutboundEvent, Target};
pub use contacts::{EmergencyContactProvider, MemoryContacts};
pub use notify::{HttpNotifier, NotificationSink, NullNotifier};
pub use store::{AlertStore, IncidentStore, MemoryStore, StoreError};
