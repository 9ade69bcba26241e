//! Domain models - core business types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Alert` / `Incident` - the persisted safety entities
//! - `SafeZone` - registered circular geofence with dwell threshold
//! - `LocationSample` - transient subject position input
//! - `SafetyStatus` - per-subject containment state
//! - `EngineError` - error taxonomy with HTTP mapping

pub mod alert;
pub mod error;
pub mod types;
