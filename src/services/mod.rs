//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `monitor` - per-subject safety state machine and sample loop
//! - `escalation` - automatic alert synthesis on dwell-threshold breach
//! - `panic` - manual panic alert intake
//! - `acknowledge` - role-gated alert acknowledgment
//! - `incidents` - incident lifecycle transitions
//! - `geofence` - containment and spherical-cap predicates
//! - `registry` - active safe-zone set

pub mod acknowledge;
pub mod escalation;
pub mod geofence;
pub mod incidents;
pub mod monitor;
pub mod panic;
pub mod registry;

// Re-export commonly used types
pub use acknowledge::AcknowledgmentHandler;
pub use escalation::EscalationEngine;
pub use incidents::IncidentHandler;
pub use monitor::SafetyMonitor;
pub use panic::PanicIntake;
pub use registry::{SafeZoneRegistry, ZoneSpec};
