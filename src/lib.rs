//! A stochastic patient-level simulation of anti-angiogenic (anti-VEGF)
//! treatment protocols for chronic neovascular retinal disease.
//!
//! The crate is the patient simulation core: a per-patient state machine
//! combining discrete disease-activity states, a continuous hidden
//! vision-acuity trajectory observable only at visits, a treatment-protocol
//! engine (loading, treat-and-extend, fixed-interval), per-clinician
//! decision variation, and a discontinuation/retreatment engine with
//! competing stop reasons and time-dependent recurrence risk.
//!
//! Downstream collaborators (economics, visualization, reporting) consume
//! the run output through [`SimulationOutput::visit_events`], a read-only
//! sequence of visit events.

pub mod config;
pub mod disease;
pub mod discontinuation;
pub mod engine;
pub mod error;
pub mod models;
pub mod protocol;
pub mod rng;
pub mod utils;
pub mod vision;

// Re-export the most common types for easier use
// Core types
pub use config::{ProtocolVariant, SimulationConfig};
pub use error::{Result, SimulationError};

// Models
pub use models::{
    Clinician, ClinicianManager, DiseaseState, DiscontinuationReason, Patient, PatientStatus,
    ProtocolPhase, RiskTolerance, VisitAction, VisitRecord,
};

// Component engines
pub use disease::DiseaseStateModel;
pub use discontinuation::{DiscontinuationDecision, DiscontinuationEngine};
pub use protocol::TreatmentProtocolEngine;
pub use vision::VisionTrajectoryModel;

// Orchestration
pub use engine::{PopulationStats, SimulationOutput, SimulationRunner};
pub use rng::PatientRng;
