//! Domain models for the simulation core

pub mod clinician;
pub mod patient;
pub mod types;
pub mod visit;

pub use clinician::{Clinician, ClinicianManager, DecisionPolicy};
pub use patient::{Patient, ProtocolState};
pub use types::{
    DiseaseState, DiscontinuationReason, PatientStatus, ProtocolPhase, RiskTolerance, VisitAction,
};
pub use visit::VisitRecord;
