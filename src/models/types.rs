//! Common domain type definitions
//!
//! This module contains the closed enum types used across the simulation
//! core. Disease states and discontinuation reasons are fixed taxonomies:
//! free-form strings are converted exactly once, at the configuration input
//! boundary, and rejected if unknown.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Discrete disease-activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiseaseState {
    /// Treatment-naive, no prior injections
    Naive,
    /// Quiescent disease under control
    Stable,
    /// Active neovascular disease
    Active,
    /// Highly active disease with rapid progression risk
    HighlyActive,
}

impl DiseaseState {
    /// All states, in transition-matrix row order
    pub const ALL: [Self; 4] = [Self::Naive, Self::Stable, Self::Active, Self::HighlyActive];

    /// Row/column index into the transition matrix
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Naive => 0,
            Self::Stable => 1,
            Self::Active => 2,
            Self::HighlyActive => 3,
        }
    }

    /// Severity rank used to decide whether a transition moves toward a
    /// worse state. Stable is best; untreated naive disease is
    /// active-leaning, so it ranks between Stable and Active.
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Stable => 0,
            Self::Naive => 1,
            Self::Active => 2,
            Self::HighlyActive => 3,
        }
    }

    /// Whether this state counts as an active-disease signal at a visit
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::HighlyActive)
    }

    /// Stable tag for downstream consumers
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Stable => "stable",
            Self::Active => "active",
            Self::HighlyActive => "highly_active",
        }
    }

    /// Convert a configuration label into a state. This is the single
    /// authoritative string boundary; anything unknown is a fatal
    /// configuration error.
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "stable" => Ok(Self::Stable),
            "active" => Ok(Self::Active),
            "highly_active" | "highly-active" => Ok(Self::HighlyActive),
            other => Err(SimulationError::UnknownState(other.to_string())),
        }
    }
}

/// Action taken at a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitAction {
    /// Anti-VEGF injection administered
    Injection,
    /// Assessment or monitoring only, no injection
    MonitoringOnly,
}

/// Treatment-protocol phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolPhase {
    /// Fixed-count, fixed-interval initial injection sequence
    Loading,
    /// Adaptive (or fixed) dosing after loading completes
    Maintenance,
}

/// Whether the patient is currently receiving active treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    /// Receiving injections per protocol
    OnTreatment,
    /// Treatment stopped; reason recorded on the patient
    Discontinued,
}

/// Clinician risk-tolerance category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTolerance {
    /// Reluctant to stop treatment
    Low,
    /// Follows the protocol's lead
    Medium,
    /// Quick to stop, slower to retreat
    High,
}

/// Fixed taxonomy of discontinuation reasons, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscontinuationReason {
    /// Death; terminal and absorbing
    Mortality,
    /// Loss to follow-up driven by treatment duration and injection burden
    Attrition,
    /// Administrative error (scheduling failure, referral loss)
    AdministrativeError,
    /// Clinician judgement after sustained stability or futility
    ClinicalDecision,
    /// Cumulative significant vision loss despite treatment
    ContinuedDeterioration,
    /// Protocol-based planned stop at maximum interval with stability
    PlannedStable,
    /// Observed vision persistently below the treatment-benefit floor
    PoorVision,
}

impl DiscontinuationReason {
    /// All reasons, in priority order (first match wins)
    pub const ALL: [Self; 7] = [
        Self::Mortality,
        Self::Attrition,
        Self::AdministrativeError,
        Self::ClinicalDecision,
        Self::ContinuedDeterioration,
        Self::PlannedStable,
        Self::PoorVision,
    ];

    /// Stable tag for downstream consumers
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mortality => "mortality",
            Self::Attrition => "attrition",
            Self::AdministrativeError => "administrative_error",
            Self::ClinicalDecision => "clinical_decision",
            Self::ContinuedDeterioration => "continued_deterioration",
            Self::PlannedStable => "planned_stable",
            Self::PoorVision => "poor_vision",
        }
    }

    /// Convert a configuration tag into a reason; unknown tags are fatal.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_lowercase().as_str() {
            "mortality" => Ok(Self::Mortality),
            "attrition" => Ok(Self::Attrition),
            "administrative_error" => Ok(Self::AdministrativeError),
            "clinical_decision" => Ok(Self::ClinicalDecision),
            "continued_deterioration" => Ok(Self::ContinuedDeterioration),
            "planned_stable" => Ok(Self::PlannedStable),
            "poor_vision" => Ok(Self::PoorVision),
            other => Err(SimulationError::UnknownReason(other.to_string())),
        }
    }

    /// Whether this reason ends the patient's timeline outright
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Mortality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels_round_trip() {
        for state in DiseaseState::ALL {
            assert_eq!(DiseaseState::from_label(state.as_str()).unwrap(), state);
        }
        assert!(DiseaseState::from_label("remission").is_err());
    }

    #[test]
    fn test_reason_tags_round_trip() {
        for reason in DiscontinuationReason::ALL {
            assert_eq!(
                DiscontinuationReason::from_tag(reason.as_str()).unwrap(),
                reason
            );
        }
        assert!(DiscontinuationReason::from_tag("cured").is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(DiseaseState::Stable.severity() < DiseaseState::Naive.severity());
        assert!(DiseaseState::Naive.severity() < DiseaseState::Active.severity());
        assert!(DiseaseState::Active.severity() < DiseaseState::HighlyActive.severity());
    }

    #[test]
    fn test_only_mortality_is_terminal() {
        for reason in DiscontinuationReason::ALL {
            assert_eq!(
                reason.is_terminal(),
                reason == DiscontinuationReason::Mortality
            );
        }
    }
}
