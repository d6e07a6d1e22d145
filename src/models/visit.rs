//! Visit records
//!
//! A `VisitRecord` is the fixed-shape, append-only unit of simulation
//! output: one per visit, immutable once appended to the patient's history.
//! Downstream collaborators (economics, reporting) consume these read-only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::types::{DiseaseState, DiscontinuationReason, VisitAction};

/// One visit in a patient's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Calendar date of the visit
    pub date: NaiveDate,
    /// Vision measured at the visit (noisy, rounded, [0, 100])
    pub observed_vision: f64,
    /// Hidden vision at the instant of the visit
    pub hidden_vision: f64,
    /// Disease state at the visit
    pub disease_state: DiseaseState,
    /// Action taken at the visit
    pub action: VisitAction,
    /// Days since the previous visit (0 for the first)
    pub interval_days: i64,
    /// Set when this visit triggered a discontinuation
    pub discontinued: Option<DiscontinuationReason>,
    /// Whether this is a post-stop monitoring visit
    pub is_monitoring: bool,
    /// Whether a recurrence was detected at this monitoring visit
    pub recurrence_detected: bool,
    /// Whether treatment resumed at this visit
    pub retreatment_started: bool,
}

impl VisitRecord {
    /// A routine on-treatment visit; stop/monitoring flags default to off
    #[must_use]
    pub fn on_treatment(
        date: NaiveDate,
        observed_vision: f64,
        hidden_vision: f64,
        disease_state: DiseaseState,
        action: VisitAction,
        interval_days: i64,
    ) -> Self {
        Self {
            date,
            observed_vision,
            hidden_vision,
            disease_state,
            action,
            interval_days,
            discontinued: None,
            is_monitoring: false,
            recurrence_detected: false,
            retreatment_started: false,
        }
    }
}
