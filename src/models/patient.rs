//! Patient entity model
//!
//! The `Patient` is the single owner of everything the simulation mutates
//! for one person: the hidden vision trajectory, the disease state, the
//! protocol state and every decision counter. Counters live here rather
//! than in any shared manager; population statistics are derived by a pure
//! reduction over final patients after the run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::models::types::{
    DiseaseState, DiscontinuationReason, PatientStatus, ProtocolPhase,
};
use crate::models::visit::VisitRecord;

/// Mutable protocol state carried by the patient between visits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolState {
    /// Current phase
    pub phase: ProtocolPhase,
    /// Current maintenance interval, days
    pub current_interval_days: i64,
    /// Injections given in the current loading sequence
    pub injections_in_phase: u32,
    /// Fixed-interval variant: days remaining to the next injection
    pub days_to_next_injection: i64,
    /// Fixed-interval variant: days remaining to the next assessment
    pub days_to_next_assessment: i64,
}

impl ProtocolState {
    /// Fresh loading-phase state
    #[must_use]
    pub fn loading(loading_interval_days: i64) -> Self {
        Self {
            phase: ProtocolPhase::Loading,
            current_interval_days: loading_interval_days,
            injections_in_phase: 0,
            days_to_next_injection: 0,
            days_to_next_assessment: 0,
        }
    }
}

/// One simulated patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Patient identifier (index within the run)
    pub id: usize,
    /// Age at treatment start, years
    pub age: f64,
    /// Vision at treatment start, ETDRS letters
    pub baseline_vision: f64,
    /// Hidden (true) vision, only observable through `measure`
    pub hidden_vision: f64,
    /// Personal ceiling: min(absolute maximum, baseline * ceiling factor)
    pub vision_ceiling: f64,
    /// Current disease-activity state
    pub disease_state: DiseaseState,
    /// Whether the patient is on treatment or discontinued
    pub status: PatientStatus,
    /// Calendar date of simulation day 0 for this patient
    pub treatment_start: NaiveDate,
    /// Day offset of the most recent injection, if any
    pub last_injection_day: Option<i64>,
    /// Cumulative injections across the whole history
    pub injection_count: u32,
    /// Consecutive visits with inactive disease
    pub consecutive_stable_visits: u32,
    /// Consecutive visits with observed vision below the poor-vision floor
    pub consecutive_low_vision_visits: u32,
    /// Maintenance visits since the observed vision last improved
    pub visits_without_improvement: u32,
    /// Consecutive stable visits while at the maximum interval
    pub stable_at_max_interval: u32,
    /// Best observed vision so far, for the no-improvement counter
    pub best_observed_vision: f64,
    /// Recent observed visions, newest last, for the deterioration window
    pub recent_observed: SmallVec<[f64; 8]>,
    /// Sub-intervals remaining in the current improvement window
    pub improvement_intervals_left: u32,
    /// Protocol phase and interval state
    pub protocol: ProtocolState,
    /// The single active discontinuation reason, if discontinued
    pub discontinuation_reason: Option<DiscontinuationReason>,
    /// Day offset at which treatment was stopped
    pub discontinuation_day: Option<i64>,
    /// Recurrence present but not yet detected while discontinued
    pub recurrence_present: bool,
    /// Number of times treatment has been resumed after a stop
    pub retreat_count: u32,
    /// Anatomical recurrence-risk feature present
    pub has_risk_feature: bool,
    /// Assigned clinician, a non-owning index into the shared pool
    pub clinician_id: usize,
    /// Append-only visit history, strictly time-ordered
    pub history: Vec<VisitRecord>,
}

impl Patient {
    /// Create a patient at treatment start with sampled baseline attributes
    #[must_use]
    pub fn new(
        id: usize,
        age: f64,
        baseline_vision: f64,
        vision_ceiling: f64,
        treatment_start: NaiveDate,
        loading_interval_days: i64,
        clinician_id: usize,
        has_risk_feature: bool,
    ) -> Self {
        assert!(
            baseline_vision >= 0.0 && baseline_vision <= vision_ceiling,
            "baseline vision {baseline_vision} outside [0, {vision_ceiling}]"
        );
        Self {
            id,
            age,
            baseline_vision,
            hidden_vision: baseline_vision,
            vision_ceiling,
            disease_state: DiseaseState::Naive,
            status: PatientStatus::OnTreatment,
            treatment_start,
            last_injection_day: None,
            injection_count: 0,
            consecutive_stable_visits: 0,
            consecutive_low_vision_visits: 0,
            visits_without_improvement: 0,
            stable_at_max_interval: 0,
            best_observed_vision: 0.0,
            recent_observed: SmallVec::new(),
            improvement_intervals_left: 0,
            protocol: ProtocolState::loading(loading_interval_days),
            discontinuation_reason: None,
            discontinuation_day: None,
            recurrence_present: false,
            retreat_count: 0,
            has_risk_feature,
            clinician_id,
            history: Vec::new(),
        }
    }

    /// Days since the last injection at the given day offset; `None` if the
    /// patient has never been injected
    #[must_use]
    pub fn days_since_injection(&self, day: i64) -> Option<i64> {
        self.last_injection_day.map(|d| day - d)
    }

    /// Register an injection given at the given day offset
    pub fn record_injection(&mut self, day: i64) {
        self.last_injection_day = Some(day);
        self.injection_count += 1;
        self.protocol.injections_in_phase += 1;
    }

    /// Mark the patient discontinued. A patient holds at most one active
    /// reason; stopping an already-stopped patient is a programming defect.
    pub fn discontinue(&mut self, reason: DiscontinuationReason, day: i64) {
        assert!(
            self.discontinuation_reason.is_none(),
            "patient {} already has an active discontinuation reason",
            self.id
        );
        self.status = PatientStatus::Discontinued;
        self.discontinuation_reason = Some(reason);
        self.discontinuation_day = Some(day);
        self.consecutive_stable_visits = 0;
        self.stable_at_max_interval = 0;
        self.consecutive_low_vision_visits = 0;
        self.improvement_intervals_left = 0;
    }

    /// Return the patient to active treatment after a detected recurrence
    pub fn resume_treatment(&mut self, protocol: ProtocolState) {
        self.status = PatientStatus::OnTreatment;
        self.discontinuation_reason = None;
        self.discontinuation_day = None;
        self.recurrence_present = false;
        self.retreat_count += 1;
        self.visits_without_improvement = 0;
        self.recent_observed.clear();
        self.protocol = protocol;
    }

    /// Update the per-patient decision counters after a measurement
    pub fn update_visit_counters(
        &mut self,
        observed: f64,
        disease_active: bool,
        at_max_interval: bool,
        poor_vision_threshold: f64,
        deterioration_window: usize,
    ) {
        if disease_active {
            self.consecutive_stable_visits = 0;
            self.stable_at_max_interval = 0;
        } else {
            self.consecutive_stable_visits += 1;
            if at_max_interval {
                self.stable_at_max_interval += 1;
            } else {
                self.stable_at_max_interval = 0;
            }
        }

        if observed < poor_vision_threshold {
            self.consecutive_low_vision_visits += 1;
        } else {
            self.consecutive_low_vision_visits = 0;
        }

        if observed > self.best_observed_vision {
            self.best_observed_vision = observed;
            self.visits_without_improvement = 0;
        } else {
            self.visits_without_improvement += 1;
        }

        self.recent_observed.push(observed);
        while self.recent_observed.len() > deterioration_window {
            self.recent_observed.remove(0);
        }
    }

    /// Observed loss across the deterioration window, letters; 0 until the
    /// window has filled
    #[must_use]
    pub fn deterioration_window_loss(&self, window: usize) -> f64 {
        if self.recent_observed.len() < window {
            return 0.0;
        }
        let first = self.recent_observed[0];
        let last = self.recent_observed[self.recent_observed.len() - 1];
        (first - last).max(0.0)
    }

    /// Append an immutable visit record; the history must stay time-ordered
    pub fn push_visit(&mut self, record: VisitRecord) {
        if let Some(previous) = self.history.last() {
            assert!(
                record.date >= previous.date,
                "patient {} visit history out of order",
                self.id
            );
        }
        self.history.push(record);
    }

    /// Hidden vision must always sit inside [0, personal ceiling]. A
    /// violation is a programming defect, not something to clamp away.
    pub fn assert_vision_invariant(&self) {
        assert!(
            self.hidden_vision >= 0.0 && self.hidden_vision <= self.vision_ceiling,
            "patient {} hidden vision {} outside [0, {}]",
            self.id,
            self.hidden_vision,
            self.vision_ceiling
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_patient() -> Patient {
        Patient::new(
            0,
            75.0,
            65.0,
            71.5,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            28,
            0,
            false,
        )
    }

    #[test]
    fn test_new_patient_starts_naive_on_treatment() {
        let patient = test_patient();
        assert_eq!(patient.disease_state, DiseaseState::Naive);
        assert_eq!(patient.status, PatientStatus::OnTreatment);
        assert_eq!(patient.hidden_vision, patient.baseline_vision);
        assert!(patient.discontinuation_reason.is_none());
    }

    #[test]
    fn test_stable_counter_resets_on_activity() {
        let mut patient = test_patient();
        patient.update_visit_counters(65.0, false, false, 20.0, 4);
        patient.update_visit_counters(66.0, false, false, 20.0, 4);
        assert_eq!(patient.consecutive_stable_visits, 2);
        patient.update_visit_counters(64.0, true, false, 20.0, 4);
        assert_eq!(patient.consecutive_stable_visits, 0);
    }

    #[test]
    fn test_deterioration_window_loss() {
        let mut patient = test_patient();
        for observed in [70.0, 66.0, 62.0, 58.0] {
            patient.update_visit_counters(observed, true, false, 20.0, 4);
        }
        assert_eq!(patient.deterioration_window_loss(4), 12.0);
        // window not yet full after a reset
        patient.recent_observed.clear();
        patient.update_visit_counters(58.0, true, false, 20.0, 4);
        assert_eq!(patient.deterioration_window_loss(4), 0.0);
    }

    #[test]
    #[should_panic(expected = "already has an active discontinuation reason")]
    fn test_double_discontinuation_panics() {
        let mut patient = test_patient();
        patient.discontinue(DiscontinuationReason::PlannedStable, 100);
        patient.discontinue(DiscontinuationReason::PoorVision, 120);
    }

    #[test]
    fn test_patient_round_trips_through_json() {
        let mut patient = test_patient();
        patient.update_visit_counters(64.0, false, false, 20.0, 4);
        patient.update_visit_counters(61.0, true, false, 20.0, 4);
        let json = serde_json::to_string(&patient).unwrap();
        let back: Patient = serde_json::from_str(&json).unwrap();
        assert_eq!(back.recent_observed.as_slice(), &[64.0, 61.0]);
        assert_eq!(back.consecutive_stable_visits, 0);
    }

    #[test]
    fn test_resume_clears_reason_and_counts_retreat() {
        let mut patient = test_patient();
        patient.discontinue(DiscontinuationReason::PlannedStable, 100);
        patient.resume_treatment(ProtocolState::loading(28));
        assert_eq!(patient.status, PatientStatus::OnTreatment);
        assert!(patient.discontinuation_reason.is_none());
        assert_eq!(patient.retreat_count, 1);
        assert_eq!(patient.protocol.phase, ProtocolPhase::Loading);
    }
}
