//! Discontinuation and retreatment engine
//!
//! At each on-treatment visit the engine evaluates the fixed taxonomy of
//! stop reasons in priority order; the first reason whose draw fires wins,
//! and a patient holds at most one active reason. Clinical-judgement
//! reasons (clinical decision, deterioration, planned stop, poor vision)
//! pass through the clinician evaluator; mortality, attrition and
//! administrative error do not.
//!
//! While discontinued, recurrence risk follows a time-since-stop cumulative
//! curve piecewise-interpolated between configured 1-year/3-year/5-year
//! anchors specific to the stop reason. Monitoring visits convert the
//! cumulative curve into a conditional hazard per gap, so the simulated
//! cumulative incidence reproduces the anchors regardless of the cadence.

use crate::config::{DiscontinuationParams, RecurrenceAnchors};
use crate::models::clinician::Clinician;
use crate::models::patient::Patient;
use crate::models::types::{DiscontinuationReason, ProtocolPhase};
use crate::rng::PatientRng;

const DAYS_PER_YEAR: f64 = 365.0;

/// Transient outcome of one discontinuation evaluation; its effects are
/// written into the patient and visit record, never persisted directly
#[derive(Debug, Clone, Copy)]
pub struct DiscontinuationDecision {
    /// The winning stop reason
    pub reason: DiscontinuationReason,
    /// The probability that produced the stop
    pub probability: f64,
}

/// Outcome of a monitoring visit while discontinued
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitoringOutcome {
    /// A recurrence is now present (sampled at this or an earlier visit)
    pub recurrence_present: bool,
    /// The recurrence was detected at this visit
    pub recurrence_detected: bool,
    /// Treatment resumes at this visit
    pub retreat: bool,
}

/// Shared, read-only discontinuation engine
#[derive(Debug, Clone)]
pub struct DiscontinuationEngine {
    params: DiscontinuationParams,
}

impl DiscontinuationEngine {
    #[must_use]
    pub fn new(params: DiscontinuationParams) -> Self {
        Self { params }
    }

    /// Evaluate every stop reason in priority order at an on-treatment
    /// visit. Returns the first reason whose draw fires, or `None`.
    pub fn evaluate(
        &self,
        patient: &Patient,
        day: i64,
        interval_days: i64,
        at_max_interval: bool,
        clinician: &Clinician,
        rng: &mut PatientRng,
    ) -> Option<DiscontinuationDecision> {
        let params = &self.params;

        // 1. Mortality: age-adjusted per-interval probability.
        let current_age = patient.age + day as f64 / DAYS_PER_YEAR;
        let age_multiplier = 2f64.powf(
            (current_age - params.mortality_reference_age) / params.mortality_age_doubling_years,
        );
        let mortality = (params.mortality_annual_base * age_multiplier * interval_days.max(1) as f64
            / DAYS_PER_YEAR)
            .clamp(0.0, 1.0);
        if rng.bernoulli(mortality) {
            return Some(DiscontinuationDecision {
                reason: DiscontinuationReason::Mortality,
                probability: mortality,
            });
        }

        // 2. Attrition scales with treatment duration and injection burden.
        let years_on_treatment = day as f64 / DAYS_PER_YEAR;
        let attrition = (params.attrition_base_per_visit
            * (1.0
                + years_on_treatment * params.attrition_duration_factor
                + f64::from(patient.injection_count) * params.attrition_burden_factor))
            .clamp(0.0, 1.0);
        if rng.bernoulli(attrition) {
            return Some(DiscontinuationDecision {
                reason: DiscontinuationReason::Attrition,
                probability: attrition,
            });
        }

        // 3. Administrative error: small constant per-visit probability.
        if rng.bernoulli(params.administrative_per_visit) {
            return Some(DiscontinuationDecision {
                reason: DiscontinuationReason::AdministrativeError,
                probability: params.administrative_per_visit,
            });
        }

        // 4. Clinical decision: sustained stability, or futility past loading.
        let stability_threshold = clinician
            .stability_threshold_override
            .unwrap_or(params.stable_visits_threshold);
        let futility = patient.protocol.phase == ProtocolPhase::Maintenance
            && patient.visits_without_improvement >= params.no_improvement_visits_threshold;
        if patient.consecutive_stable_visits >= stability_threshold || futility {
            if let Some(decision) = self.clinical_stop(
                DiscontinuationReason::ClinicalDecision,
                params.clinical_decision_probability,
                clinician,
                rng,
            ) {
                return Some(decision);
            }
        }

        // 5. Continued deterioration over the recent-visit window.
        if patient.deterioration_window_loss(params.deterioration_window_visits)
            >= params.deterioration_loss_threshold
        {
            if let Some(decision) = self.clinical_stop(
                DiscontinuationReason::ContinuedDeterioration,
                params.deterioration_probability,
                clinician,
                rng,
            ) {
                return Some(decision);
            }
        }

        // 6. Planned stop at maximum interval with sustained stability;
        //    independently probabilistic at every qualifying visit.
        if at_max_interval && patient.stable_at_max_interval >= params.planned_stable_visits_at_max
        {
            if let Some(decision) = self.clinical_stop(
                DiscontinuationReason::PlannedStable,
                params.planned_stop_probability,
                clinician,
                rng,
            ) {
                return Some(decision);
            }
        }

        // 7. Poor absolute vision past the grace period: the stop is first
        //    considered at the visit after the grace visits have elapsed.
        if patient.consecutive_low_vision_visits > params.poor_vision_grace_visits {
            if let Some(decision) = self.clinical_stop(
                DiscontinuationReason::PoorVision,
                params.poor_vision_probability,
                clinician,
                rng,
            ) {
                return Some(decision);
            }
        }

        None
    }

    /// Sample a clinical-judgement stop and run it past the clinician
    fn clinical_stop(
        &self,
        reason: DiscontinuationReason,
        probability: f64,
        clinician: &Clinician,
        rng: &mut PatientRng,
    ) -> Option<DiscontinuationDecision> {
        let protocol_stop = rng.bernoulli(probability);
        let (stop, used_probability) =
            clinician.evaluate_discontinuation(protocol_stop, probability, rng);
        stop.then_some(DiscontinuationDecision {
            reason,
            probability: used_probability,
        })
    }

    /// Absolute monitoring-visit day offsets for a stop at `stop_day`,
    /// bounded by the horizon. Attrition schedules nothing (the patient is
    /// lost to follow-up) and mortality is terminal.
    #[must_use]
    pub fn monitoring_schedule(
        &self,
        reason: DiscontinuationReason,
        stop_day: i64,
        horizon_days: i64,
    ) -> Vec<i64> {
        let weeks: &[i64] = match reason {
            DiscontinuationReason::Mortality | DiscontinuationReason::Attrition => &[],
            DiscontinuationReason::AdministrativeError => {
                &self.params.monitoring.administrative_error_weeks
            }
            DiscontinuationReason::ClinicalDecision => {
                &self.params.monitoring.clinical_decision_weeks
            }
            DiscontinuationReason::ContinuedDeterioration => {
                &self.params.monitoring.continued_deterioration_weeks
            }
            DiscontinuationReason::PlannedStable => &self.params.monitoring.planned_stable_weeks,
            DiscontinuationReason::PoorVision => &self.params.monitoring.poor_vision_weeks,
        };
        let mut days: Vec<i64> = weeks
            .iter()
            .map(|w| stop_day + w * 7)
            .filter(|d| *d <= horizon_days)
            .collect();
        if weeks.is_empty() {
            return days;
        }
        if let Some(gap) = self.params.monitoring.recurring_gap_weeks {
            let mut next = stop_day + weeks.last().unwrap() * 7 + gap * 7;
            while next <= horizon_days {
                days.push(next);
                next += gap * 7;
            }
        }
        days
    }

    fn anchors_for(&self, reason: DiscontinuationReason) -> Option<&RecurrenceAnchors> {
        match reason {
            DiscontinuationReason::Mortality | DiscontinuationReason::Attrition => None,
            DiscontinuationReason::AdministrativeError => {
                Some(&self.params.recurrence.administrative_error)
            }
            DiscontinuationReason::ClinicalDecision => {
                Some(&self.params.recurrence.clinical_decision)
            }
            DiscontinuationReason::ContinuedDeterioration => {
                Some(&self.params.recurrence.continued_deterioration)
            }
            DiscontinuationReason::PlannedStable => Some(&self.params.recurrence.planned_stable),
            DiscontinuationReason::PoorVision => Some(&self.params.recurrence.poor_vision),
        }
    }

    /// Cumulative recurrence probability at `days_since_stop`, piecewise-
    /// linearly interpolated through (0, 0) and the 1/3/5-year anchors,
    /// flat beyond 5 years.
    #[must_use]
    pub fn cumulative_recurrence(
        &self,
        reason: DiscontinuationReason,
        days_since_stop: f64,
    ) -> f64 {
        let Some(anchors) = self.anchors_for(reason) else {
            return 0.0;
        };
        let points = [
            (0.0, 0.0),
            (DAYS_PER_YEAR, anchors.year1),
            (3.0 * DAYS_PER_YEAR, anchors.year3),
            (5.0 * DAYS_PER_YEAR, anchors.year5),
        ];
        if days_since_stop <= 0.0 {
            return 0.0;
        }
        for window in points.windows(2) {
            let (d0, c0) = window[0];
            let (d1, c1) = window[1];
            if days_since_stop <= d1 {
                return c0 + (days_since_stop - d0) / (d1 - d0) * (c1 - c0);
            }
        }
        anchors.year5
    }

    /// Conditional recurrence probability over a monitoring gap
    /// (`previous_check` to `current_check`, days since stop), given no
    /// recurrence so far, modified by the risk-feature multiplier.
    #[must_use]
    pub fn recurrence_hazard(
        &self,
        reason: DiscontinuationReason,
        previous_check: f64,
        current_check: f64,
        has_risk_feature: bool,
    ) -> f64 {
        let c0 = self.cumulative_recurrence(reason, previous_check);
        let c1 = self.cumulative_recurrence(reason, current_check);
        let base = ((c1 - c0) / (1.0 - c0).max(f64::EPSILON)).clamp(0.0, 1.0);
        let multiplier = if has_risk_feature {
            self.params.recurrence.risk_feature_multiplier
        } else {
            1.0
        };
        (base * multiplier).clamp(0.0, 1.0)
    }

    /// Process one monitoring visit while discontinued: sample recurrence
    /// over the elapsed gap, roll detection (conditioned on imaging), and
    /// evaluate retreatment eligibility on detection.
    #[allow(clippy::too_many_arguments)]
    pub fn monitoring_visit(
        &self,
        patient: &Patient,
        observed_vision: f64,
        previous_check_day: i64,
        day: i64,
        clinician: &Clinician,
        rng: &mut PatientRng,
    ) -> MonitoringOutcome {
        let reason = patient
            .discontinuation_reason
            .expect("monitoring visit for a patient without a stop reason");
        let stop_day = patient
            .discontinuation_day
            .expect("monitoring visit for a patient without a stop date");

        let mut outcome = MonitoringOutcome {
            recurrence_present: patient.recurrence_present,
            ..MonitoringOutcome::default()
        };

        if !outcome.recurrence_present {
            let hazard = self.recurrence_hazard(
                reason,
                (previous_check_day - stop_day) as f64,
                (day - stop_day) as f64,
                patient.has_risk_feature,
            );
            outcome.recurrence_present = rng.bernoulli(hazard);
        }

        if !outcome.recurrence_present {
            return outcome;
        }

        // Detection requires imaging to have been performed at this visit.
        let imaging = rng.bernoulli(self.params.recurrence.imaging_probability);
        let detected = imaging && rng.bernoulli(self.params.recurrence.detection_probability);
        if !detected {
            return outcome;
        }
        outcome.recurrence_detected = true;

        // Eligibility: a detected active-disease signal plus sufficient
        // vision loss from baseline.
        let vision_loss = patient.baseline_vision - observed_vision;
        if vision_loss < self.params.retreatment.min_vision_loss_from_baseline {
            return outcome;
        }
        let protocol_retreat = rng.bernoulli(self.params.retreatment.base_probability);
        let (retreat, _) = clinician.evaluate_retreatment(
            protocol_retreat,
            self.params.retreatment.base_probability,
            rng,
        );
        outcome.retreat = retreat;
        outcome
    }
}
