//! Treatment-protocol engine
//!
//! A state machine over {loading, maintenance} that decides, at the end of
//! each visit, when the patient is seen next and what happens then.
//! Loading completion is determined purely by injection count, never by
//! calendar time. Treat-and-extend titrates the maintenance interval inside
//! [min, max]; the fixed-interval variant keeps a constant injection
//! spacing and may interleave monitoring-only assessment visits that never
//! alter the injection schedule.

use crate::config::{ProtocolParams, ProtocolVariant};
use crate::models::clinician::Clinician;
use crate::models::patient::{Patient, ProtocolState};
use crate::models::types::{ProtocolPhase, VisitAction};

/// The next scheduled visit: how far away, and what will happen there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledVisit {
    /// Days until the visit
    pub interval_days: i64,
    /// Action planned for the visit
    pub action: VisitAction,
}

/// Shared, read-only protocol engine
#[derive(Debug, Clone)]
pub struct TreatmentProtocolEngine {
    params: ProtocolParams,
}

impl TreatmentProtocolEngine {
    #[must_use]
    pub fn new(params: ProtocolParams) -> Self {
        Self { params }
    }

    /// Protocol state for a treatment-naive patient
    #[must_use]
    pub fn initial_state(&self) -> ProtocolState {
        ProtocolState::loading(self.params.loading_interval_days)
    }

    /// Protocol state after retreatment: loading re-triggers when
    /// configured, otherwise maintenance restarts at the minimum interval
    #[must_use]
    pub fn state_after_retreatment(&self) -> ProtocolState {
        if self.params.retreatment_resets_loading {
            self.initial_state()
        } else {
            let mut state = self.initial_state();
            state.phase = ProtocolPhase::Maintenance;
            state.current_interval_days = self.params.min_interval_days;
            state.days_to_next_injection = self.maintenance_interval();
            state.days_to_next_assessment = self.params.assessment_interval_days.unwrap_or(0);
            state
        }
    }

    /// The interval cap this clinician will actually extend to
    #[must_use]
    pub fn effective_max_interval(&self, clinician: &Clinician) -> i64 {
        clinician
            .preferred_max_interval_days
            .map_or(self.params.max_interval_days, |preferred| {
                preferred
                    .clamp(self.params.min_interval_days, self.params.max_interval_days)
            })
    }

    fn maintenance_interval(&self) -> i64 {
        match self.params.variant {
            ProtocolVariant::TreatAndExtend => self.params.min_interval_days,
            ProtocolVariant::FixedInterval => self.params.fixed_interval_days,
        }
    }

    /// Decide the next visit for a patient whose current visit just
    /// finished. `disease_active` is the observed recurrence signal at the
    /// current visit. Mutates the patient's protocol state.
    pub fn next_visit(
        &self,
        patient: &mut Patient,
        disease_active: bool,
        clinician: &Clinician,
    ) -> ScheduledVisit {
        if patient.protocol.phase == ProtocolPhase::Loading {
            if patient.protocol.injections_in_phase < self.params.loading_injections {
                return ScheduledVisit {
                    interval_days: self.params.loading_interval_days,
                    action: VisitAction::Injection,
                };
            }
            // Loading complete; enter maintenance. The futility counter
            // only counts maintenance visits, so it restarts here.
            patient.protocol.phase = ProtocolPhase::Maintenance;
            patient.visits_without_improvement = 0;
            patient.protocol.current_interval_days = self.maintenance_interval();
            patient.protocol.days_to_next_injection = self.maintenance_interval();
            patient.protocol.days_to_next_assessment =
                self.params.assessment_interval_days.unwrap_or(0);
            if self.params.variant == ProtocolVariant::FixedInterval {
                return self.next_fixed_visit(patient);
            }
            let interval = patient.protocol.current_interval_days;
            debug_assert!(
                (self.params.min_interval_days..=self.params.max_interval_days)
                    .contains(&interval)
            );
            return ScheduledVisit {
                interval_days: interval,
                action: VisitAction::Injection,
            };
        }

        match self.params.variant {
            ProtocolVariant::TreatAndExtend => {
                let max = self.effective_max_interval(clinician);
                let current = patient.protocol.current_interval_days;
                let next = if disease_active {
                    (current - self.params.shorten_step_days).max(self.params.min_interval_days)
                } else {
                    (current + self.params.extend_step_days).min(max)
                };
                assert!(
                    next >= self.params.min_interval_days && next <= self.params.max_interval_days,
                    "treat-and-extend interval {next} escaped [{}, {}]",
                    self.params.min_interval_days,
                    self.params.max_interval_days
                );
                patient.protocol.current_interval_days = next;
                ScheduledVisit {
                    interval_days: next,
                    action: VisitAction::Injection,
                }
            }
            ProtocolVariant::FixedInterval => self.next_fixed_visit(patient),
        }
    }

    /// Fixed-interval scheduling: the injection countdown and the optional
    /// assessment countdown run side by side; whichever is due sooner is
    /// the next visit, and assessments never move the injection date.
    fn next_fixed_visit(&self, patient: &mut Patient) -> ScheduledVisit {
        let state = &mut patient.protocol;
        let Some(assessment_gap) = self.params.assessment_interval_days else {
            state.current_interval_days = self.params.fixed_interval_days;
            return ScheduledVisit {
                interval_days: self.params.fixed_interval_days,
                action: VisitAction::Injection,
            };
        };

        // Reset whichever countdown expired at the visit we are leaving.
        if state.days_to_next_injection <= 0 {
            state.days_to_next_injection = self.params.fixed_interval_days;
        }
        if state.days_to_next_assessment <= 0 {
            state.days_to_next_assessment = assessment_gap;
        }

        let gap = state.days_to_next_injection.min(state.days_to_next_assessment);
        state.days_to_next_injection -= gap;
        state.days_to_next_assessment -= gap;
        let action = if state.days_to_next_injection == 0 {
            VisitAction::Injection
        } else {
            VisitAction::MonitoringOnly
        };
        state.current_interval_days = self.params.fixed_interval_days;
        ScheduledVisit {
            interval_days: gap,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClinicianParams;
    use crate::models::clinician::ClinicianManager;
    use chrono::NaiveDate;

    fn engine(params: ProtocolParams) -> TreatmentProtocolEngine {
        TreatmentProtocolEngine::new(params)
    }

    fn test_patient(engine: &TreatmentProtocolEngine) -> Patient {
        let mut patient = Patient::new(
            0,
            75.0,
            65.0,
            71.5,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            28,
            0,
            false,
        );
        patient.protocol = engine.initial_state();
        patient
    }

    fn any_clinician() -> Clinician {
        ClinicianManager::from_config(&ClinicianParams::default())
            .unwrap()
            .get(4)
            .clone()
    }

    #[test]
    fn test_loading_schedule_is_fixed() {
        let engine = engine(ProtocolParams::default());
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();

        patient.record_injection(0);
        let next = engine.next_visit(&mut patient, false, &clinician);
        assert_eq!(next, ScheduledVisit { interval_days: 28, action: VisitAction::Injection });

        patient.record_injection(28);
        let next = engine.next_visit(&mut patient, false, &clinician);
        assert_eq!(next.interval_days, 28);
        assert_eq!(patient.protocol.phase, ProtocolPhase::Loading);
    }

    #[test]
    fn test_loading_completes_by_injection_count() {
        let engine = engine(ProtocolParams::default());
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();
        for day in [0, 28, 56] {
            patient.record_injection(day);
            engine.next_visit(&mut patient, false, &clinician);
        }
        assert_eq!(patient.protocol.phase, ProtocolPhase::Maintenance);
    }

    #[test]
    fn test_loading_visits_do_not_count_toward_futility() {
        let engine = engine(ProtocolParams::default());
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();
        for day in [0, 28, 56] {
            patient.record_injection(day);
            // a flat loading phase accrues no-improvement visits
            patient.visits_without_improvement += 1;
            engine.next_visit(&mut patient, false, &clinician);
        }
        assert_eq!(patient.protocol.phase, ProtocolPhase::Maintenance);
        assert_eq!(patient.visits_without_improvement, 0);
    }

    #[test]
    fn test_extend_and_shorten_stay_in_bounds() {
        let engine = engine(ProtocolParams::default());
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();
        patient.protocol.phase = ProtocolPhase::Maintenance;
        patient.protocol.current_interval_days = 28;

        // extend to the max and stick there
        for _ in 0..12 {
            let next = engine.next_visit(&mut patient, false, &clinician);
            assert!(next.interval_days >= 28 && next.interval_days <= 112);
        }
        assert_eq!(patient.protocol.current_interval_days, 112);

        // shorten back down to the min and stick there
        for _ in 0..12 {
            let next = engine.next_visit(&mut patient, true, &clinician);
            assert!(next.interval_days >= 28 && next.interval_days <= 112);
        }
        assert_eq!(patient.protocol.current_interval_days, 28);
    }

    #[test]
    fn test_clinician_preferred_max_caps_extension() {
        let engine = engine(ProtocolParams::default());
        let mut patient = test_patient(&engine);
        let mut clinician = any_clinician();
        clinician.preferred_max_interval_days = Some(98);
        patient.protocol.phase = ProtocolPhase::Maintenance;
        patient.protocol.current_interval_days = 28;
        for _ in 0..12 {
            engine.next_visit(&mut patient, false, &clinician);
        }
        assert_eq!(patient.protocol.current_interval_days, 98);
    }

    #[test]
    fn test_fixed_variant_keeps_constant_spacing() {
        let mut params = ProtocolParams::default();
        params.variant = ProtocolVariant::FixedInterval;
        params.fixed_interval_days = 56;
        params.assessment_interval_days = None;
        let engine = engine(params);
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();
        for day in [0, 28, 56] {
            patient.record_injection(day);
            engine.next_visit(&mut patient, false, &clinician);
        }
        for active in [true, false, true] {
            let next = engine.next_visit(&mut patient, active, &clinician);
            assert_eq!(next, ScheduledVisit { interval_days: 56, action: VisitAction::Injection });
        }
    }

    #[test]
    fn test_fixed_variant_interleaves_assessments_without_moving_injections() {
        let mut params = ProtocolParams::default();
        params.variant = ProtocolVariant::FixedInterval;
        params.fixed_interval_days = 56;
        params.assessment_interval_days = Some(42);
        let engine = engine(params);
        let mut patient = test_patient(&engine);
        let clinician = any_clinician();
        let mut schedule = ScheduledVisit { interval_days: 0, action: VisitAction::Injection };
        for day in [0, 28, 56] {
            patient.record_injection(day);
            schedule = engine.next_visit(&mut patient, false, &clinician);
        }
        // walk a year of maintenance, reconstructing absolute days
        let mut day = 56; // last loading injection
        let mut injection_days = vec![56];
        let mut assessment_seen = false;
        for _ in 0..20 {
            day += schedule.interval_days;
            match schedule.action {
                VisitAction::Injection => injection_days.push(day),
                VisitAction::MonitoringOnly => assessment_seen = true,
            }
            schedule = engine.next_visit(&mut patient, false, &clinician);
        }
        assert!(assessment_seen);
        // injections stay exactly 56 days apart despite interleaved visits
        for pair in injection_days.windows(2) {
            assert_eq!(pair[1] - pair[0], 56);
        }
    }

    #[test]
    fn test_retreatment_reset_honours_configuration() {
        let mut params = ProtocolParams::default();
        params.retreatment_resets_loading = true;
        let engine = TreatmentProtocolEngine::new(params.clone());
        assert_eq!(engine.state_after_retreatment().phase, ProtocolPhase::Loading);

        params.retreatment_resets_loading = false;
        let engine = TreatmentProtocolEngine::new(params);
        let state = engine.state_after_retreatment();
        assert_eq!(state.phase, ProtocolPhase::Maintenance);
        assert_eq!(state.current_interval_days, 28);
    }
}
