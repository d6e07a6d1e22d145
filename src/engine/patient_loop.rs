//! Per-patient simulation loop
//!
//! Advances one patient across calendar time in fixed sub-intervals. The
//! hidden vision and the disease state update on the sub-interval grid; at
//! each scheduled visit the protocol and discontinuation engines run,
//! consulting the assigned clinician, and decide the next visit date.
//! Exactly one immutable `VisitRecord` is appended per visit.

use std::collections::VecDeque;

use chrono::Duration;

use crate::config::SimulationConfig;
use crate::disease::DiseaseStateModel;
use crate::discontinuation::DiscontinuationEngine;
use crate::models::clinician::ClinicianManager;
use crate::models::patient::Patient;
use crate::models::types::{DiseaseState, PatientStatus, ProtocolPhase, VisitAction};
use crate::models::visit::VisitRecord;
use crate::protocol::TreatmentProtocolEngine;
use crate::rng::PatientRng;
use crate::vision::VisionTrajectoryModel;

/// The shared, read-only model set used by every patient worker
#[derive(Debug)]
pub struct SimulationModels {
    /// Disease-state transition model
    pub disease: DiseaseStateModel,
    /// Hidden vision-trajectory model
    pub vision: VisionTrajectoryModel,
    /// Treatment-protocol engine
    pub protocol: TreatmentProtocolEngine,
    /// Discontinuation/retreatment engine
    pub discontinuation: DiscontinuationEngine,
}

/// Simulate a single patient from treatment start to the horizon.
/// Deterministic: the same master seed and patient index always produce
/// the same visit history.
pub fn simulate_patient(
    config: &SimulationConfig,
    models: &SimulationModels,
    clinicians: &ClinicianManager,
    patient_index: usize,
) -> Patient {
    let pop = &config.population;
    let mut rng = PatientRng::for_patient(pop.master_seed, patient_index);

    let baseline = rng
        .gaussian(pop.baseline_vision.mean, pop.baseline_vision.sd)
        .clamp(pop.baseline_vision_range.0, pop.baseline_vision_range.1)
        .round();
    let age = rng
        .gaussian(pop.age.mean, pop.age.sd)
        .clamp(pop.age_range.0, pop.age_range.1);
    let has_risk_feature = rng.bernoulli(pop.risk_feature_prevalence);
    let clinician_id = clinicians.assign_initial(&mut rng);

    let mut patient = Patient::new(
        patient_index,
        age,
        baseline,
        models.vision.ceiling_for_baseline(baseline),
        pop.start_date,
        config.protocol.loading_interval_days,
        clinician_id,
        has_risk_feature,
    );
    patient.protocol = models.protocol.initial_state();

    let horizon = pop.horizon_days;
    let sub = pop.sub_interval_days;
    let mut model_day: i64 = 0;
    let mut previous_visit_day: i64 = 0;
    let mut next_visit_day: i64 = 0;
    let mut next_action = VisitAction::Injection;
    let mut monitoring_days: VecDeque<i64> = VecDeque::new();
    let mut last_recurrence_check: i64 = 0;

    while next_visit_day <= horizon {
        // Advance the models on the fortnight grid up to the visit.
        while model_day + sub <= next_visit_day {
            let since_injection = patient.days_since_injection(model_day);
            let effect = models.disease.treatment_effect(since_injection);
            // A never-injected patient has been untreated since day 0.
            let days_untreated = since_injection.unwrap_or(model_day);
            models
                .vision
                .advance(&mut patient, effect, days_untreated, &mut rng);
            patient.disease_state =
                models
                    .disease
                    .transition(patient.disease_state, effect, &mut rng);
            model_day += sub;
        }

        let day = next_visit_day;
        let interval = day - previous_visit_day;
        let date = pop.start_date + Duration::days(day);
        patient.clinician_id = clinicians.clinician_for_visit(patient.clinician_id, &mut rng);
        let clinician = clinicians.get(patient.clinician_id);
        let observed = models.vision.measure(&patient, &mut rng);

        match patient.status {
            PatientStatus::OnTreatment => {
                let disease_active = patient.disease_state.is_active();
                let at_max = patient.protocol.phase == ProtocolPhase::Maintenance
                    && patient.protocol.current_interval_days
                        >= models.protocol.effective_max_interval(clinician);
                patient.update_visit_counters(
                    observed,
                    disease_active,
                    at_max,
                    config.discontinuation.poor_vision_threshold,
                    config.discontinuation.deterioration_window_visits,
                );

                let decision = models.discontinuation.evaluate(
                    &patient,
                    day,
                    interval,
                    at_max,
                    clinician,
                    &mut rng,
                );

                if let Some(decision) = decision {
                    patient.discontinue(decision.reason, day);
                    let mut record = VisitRecord::on_treatment(
                        date,
                        observed,
                        patient.hidden_vision,
                        patient.disease_state,
                        VisitAction::MonitoringOnly,
                        interval,
                    );
                    record.discontinued = Some(decision.reason);
                    patient.push_visit(record);

                    if decision.reason.is_terminal() {
                        break;
                    }
                    monitoring_days = models
                        .discontinuation
                        .monitoring_schedule(decision.reason, day, horizon)
                        .into();
                    last_recurrence_check = day;
                    let Some(first_monitoring) = monitoring_days.pop_front() else {
                        // e.g. lost to follow-up: nothing is scheduled
                        break;
                    };
                    previous_visit_day = day;
                    next_visit_day = first_monitoring;
                    next_action = VisitAction::MonitoringOnly;
                } else {
                    let action = next_action;
                    if action == VisitAction::Injection {
                        // The window check reads the previous injection day,
                        // so it runs before the injection is recorded.
                        models.vision.on_injection(&mut patient, day, &mut rng);
                        patient.record_injection(day);
                    }
                    patient.push_visit(VisitRecord::on_treatment(
                        date,
                        observed,
                        patient.hidden_vision,
                        patient.disease_state,
                        action,
                        interval,
                    ));
                    let schedule = models.protocol.next_visit(&mut patient, disease_active, clinician);
                    previous_visit_day = day;
                    next_visit_day = day + schedule.interval_days;
                    next_action = schedule.action;
                }
            }
            PatientStatus::Discontinued => {
                let outcome = models.discontinuation.monitoring_visit(
                    &patient,
                    observed,
                    last_recurrence_check,
                    day,
                    clinician,
                    &mut rng,
                );
                patient.recurrence_present = outcome.recurrence_present;
                last_recurrence_check = day;
                if outcome.recurrence_present && !patient.disease_state.is_active() {
                    // recurrence reactivates the disease
                    patient.disease_state = DiseaseState::Active;
                }

                let mut record = VisitRecord::on_treatment(
                    date,
                    observed,
                    patient.hidden_vision,
                    patient.disease_state,
                    VisitAction::MonitoringOnly,
                    interval,
                );
                record.is_monitoring = true;
                record.recurrence_detected = outcome.recurrence_detected;

                if outcome.retreat {
                    record.retreatment_started = true;
                    record.action = VisitAction::Injection;
                    patient.resume_treatment(models.protocol.state_after_retreatment());
                    models.vision.on_injection(&mut patient, day, &mut rng);
                    patient.record_injection(day);
                    patient.push_visit(record);
                    monitoring_days.clear();
                    let schedule = models.protocol.next_visit(&mut patient, true, clinician);
                    previous_visit_day = day;
                    next_visit_day = day + schedule.interval_days;
                    next_action = schedule.action;
                } else {
                    patient.push_visit(record);
                    let Some(next_monitoring) = monitoring_days.pop_front() else {
                        break;
                    };
                    previous_visit_day = day;
                    next_visit_day = next_monitoring;
                    next_action = VisitAction::MonitoringOnly;
                }
            }
        }
    }

    patient
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::models::types::DiscontinuationReason;

    fn build_models(config: &SimulationConfig) -> SimulationModels {
        SimulationModels {
            disease: DiseaseStateModel::from_config(&config.disease).unwrap(),
            vision: VisionTrajectoryModel::new(config.vision.clone()),
            protocol: TreatmentProtocolEngine::new(config.protocol.clone()),
            discontinuation: DiscontinuationEngine::new(config.discontinuation.clone()),
        }
    }

    /// A configuration where no discontinuation reason can ever fire.
    fn quiet_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.discontinuation.mortality_annual_base = 0.0;
        config.discontinuation.attrition_base_per_visit = 0.0;
        config.discontinuation.administrative_per_visit = 0.0;
        config.discontinuation.clinical_decision_probability = 0.0;
        config.discontinuation.deterioration_probability = 0.0;
        config.discontinuation.planned_stop_probability = 0.0;
        config.discontinuation.poor_vision_probability = 0.0;
        // fully adherent single profile so clinicians never deviate
        config.clinicians.profiles.truncate(1);
        config.clinicians.profiles[0].proportion = 1.0;
        config.clinicians.profiles[0].adherence_rate = 1.0;
        config.clinicians.profiles[0].stability_threshold_override = None;
        config.clinicians.profiles[0].preferred_max_interval_days = None;
        config
    }

    #[test]
    fn test_loading_phase_visits_land_on_schedule() {
        let mut config = quiet_config();
        config.population.horizon_days = 80; // through the loading phase only
        config.validate().unwrap();
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();

        let patient = simulate_patient(&config, &models, &clinicians, 0);
        let injections: Vec<i64> = patient
            .history
            .iter()
            .filter(|v| v.action == VisitAction::Injection)
            .map(|v| (v.date - config.population.start_date).num_days())
            .collect();
        assert_eq!(injections, vec![0, 28, 56]);
        assert_eq!(patient.injection_count, 3);
    }

    #[test]
    fn test_history_is_time_ordered_and_intervals_consistent() {
        let config = quiet_config();
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();
        let patient = simulate_patient(&config, &models, &clinicians, 3);
        for pair in patient.history.windows(2) {
            let gap = (pair[1].date - pair[0].date).num_days();
            assert!(gap > 0);
            assert_eq!(gap, pair[1].interval_days);
        }
    }

    #[test]
    fn test_attrition_stop_ends_the_timeline() {
        let mut config = quiet_config();
        config.discontinuation.attrition_base_per_visit = 1.0;
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();
        let patient = simulate_patient(&config, &models, &clinicians, 0);
        assert_eq!(patient.history.len(), 1);
        let record = &patient.history[0];
        assert_eq!(record.discontinued, Some(DiscontinuationReason::Attrition));
        assert!(!patient.history.iter().any(|v| v.is_monitoring));
    }

    #[test]
    fn test_degenerate_zero_injection_patient_is_valid_output() {
        // attrition at the very first visit means zero injections ever
        let mut config = quiet_config();
        config.discontinuation.attrition_base_per_visit = 1.0;
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();
        let patient = simulate_patient(&config, &models, &clinicians, 5);
        assert_eq!(patient.injection_count, 0);
        assert_eq!(patient.status, PatientStatus::Discontinued);
    }

    #[test]
    fn test_never_discontinuing_patient_runs_to_horizon() {
        let config = quiet_config();
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();
        let patient = simulate_patient(&config, &models, &clinicians, 1);
        assert_eq!(patient.status, PatientStatus::OnTreatment);
        let last_day = (patient.history.last().unwrap().date - config.population.start_date)
            .num_days();
        // the final visit sits within one maximum interval of the horizon
        assert!(last_day > config.population.horizon_days - config.protocol.max_interval_days - 1);
    }

    #[test]
    fn test_hidden_vision_invariant_holds_at_every_visit() {
        let config = quiet_config();
        let models = build_models(&config);
        let clinicians = ClinicianManager::from_config(&config.clinicians).unwrap();
        for index in 0..25 {
            let patient = simulate_patient(&config, &models, &clinicians, index);
            for visit in &patient.history {
                assert!(visit.hidden_vision >= 0.0);
                assert!(visit.hidden_vision <= patient.vision_ceiling);
                assert!(patient.vision_ceiling <= config.vision.absolute_max);
            }
        }
    }
}
