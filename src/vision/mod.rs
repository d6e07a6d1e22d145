//! Hidden vision-acuity trajectory model
//!
//! The patient's true vision evolves every sub-interval and is never
//! directly observable: `measure` is the only way vision becomes visible,
//! and it adds measurement noise without mutating the hidden value.
//!
//! Each sub-interval is either an improvement step (while a
//! treatment-response window is open) or a decline step whose parameters
//! interpolate between the untreated and treated sets by the current
//! treatment effect. Active disease additionally carries a small,
//! independent catastrophic-loss probability that grows with time since the
//! last injection, modelling the bimodal gradual-versus-sudden loss
//! process.

use crate::config::VisionParams;
use crate::models::patient::Patient;
use crate::rng::PatientRng;

/// Shared, read-only vision-trajectory model
#[derive(Debug, Clone)]
pub struct VisionTrajectoryModel {
    params: VisionParams,
}

impl VisionTrajectoryModel {
    #[must_use]
    pub fn new(params: VisionParams) -> Self {
        Self { params }
    }

    /// Personal vision ceiling for a baseline value
    #[must_use]
    pub fn ceiling_for_baseline(&self, baseline: f64) -> f64 {
        f64::min(self.params.absolute_max, baseline * self.params.ceiling_factor)
    }

    /// Advance the hidden vision by one sub-interval. `days_untreated` is
    /// the time since the last injection, or since treatment start for a
    /// patient who has never been injected.
    pub fn advance(
        &self,
        patient: &mut Patient,
        treatment_effect: f64,
        days_untreated: i64,
        rng: &mut PatientRng,
    ) {
        let state_index = patient.disease_state.index();

        let change = if patient.improvement_intervals_left > 0 {
            patient.improvement_intervals_left -= 1;
            let improve = self.params.improvement[state_index];
            rng.gaussian(improve.mean, improve.sd).max(0.0)
        } else {
            let effect = treatment_effect.clamp(0.0, 1.0);
            let untreated = self.params.decline_untreated[state_index];
            let treated = self.params.decline_treated[state_index];
            let mean = untreated.mean + effect * (treated.mean - untreated.mean);
            let sd = untreated.sd + effect * (treated.sd - untreated.sd);
            let mut change = rng.gaussian(mean, sd);

            if patient.disease_state.is_active() {
                // Sudden-loss events subtract from the gradual change
                // rather than replacing it.
                let probability = self.params.catastrophic_base_probability
                    + self.params.catastrophic_daily_increase * days_untreated.max(0) as f64;
                if rng.bernoulli(probability) {
                    let (lo, hi) = self.params.catastrophic_loss_range;
                    change -= rng.uniform_range(lo, hi);
                }
            }
            change
        };

        // Floor and personal ceiling are model semantics, applied before the
        // invariant check.
        patient.hidden_vision = (patient.hidden_vision + change).clamp(0.0, patient.vision_ceiling);
        patient.assert_vision_invariant();
    }

    /// Possibly open an improvement window for an injection given at `day`.
    /// Qualifying injections are the first ever, or one following a gap
    /// longer than the configured threshold. Call before the injection is
    /// recorded on the patient.
    pub fn on_injection(&self, patient: &mut Patient, day: i64, rng: &mut PatientRng) {
        let qualifying = match patient.last_injection_day {
            None => true,
            Some(last) => day - last > self.params.qualifying_gap_days,
        };
        if qualifying && rng.bernoulli(self.params.improvement_window_probability) {
            patient.improvement_intervals_left = self.params.improvement_window_intervals;
        }
    }

    /// Observe the hidden vision with measurement noise, clamped to
    /// [0, 100] and rounded to whole letters. Never mutates hidden state.
    pub fn measure(&self, patient: &Patient, rng: &mut PatientRng) -> f64 {
        let noisy = rng.gaussian(patient.hidden_vision, self.params.measurement_noise_sd);
        noisy.clamp(0.0, 100.0).round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisionParams;
    use crate::models::types::DiseaseState;
    use chrono::NaiveDate;

    fn test_patient(baseline: f64, ceiling: f64) -> Patient {
        Patient::new(
            0,
            75.0,
            baseline,
            ceiling,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            28,
            0,
            false,
        )
    }

    #[test]
    fn test_ceiling_for_baseline() {
        let model = VisionTrajectoryModel::new(VisionParams::default());
        assert!((model.ceiling_for_baseline(65.0) - 71.5).abs() < 1e-9);
        // high baselines cap at the absolute maximum
        assert_eq!(model.ceiling_for_baseline(84.0), 85.0);
    }

    #[test]
    fn test_advance_respects_bounds() {
        let model = VisionTrajectoryModel::new(VisionParams::default());
        let mut patient = test_patient(65.0, 71.5);
        patient.disease_state = DiseaseState::HighlyActive;
        let mut rng = PatientRng::from_seed(17);
        for _ in 0..500 {
            model.advance(&mut patient, 0.0, 365, &mut rng);
            assert!(patient.hidden_vision >= 0.0);
            assert!(patient.hidden_vision <= patient.vision_ceiling);
        }
    }

    #[test]
    fn test_improvement_window_raises_vision() {
        let mut params = VisionParams::default();
        params.improvement[DiseaseState::Naive.index()] = crate::config::GaussianParams::new(2.0, 0.0);
        let model = VisionTrajectoryModel::new(params);
        let mut patient = test_patient(60.0, 70.0);
        patient.improvement_intervals_left = 3;
        let mut rng = PatientRng::from_seed(23);
        model.advance(&mut patient, 1.0, 0, &mut rng);
        assert_eq!(patient.hidden_vision, 62.0);
        assert_eq!(patient.improvement_intervals_left, 2);
    }

    #[test]
    fn test_improvement_clamps_at_personal_ceiling() {
        let mut params = VisionParams::default();
        params.improvement[DiseaseState::Naive.index()] =
            crate::config::GaussianParams::new(50.0, 0.0);
        let model = VisionTrajectoryModel::new(params);
        let mut patient = test_patient(65.0, 71.5);
        patient.improvement_intervals_left = 1;
        let mut rng = PatientRng::from_seed(29);
        model.advance(&mut patient, 1.0, 0, &mut rng);
        assert_eq!(patient.hidden_vision, 71.5);
    }

    #[test]
    fn test_first_injection_can_open_window() {
        let mut params = VisionParams::default();
        params.improvement_window_probability = 1.0;
        let model = VisionTrajectoryModel::new(params);
        let mut patient = test_patient(65.0, 71.5);
        let mut rng = PatientRng::from_seed(31);
        model.on_injection(&mut patient, 0, &mut rng);
        assert_eq!(patient.improvement_intervals_left, 6);
    }

    #[test]
    fn test_short_gap_injection_does_not_requalify() {
        let mut params = VisionParams::default();
        params.improvement_window_probability = 1.0;
        let model = VisionTrajectoryModel::new(params);
        let mut patient = test_patient(65.0, 71.5);
        patient.last_injection_day = Some(100);
        let mut rng = PatientRng::from_seed(37);
        model.on_injection(&mut patient, 128, &mut rng);
        assert_eq!(patient.improvement_intervals_left, 0);
        // but a gap beyond the threshold qualifies again
        model.on_injection(&mut patient, 190, &mut rng);
        assert_eq!(patient.improvement_intervals_left, 6);
    }

    #[test]
    fn test_measure_is_read_only_bounded_and_rounded() {
        let model = VisionTrajectoryModel::new(VisionParams::default());
        let patient = test_patient(65.0, 71.5);
        let mut rng = PatientRng::from_seed(41);
        for _ in 0..200 {
            let observed = model.measure(&patient, &mut rng);
            assert!((0.0..=100.0).contains(&observed));
            assert_eq!(observed, observed.round());
        }
        assert_eq!(patient.hidden_vision, 65.0);
    }

    #[test]
    fn test_catastrophic_loss_is_rare_but_large() {
        let mut params = VisionParams::default();
        params.catastrophic_base_probability = 1.0;
        params.catastrophic_daily_increase = 0.0;
        params.decline_untreated[DiseaseState::Active.index()] =
            crate::config::GaussianParams::new(0.0, 0.0);
        let model = VisionTrajectoryModel::new(params);
        let mut patient = test_patient(65.0, 71.5);
        patient.disease_state = DiseaseState::Active;
        let mut rng = PatientRng::from_seed(43);
        model.advance(&mut patient, 0.0, 200, &mut rng);
        let loss = 65.0 - patient.hidden_vision;
        assert!((10.0..=30.0).contains(&loss), "loss = {loss}");
    }

    #[test]
    fn test_catastrophic_risk_grows_from_the_untreated_duration() {
        // The sudden-loss probability derives from the actual untreated
        // duration: a never-injected patient early in the run carries the
        // small base risk, not a saturated one.
        let mut params = VisionParams::default();
        params.catastrophic_base_probability = 0.0;
        params.catastrophic_daily_increase = 1.0;
        params.decline_untreated[DiseaseState::Active.index()] =
            crate::config::GaussianParams::new(0.0, 0.0);
        let model = VisionTrajectoryModel::new(params);
        let mut rng = PatientRng::from_seed(47);

        let mut patient = test_patient(65.0, 71.5);
        patient.disease_state = DiseaseState::Active;
        model.advance(&mut patient, 0.0, 0, &mut rng);
        assert_eq!(patient.hidden_vision, 65.0);

        model.advance(&mut patient, 0.0, 1000, &mut rng);
        assert!(patient.hidden_vision <= 55.0);
    }
}
