//! Fully-resolved simulation configuration.
//!
//! The core receives these parameter sets from an external
//! configuration-loading collaborator and performs only structural
//! validation: probabilities in range, transition-matrix rows summing to 1,
//! interval bounds ordered, interpolation anchors present and monotone.
//! Every violation is fatal before the first patient is simulated, with a
//! message naming the offending parameter.
//!
//! The `Default` impls describe a clinically plausible treat-and-extend
//! population so the demo binary runs without any external input.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::models::types::RiskTolerance;

/// Tolerance for transition-matrix row sums
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// A mean/standard-deviation pair for Gaussian sampling
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GaussianParams {
    /// Distribution mean
    pub mean: f64,
    /// Distribution standard deviation
    pub sd: f64,
}

impl GaussianParams {
    #[must_use]
    pub const fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }
}

/// Population-level run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationParams {
    /// Number of patients to simulate
    pub n_patients: usize,
    /// Master seed; each patient derives a private stream from it
    pub master_seed: u64,
    /// Calendar date of simulation day 0
    pub start_date: NaiveDate,
    /// Simulated horizon in days
    pub horizon_days: i64,
    /// Model sub-interval in days (fortnightly by default)
    pub sub_interval_days: i64,
    /// Baseline vision sampling (ETDRS letters)
    pub baseline_vision: GaussianParams,
    /// Baseline vision is clamped into this range after sampling
    pub baseline_vision_range: (f64, f64),
    /// Patient age sampling (years)
    pub age: GaussianParams,
    /// Age is clamped into this range after sampling
    pub age_range: (f64, f64),
    /// Prevalence of the anatomical recurrence-risk feature
    pub risk_feature_prevalence: f64,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            n_patients: 1000,
            master_seed: 42,
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            horizon_days: 5 * 365,
            sub_interval_days: 14,
            baseline_vision: GaussianParams::new(62.0, 12.0),
            baseline_vision_range: (25.0, 85.0),
            age: GaussianParams::new(77.0, 7.5),
            age_range: (55.0, 100.0),
            risk_feature_prevalence: 0.3,
        }
    }
}

/// Disease-state transition parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseParams {
    /// Per-sub-interval transition matrix, rows and columns in
    /// [naive, stable, active, highly_active] order; each row must sum to 1
    pub transition_matrix: [[f64; 4]; 4],
    /// How strongly full treatment effect suppresses worsening transitions
    pub mitigation_factor: f64,
    /// Piecewise-linear treatment-effect decay: (days since injection,
    /// effect in [0,1]), ascending in days, ending at 0
    pub effect_decay: Vec<(f64, f64)>,
}

impl Default for DiseaseParams {
    fn default() -> Self {
        Self {
            transition_matrix: [
                [0.60, 0.15, 0.20, 0.05],
                [0.00, 0.85, 0.12, 0.03],
                [0.00, 0.20, 0.70, 0.10],
                [0.00, 0.05, 0.25, 0.70],
            ],
            mitigation_factor: 0.7,
            // Full effect through week 4, decayed to nothing by week 16
            effect_decay: vec![(0.0, 1.0), (28.0, 1.0), (56.0, 0.7), (84.0, 0.3), (112.0, 0.0)],
        }
    }
}

/// Hidden vision-trajectory parameters. Per-state arrays are indexed by
/// `DiseaseState::index()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionParams {
    /// Measurement noise added by `measure` (ETDRS letters)
    pub measurement_noise_sd: f64,
    /// Absolute vision ceiling no patient can exceed
    pub absolute_max: f64,
    /// Personal ceiling = min(absolute_max, baseline * ceiling_factor)
    pub ceiling_factor: f64,
    /// Per-sub-interval vision change under full treatment effect
    pub decline_treated: [GaussianParams; 4],
    /// Per-sub-interval vision change with no treatment effect
    pub decline_untreated: [GaussianParams; 4],
    /// Per-state positive change while the improvement window is open
    pub improvement: [GaussianParams; 4],
    /// Probability a qualifying injection opens an improvement window
    pub improvement_window_probability: f64,
    /// Improvement window length in sub-intervals
    pub improvement_window_intervals: u32,
    /// An injection after a gap longer than this re-qualifies for a window
    pub qualifying_gap_days: i64,
    /// Catastrophic-loss probability per sub-interval at day 0 post-injection
    pub catastrophic_base_probability: f64,
    /// Additional catastrophic probability per day since last injection
    pub catastrophic_daily_increase: f64,
    /// Catastrophic loss magnitude sampled uniformly from this range
    pub catastrophic_loss_range: (f64, f64),
}

impl Default for VisionParams {
    fn default() -> Self {
        Self {
            measurement_noise_sd: 2.5,
            absolute_max: 85.0,
            ceiling_factor: 1.1,
            decline_treated: [
                GaussianParams::new(-0.10, 0.40),
                GaussianParams::new(-0.05, 0.30),
                GaussianParams::new(-0.50, 0.70),
                GaussianParams::new(-1.00, 1.00),
            ],
            decline_untreated: [
                GaussianParams::new(-0.60, 0.80),
                GaussianParams::new(-0.30, 0.50),
                GaussianParams::new(-1.40, 1.00),
                GaussianParams::new(-2.40, 1.40),
            ],
            improvement: [
                GaussianParams::new(1.50, 0.80),
                GaussianParams::new(1.00, 0.60),
                GaussianParams::new(0.80, 0.60),
                GaussianParams::new(0.50, 0.50),
            ],
            improvement_window_probability: 0.62,
            improvement_window_intervals: 6,
            qualifying_gap_days: 84,
            catastrophic_base_probability: 0.001,
            catastrophic_daily_increase: 0.00005,
            catastrophic_loss_range: (10.0, 30.0),
        }
    }
}

/// Protocol variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Interval titrated between min and max by disease activity
    TreatAndExtend,
    /// Constant maintenance interval with optional interleaved assessments
    FixedInterval,
}

/// Treatment-protocol parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Which protocol variant to run
    pub variant: ProtocolVariant,
    /// Number of loading-phase injections
    pub loading_injections: u32,
    /// Spacing of loading-phase injections, days
    pub loading_interval_days: i64,
    /// Lower bound on any scheduled maintenance interval, days
    pub min_interval_days: i64,
    /// Upper bound on any scheduled maintenance interval, days
    pub max_interval_days: i64,
    /// Treat-and-extend lengthening step on inactive disease, days
    pub extend_step_days: i64,
    /// Treat-and-extend shortening step on active disease, days
    pub shorten_step_days: i64,
    /// Constant injection interval for the fixed-interval variant, days
    pub fixed_interval_days: i64,
    /// Cadence of monitoring-only assessment visits in the fixed-interval
    /// variant; `None` disables assessments
    pub assessment_interval_days: Option<i64>,
    /// Whether retreatment after a detected recurrence re-enters loading
    pub retreatment_resets_loading: bool,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::TreatAndExtend,
            loading_injections: 3,
            loading_interval_days: 28,
            min_interval_days: 28,
            max_interval_days: 112,
            extend_step_days: 14,
            shorten_step_days: 14,
            fixed_interval_days: 56,
            assessment_interval_days: None,
            retreatment_resets_loading: true,
        }
    }
}

/// One clinician profile with its share of the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicianProfileParams {
    /// Profile name, informational only
    pub name: String,
    /// Fraction of the pool drawn from this profile; fractions sum to 1
    pub proportion: f64,
    /// Probability of following the protocol decision exactly
    pub adherence_rate: f64,
    /// Risk-tolerance category driving the decision policy
    pub risk_tolerance: RiskTolerance,
    /// Overrides the protocol's consecutive-stable-visit threshold
    pub stability_threshold_override: Option<u32>,
    /// Clinician will not extend beyond this interval, days
    pub preferred_max_interval_days: Option<i64>,
}

/// Patient-to-clinician assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AssignmentPolicy {
    /// One clinician per patient for the whole run
    FixedForPatient,
    /// Independent draw from the pool at every visit
    RandomPerVisit,
    /// Retain the previous clinician with the given probability,
    /// otherwise redraw
    WeightedContinuity {
        /// Continuity-of-care probability
        continuity_probability: f64,
    },
}

/// Clinician pool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicianParams {
    /// Pool size for the run
    pub pool_size: usize,
    /// Profiles and their proportions
    pub profiles: Vec<ClinicianProfileParams>,
    /// How patients are assigned to clinicians
    pub assignment: AssignmentPolicy,
}

impl Default for ClinicianParams {
    fn default() -> Self {
        Self {
            pool_size: 12,
            profiles: vec![
                ClinicianProfileParams {
                    name: "strict".to_string(),
                    proportion: 0.25,
                    adherence_rate: 0.95,
                    risk_tolerance: RiskTolerance::Low,
                    stability_threshold_override: Some(4),
                    preferred_max_interval_days: None,
                },
                ClinicianProfileParams {
                    name: "average".to_string(),
                    proportion: 0.50,
                    adherence_rate: 0.85,
                    risk_tolerance: RiskTolerance::Medium,
                    stability_threshold_override: None,
                    preferred_max_interval_days: None,
                },
                ClinicianProfileParams {
                    name: "lax".to_string(),
                    proportion: 0.25,
                    adherence_rate: 0.70,
                    risk_tolerance: RiskTolerance::High,
                    stability_threshold_override: Some(2),
                    preferred_max_interval_days: Some(98),
                },
            ],
            assignment: AssignmentPolicy::FixedForPatient,
        }
    }
}

/// Cumulative recurrence-rate anchors for one stop reason
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecurrenceAnchors {
    /// Cumulative recurrence rate at 1 year post-stop
    pub year1: f64,
    /// Cumulative recurrence rate at 3 years post-stop
    pub year3: f64,
    /// Cumulative recurrence rate at 5 years post-stop
    pub year5: f64,
}

impl RecurrenceAnchors {
    #[must_use]
    pub const fn new(year1: f64, year3: f64, year5: f64) -> Self {
        Self { year1, year3, year5 }
    }
}

/// Recurrence and detection parameters while discontinued
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceParams {
    /// Anchors after a protocol-based planned stop
    pub planned_stable: RecurrenceAnchors,
    /// Anchors after a clinical-decision stop
    pub clinical_decision: RecurrenceAnchors,
    /// Anchors after an administrative-error stop
    pub administrative_error: RecurrenceAnchors,
    /// Anchors after a continued-deterioration stop
    pub continued_deterioration: RecurrenceAnchors,
    /// Anchors after a poor-vision stop
    pub poor_vision: RecurrenceAnchors,
    /// Hazard multiplier when the anatomical risk feature is present
    pub risk_feature_multiplier: f64,
    /// Probability imaging is performed at a monitoring visit
    pub imaging_probability: f64,
    /// Probability a present recurrence is detected given imaging
    pub detection_probability: f64,
}

impl Default for RecurrenceParams {
    fn default() -> Self {
        Self {
            planned_stable: RecurrenceAnchors::new(0.13, 0.40, 0.65),
            clinical_decision: RecurrenceAnchors::new(0.21, 0.55, 0.80),
            administrative_error: RecurrenceAnchors::new(0.30, 0.70, 0.85),
            continued_deterioration: RecurrenceAnchors::new(0.35, 0.75, 0.88),
            poor_vision: RecurrenceAnchors::new(0.35, 0.75, 0.88),
            risk_feature_multiplier: 1.4,
            imaging_probability: 0.95,
            detection_probability: 0.85,
        }
    }
}

/// Retreatment-eligibility parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetreatmentParams {
    /// Minimum observed vision loss from baseline to qualify, letters
    pub min_vision_loss_from_baseline: f64,
    /// Protocol probability of resuming treatment when eligible
    pub base_probability: f64,
}

impl Default for RetreatmentParams {
    fn default() -> Self {
        Self {
            min_vision_loss_from_baseline: 5.0,
            base_probability: 0.95,
        }
    }
}

/// Post-stop monitoring cadences, as week offsets from the stop date.
/// Attrition schedules nothing and mortality is terminal, so neither has an
/// entry here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringParams {
    /// Cadence after a planned stable stop
    pub planned_stable_weeks: Vec<i64>,
    /// Cadence after a clinical-decision stop
    pub clinical_decision_weeks: Vec<i64>,
    /// Cadence after an administrative-error stop
    pub administrative_error_weeks: Vec<i64>,
    /// Cadence after a continued-deterioration stop
    pub continued_deterioration_weeks: Vec<i64>,
    /// Cadence after a poor-vision stop
    pub poor_vision_weeks: Vec<i64>,
    /// After the listed visits, keep monitoring at this recurring gap
    /// (weeks) until the horizon; `None` stops after the list
    pub recurring_gap_weeks: Option<i64>,
}

impl Default for MonitoringParams {
    fn default() -> Self {
        Self {
            planned_stable_weeks: vec![12, 24, 36],
            clinical_decision_weeks: vec![12, 24, 36, 52],
            administrative_error_weeks: vec![4, 12, 24],
            continued_deterioration_weeks: vec![12, 26, 52],
            poor_vision_weeks: vec![26, 52],
            recurring_gap_weeks: Some(26),
        }
    }
}

/// Discontinuation-engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscontinuationParams {
    /// Annual mortality probability at the reference age
    pub mortality_annual_base: f64,
    /// Reference age for the mortality base rate
    pub mortality_reference_age: f64,
    /// Mortality risk doubles for every this-many years above reference
    pub mortality_age_doubling_years: f64,
    /// Attrition probability per visit before scaling
    pub attrition_base_per_visit: f64,
    /// Attrition scaling per year on treatment
    pub attrition_duration_factor: f64,
    /// Attrition scaling per cumulative injection
    pub attrition_burden_factor: f64,
    /// Constant administrative-error probability per visit
    pub administrative_per_visit: f64,
    /// Consecutive stable visits before a clinical-decision stop is
    /// considered (clinician-adjustable)
    pub stable_visits_threshold: u32,
    /// Maintenance visits with no observed improvement before futility is
    /// considered
    pub no_improvement_visits_threshold: u32,
    /// Stop probability once a clinical-decision trigger fires
    pub clinical_decision_probability: f64,
    /// Window of recent visits over which deterioration is measured
    pub deterioration_window_visits: usize,
    /// Observed loss across the window that triggers evaluation, letters
    pub deterioration_loss_threshold: f64,
    /// Stop probability once the deterioration trigger fires
    pub deterioration_probability: f64,
    /// Consecutive stable visits at maximum interval before a planned stop
    /// is evaluated
    pub planned_stable_visits_at_max: u32,
    /// Planned-stop probability at each qualifying evaluation
    pub planned_stop_probability: f64,
    /// Observed vision below this counts toward a poor-vision stop, letters
    pub poor_vision_threshold: f64,
    /// Consecutive below-threshold visits before a stop is evaluated
    pub poor_vision_grace_visits: u32,
    /// Stop probability once the poor-vision grace period has elapsed
    pub poor_vision_probability: f64,
    /// Post-stop monitoring cadences
    pub monitoring: MonitoringParams,
    /// Recurrence and detection parameters
    pub recurrence: RecurrenceParams,
    /// Retreatment-eligibility parameters
    pub retreatment: RetreatmentParams,
}

impl Default for DiscontinuationParams {
    fn default() -> Self {
        Self {
            mortality_annual_base: 0.02,
            mortality_reference_age: 75.0,
            mortality_age_doubling_years: 10.0,
            attrition_base_per_visit: 0.004,
            attrition_duration_factor: 0.3,
            attrition_burden_factor: 0.01,
            administrative_per_visit: 0.002,
            stable_visits_threshold: 3,
            no_improvement_visits_threshold: 8,
            clinical_decision_probability: 0.2,
            deterioration_window_visits: 4,
            deterioration_loss_threshold: 10.0,
            deterioration_probability: 0.3,
            planned_stable_visits_at_max: 3,
            planned_stop_probability: 0.2,
            poor_vision_threshold: 20.0,
            poor_vision_grace_visits: 2,
            poor_vision_probability: 0.5,
            monitoring: MonitoringParams::default(),
            recurrence: RecurrenceParams::default(),
            retreatment: RetreatmentParams::default(),
        }
    }
}

/// Complete configuration for a simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Population-level run parameters
    pub population: PopulationParams,
    /// Disease-state transition parameters
    pub disease: DiseaseParams,
    /// Hidden vision-trajectory parameters
    pub vision: VisionParams,
    /// Treatment-protocol parameters
    pub protocol: ProtocolParams,
    /// Clinician pool parameters
    pub clinicians: ClinicianParams,
    /// Discontinuation-engine parameters
    pub discontinuation: DiscontinuationParams,
}

fn check_probability(value: f64, name: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(SimulationError::config(format!(
            "{name} must be a probability in [0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_anchors(anchors: &RecurrenceAnchors, name: &str) -> Result<()> {
    for (value, label) in [
        (anchors.year1, "year1"),
        (anchors.year3, "year3"),
        (anchors.year5, "year5"),
    ] {
        if !(0.0..1.0).contains(&value) {
            return Err(SimulationError::config(format!(
                "{name}.{label} must be in [0, 1), got {value}"
            )));
        }
    }
    if anchors.year1 > anchors.year3 || anchors.year3 > anchors.year5 {
        return Err(SimulationError::config(format!(
            "{name} cumulative anchors must be non-decreasing: \
             {} / {} / {}",
            anchors.year1, anchors.year3, anchors.year5
        )));
    }
    Ok(())
}

impl SimulationConfig {
    /// Structural validation of the whole parameter set. Any failure is a
    /// fatal startup error; nothing is checked again at simulation time.
    pub fn validate(&self) -> Result<()> {
        let pop = &self.population;
        if pop.n_patients == 0 {
            return Err(SimulationError::config("population.n_patients must be > 0"));
        }
        if pop.horizon_days <= 0 {
            return Err(SimulationError::config("population.horizon_days must be > 0"));
        }
        if pop.sub_interval_days <= 0 {
            return Err(SimulationError::config(
                "population.sub_interval_days must be > 0",
            ));
        }
        if pop.baseline_vision_range.0 > pop.baseline_vision_range.1 {
            return Err(SimulationError::config(
                "population.baseline_vision_range must be (low, high) with low <= high",
            ));
        }
        check_probability(
            pop.risk_feature_prevalence,
            "population.risk_feature_prevalence",
        )?;

        // Transition matrix: each configured row must sum to 1 before any
        // treatment-effect scaling.
        for (i, row) in self.disease.transition_matrix.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(SimulationError::config(format!(
                    "disease.transition_matrix row {i} sums to {sum}, expected 1.0"
                )));
            }
            if row.iter().any(|p| *p < 0.0) {
                return Err(SimulationError::config(format!(
                    "disease.transition_matrix row {i} contains a negative probability"
                )));
            }
        }
        check_probability(self.disease.mitigation_factor, "disease.mitigation_factor")?;
        let decay = &self.disease.effect_decay;
        if decay.is_empty() {
            return Err(SimulationError::config(
                "disease.effect_decay must contain at least one breakpoint",
            ));
        }
        if !decay.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(SimulationError::config(
                "disease.effect_decay breakpoints must be strictly ascending in days",
            ));
        }
        for (day, effect) in decay {
            if *day < 0.0 {
                return Err(SimulationError::config(
                    "disease.effect_decay days must be non-negative",
                ));
            }
            check_probability(*effect, "disease.effect_decay effect")?;
        }

        let vision = &self.vision;
        if vision.measurement_noise_sd < 0.0 {
            return Err(SimulationError::config(
                "vision.measurement_noise_sd must be >= 0",
            ));
        }
        if vision.absolute_max <= 0.0 {
            return Err(SimulationError::config("vision.absolute_max must be > 0"));
        }
        if vision.ceiling_factor <= 0.0 {
            return Err(SimulationError::config("vision.ceiling_factor must be > 0"));
        }
        check_probability(
            vision.improvement_window_probability,
            "vision.improvement_window_probability",
        )?;
        check_probability(
            vision.catastrophic_base_probability,
            "vision.catastrophic_base_probability",
        )?;
        if vision.catastrophic_daily_increase < 0.0 {
            return Err(SimulationError::config(
                "vision.catastrophic_daily_increase must be >= 0",
            ));
        }
        if vision.catastrophic_loss_range.0 > vision.catastrophic_loss_range.1 {
            return Err(SimulationError::config(
                "vision.catastrophic_loss_range must be (low, high) with low <= high",
            ));
        }

        let protocol = &self.protocol;
        if protocol.loading_injections == 0 {
            return Err(SimulationError::config(
                "protocol.loading_injections must be >= 1",
            ));
        }
        if protocol.loading_interval_days <= 0 {
            return Err(SimulationError::config(
                "protocol.loading_interval_days must be > 0",
            ));
        }
        if protocol.min_interval_days <= 0 {
            return Err(SimulationError::config(
                "protocol.min_interval_days must be > 0",
            ));
        }
        if protocol.min_interval_days > protocol.max_interval_days {
            return Err(SimulationError::config(format!(
                "protocol.min_interval_days ({}) exceeds protocol.max_interval_days ({})",
                protocol.min_interval_days, protocol.max_interval_days
            )));
        }
        if protocol.extend_step_days < 0 || protocol.shorten_step_days < 0 {
            return Err(SimulationError::config(
                "protocol extend/shorten steps must be >= 0",
            ));
        }
        if protocol.variant == ProtocolVariant::FixedInterval {
            if !(protocol.min_interval_days..=protocol.max_interval_days)
                .contains(&protocol.fixed_interval_days)
            {
                return Err(SimulationError::config(format!(
                    "protocol.fixed_interval_days ({}) outside [min, max] interval bounds",
                    protocol.fixed_interval_days
                )));
            }
            if let Some(gap) = protocol.assessment_interval_days {
                if gap <= 0 {
                    return Err(SimulationError::config(
                        "protocol.assessment_interval_days must be > 0 when set",
                    ));
                }
            }
        }

        let clinicians = &self.clinicians;
        if clinicians.pool_size == 0 {
            return Err(SimulationError::config("clinicians.pool_size must be > 0"));
        }
        if clinicians.profiles.is_empty() {
            return Err(SimulationError::config(
                "clinicians.profiles must not be empty",
            ));
        }
        let proportion_sum: f64 = clinicians.profiles.iter().map(|p| p.proportion).sum();
        if (proportion_sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(SimulationError::config(format!(
                "clinicians.profiles proportions sum to {proportion_sum}, expected 1.0"
            )));
        }
        for profile in &clinicians.profiles {
            check_probability(
                profile.adherence_rate,
                &format!("clinicians.profiles[{}].adherence_rate", profile.name),
            )?;
            check_probability(
                profile.proportion,
                &format!("clinicians.profiles[{}].proportion", profile.name),
            )?;
        }
        if let AssignmentPolicy::WeightedContinuity {
            continuity_probability,
        } = clinicians.assignment
        {
            check_probability(
                continuity_probability,
                "clinicians.assignment.continuity_probability",
            )?;
        }

        let disc = &self.discontinuation;
        check_probability(disc.mortality_annual_base, "discontinuation.mortality_annual_base")?;
        if disc.mortality_age_doubling_years <= 0.0 {
            return Err(SimulationError::config(
                "discontinuation.mortality_age_doubling_years must be > 0",
            ));
        }
        check_probability(
            disc.attrition_base_per_visit,
            "discontinuation.attrition_base_per_visit",
        )?;
        check_probability(
            disc.administrative_per_visit,
            "discontinuation.administrative_per_visit",
        )?;
        check_probability(
            disc.clinical_decision_probability,
            "discontinuation.clinical_decision_probability",
        )?;
        check_probability(
            disc.deterioration_probability,
            "discontinuation.deterioration_probability",
        )?;
        check_probability(
            disc.planned_stop_probability,
            "discontinuation.planned_stop_probability",
        )?;
        check_probability(
            disc.poor_vision_probability,
            "discontinuation.poor_vision_probability",
        )?;
        if disc.deterioration_window_visits == 0 {
            return Err(SimulationError::config(
                "discontinuation.deterioration_window_visits must be >= 1",
            ));
        }
        check_anchors(
            &disc.recurrence.planned_stable,
            "discontinuation.recurrence.planned_stable",
        )?;
        check_anchors(
            &disc.recurrence.clinical_decision,
            "discontinuation.recurrence.clinical_decision",
        )?;
        check_anchors(
            &disc.recurrence.administrative_error,
            "discontinuation.recurrence.administrative_error",
        )?;
        check_anchors(
            &disc.recurrence.continued_deterioration,
            "discontinuation.recurrence.continued_deterioration",
        )?;
        check_anchors(
            &disc.recurrence.poor_vision,
            "discontinuation.recurrence.poor_vision",
        )?;
        if disc.recurrence.risk_feature_multiplier < 0.0 {
            return Err(SimulationError::config(
                "discontinuation.recurrence.risk_feature_multiplier must be >= 0",
            ));
        }
        check_probability(
            disc.recurrence.imaging_probability,
            "discontinuation.recurrence.imaging_probability",
        )?;
        check_probability(
            disc.recurrence.detection_probability,
            "discontinuation.recurrence.detection_probability",
        )?;
        check_probability(
            disc.retreatment.base_probability,
            "discontinuation.retreatment.base_probability",
        )?;
        for weeks in [
            &disc.monitoring.planned_stable_weeks,
            &disc.monitoring.clinical_decision_weeks,
            &disc.monitoring.administrative_error_weeks,
            &disc.monitoring.continued_deterioration_weeks,
            &disc.monitoring.poor_vision_weeks,
        ] {
            if !weeks.windows(2).all(|w| w[0] < w[1]) || weeks.iter().any(|w| *w <= 0) {
                return Err(SimulationError::config(
                    "discontinuation.monitoring week offsets must be positive and strictly ascending",
                ));
            }
        }
        if let Some(gap) = disc.monitoring.recurring_gap_weeks {
            if gap <= 0 {
                return Err(SimulationError::config(
                    "discontinuation.monitoring.recurring_gap_weeks must be > 0 when set",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_bad_matrix_row_is_fatal_and_named() {
        let mut config = SimulationConfig::default();
        config.disease.transition_matrix[2] = [0.1, 0.1, 0.1, 0.1];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("transition_matrix row 2"));
    }

    #[test]
    fn test_inverted_interval_bounds_are_fatal() {
        let mut config = SimulationConfig::default();
        config.protocol.min_interval_days = 120;
        config.protocol.max_interval_days = 56;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_interval_days"));
    }

    #[test]
    fn test_non_normalized_profile_proportions_are_fatal() {
        let mut config = SimulationConfig::default();
        config.clinicians.profiles[0].proportion = 0.9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("proportions sum"));
    }

    #[test]
    fn test_decreasing_anchors_are_fatal() {
        let mut config = SimulationConfig::default();
        config.discontinuation.recurrence.planned_stable =
            RecurrenceAnchors::new(0.5, 0.3, 0.6);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("planned_stable"));
    }

    #[test]
    fn test_empty_decay_is_fatal() {
        let mut config = SimulationConfig::default();
        config.disease.effect_decay.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = SimulationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SimulationConfig = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        assert_eq!(back.population.n_patients, config.population.n_patients);
    }
}
