//! Clinician model and pool management
//!
//! A `Clinician` is created once per run by the `ClinicianManager` and is
//! immutable afterwards; patients hold a non-owning index into the pool.
//! The behavioural variation is a single data-driven `DecisionPolicy`
//! consumed uniformly by the discontinuation and retreatment evaluators,
//! instead of per-decision ad hoc conditionals.

use crate::config::{AssignmentPolicy, ClinicianParams};
use crate::error::{Result, SimulationError};
use crate::models::types::RiskTolerance;
use crate::rng::PatientRng;

/// Multipliers and override probabilities applied when a clinician deviates
/// from the protocol decision
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    /// Scales the protocol stop probability
    pub stop_probability_multiplier: f64,
    /// Probability of stopping even when the protocol says continue
    pub premature_stop_probability: f64,
    /// Probability of overriding a protocol stop into continuation
    pub conservative_override_probability: f64,
    /// Scales the protocol retreatment probability
    pub retreat_probability_multiplier: f64,
}

impl DecisionPolicy {
    /// Policy for a risk-tolerance category
    #[must_use]
    pub fn for_tolerance(tolerance: RiskTolerance) -> Self {
        match tolerance {
            RiskTolerance::Low => Self {
                stop_probability_multiplier: 0.7,
                premature_stop_probability: 0.0,
                conservative_override_probability: 0.15,
                retreat_probability_multiplier: 1.1,
            },
            RiskTolerance::Medium => Self {
                stop_probability_multiplier: 1.0,
                premature_stop_probability: 0.01,
                conservative_override_probability: 0.05,
                retreat_probability_multiplier: 1.0,
            },
            RiskTolerance::High => Self {
                stop_probability_multiplier: 1.4,
                premature_stop_probability: 0.04,
                conservative_override_probability: 0.0,
                retreat_probability_multiplier: 0.85,
            },
        }
    }
}

/// One clinician in the shared pool, immutable after creation
#[derive(Debug, Clone)]
pub struct Clinician {
    /// Index within the pool
    pub id: usize,
    /// Profile name this clinician was drawn from
    pub profile_name: String,
    /// Probability of following the protocol decision exactly
    pub adherence_rate: f64,
    /// Risk-tolerance category
    pub risk_tolerance: RiskTolerance,
    /// Overrides the protocol's consecutive-stable-visit threshold
    pub stability_threshold_override: Option<u32>,
    /// Clinician will not extend beyond this interval, days
    pub preferred_max_interval_days: Option<i64>,
}

impl Clinician {
    /// The decision policy for this clinician's risk tolerance
    #[must_use]
    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy::for_tolerance(self.risk_tolerance)
    }

    /// Apply this clinician's profile to a protocol discontinuation
    /// decision. An adherent draw passes the protocol decision through
    /// unchanged; otherwise the policy amplifies or dampens the stop
    /// probability, may stop prematurely, or may override a stop.
    pub fn evaluate_discontinuation(
        &self,
        protocol_stop: bool,
        protocol_probability: f64,
        rng: &mut PatientRng,
    ) -> (bool, f64) {
        if rng.bernoulli(self.adherence_rate) {
            return (protocol_stop, protocol_probability);
        }
        let policy = self.policy();
        let adjusted = (protocol_probability * policy.stop_probability_multiplier).clamp(0.0, 1.0);
        if protocol_stop {
            if rng.bernoulli(policy.conservative_override_probability) {
                (false, adjusted)
            } else {
                (true, adjusted)
            }
        } else {
            // Extra stop mass beyond what the protocol draw already covered,
            // so the effective stop rate tracks the adjusted probability.
            let residual = (1.0 - protocol_probability).max(f64::EPSILON);
            let extra = ((adjusted - protocol_probability) / residual).clamp(0.0, 1.0);
            if rng.bernoulli(extra.max(policy.premature_stop_probability)) {
                (true, adjusted)
            } else {
                (false, adjusted)
            }
        }
    }

    /// Apply this clinician's profile to a protocol retreatment decision
    pub fn evaluate_retreatment(
        &self,
        protocol_retreat: bool,
        protocol_probability: f64,
        rng: &mut PatientRng,
    ) -> (bool, f64) {
        if rng.bernoulli(self.adherence_rate) {
            return (protocol_retreat, protocol_probability);
        }
        let policy = self.policy();
        let adjusted =
            (protocol_probability * policy.retreat_probability_multiplier).clamp(0.0, 1.0);
        // Non-adherent clinicians re-draw against their own probability.
        let decision = rng.bernoulli(adjusted);
        (decision, adjusted)
    }
}

/// Pre-generated pool of clinicians plus the assignment policy
#[derive(Debug)]
pub struct ClinicianManager {
    pool: Vec<Clinician>,
    assignment: AssignmentPolicy,
}

impl ClinicianManager {
    /// Build the pool from configured profile proportions. Profile counts
    /// use largest-remainder rounding so the pool always has exactly
    /// `pool_size` members.
    pub fn from_config(params: &ClinicianParams) -> Result<Self> {
        if params.profiles.is_empty() || params.pool_size == 0 {
            return Err(SimulationError::precondition(
                "clinician pool is empty; the run cannot start",
            ));
        }

        let mut counts: Vec<usize> = params
            .profiles
            .iter()
            .map(|p| (p.proportion * params.pool_size as f64).floor() as usize)
            .collect();
        let mut remainders: Vec<(usize, f64)> = params
            .profiles
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let exact = p.proportion * params.pool_size as f64;
                (i, exact - exact.floor())
            })
            .collect();
        remainders.sort_by(|a, b| b.1.total_cmp(&a.1));
        let assigned: usize = counts.iter().sum();
        for (i, _) in remainders.iter().take(params.pool_size - assigned) {
            counts[*i] += 1;
        }

        let mut pool = Vec::with_capacity(params.pool_size);
        for (profile, count) in params.profiles.iter().zip(&counts) {
            for _ in 0..*count {
                pool.push(Clinician {
                    id: pool.len(),
                    profile_name: profile.name.clone(),
                    adherence_rate: profile.adherence_rate,
                    risk_tolerance: profile.risk_tolerance,
                    stability_threshold_override: profile.stability_threshold_override,
                    preferred_max_interval_days: profile.preferred_max_interval_days,
                });
            }
        }
        debug_assert_eq!(pool.len(), params.pool_size);

        Ok(Self {
            pool,
            assignment: params.assignment,
        })
    }

    /// Number of clinicians in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether the pool is empty (never true after construction)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// All clinicians, read-only
    #[must_use]
    pub fn pool(&self) -> &[Clinician] {
        &self.pool
    }

    /// Initial assignment for a new patient
    pub fn assign_initial(&self, rng: &mut PatientRng) -> usize {
        (rng.uniform() * self.pool.len() as f64) as usize % self.pool.len()
    }

    /// The clinician seeing the patient at this visit, per the assignment
    /// policy. Returns the (possibly new) clinician id; the caller stores it
    /// back on the patient.
    pub fn clinician_for_visit(&self, current_id: usize, rng: &mut PatientRng) -> usize {
        match self.assignment {
            AssignmentPolicy::FixedForPatient => current_id,
            AssignmentPolicy::RandomPerVisit => self.assign_initial(rng),
            AssignmentPolicy::WeightedContinuity {
                continuity_probability,
            } => {
                if rng.bernoulli(continuity_probability) {
                    current_id
                } else {
                    self.assign_initial(rng)
                }
            }
        }
    }

    /// Look up a clinician by id
    #[must_use]
    pub fn get(&self, id: usize) -> &Clinician {
        &self.pool[id]
    }
}
