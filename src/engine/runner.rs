//! Population simulation runner
//!
//! Patients are embarrassingly parallel: each worker owns a private RNG
//! stream seeded from the master seed plus the patient index, and the only
//! shared state is the read-only configuration, model set and clinician
//! pool. Results are reduced to population statistics after all workers
//! complete.

use log::info;
use rayon::prelude::*;

use crate::config::SimulationConfig;
use crate::disease::DiseaseStateModel;
use crate::discontinuation::DiscontinuationEngine;
use crate::engine::patient_loop::{SimulationModels, simulate_patient};
use crate::engine::statistics::PopulationStats;
use crate::error::Result;
use crate::models::clinician::ClinicianManager;
use crate::models::patient::Patient;
use crate::models::visit::VisitRecord;
use crate::protocol::TreatmentProtocolEngine;
use crate::utils::progress;
use crate::vision::VisionTrajectoryModel;

/// The complete, read-only output of a simulation run
#[derive(Debug)]
pub struct SimulationOutput {
    /// Final patient states with their complete visit histories,
    /// ordered by patient index
    pub patients: Vec<Patient>,
    /// Population statistics reduced from the final patient states
    pub stats: PopulationStats,
}

impl SimulationOutput {
    /// Flattened, read-only view of every visit event, grouped per patient
    /// in time order. This is the narrow interface downstream collaborators
    /// (economics, visualization, reporting) consume.
    pub fn visit_events(&self) -> impl Iterator<Item = (usize, &VisitRecord)> {
        self.patients
            .iter()
            .flat_map(|p| p.history.iter().map(move |v| (p.id, v)))
    }
}

/// Runs a configured population simulation
#[derive(Debug)]
pub struct SimulationRunner {
    config: SimulationConfig,
}

impl SimulationRunner {
    /// Validate the configuration and prepare a runner. All structural
    /// configuration errors surface here, before any patient is simulated.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate the whole population in parallel
    pub fn run(&self) -> Result<SimulationOutput> {
        let models = SimulationModels {
            disease: DiseaseStateModel::from_config(&self.config.disease)?,
            vision: VisionTrajectoryModel::new(self.config.vision.clone()),
            protocol: TreatmentProtocolEngine::new(self.config.protocol.clone()),
            discontinuation: DiscontinuationEngine::new(self.config.discontinuation.clone()),
        };
        // Fatal precondition: the pool must exist before the run starts.
        let clinicians = ClinicianManager::from_config(&self.config.clinicians)?;

        let n_patients = self.config.population.n_patients;
        info!(
            "Simulating {n_patients} patients over {} days with {} clinicians ({} threads)",
            self.config.population.horizon_days,
            clinicians.len(),
            rayon::current_num_threads()
        );

        let pb = progress::create_main_progress_bar(
            n_patients as u64,
            Some("Simulating patients"),
        );
        let patients: Vec<Patient> = (0..n_patients)
            .into_par_iter()
            .map(|index| {
                let patient = simulate_patient(&self.config, &models, &clinicians, index);
                pb.inc(1);
                patient
            })
            .collect();
        progress::finish_progress_bar(&pb, Some("Simulation complete"));

        let stats = PopulationStats::from_patients(&patients);
        info!(
            "Run complete: {} visits, {} injections, {} discontinued",
            stats.total_visits, stats.total_injections, stats.discontinued_count
        );

        Ok(SimulationOutput { patients, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    #[test]
    fn test_invalid_config_fails_before_running() {
        let mut config = SimulationConfig::default();
        config.disease.transition_matrix[0] = [0.5, 0.5, 0.5, 0.5];
        assert!(SimulationRunner::new(config).is_err());
    }

    #[test]
    fn test_small_run_produces_ordered_output() {
        let mut config = SimulationConfig::default();
        config.population.n_patients = 20;
        config.population.horizon_days = 365;
        let output = SimulationRunner::new(config).unwrap().run().unwrap();
        assert_eq!(output.patients.len(), 20);
        for (index, patient) in output.patients.iter().enumerate() {
            assert_eq!(patient.id, index);
        }
        assert_eq!(
            output.stats.total_visits,
            output.visit_events().count()
        );
    }
}
