//! Simulation orchestration: per-patient loop, parallel runner and
//! population statistics

pub mod patient_loop;
pub mod runner;
pub mod statistics;

pub use patient_loop::{SimulationModels, simulate_patient};
pub use runner::{SimulationOutput, SimulationRunner};
pub use statistics::PopulationStats;
