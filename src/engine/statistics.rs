//! Population statistics
//!
//! Aggregate statistics are a pure reduction over final patient states
//! after the run completes. Nothing here is accumulated incrementally in
//! shared mutable state while patients simulate, which keeps the aggregate
//! counts structurally incapable of drifting from per-patient truth.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::models::patient::Patient;
use crate::models::types::{DiscontinuationReason, PatientStatus, VisitAction};

/// Summary statistics for a completed simulation run
#[derive(Debug, Clone)]
pub struct PopulationStats {
    /// Number of patients simulated
    pub patient_count: usize,
    /// Total visits across all patients
    pub total_visits: usize,
    /// Total injections across all patients
    pub total_injections: u64,
    /// Mean injections per patient
    pub mean_injections: f64,
    /// Mean baseline vision, letters
    pub mean_baseline_vision: f64,
    /// Mean hidden vision at the end of each patient's timeline, letters
    pub mean_final_vision: f64,
    /// Mean hidden vision change from baseline, letters
    pub mean_vision_change: f64,
    /// Patients discontinued at the end of the run
    pub discontinued_count: usize,
    /// Patients who died during the run
    pub deceased_count: usize,
    /// Total retreatment episodes
    pub retreatment_count: u64,
    /// Stop counts by reason (counting each patient's final reason)
    pub stops_by_reason: FxHashMap<DiscontinuationReason, usize>,
}

impl PopulationStats {
    /// Reduce a completed patient population to its summary statistics
    #[must_use]
    pub fn from_patients(patients: &[Patient]) -> Self {
        let patient_count = patients.len();
        let total_visits: usize = patients.iter().map(|p| p.history.len()).sum();
        let total_injections: u64 = patients
            .iter()
            .flat_map(|p| &p.history)
            .filter(|v| v.action == VisitAction::Injection)
            .count() as u64;
        let retreatment_count: u64 = patients.iter().map(|p| u64::from(p.retreat_count)).sum();

        let divisor = patient_count.max(1) as f64;
        let mean_baseline_vision =
            patients.iter().map(|p| p.baseline_vision).sum::<f64>() / divisor;
        let mean_final_vision = patients.iter().map(|p| p.hidden_vision).sum::<f64>() / divisor;

        let stops_by_reason = patients
            .iter()
            .filter_map(|p| p.discontinuation_reason)
            .fold(FxHashMap::default(), |mut counts, reason| {
                *counts.entry(reason).or_insert(0) += 1;
                counts
            });

        Self {
            patient_count,
            total_visits,
            total_injections,
            mean_injections: total_injections as f64 / divisor,
            mean_baseline_vision,
            mean_final_vision,
            mean_vision_change: mean_final_vision - mean_baseline_vision,
            discontinued_count: patients
                .iter()
                .filter(|p| p.status == PatientStatus::Discontinued)
                .count(),
            deceased_count: stops_by_reason
                .get(&DiscontinuationReason::Mortality)
                .copied()
                .unwrap_or(0),
            retreatment_count,
            stops_by_reason,
        }
    }

    /// Human-readable run summary
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Simulation Run Summary:\n");
        summary.push_str(&format!("  Patients: {}\n", self.patient_count));
        summary.push_str(&format!("  Total Visits: {}\n", self.total_visits));
        summary.push_str(&format!(
            "  Total Injections: {} (mean {:.1}/patient)\n",
            self.total_injections, self.mean_injections
        ));
        summary.push_str(&format!(
            "  Mean Vision: {:.1} -> {:.1} letters ({:+.1})\n",
            self.mean_baseline_vision, self.mean_final_vision, self.mean_vision_change
        ));
        summary.push_str(&format!(
            "  Discontinued: {} ({} deceased)\n",
            self.discontinued_count, self.deceased_count
        ));
        summary.push_str(&format!("  Retreatments: {}\n", self.retreatment_count));
        for (reason, count) in self
            .stops_by_reason
            .iter()
            .sorted_by_key(|(_, count)| std::cmp::Reverse(**count))
        {
            summary.push_str(&format!("    {}: {}\n", reason.as_str(), count));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::patient::Patient;
    use crate::models::types::DiscontinuationReason;
    use chrono::NaiveDate;

    fn patient(id: usize, baseline: f64) -> Patient {
        Patient::new(
            id,
            75.0,
            baseline,
            baseline * 1.1,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            28,
            0,
            false,
        )
    }

    #[test]
    fn test_empty_population() {
        let stats = PopulationStats::from_patients(&[]);
        assert_eq!(stats.patient_count, 0);
        assert_eq!(stats.total_injections, 0);
    }

    #[test]
    fn test_stops_counted_by_final_reason() {
        let mut a = patient(0, 60.0);
        a.discontinue(DiscontinuationReason::PlannedStable, 100);
        let mut b = patient(1, 70.0);
        b.discontinue(DiscontinuationReason::Mortality, 200);
        let c = patient(2, 65.0);

        let stats = PopulationStats::from_patients(&[a, b, c]);
        assert_eq!(stats.discontinued_count, 2);
        assert_eq!(stats.deceased_count, 1);
        assert_eq!(
            stats.stops_by_reason[&DiscontinuationReason::PlannedStable],
            1
        );
        assert!((stats.mean_baseline_vision - 65.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_mentions_reasons() {
        let mut a = patient(0, 60.0);
        a.discontinue(DiscontinuationReason::PoorVision, 100);
        let stats = PopulationStats::from_patients(&[a]);
        assert!(stats.summary().contains("poor_vision: 1"));
    }
}
