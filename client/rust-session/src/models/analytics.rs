use serde::Serialize;
use std::collections::BTreeSet;

use super::assessment::average;
use super::learning_path::{LearningPath, PathStatus};

/// Teacher-dashboard figures derived from normalized learning paths.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DashboardAnalytics {
    pub total_paths: usize,
    pub active_paths: usize,
    pub completed_paths: usize,
    pub paused_paths: usize,
    pub distinct_students: usize,
    pub average_progress: f64,
    pub total_steps: usize,
    pub completed_steps: usize,
    /// Completed steps over all steps, as a percentage.
    pub step_completion_rate: f64,
}

impl DashboardAnalytics {
    pub fn from_paths(paths: &[LearningPath]) -> Self {
        let count_status = |status: PathStatus| paths.iter().filter(|p| p.status() == status).count();

        let students: BTreeSet<&str> = paths
            .iter()
            .filter_map(|p| p.student_ref.as_deref())
            .collect();

        let progress_sum: u64 = paths.iter().map(|p| p.progress_percentage() as u64).sum();
        let total_steps: usize = paths.iter().map(LearningPath::total_steps).sum();
        let completed_steps: usize = paths.iter().map(LearningPath::completed_steps).sum();

        Self {
            total_paths: paths.len(),
            active_paths: count_status(PathStatus::Active),
            completed_paths: count_status(PathStatus::Completed),
            paused_paths: count_status(PathStatus::Paused),
            distinct_students: students.len(),
            average_progress: average(progress_sum, paths.len()),
            total_steps,
            completed_steps,
            step_completion_rate: average(completed_steps as u64 * 100, total_steps),
        }
    }
}
