use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    #[default]
    Active,
    Completed,
    Paused,
}

impl PathStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "active" | "in_progress" | "ongoing" | "started" => Some(PathStatus::Active),
            "completed" | "complete" | "done" | "finished" => Some(PathStatus::Completed),
            "paused" | "on_hold" | "suspended" => Some(PathStatus::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_label(raw).as_str() {
            "not_started" | "pending" | "locked" | "todo" | "new" => Some(StepStatus::NotStarted),
            "in_progress" | "started" | "active" | "ongoing" => Some(StepStatus::InProgress),
            "completed" | "complete" | "done" | "finished" => Some(StepStatus::Completed),
            _ => None,
        }
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningStep {
    pub step_id: String,
    pub title: String,
    pub status: StepStatus,
    progress_percentage: u8,
}

impl LearningStep {
    /// Builds a step whose percentage agrees with its status: completed steps
    /// are 100, unstarted steps 0, and in-progress steps stay below 100.
    pub fn new(step_id: String, title: String, status: StepStatus, reported_progress: f64) -> Self {
        let progress_percentage = match status {
            StepStatus::Completed => 100,
            StepStatus::NotStarted => 0,
            StepStatus::InProgress => clamp_percentage(reported_progress).min(99),
        };
        Self {
            step_id,
            title,
            status,
            progress_percentage,
        }
    }

    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }
}

/// A student's learning path. Progress and step counts are derived from the
/// steps at construction and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningPath {
    pub path_id: String,
    pub student_ref: Option<String>,
    pub title: String,
    status: PathStatus,
    progress_percentage: u8,
    completed_steps: usize,
    total_steps: usize,
    steps: Vec<LearningStep>,
}

impl LearningPath {
    pub fn new(
        path_id: String,
        student_ref: Option<String>,
        title: String,
        reported_status: PathStatus,
        steps: Vec<LearningStep>,
    ) -> Self {
        let total_steps = steps.len();
        let completed_steps = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        let progress_percentage = if total_steps == 0 {
            0
        } else {
            let sum: u32 = steps.iter().map(|s| s.progress_percentage as u32).sum();
            (sum as f64 / total_steps as f64).round() as u8
        };

        let all_done = total_steps > 0 && completed_steps == total_steps;
        let status = match reported_status {
            PathStatus::Paused => PathStatus::Paused,
            _ if all_done => PathStatus::Completed,
            PathStatus::Completed => PathStatus::Active,
            other => other,
        };

        Self {
            path_id,
            student_ref,
            title,
            status,
            progress_percentage,
            completed_steps,
            total_steps,
            steps,
        }
    }

    pub fn status(&self) -> PathStatus {
        self.status
    }

    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn steps(&self) -> &[LearningStep] {
        &self.steps
    }

    pub fn current_step(&self) -> Option<&LearningStep> {
        self.steps
            .iter()
            .find(|s| s.status != StepStatus::Completed)
    }
}

pub(crate) fn clamp_percentage(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
