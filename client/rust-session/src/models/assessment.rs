use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Mixed,
}

impl Difficulty {
    /// Lenient parse of backend difficulty labels; `None` for anything unknown.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" | "low" => Some(Difficulty::Easy),
            "medium" | "intermediate" | "moderate" => Some(Difficulty::Medium),
            "hard" | "advanced" | "high" => Some(Difficulty::Hard),
            "mixed" | "adaptive" => Some(Difficulty::Mixed),
            _ => None,
        }
    }
}

/// UI-stable view of a backend `AssessmentConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentSummary {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub grade: u32,
    /// Ordered, duplicate-free, never empty.
    pub topics: Vec<String>,
    pub questions_count: u32,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AssessmentStats {
    pub total: usize,
    pub average_duration_minutes: f64,
    pub average_questions: f64,
    pub subjects: BTreeMap<String, usize>,
}

impl AssessmentStats {
    pub fn from_summaries(summaries: &[AssessmentSummary]) -> Self {
        let total = summaries.len();
        let mut subjects = BTreeMap::new();
        for summary in summaries {
            *subjects.entry(summary.subject.clone()).or_insert(0) += 1;
        }

        let total_duration: u64 = summaries.iter().map(|s| s.duration_minutes as u64).sum();
        let total_questions: u64 = summaries.iter().map(|s| s.questions_count as u64).sum();

        Self {
            total,
            average_duration_minutes: average(total_duration, total),
            average_questions: average(total_questions, total),
            subjects,
        }
    }
}

pub(crate) fn average(sum: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
