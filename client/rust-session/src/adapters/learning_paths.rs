use serde_json::Value;

use super::{normalize_all, Normalized};
use crate::models::learning_path::{LearningPath, LearningStep, PathStatus, StepStatus};
use crate::utils::json::{array_field, id_field, number_field, string_field, Object};

pub const DEFAULT_PATH_TITLE: &str = "Learning Path";
pub const DEFAULT_STEP_TITLE: &str = "Untitled Step";

const PATH_ID_KEYS: &[&str] = &["path_id", "learning_path_id", "id", "_id"];
const STUDENT_KEYS: &[&str] = &["student_id", "studentId", "user_id"];
const STEP_ID_KEYS: &[&str] = &["step_id", "lesson_id", "id", "_id"];
const STEP_KEYS: &[&str] = &["steps", "lessons", "modules"];
const TITLE_KEYS: &[&str] = &["title", "name", "topic"];
const PROGRESS_KEYS: &[&str] = &["progress_percentage", "progressPercentage", "progress"];
const ORDER_KEYS: &[&str] = &["order", "step_number", "position"];

/// Normalizes learning-path payloads. Path progress is always derived from
/// the steps; any path-level percentage the backend sends is ignored.
pub fn adapt_learning_paths(raw: &Value) -> Normalized<LearningPath> {
    normalize_all(
        "learning_paths",
        raw,
        &["learning_paths", "paths"],
        normalize_path,
    )
}

fn normalize_path(obj: &Object) -> Option<LearningPath> {
    let path_id = id_field(obj, PATH_ID_KEYS)?;

    let reported_status = string_field(obj, &["status"])
        .and_then(|s| PathStatus::parse(&s))
        .unwrap_or_default();

    let mut ordered: Vec<(Option<f64>, &Object)> = array_field(obj, STEP_KEYS)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|step| (number_field(step, ORDER_KEYS), step))
                .collect()
        })
        .unwrap_or_default();
    // Stable: unordered steps keep their input position after ordered ones.
    ordered.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let steps = ordered
        .into_iter()
        .enumerate()
        .map(|(index, (_, step))| normalize_step(&path_id, index, step))
        .collect();

    Some(LearningPath::new(
        path_id,
        id_field(obj, STUDENT_KEYS),
        string_field(obj, TITLE_KEYS).unwrap_or_else(|| DEFAULT_PATH_TITLE.to_string()),
        reported_status,
        steps,
    ))
}

fn normalize_step(path_id: &str, index: usize, step: &Object) -> LearningStep {
    let status = string_field(step, &["status"])
        .and_then(|s| StepStatus::parse(&s))
        .or_else(|| {
            step.get("completed")
                .and_then(Value::as_bool)
                .map(|done| if done { StepStatus::Completed } else { StepStatus::NotStarted })
        })
        .unwrap_or_default();

    LearningStep::new(
        id_field(step, STEP_ID_KEYS).unwrap_or_else(|| format!("{}-step-{}", path_id, index + 1)),
        string_field(step, TITLE_KEYS).unwrap_or_else(|| DEFAULT_STEP_TITLE.to_string()),
        status,
        number_field(step, PROGRESS_KEYS).unwrap_or(0.0),
    )
}
