use chrono::DateTime;
use serde_json::Value;

use super::{normalize_all, Normalized};
use crate::models::assessment::{AssessmentSummary, Difficulty};
use crate::utils::json::{any_field, array_field, count_field, id_field, string_field, Object};
use crate::utils::time::timestamp_from_json;

pub const DEFAULT_TITLE: &str = "Untitled Assessment";
pub const DEFAULT_SUBJECT: &str = "General";
pub const DEFAULT_TOPIC: &str = "General";
pub const DEFAULT_GRADE: u32 = 0;
pub const DEFAULT_QUESTIONS_COUNT: u32 = 10;
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

const ID_KEYS: &[&str] = &["config_id", "id", "_id"];
const TITLE_KEYS: &[&str] = &["name", "title"];
const GRADE_KEYS: &[&str] = &["target_grade", "grade", "grade_level"];
const QUESTION_COUNT_KEYS: &[&str] = &["question_count", "questions_count", "num_questions"];
const DURATION_KEYS: &[&str] = &["duration_minutes", "duration", "time_limit_minutes"];
const CREATED_AT_KEYS: &[&str] = &["created_at", "createdAt"];
const DIFFICULTY_KEYS: &[&str] = &["difficulty_level", "difficulty"];

/// Normalizes an assessment-config listing into [`AssessmentSummary`] records.
pub fn adapt_assessments(raw: &Value) -> Normalized<AssessmentSummary> {
    normalize_all("assessments", raw, &["configs", "assessments"], normalize_config)
}

fn normalize_config(obj: &Object) -> Option<AssessmentSummary> {
    let id = id_field(obj, ID_KEYS)?;

    let questions_count = count_field(obj, QUESTION_COUNT_KEYS)
        .or_else(|| array_field(obj, &["questions"]).map(|q| q.len() as u32))
        .unwrap_or(DEFAULT_QUESTIONS_COUNT);

    let difficulty = DIFFICULTY_KEYS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find_map(Difficulty::parse)
        .unwrap_or_default();

    Some(AssessmentSummary {
        id,
        title: string_field(obj, TITLE_KEYS).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        subject: string_field(obj, &["subject"]).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        grade: count_field(obj, GRADE_KEYS).unwrap_or(DEFAULT_GRADE),
        topics: topics(obj),
        questions_count,
        duration_minutes: count_field(obj, DURATION_KEYS).unwrap_or(DEFAULT_DURATION_MINUTES),
        created_at: any_field(obj, CREATED_AT_KEYS)
            .and_then(timestamp_from_json)
            .unwrap_or(DateTime::UNIX_EPOCH),
        difficulty,
    })
}

/// `topics` array first, then a single (possibly comma-separated) `topic`.
fn topics(obj: &Object) -> Vec<String> {
    let raw: Vec<&str> = match obj.get("topics") {
        Some(Value::Array(items)) if !items.is_empty() => {
            items.iter().filter_map(Value::as_str).collect()
        }
        Some(Value::String(s)) => s.split(',').collect(),
        _ => match obj.get("topic") {
            Some(Value::String(s)) => s.split(',').collect(),
            _ => Vec::new(),
        },
    };

    let mut topics: Vec<String> = Vec::with_capacity(raw.len());
    for topic in raw.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
        if !topics.iter().any(|existing| existing == topic) {
            topics.push(topic.to_string());
        }
    }

    if topics.is_empty() {
        topics.push(DEFAULT_TOPIC.to_string());
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn minimal_config_gets_documented_defaults() {
        let raw = json!({"config_id": "c1", "name": "Algebra Quiz", "subject": "Math"});
        let out = adapt_assessments(&raw);

        assert_eq!(out.skipped, 0);
        let summary = &out.records[0];
        assert_eq!(summary.id, "c1");
        assert_eq!(summary.title, "Algebra Quiz");
        assert_eq!(summary.subject, "Math");
        assert_eq!(summary.grade, 0);
        assert_eq!(summary.topics, vec!["General".to_string()]);
        assert_eq!(summary.questions_count, 10);
        assert_eq!(summary.duration_minutes, 30);
        assert_eq!(summary.difficulty, Difficulty::Medium);
        assert_eq!(summary.created_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn newer_field_names_are_understood() {
        let raw = json!({
            "data": [{
                "id": 7,
                "title": "Cells",
                "subject": "Biology",
                "grade": "8",
                "topics": ["Mitosis", " Meiosis ", "Mitosis", ""],
                "questions": [{}, {}, {}],
                "duration": 45,
                "difficulty": "Advanced",
                "createdAt": "2024-05-01T09:30:00Z"
            }]
        });
        let summary = adapt_assessments(&raw).into_records().remove(0);

        assert_eq!(summary.id, "7");
        assert_eq!(summary.grade, 8);
        assert_eq!(summary.topics, vec!["Mitosis", "Meiosis"]);
        assert_eq!(summary.questions_count, 3);
        assert_eq!(summary.duration_minutes, 45);
        assert_eq!(summary.difficulty, Difficulty::Hard);
        assert_eq!(
            summary.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn single_topic_string_is_split() {
        let raw = json!([{"config_id": "c2", "topic": "Fractions, Decimals"}]);
        let summary = adapt_assessments(&raw).into_records().remove(0);
        assert_eq!(summary.topics, vec!["Fractions", "Decimals"]);
        assert_eq!(summary.title, DEFAULT_TITLE);
        assert_eq!(summary.subject, DEFAULT_SUBJECT);
    }

    #[test]
    fn negative_and_garbage_counts_fall_back() {
        let raw = json!([{
            "config_id": "c3",
            "question_count": -4,
            "duration_minutes": "soon",
            "target_grade": -1
        }]);
        let summary = adapt_assessments(&raw).into_records().remove(0);
        assert_eq!(summary.questions_count, DEFAULT_QUESTIONS_COUNT);
        assert_eq!(summary.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert_eq!(summary.grade, DEFAULT_GRADE);
    }

    #[test]
    fn out_of_range_timestamps_fall_back_to_the_epoch() {
        let raw = json!([
            {"config_id": "c4", "created_at": -1e300},
            {"config_id": "c5", "created_at": "-9223372036854775808"},
            {"config_id": "c6", "created_at": i64::MIN}
        ]);
        let out = adapt_assessments(&raw);
        assert_eq!(out.records.len(), 3);
        for summary in &out.records {
            assert_eq!(summary.created_at, DateTime::UNIX_EPOCH);
        }
    }

    #[test]
    fn records_without_id_are_skipped_and_counted() {
        let raw = json!([
            {"config_id": "keep"},
            {"name": "no id"},
            null,
            {"id": ""}
        ]);
        let out = adapt_assessments(&raw);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].id, "keep");
        assert_eq!(out.skipped, 3);
    }

    #[test]
    fn every_payload_shape_yields_a_sequence() {
        let shapes = [
            json!([{"config_id": "a"}]),
            json!({"data": [{"config_id": "a"}]}),
            json!({"configs": [{"config_id": "a"}]}),
            json!({"config_id": "a"}),
            Value::Null,
            json!(42),
            json!({"data": null}),
            json!("<html>"),
        ];

        for shape in &shapes {
            let out = adapt_assessments(shape);
            assert!(out.records.len() <= 1, "shape {}", shape);
            for summary in &out.records {
                assert!(!summary.id.is_empty());
                assert!(!summary.title.is_empty());
                assert!(!summary.topics.is_empty());
            }
        }

        assert!(adapt_assessments(&Value::Null).is_empty());
        assert_eq!(adapt_assessments(&json!({"data": null})).records.len(), 0);
    }
}
