use serde_json::Value;

use super::Payload;
use crate::models::upload::{BulkImportResult, RecordFailure};
use crate::utils::json::{array_field, count_field, id_field, string_field, Object};

const TOTAL_KEYS: &[&str] = &["total", "total_records", "total_rows", "processed"];
const CREATED_KEYS: &[&str] = &["created", "created_count", "students_created", "inserted"];
const UPDATED_KEYS: &[&str] = &["updated", "updated_count", "students_updated"];
const FAILED_KEYS: &[&str] = &["failed", "failed_count", "errors_count"];
const FAILURE_LIST_KEYS: &[&str] = &["failures", "errors", "failed_records"];

pub const DEFAULT_FAILURE_REASON: &str = "Record could not be imported";

/// Normalizes the bulk-import endpoint's response. Missing counts become 0,
/// `total` falls back to the sum of the outcome counts, and `failed` is never
/// lower than the number of listed failures.
pub fn adapt_bulk_import_result(raw: &Value) -> BulkImportResult {
    let summary = Payload::classify(raw, &["result", "summary"])
        .records()
        .into_iter()
        .flatten()
        .next();

    let Some(obj) = summary else {
        return BulkImportResult::default();
    };

    let failures: Vec<RecordFailure> = array_field(obj, FAILURE_LIST_KEYS)
        .map(|items| items.iter().filter_map(normalize_failure).collect())
        .unwrap_or_default();

    let created = count_field(obj, CREATED_KEYS).unwrap_or(0);
    let updated = count_field(obj, UPDATED_KEYS).unwrap_or(0);
    let failed = count_field(obj, FAILED_KEYS)
        .unwrap_or(0)
        .max(failures.len() as u32);
    let total = count_field(obj, TOTAL_KEYS)
        .unwrap_or(0)
        .max(created.saturating_add(updated).saturating_add(failed));

    BulkImportResult {
        total,
        created,
        updated,
        failed,
        failures,
    }
}

fn normalize_failure(item: &Value) -> Option<RecordFailure> {
    match item {
        Value::String(reason) if !reason.trim().is_empty() => Some(RecordFailure {
            reason: reason.trim().to_string(),
            ..Default::default()
        }),
        Value::Object(obj) => Some(failure_from_object(obj)),
        _ => None,
    }
}

fn failure_from_object(obj: &Object) -> RecordFailure {
    RecordFailure {
        row: count_field(obj, &["row", "row_number", "line"]),
        identifier: id_field(obj, &["email", "identifier", "student_id", "id"]),
        reason: string_field(obj, &["reason", "error", "message", "detail"])
            .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
    }
}
