//! Field lookup helpers for loosely-shaped backend objects.
//!
//! Every helper takes a list of candidate keys and returns the first value
//! that is present *and* usable for the requested type, so that a record
//! with `"question_count": null, "num_questions": 12` still resolves.

use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

/// First non-empty string (after trimming) among `keys`.
pub fn string_field(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Like [`string_field`] but also accepts integers, for identifiers that
/// some backend versions emit as numbers.
pub fn id_field(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First value among `keys` that reads as a non-negative integer. Numeric
/// strings and whole floats are accepted; negatives are treated as unusable.
pub fn count_field(obj: &Object, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(non_negative_int))
}

/// First value among `keys` that reads as a number, as `f64`.
pub fn number_field(obj: &Object, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|f| f.is_finite())
}

/// First array among `keys`.
pub fn array_field<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_array))
}

/// First present, non-null value among `keys`.
pub fn any_field<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
}

fn non_negative_int(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u32::try_from(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn skips_unusable_candidates() {
        let o = obj(json!({"question_count": null, "num_questions": "12", "title": "  "}));
        assert_eq!(count_field(&o, &["question_count", "num_questions"]), Some(12));
        assert_eq!(string_field(&o, &["title"]), None);
    }

    #[test]
    fn negative_counts_are_unusable() {
        let o = obj(json!({"duration": -5, "grade": 3.0}));
        assert_eq!(count_field(&o, &["duration"]), None);
        assert_eq!(count_field(&o, &["grade"]), Some(3));
    }

    #[test]
    fn ids_accept_numbers() {
        let o = obj(json!({"id": 42}));
        assert_eq!(id_field(&o, &["config_id", "id"]).as_deref(), Some("42"));
    }
}
