//! View-model adapters: pure transforms from loosely-shaped backend JSON to
//! the strictly-shaped records the dashboard renders.
//!
//! Every adapter first classifies the payload into a [`Payload`] and then
//! normalizes each candidate record against an explicit fallback table.
//! Adapters never fail; unusable input produces an empty sequence.

pub mod analytics;
pub mod assessments;
pub mod bulk_import;
pub mod learning_paths;

pub use analytics::adapt_dashboard_analytics;
pub use assessments::adapt_assessments;
pub use bulk_import::adapt_bulk_import_result;
pub use learning_paths::adapt_learning_paths;

use serde_json::Value;

use crate::metrics;
use crate::utils::json::Object;

/// The shapes backend list endpoints have been seen to return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    /// A bare JSON array.
    List(&'a [Value]),
    /// An object wrapping the array under `data` or a domain-specific key.
    Wrapped(&'a [Value]),
    /// A single record object.
    Single(&'a Object),
    /// `null`, a scalar, or a wrapper around something unusable.
    Empty,
}

/// Key every list endpoint may use to wrap its array.
const DATA_KEY: &str = "data";

impl<'a> Payload<'a> {
    /// Classifies `value`, trying `data` and then each of `wrapper_keys`.
    pub fn classify(value: &'a Value, wrapper_keys: &[&str]) -> Self {
        match value {
            Value::Array(items) => Payload::List(items),
            Value::Object(map) => {
                let wrapped = std::iter::once(DATA_KEY)
                    .chain(wrapper_keys.iter().copied())
                    .find_map(|key| map.get(key));
                match wrapped {
                    Some(Value::Array(items)) => Payload::Wrapped(items),
                    // `{data: {...}}` wraps a single record.
                    Some(Value::Object(inner)) => Payload::Single(inner),
                    Some(_) => Payload::Empty,
                    None => Payload::Single(map),
                }
            }
            _ => Payload::Empty,
        }
    }

    /// Candidate records in input order. Non-object items are yielded as
    /// `None` so the caller can count them as skipped.
    pub fn records(&self) -> Vec<Option<&'a Object>> {
        match *self {
            Payload::List(items) | Payload::Wrapped(items) => {
                items.iter().map(Value::as_object).collect()
            }
            Payload::Single(obj) => vec![Some(obj)],
            Payload::Empty => Vec::new(),
        }
    }
}

/// Adapter output: the normalized records plus how many inputs had to be
/// dropped for lacking an identifying key.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Normalized<T> {
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Drives `normalize` over every candidate record of `raw`, counting the
/// ones it rejects.
pub(crate) fn normalize_all<'a, T, F>(
    adapter: &str,
    raw: &'a Value,
    wrapper_keys: &[&str],
    mut normalize: F,
) -> Normalized<T>
where
    F: FnMut(&'a Object) -> Option<T>,
{
    let payload = Payload::classify(raw, wrapper_keys);
    let mut out = Normalized::default();

    for candidate in payload.records() {
        match candidate.and_then(&mut normalize) {
            Some(record) => out.records.push(record),
            None => out.skipped += 1,
        }
    }

    if out.skipped > 0 {
        tracing::debug!(
            "{} adapter skipped {} unidentifiable record(s)",
            adapter,
            out.skipped
        );
    }
    metrics::record_adapter_skips(adapter, out.skipped);
    out
}
