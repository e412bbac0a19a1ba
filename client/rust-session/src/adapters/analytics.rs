use serde_json::Value;

use super::learning_paths::adapt_learning_paths;
use crate::models::analytics::DashboardAnalytics;

/// Builds dashboard figures from a learning-path analytics payload.
///
/// Aggregates the backend precomputes (`average_progress`, `total_students`,
/// ...) are ignored in favour of values derived from the normalized paths,
/// so the cards always agree with the list rendered beside them.
pub fn adapt_dashboard_analytics(raw: &Value) -> DashboardAnalytics {
    let paths = adapt_learning_paths(raw).into_records();
    DashboardAnalytics::from_paths(&paths)
}
