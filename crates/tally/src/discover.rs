//! Schema-object discovery.
//!
//! Runs a declaratively-configured set of catalog queries against one
//! endpoint - one query per object kind (tables, views, sequences, ...) -
//! and reports, per label, what came back. A single query's failure is that
//! label's outcome; discovery of the other labels continues.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::endpoint::Endpoint;
use crate::fanout;
use crate::value::{Dataset, Value};

/// Outcome of one (label, side) discovery task.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    /// The query returned at least one row.
    Rows(Dataset),
    /// The query legitimately returned no rows.
    Absent,
    /// The query failed; message carried verbatim.
    Failed(String),
}

impl DiscoveryOutcome {
    /// Render this outcome as a dataset for the report sink, so the sink
    /// stays agnostic of discovery semantics.
    pub fn to_dataset(&self, label: &str) -> Dataset {
        match self {
            DiscoveryOutcome::Rows(dataset) => dataset.clone(),
            DiscoveryOutcome::Absent => {
                let mut dataset = Dataset::new(vec!["note".to_string()]);
                dataset.push_row(vec![Value::String(format!("{label} not found"))]);
                dataset
            }
            DiscoveryOutcome::Failed(message) => {
                let mut dataset = Dataset::new(vec!["error".to_string()]);
                dataset.push_row(vec![Value::String(message.clone())]);
                dataset
            }
        }
    }
}

/// Run every discovery query through the bounded fan-out and return one
/// outcome per label, in definition order.
///
/// Ordering matters for deterministic reports: completions arrive unordered,
/// so they are re-sorted by the label's position in `queries`.
pub async fn discover_objects(
    endpoint: Arc<dyn Endpoint>,
    queries: &IndexMap<String, String>,
    jobs: usize,
) -> Vec<(String, DiscoveryOutcome)> {
    let mut tasks = Vec::with_capacity(queries.len());
    for (position, (label, sql)) in queries.iter().enumerate() {
        let endpoint = Arc::clone(&endpoint);
        let label = label.clone();
        let sql = sql.clone();
        tasks.push(async move {
            let outcome = match endpoint.query(&sql, &[]).await {
                Ok(dataset) if dataset.is_empty() => DiscoveryOutcome::Absent,
                Ok(dataset) => DiscoveryOutcome::Rows(dataset),
                Err(message) => DiscoveryOutcome::Failed(message),
            };
            (position, label, outcome)
        });
    }

    let mut completed = Vec::with_capacity(tasks.len());
    fanout::run_bounded(jobs, tasks, |done| completed.push(done)).await;
    completed.sort_by_key(|(position, _, _)| *position);

    completed
        .into_iter()
        .map(|(_, label, outcome)| {
            if let DiscoveryOutcome::Failed(message) = &outcome {
                tracing::warn!(label = %label, error = %message, "discovery query failed");
            }
            (label, outcome)
        })
        .collect()
}
