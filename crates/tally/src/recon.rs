//! Row-count reconciliation across two endpoints.
//!
//! The engine enumerates every user table on both sides, computes the union
//! of the two table universes, then audits each (table, side) pair with one
//! bounded-concurrency query task. Completions stream back unordered and are
//! merged by the [`Aggregator`] into one [`ReconRecord`] per table.
//!
//! A failing audit on one side of one table is recorded in that side's error
//! field and never aborts sibling tasks or the run. Failed tasks are final;
//! nothing is retried.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::fanout;
use crate::value::Value;

/// Enumerates user-relation identities with live-row statistics available.
/// Fixed by the engine, not user-configurable.
const ENUMERATE_SQL: &str =
    "SELECT schemaname, relname FROM pg_stat_user_tables ORDER BY schemaname, relname";

/// Audits one table's estimated live-row count.
const AUDIT_SQL: &str =
    "SELECT n_live_tup FROM pg_stat_user_tables WHERE schemaname = $1 AND relname = $2";

/// Identity of a relation. Ordering is lexicographic on (schema, table) and
/// drives both deterministic enumeration and stable report order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub schema: String,
    pub table: String,
}

impl TableKey {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// One of the two endpoints being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one side's audit attempt for one table.
///
/// A count and an error are mutually exclusive; both absent means the
/// attempt has not completed (or the table was missing from that side's
/// catalog, which is an absence of data, not an error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideCount {
    /// Estimated live-row count.
    pub rows: Option<i64>,
    /// Error message of a failed audit, verbatim.
    pub error: Option<String>,
}

impl SideCount {
    /// True if the audit produced a usable count.
    pub fn has_count(&self) -> bool {
        self.error.is_none() && self.rows.is_some()
    }
}

/// Merged comparison outcome for one table across both sides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconRecord {
    pub source: SideCount,
    pub target: SideCount,
    /// Defined iff both sides produced a non-error count.
    pub row_count_match: Option<bool>,
}

impl ReconRecord {
    fn refresh_match(&mut self) {
        self.row_count_match = if self.source.error.is_none() && self.target.error.is_none() {
            match (self.source.rows, self.target.rows) {
                (Some(a), Some(b)) => Some(a == b),
                _ => None,
            }
        } else {
            None
        };
    }
}

/// Single-writer accumulator for audit completions.
///
/// The fan-out scheduler delivers outcomes on the caller's task, so every
/// `upsert` runs serialized even though the underlying queries complete
/// concurrently - same-key updates can never race. The raw map is not
/// exposed until the run is over.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: BTreeMap<TableKey, ReconRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-update the record for `key` with one side's outcome.
    ///
    /// `Ok(None)` means the table was absent from that side's catalog at
    /// audit time; that leaves the count empty without recording an error.
    pub fn upsert(&mut self, key: TableKey, side: Side, outcome: Result<Option<i64>, String>) {
        let record = self.records.entry(key).or_default();
        let slot = match side {
            Side::Source => &mut record.source,
            Side::Target => &mut record.target,
        };
        match outcome {
            Ok(rows) => slot.rows = rows,
            Err(message) => slot.error = Some(message),
        }
        record.refresh_match();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hand the completed mapping over for diff computation.
    pub fn into_records(self) -> BTreeMap<TableKey, ReconRecord> {
        self.records
    }
}

/// The reconciliation engine: two endpoints, one bounded fan-out.
pub struct ReconEngine {
    source: Arc<dyn Endpoint>,
    target: Arc<dyn Endpoint>,
    jobs: usize,
}

impl ReconEngine {
    pub fn new(source: Arc<dyn Endpoint>, target: Arc<dyn Endpoint>) -> Self {
        Self {
            source,
            target,
            jobs: fanout::DEFAULT_JOBS,
        }
    }

    /// Set the maximum number of concurrently in-flight audit queries.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Run the full audit: freshen statistics, enumerate both sides, audit
    /// every table in the union, and return the merged records.
    ///
    /// Returns only once every submitted task has completed. Enumeration
    /// failure on either side is fatal; everything downstream degrades into
    /// the records instead.
    pub async fn run(&self) -> crate::Result<BTreeMap<TableKey, ReconRecord>> {
        self.refresh_statistics().await;
        let keys = self.enumerate_union().await?;
        tracing::info!(tables = keys.len(), "auditing row counts");
        Ok(self.audit(keys).await)
    }

    /// `ANALYZE` both sides so `n_live_tup` is fresh. Failure is only worth
    /// a warning: the audit still runs, with staler estimates.
    async fn refresh_statistics(&self) {
        for (side, endpoint) in self.sides() {
            if let Err(err) = endpoint.query("ANALYZE", &[]).await {
                tracing::warn!(%side, error = %err, "ANALYZE failed; row estimates may be stale");
            }
        }
    }

    /// Union of both sides' table enumerations, in key order.
    async fn enumerate_union(&self) -> crate::Result<Vec<TableKey>> {
        let mut keys = BTreeSet::new();
        for (side, endpoint) in self.sides() {
            keys.extend(enumerate_tables(endpoint.as_ref(), side).await?);
        }
        Ok(keys.into_iter().collect())
    }

    /// Submit exactly two audit tasks per key and merge the completions.
    async fn audit(&self, keys: Vec<TableKey>) -> BTreeMap<TableKey, ReconRecord> {
        let mut tasks = Vec::with_capacity(keys.len() * 2);
        for key in keys {
            for (side, endpoint) in self.sides() {
                let key = key.clone();
                tasks.push(async move {
                    let outcome = audit_one(endpoint.as_ref(), &key).await;
                    (key, side, outcome)
                });
            }
        }

        let mut aggregator = Aggregator::new();
        fanout::run_bounded(self.jobs, tasks, |(key, side, outcome)| {
            if let Err(message) = &outcome {
                tracing::warn!(table = %key, %side, error = %message, "audit query failed");
            }
            aggregator.upsert(key, side, outcome);
        })
        .await;
        aggregator.into_records()
    }

    fn sides(&self) -> [(Side, Arc<dyn Endpoint>); 2] {
        [
            (Side::Source, Arc::clone(&self.source)),
            (Side::Target, Arc::clone(&self.target)),
        ]
    }
}

/// Enumerate all user tables on one side.
async fn enumerate_tables(endpoint: &dyn Endpoint, side: Side) -> crate::Result<Vec<TableKey>> {
    let dataset = endpoint
        .query(ENUMERATE_SQL, &[])
        .await
        .map_err(|message| Error::Enumerate {
            side: side.as_str(),
            message,
        })?;

    let mut keys = Vec::with_capacity(dataset.rows.len());
    for row in &dataset.rows {
        if let (Some(Value::String(schema)), Some(Value::String(table))) =
            (row.first(), row.get(1))
        {
            keys.push(TableKey::new(schema.clone(), table.clone()));
        }
    }
    Ok(keys)
}

/// Audit one (table, side) pair.
///
/// `Ok(None)` when the catalog row vanished between enumeration and audit.
async fn audit_one(endpoint: &dyn Endpoint, key: &TableKey) -> Result<Option<i64>, String> {
    let dataset = endpoint
        .query(AUDIT_SQL, &[&key.schema, &key.table])
        .await?;
    Ok(dataset
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_merges_both_sides() {
        let mut agg = Aggregator::new();
        let key = TableKey::new("public", "users");

        agg.upsert(key.clone(), Side::Source, Ok(Some(10)));
        agg.upsert(key.clone(), Side::Target, Ok(Some(10)));

        let records = agg.into_records();
        let record = &records[&key];
        assert_eq!(record.source.rows, Some(10));
        assert_eq!(record.target.rows, Some(10));
        assert_eq!(record.row_count_match, Some(true));
    }

    #[test]
    fn mismatched_counts_are_flagged_false() {
        let mut agg = Aggregator::new();
        let key = TableKey::new("public", "orders");
        agg.upsert(key.clone(), Side::Source, Ok(Some(5)));
        agg.upsert(key.clone(), Side::Target, Ok(Some(7)));
        assert_eq!(agg.into_records()[&key].row_count_match, Some(false));
    }

    #[test]
    fn match_is_undefined_while_one_side_is_pending() {
        let mut agg = Aggregator::new();
        let key = TableKey::new("public", "users");
        agg.upsert(key.clone(), Side::Source, Ok(Some(10)));
        assert_eq!(agg.into_records()[&key].row_count_match, None);
    }

    #[test]
    fn an_error_on_either_side_suppresses_the_match_flag() {
        let mut agg = Aggregator::new();
        let key = TableKey::new("public", "locked");
        agg.upsert(key.clone(), Side::Source, Ok(Some(3)));
        agg.upsert(key.clone(), Side::Target, Err("permission denied".into()));

        let records = agg.into_records();
        let record = &records[&key];
        assert_eq!(record.row_count_match, None);
        assert_eq!(record.target.error.as_deref(), Some("permission denied"));
        assert_eq!(record.source.rows, Some(3));
    }

    #[test]
    fn absent_count_is_not_zero() {
        let mut agg = Aggregator::new();
        let key = TableKey::new("public", "ghost");
        agg.upsert(key.clone(), Side::Source, Ok(Some(0)));
        agg.upsert(key.clone(), Side::Target, Ok(None));

        let records = agg.into_records();
        let record = &records[&key];
        assert_eq!(record.target.rows, None);
        assert_eq!(record.row_count_match, None);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let key = TableKey::new("public", "users");

        let mut first = Aggregator::new();
        first.upsert(key.clone(), Side::Source, Ok(Some(4)));
        first.upsert(key.clone(), Side::Target, Ok(Some(4)));

        let mut second = Aggregator::new();
        second.upsert(key.clone(), Side::Target, Ok(Some(4)));
        second.upsert(key.clone(), Side::Source, Ok(Some(4)));

        assert_eq!(first.into_records(), second.into_records());
    }

    #[test]
    fn table_keys_order_lexicographically() {
        let mut keys = vec![
            TableKey::new("sales", "orders"),
            TableKey::new("public", "zebra"),
            TableKey::new("public", "apple"),
        ];
        keys.sort();
        assert_eq!(keys[0], TableKey::new("public", "apple"));
        assert_eq!(keys[1], TableKey::new("public", "zebra"));
        assert_eq!(keys[2], TableKey::new("sales", "orders"));
    }
}
