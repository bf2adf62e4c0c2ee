//! Diff computation over completed reconciliation records.
//!
//! Derives the three report datasets from the merged per-table records: the
//! full comparison table plus the two one-sided sets. Set membership is
//! computed on `(schema, table, count)` tuples restricted to non-error
//! entries, so a table whose counts differ shows up in both sets' arithmetic
//! but lands in exactly one of them per side.

use std::collections::{BTreeMap, BTreeSet};

use crate::recon::{ReconRecord, TableKey};
use crate::value::{Dataset, Value};

/// A `(schema, table, count)` tuple as it participates in set arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CountedTable {
    pub key: TableKey,
    pub rows: i64,
}

/// The derived outputs of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconDiff {
    /// Every audited table, ordered by key.
    pub records: BTreeMap<TableKey, ReconRecord>,
    /// Tuples present with a count in source but not matching in target.
    pub only_in_source: BTreeSet<CountedTable>,
    /// Tuples present with a count in target but not matching in source.
    pub only_in_target: BTreeSet<CountedTable>,
}

impl ReconDiff {
    /// Compute both one-sided sets from the completed mapping.
    ///
    /// Error rows never contribute to set membership; they stay visible in
    /// the full table only.
    pub fn compute(records: BTreeMap<TableKey, ReconRecord>) -> Self {
        let mut source_set = BTreeSet::new();
        let mut target_set = BTreeSet::new();

        for (key, record) in &records {
            if record.source.error.is_none()
                && let Some(rows) = record.source.rows
            {
                source_set.insert(CountedTable {
                    key: key.clone(),
                    rows,
                });
            }
            if record.target.error.is_none()
                && let Some(rows) = record.target.rows
            {
                target_set.insert(CountedTable {
                    key: key.clone(),
                    rows,
                });
            }
        }

        let only_in_source = source_set.difference(&target_set).cloned().collect();
        let only_in_target = target_set.difference(&source_set).cloned().collect();

        Self {
            records,
            only_in_source,
            only_in_target,
        }
    }

    /// The full reconciliation table: all keys, both counts, match flag,
    /// both error fields. Row order follows key order.
    pub fn full_table(&self) -> Dataset {
        let mut dataset = Dataset::new(
            [
                "schema_name",
                "table_name",
                "estimated_rows_source",
                "estimated_rows_target",
                "row_count_match",
                "error_source",
                "error_target",
            ]
            .map(String::from)
            .to_vec(),
        );
        for (key, record) in &self.records {
            dataset.push_row(vec![
                Value::from(key.schema.as_str()),
                Value::from(key.table.as_str()),
                Value::from(record.source.rows),
                Value::from(record.target.rows),
                record.row_count_match.map(Value::Bool).unwrap_or(Value::Null),
                Value::from(record.source.error.clone()),
                Value::from(record.target.error.clone()),
            ]);
        }
        dataset
    }

    pub fn only_in_source_table(&self) -> Dataset {
        one_sided_table(&self.only_in_source)
    }

    pub fn only_in_target_table(&self) -> Dataset {
        one_sided_table(&self.only_in_target)
    }
}

fn one_sided_table(set: &BTreeSet<CountedTable>) -> Dataset {
    let mut dataset = Dataset::new(
        ["schema_name", "table_name", "estimated_rows"]
            .map(String::from)
            .to_vec(),
    );
    for entry in set {
        dataset.push_row(vec![
            Value::from(entry.key.schema.as_str()),
            Value::from(entry.key.table.as_str()),
            Value::from(entry.rows),
        ]);
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon::SideCount;

    fn record(source: SideCount, target: SideCount) -> ReconRecord {
        let mut record = ReconRecord {
            source,
            target,
            row_count_match: None,
        };
        // Recompute the flag the way the aggregator would have.
        if record.source.error.is_none() && record.target.error.is_none() {
            record.row_count_match = match (record.source.rows, record.target.rows) {
                (Some(a), Some(b)) => Some(a == b),
                _ => None,
            };
        }
        record
    }

    fn pending() -> SideCount {
        SideCount::default()
    }

    fn with_rows(rows: i64) -> SideCount {
        SideCount {
            rows: Some(rows),
            error: None,
        }
    }

    fn with_error(message: &str) -> SideCount {
        SideCount {
            rows: None,
            error: Some(message.to_string()),
        }
    }

    #[test]
    fn matching_tables_appear_in_neither_set() {
        let mut records = BTreeMap::new();
        records.insert(
            TableKey::new("public", "a"),
            record(with_rows(10), with_rows(10)),
        );

        let diff = ReconDiff::compute(records);
        assert!(diff.only_in_source.is_empty());
        assert!(diff.only_in_target.is_empty());
    }

    #[test]
    fn the_two_sets_are_disjoint() {
        let mut records = BTreeMap::new();
        records.insert(
            TableKey::new("public", "a"),
            record(with_rows(10), with_rows(10)),
        );
        records.insert(
            TableKey::new("public", "b"),
            record(with_rows(5), pending()),
        );
        records.insert(
            TableKey::new("public", "c"),
            record(pending(), with_rows(3)),
        );
        // Differing counts: contributes one tuple to each side's set.
        records.insert(
            TableKey::new("public", "d"),
            record(with_rows(1), with_rows(2)),
        );

        let diff = ReconDiff::compute(records);
        let in_both: Vec<_> = diff
            .only_in_source
            .intersection(&diff.only_in_target)
            .collect();
        assert!(in_both.is_empty());

        assert!(diff.only_in_source.contains(&CountedTable {
            key: TableKey::new("public", "b"),
            rows: 5
        }));
        assert!(diff.only_in_target.contains(&CountedTable {
            key: TableKey::new("public", "c"),
            rows: 3
        }));
    }

    #[test]
    fn error_rows_are_excluded_from_sets_but_kept_in_the_full_table() {
        let mut records = BTreeMap::new();
        records.insert(
            TableKey::new("public", "locked"),
            record(with_rows(3), with_error("permission denied")),
        );

        let diff = ReconDiff::compute(records);
        // The source side still has a non-error count, so it contributes.
        assert_eq!(diff.only_in_source.len(), 1);
        assert!(diff.only_in_target.is_empty());

        let full = diff.full_table();
        assert_eq!(full.len(), 1);
        assert_eq!(
            full.rows[0][6],
            Value::String("permission denied".to_string())
        );
        assert_eq!(full.rows[0][4], Value::Null);
    }

    #[test]
    fn full_table_is_ordered_and_complete() {
        let mut records = BTreeMap::new();
        records.insert(
            TableKey::new("sales", "orders"),
            record(with_rows(1), with_rows(1)),
        );
        records.insert(
            TableKey::new("public", "users"),
            record(with_rows(2), with_rows(2)),
        );

        let diff = ReconDiff::compute(records);
        let full = diff.full_table();
        assert_eq!(full.len(), 2);
        assert_eq!(full.rows[0][0], Value::from("public"));
        assert_eq!(full.rows[1][0], Value::from("sales"));
        assert_eq!(full.columns.len(), 7);
    }

    #[test]
    fn one_side_only_with_absent_count_joins_no_set() {
        // Enumerated on the target but its catalog row vanished before the
        // audit: count absent on both sides, so it appears nowhere but the
        // full table.
        let mut records = BTreeMap::new();
        records.insert(
            TableKey::new("public", "ghost"),
            record(SideCount::default(), SideCount::default()),
        );

        let diff = ReconDiff::compute(records);
        assert!(diff.only_in_source.is_empty());
        assert!(diff.only_in_target.is_empty());
        assert_eq!(diff.full_table().len(), 1);
    }
}
