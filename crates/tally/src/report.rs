//! Report sink interface.
//!
//! The engine is agnostic of concrete file formats: it pushes named datasets
//! into a [`ReportSink`] under fixed section labels. Concrete writers (text
//! tables, CSV, ...) live with the caller.

use crate::diff::ReconDiff;
use crate::value::Dataset;

/// Section label for the full per-table comparison.
pub const SECTION_FULL: &str = "RowCountComparison";
/// Section label for tables with a count in source but not matching in target.
pub const SECTION_ONLY_IN_SOURCE: &str = "OnlyInSource";
/// Section label for tables with a count in target but not matching in source.
pub const SECTION_ONLY_IN_TARGET: &str = "OnlyInTarget";

/// Something that persists named datasets.
///
/// Sink failures are fatal for the run: a silently incomplete report is
/// worse than a visible failure.
pub trait ReportSink {
    /// Reinitialize the sink for `output_name`, clearing any prior state for
    /// that name. Called once at the start of each run, never to append.
    fn begin(&mut self, output_name: &str) -> crate::Result<()>;

    /// Persist one completed dataset under a section label.
    fn write_section(&mut self, label: &str, dataset: &Dataset) -> crate::Result<()>;
}

/// Push the three reconciliation datasets into a sink, in their fixed order.
pub fn write_reconciliation(
    sink: &mut dyn ReportSink,
    output_name: &str,
    diff: &ReconDiff,
) -> crate::Result<()> {
    sink.begin(output_name)?;
    sink.write_section(SECTION_FULL, &diff.full_table())?;
    sink.write_section(SECTION_ONLY_IN_SOURCE, &diff.only_in_source_table())?;
    sink.write_section(SECTION_ONLY_IN_TARGET, &diff.only_in_target_table())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon::{Aggregator, Side, TableKey};

    #[derive(Default)]
    struct RecordingSink {
        began: Vec<String>,
        sections: Vec<(String, usize)>,
        fail_on: Option<&'static str>,
    }

    impl ReportSink for RecordingSink {
        fn begin(&mut self, output_name: &str) -> crate::Result<()> {
            self.began.push(output_name.to_string());
            Ok(())
        }

        fn write_section(&mut self, label: &str, dataset: &Dataset) -> crate::Result<()> {
            if self.fail_on == Some(label) {
                return Err(crate::Error::Sink(format!("cannot write {label}")));
            }
            self.sections.push((label.to_string(), dataset.len()));
            Ok(())
        }
    }

    fn sample_diff() -> ReconDiff {
        let mut agg = Aggregator::new();
        let a = TableKey::new("public", "a");
        agg.upsert(a.clone(), Side::Source, Ok(Some(10)));
        agg.upsert(a, Side::Target, Ok(Some(10)));
        let b = TableKey::new("public", "b");
        agg.upsert(b.clone(), Side::Source, Ok(Some(5)));
        agg.upsert(b, Side::Target, Ok(None));
        ReconDiff::compute(agg.into_records())
    }

    #[test]
    fn writes_all_three_sections_in_order() {
        let mut sink = RecordingSink::default();
        write_reconciliation(&mut sink, "reports", &sample_diff()).unwrap();

        assert_eq!(sink.began, vec!["reports".to_string()]);
        let labels: Vec<_> = sink.sections.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec![SECTION_FULL, SECTION_ONLY_IN_SOURCE, SECTION_ONLY_IN_TARGET]
        );
        // Full table has both keys; only-in-source has public.b.
        assert_eq!(sink.sections[0].1, 2);
        assert_eq!(sink.sections[1].1, 1);
        assert_eq!(sink.sections[2].1, 0);
    }

    #[test]
    fn sink_failure_propagates() {
        let mut sink = RecordingSink {
            fail_on: Some(SECTION_ONLY_IN_SOURCE),
            ..Default::default()
        };
        let err = write_reconciliation(&mut sink, "reports", &sample_diff()).unwrap_err();
        assert!(matches!(err, crate::Error::Sink(_)));
    }
}
