//! Cross-database reconciliation engine for Postgres migrations.
//!
//! This crate audits two independently-operated Postgres instances - a
//! "source" and a "target" that are expected to hold equivalent data after a
//! migration - and produces a discrepancy report:
//!
//! - [`discover`] enumerates schema objects (tables, views, sequences, ...)
//!   on one side via a configurable set of catalog queries.
//! - [`recon`] enumerates every user table on both sides, audits each
//!   (table, side) pair concurrently for its estimated live-row count, and
//!   merges the completions into one record per table.
//! - [`diff`] derives the mismatch report: the full per-table comparison plus
//!   the "only in source" / "only in target" sets.
//! - [`report`] is the sink interface the derived datasets are pushed into;
//!   concrete writers live with the caller.
//!
//! Per-table and per-side failures never abort a run: they are recorded in
//! the output data and surface in the report instead. Only configuration,
//! enumeration and sink failures are fatal.
//!
//! # Example
//!
//! ```ignore
//! let source: Arc<dyn Endpoint> = Arc::new(PgEndpoint::new(source_pool));
//! let target: Arc<dyn Endpoint> = Arc::new(PgEndpoint::new(target_pool));
//!
//! let records = ReconEngine::new(source, target).with_jobs(10).run().await?;
//! let diff = ReconDiff::compute(records);
//! report::write_reconciliation(&mut sink, "reports", &diff)?;
//! ```

pub mod diff;
pub mod discover;
pub mod endpoint;
mod error;
pub mod fanout;
pub mod recon;
pub mod report;
mod value;

pub use diff::{CountedTable, ReconDiff};
pub use discover::{DiscoveryOutcome, discover_objects};
pub use endpoint::{Endpoint, PgEndpoint};
pub use error::Error;
pub use recon::{Aggregator, ReconEngine, ReconRecord, Side, SideCount, TableKey};
pub use report::ReportSink;
pub use value::{Dataset, Value};

/// Result type for tally operations.
pub type Result<T> = std::result::Result<T, Error>;
