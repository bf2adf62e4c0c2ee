use thiserror::Error;

/// Fatal failures of a reconciliation run.
///
/// Per-table and per-label failures are deliberately *not* represented here:
/// they degrade into the output data (see [`crate::SideCount`] and
/// [`crate::DiscoveryOutcome`]) instead of aborting the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("table enumeration failed on {side}: {message}")]
    Enumerate { side: &'static str, message: String },

    #[error("report sink error: {0}")]
    Sink(String),
}
