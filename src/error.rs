use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed date, number or row in a record source. Aborts the load.
    #[error("row {row}: invalid {field} {value:?}: {reason}")]
    Parse {
        row: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("country reference unavailable: {reason}")]
    ReferenceUnavailable { reason: String },

    /// A view has nothing to show. Rendered as a zero state, never surfaced as a failure.
    #[error("no rows to display for {view}")]
    EmptyResult { view: String },

    #[error("boundary data: {reason}")]
    Boundary { reason: String },

    #[error("render failed: {reason}")]
    Render { reason: String },
}

impl DashboardError {
    pub(crate) fn parse(
        row: usize,
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DashboardError::Parse {
            row,
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DashboardError::Io {
            path: path.into(),
            source,
        }
    }
}
