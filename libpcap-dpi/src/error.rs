use crate::result::RunId;
use thiserror::Error;

/// Errors escaping an analysis or export run
///
/// Malformed packets never show up here: they are skipped by the dissector and
/// the inspector.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Capture-level failure (bad format, I/O, cancellation)
    #[error(transparent)]
    Capture(#[from] libpcap_tools::Error),
    #[error("unknown run {0}")]
    UnknownRun(RunId),
    #[error("invalid rules: {0}")]
    Rules(String),
    /// Unexpected failure caught at the run boundary
    #[error("run failed: {0}")]
    RunFailure(String),
}

impl From<std::io::Error> for AnalysisError {
    fn from(e: std::io::Error) -> Self {
        AnalysisError::Capture(e.into())
    }
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Capture(libpcap_tools::Error::Cancelled))
    }
}
