//! Error types for the Folio manuscript intelligence core
//!
//! Each component owns a focused error enum; `FolioError` wraps them for
//! callers that cross component boundaries.

use thiserror::Error;

/// Main error type for Folio operations
#[derive(Error, Debug)]
pub enum FolioError {
    /// An analyzer failed on some input
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Worker pool failure
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Chapter is not registered
    #[error("Unknown chapter: {0}")]
    UnknownChapter(String),

    /// No document is open
    #[error("No document is open")]
    NoDocument,
}

/// Errors produced by the analyzer suite
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Analyzer panicked: {0}")]
    Panicked(String),
}

impl AnalysisError {
    /// Build a `Panicked` error from a `catch_unwind` payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        AnalysisError::Panicked(message)
    }
}

/// Internal failures of a single approximate-search step.
///
/// These never escape `find_quote_range`; the cascade treats them as
/// "try the next strategy".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("Pattern too long: {len} chars (max {max})")]
    PatternTooLong { len: usize, max: usize },

    #[error("Search budget exceeded")]
    SearchBudgetExceeded,

    #[error("Empty pattern")]
    EmptyPattern,
}

/// Worker pool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Worker pool has been terminated")]
    Terminated,

    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("Result for job {0} was dropped before delivery")]
    ResultDropped(String),
}

/// Result type alias for Folio operations
pub type Result<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FolioError::UnknownChapter("ch-1".to_string());
        assert_eq!(err.to_string(), "Unknown chapter: ch-1");

        let err = LocateError::PatternTooLong { len: 300, max: 256 };
        assert_eq!(err.to_string(), "Pattern too long: 300 chars (max 256)");
    }

    #[test]
    fn test_analysis_error_conversion() {
        let err: FolioError = AnalysisError::Failed("boom".to_string()).into();
        assert!(matches!(err, FolioError::Analysis(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_panic_payload_conversion() {
        let payload = std::panic::catch_unwind(|| panic!("bad chunk")).unwrap_err();
        let err = AnalysisError::from_panic(payload);
        assert_eq!(err, AnalysisError::Panicked("bad chunk".to_string()));
    }
}
