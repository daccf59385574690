use crate::spreadsheet::SpreadsheetError;
use std::path::Path;
use thiserror::Error;

/// Main error type of the crate.
///
/// Inference itself only ever fails with [`ProbeError::SourceUnavailable`];
/// every other stage failure degrades to a safe-default result.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Source '{path}' is unavailable: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: SpreadsheetError,
    },

    #[error("{0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("{0}")]
    CacheError(#[from] crate::inference::cache::CacheError),
}

/// Failure of a pipeline stage, recovered by the orchestrator as the safe default
#[derive(Error, Debug)]
pub(crate) enum StageError {
    #[error("Time budget of {budget_ms} ms exceeded after stage '{stage}' ({elapsed_ms} ms)")]
    BudgetExceeded {
        stage: &'static str,
        budget_ms: u64,
        elapsed_ms: u128,
    },

    #[error("Invalid placeholder pattern: {0}")]
    PatternError(#[from] regex::Error),
}

pub(crate) trait ResultSource<T> {
    /// Marks a source-layer failure as making `path` unavailable.
    fn or_unavailable(self, path: &Path) -> Result<T, ProbeError>;
}

impl<T> ResultSource<T> for Result<T, SpreadsheetError> {
    fn or_unavailable(self, path: &Path) -> Result<T, ProbeError> {
        self.map_err(|source| ProbeError::SourceUnavailable {
            path: path.display().to_string(),
            source,
        })
    }
}
