use std::path::PathBuf;

use crate::{assets::AssetKind, notes::NoteId};

/// Result alias that carries the custom [`RhythmError`] type.
pub type Result<T> = std::result::Result<T, RhythmError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum RhythmError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in an analysis, config or preferences file.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// A caller supplied a value the engine refuses to work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The analysis record parsed but breaks an ordering or range rule.
    #[error("invalid analysis data: {0}")]
    InvalidAnalysis(String),
    /// The external analyzer could not be started or did not produce output.
    #[error("analyzer failed for `{input}`: {reason}")]
    AnalyzerFailed { input: PathBuf, reason: String },
    /// A track asset could not be read or validated.
    #[error("failed to load {kind} from `{path}`: {reason}")]
    AssetLoad {
        kind: AssetKind,
        path: PathBuf,
        reason: String,
    },
    #[error("analysis already in progress")]
    AnalysisInProgress,
    #[error("track loading already in progress")]
    LoadInProgress,
    #[error("note {0} is not in the registry")]
    UnknownNote(NoteId),
    #[error("note {0} has already been resolved")]
    NoteAlreadyResolved(NoteId),
}

impl RhythmError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn analyzer(input: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AnalyzerFailed {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for RhythmError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for RhythmError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
