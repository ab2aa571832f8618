use serde::Serialize;
use std::path::PathBuf;

/// Failures of the tracking core.
///
/// None of these abort a whole scan or detection: callers collect them per
/// item (see [`ItemError`]) and keep going.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("could not detect a function signature: {0}")]
    Parse(String),

    #[error("unsupported language for {}", .0.display())]
    UnsupportedLanguage(PathBuf),

    #[error("parameter `{parameter}` added to `{function}` has no default value")]
    MissingDefaultForNewParameter { function: String, parameter: String },

    #[error("argument for `{parameter}` of `{function}` would have to follow a spread argument")]
    ArgumentAfterSpread { function: String, parameter: String },

    #[error("unbalanced call to `{function}`: no closing parenthesis")]
    UnbalancedCall { function: String },

    #[error("file is not valid UTF-8: {}", .0.display())]
    InvalidUtf8(PathBuf),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] ignore::Error),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TrackError {
    /// Stable machine-readable tag used in serialized error records.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackError::Parse(_) => "parse_error",
            TrackError::UnsupportedLanguage(_) => "unsupported_language",
            TrackError::MissingDefaultForNewParameter { .. } => "missing_default_for_new_parameter",
            TrackError::ArgumentAfterSpread { .. } => "argument_after_spread",
            TrackError::UnbalancedCall { .. } => "unbalanced_call",
            TrackError::InvalidUtf8(_) => "invalid_utf8",
            TrackError::Pattern(_) => "invalid_pattern",
            TrackError::Io { .. } => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

/// A per-item failure reported next to successful results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub kind: &'static str,
    pub message: String,
}

impl ItemError {
    pub fn new(file: impl Into<String>, line: Option<usize>, err: &TrackError) -> Self {
        Self {
            file: file.into(),
            line,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
