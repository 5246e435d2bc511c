/*!
 * Error handling for pharmacy claims analytics
 *
 * Provides detailed error types with context, suggestions, and recovery guidance.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Claims library result type
pub type Result<T> = std::result::Result<T, ClaimsError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum ClaimsError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// JSON parsing errors for claim and revert files
    #[error("JSON parsing error: {message}")]
    JsonParse {
        message: String,
        context: ErrorContext,
    },

    /// CSV parsing errors with location information
    #[error("CSV parsing error at line {line:?}: {message}")]
    CsvParse {
        message: String,
        line: Option<usize>,
        context: ErrorContext,
    },

    /// Record validation errors with detailed information
    #[error("Data validation error: {message}")]
    DataValidation {
        message: String,
        field: Option<String>,
        value: Option<String>,
        context: ErrorContext,
    },

    /// Input file header does not carry the expected columns
    #[error("Schema mismatch: {message}")]
    SchemaMismatch {
        message: String,
        missing_columns: Vec<String>,
    },

    /// File or directory not found with suggestions
    #[error("File not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// Reference data required by an analyzer is unavailable
    #[error("Missing reference data for {analyzer}: {message}")]
    MissingReference {
        analyzer: Analyzer,
        message: String,
    },

    /// Unexpected failure inside an aggregation step
    #[error("Computation failed in {analyzer}: {message}")]
    Computation {
        analyzer: Analyzer,
        message: String,
        group: Option<String>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub record_index: Option<usize>,
    pub record_id: Option<String>,
}

/// Identifies one of the three independent analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Analyzer {
    CoreMetrics,
    ChainRanking,
    QuantityRanking,
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::CoreMetrics => write!(f, "core metrics"),
            Analyzer::ChainRanking => write!(f, "chain ranking"),
            Analyzer::QuantityRanking => write!(f, "quantity ranking"),
        }
    }
}

/// Export format for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    JsonLines,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::JsonLines => write!(f, "JSON Lines"),
        }
    }
}

impl ClaimsError {
    /// Create a file not found error with helpful suggestion
    pub fn file_not_found_with_suggestion(path: PathBuf) -> Self {
        let name = path.to_string_lossy().to_lowercase();
        let suggestion = if name.contains("pharmac") {
            format!(
                "Check that '{}' is a directory containing a pharmacy CSV file with 'chain' and 'npi' columns.",
                path.display()
            )
        } else if name.contains("claim") || name.contains("revert") {
            format!(
                "Check that '{}' is a directory containing JSON files, each holding an array of events.",
                path.display()
            )
        } else {
            format!(
                "Check if the path exists at '{}'. Make sure the path is correct and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create a schema mismatch error listing the missing columns
    pub fn missing_columns(missing: Vec<String>) -> Self {
        Self::SchemaMismatch {
            message: format!("missing required columns: {}", missing.join(", ")),
            missing_columns: missing,
        }
    }

    /// Create a validation error for a single record field
    pub fn invalid_field(field: &str, value: Option<String>, message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
            field: Some(field.to_string()),
            value,
            context: ErrorContext::default(),
        }
    }

    /// Create a computation failure for an analyzer
    pub fn computation(analyzer: Analyzer, message: impl Into<String>) -> Self {
        Self::Computation {
            analyzer,
            message: message.into(),
            group: None,
        }
    }

    /// Attach file and record position to errors that carry a context
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        match &mut self {
            Self::Io { context, .. }
            | Self::JsonParse { context, .. }
            | Self::CsvParse { context, .. }
            | Self::DataValidation { context, .. } => *context = ctx,
            _ => {}
        }
        self
    }

    /// The analyzer this error belongs to, if any
    pub fn analyzer(&self) -> Option<Analyzer> {
        match self {
            Self::MissingReference { analyzer, .. } | Self::Computation { analyzer, .. } => Some(*analyzer),
            _ => None,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::SchemaMismatch { missing_columns, .. } => {
                format!("{}\n\nAdd the columns: {}", self, missing_columns.join(", "))
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for ClaimsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for ClaimsError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line() as usize);

        Self::CsvParse {
            message: err.to_string(),
            line,
            context: ErrorContext::default(),
        }
    }
}

impl From<serde_json::Error> for ClaimsError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            context: ErrorContext::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_includes_suggestion() {
        let err = ClaimsError::file_not_found_with_suggestion(PathBuf::from("data/pharmacies"));
        let msg = err.user_message();
        assert!(msg.contains("Suggestion:"));
        assert!(msg.contains("chain"));
    }

    #[test]
    fn test_analyzer_attribution() {
        let err = ClaimsError::computation(Analyzer::QuantityRanking, "boom");
        assert_eq!(err.analyzer(), Some(Analyzer::QuantityRanking));
        assert_eq!(err.to_string(), "Computation failed in quantity ranking: boom");

        let io: ClaimsError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(io.analyzer(), None);
    }

    #[test]
    fn test_with_context_sets_file_path() {
        let err = ClaimsError::invalid_field("price", Some("-1".into()), "price must be non-negative")
            .with_context(ErrorContext {
                file_path: Some(PathBuf::from("claims/a.json")),
                record_index: Some(3),
                record_id: None,
            });
        match err {
            ClaimsError::DataValidation { context, .. } => {
                assert_eq!(context.record_index, Some(3));
                assert_eq!(context.file_path, Some(PathBuf::from("claims/a.json")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
