//! Error types for punsbot operations.
//!
//! Every failure carries a structured [`ErrorCode`] so the command layer can
//! decide what to tell the chat without matching on message text.

use thiserror::Error;

/// Result type alias for punsbot operations.
pub type PunsResult<T> = Result<T, PunsError>;

/// Main error type for all punsbot operations.
#[derive(Error, Debug)]
pub enum PunsError {
    /// A trigger did not compile as a regular expression, or used characters
    /// outside the accepted alphabet.
    #[error("Invalid trigger '{pattern}': {message}")]
    InvalidTrigger {
        pattern: String,
        message: String,
        code: ErrorCode,
    },

    /// A configuration value fell outside its accepted bounds.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
        code: ErrorCode,
    },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        suggestion: Option<String>,
    },

    /// Rule not found.
    #[error("Not found: {message}")]
    NotFound { message: String, code: ErrorCode },

    /// Backing store failed or is unreachable.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Trigger (TRG_xxx)
    TrgInvalidRegex,
    TrgEmpty,
    TrgForbiddenChars,

    // Config values (CFG_xxx)
    CfgOutOfRange,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValInvalidId,
    ValEmptyResponse,

    // Rules (RULE_xxx)
    RuleNotFound,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbLockPoisoned,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TrgInvalidRegex => "TRG_001",
            ErrorCode::TrgEmpty => "TRG_002",
            ErrorCode::TrgForbiddenChars => "TRG_003",
            ErrorCode::CfgOutOfRange => "CFG_001",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValInvalidId => "VAL_002",
            ErrorCode::ValEmptyResponse => "VAL_003",
            ErrorCode::RuleNotFound => "RULE_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbLockPoisoned => "DB_003",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl PunsError {
    /// Create an invalid-trigger error for a pattern that failed to compile.
    pub fn invalid_trigger(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            pattern: pattern.into(),
            message: message.into(),
            code: ErrorCode::TrgInvalidRegex,
        }
    }

    /// Create an invalid-trigger error for an empty pattern.
    pub fn empty_trigger() -> Self {
        Self::InvalidTrigger {
            pattern: String::new(),
            message: "trigger must not be empty".to_string(),
            code: ErrorCode::TrgEmpty,
        }
    }

    /// Create an invalid-trigger error for characters outside the alphabet.
    pub fn forbidden_trigger_chars(pattern: impl Into<String>, offending: char) -> Self {
        Self::InvalidTrigger {
            pattern: pattern.into(),
            message: format!("character '{}' is not allowed in triggers", offending),
            code: ErrorCode::TrgForbiddenChars,
        }
    }

    /// Create an out-of-range error.
    pub fn out_of_range(field: &'static str, value: i64, min: i64, max: i64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
            code: ErrorCode::CfgOutOfRange,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a validation error for a malformed rule id.
    pub fn invalid_id(raw: impl Into<String>) -> Self {
        Self::Validation {
            message: format!("'{}' is not a valid rule id", raw.into()),
            code: ErrorCode::ValInvalidId,
            suggestion: Some("Use /punlist to see the ids of this chat's rules".to_string()),
        }
    }

    /// Create a validation error for an empty response.
    pub fn empty_response() -> Self {
        Self::Validation {
            message: "response must not be empty".to_string(),
            code: ErrorCode::ValEmptyResponse,
            suggestion: None,
        }
    }

    /// Create a not found error.
    pub fn not_found(rule_id: impl Into<String>) -> Self {
        Self::NotFound {
            message: format!("Rule with id '{}' not found", rule_id.into()),
            code: ErrorCode::RuleNotFound,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create an error for a connection mutex poisoned by a panicking holder.
    pub fn lock_poisoned(store: &str) -> Self {
        Self::Database {
            message: format!("{} connection lock poisoned", store),
            code: ErrorCode::DbLockPoisoned,
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTrigger { code, .. } => *code,
            Self::OutOfRange { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::Database { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the error was caused by the caller's input rather than the system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTrigger { .. }
                | Self::OutOfRange { .. }
                | Self::Validation { .. }
                | Self::NotFound { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidTrigger { code, .. } => match code {
                ErrorCode::TrgForbiddenChars => {
                    Some("Use letters, digits, spaces and the regex symbols ^$.*+?(){}\\[]<>=-")
                }
                _ => Some("Check the trigger is a valid regular expression"),
            },
            Self::OutOfRange { .. } => Some("Use a whole number within the allowed range"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::NotFound { .. } => Some("Use /punlist to see the ids of this chat's rules"),
            Self::Database { .. } => Some("Check the database path and file permissions"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for PunsError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                ErrorCode::DbConnectionFailed
            }
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Database {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_trigger_error() {
        let err = PunsError::invalid_trigger("(abc", "unclosed group");
        assert_eq!(err.code(), ErrorCode::TrgInvalidRegex);
        assert!(err.to_string().contains("(abc"));
        assert!(err.is_user_error());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = PunsError::out_of_range("probability", 101, 0, 100);
        assert_eq!(err.code(), ErrorCode::CfgOutOfRange);
        assert_eq!(
            err.to_string(),
            "probability must be between 0 and 100, got 101"
        );
    }

    #[test]
    fn test_database_error_is_not_user_error() {
        let err = PunsError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.code(), ErrorCode::DbOperationFailed);
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::TrgInvalidRegex.as_str(), "TRG_001");
        assert_eq!(ErrorCode::CfgOutOfRange.as_str(), "CFG_001");
        assert_eq!(ErrorCode::DbLockPoisoned.as_str(), "DB_003");
    }
}
