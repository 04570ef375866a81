//! Error types for the testpilot core library.
//!
//! Every failure a run can hit is folded into [`TestPilotError`]. Malformed
//! stream lines and unmapped step identifiers are recovered locally by the
//! decoder and reducer, so they never show up here as run failures.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Validation | Rejected input, before any side effect |
//! | E2001-E2099 | Config | Config file, environment, and value errors |
//! | E3001-E3099 | Transport | Job submission and subscription errors |
//! | E4001-E4099 | Stream | Faults and cancellation while streaming |
//! | E9001-E9099 | General | Internal, IO, and serialization errors |

use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// The main error type for the testpilot core library.
#[derive(Debug, Error)]
pub enum TestPilotError {
    // ========================================================================
    // Validation Errors (E1001-E1099)
    // ========================================================================
    /// Every identifier passed to `start` was empty or whitespace
    #[error("[E1001] No input identifiers provided")]
    EmptyIdentifiers,

    /// Input rejected for another reason
    #[error("[E1002] Validation error: {0}")]
    ValidationError(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Configuration file parse error
    #[error("[E2001] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2002] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Transport Errors (E3001-E3099)
    // ========================================================================
    /// HTTP request failed
    #[error("[E3001] API request failed: {0}")]
    ApiRequestFailed(String),

    /// Response body could not be decoded
    #[error("[E3002] Failed to parse API response: {0}")]
    ApiParseError(String),

    /// Backend unreachable
    #[error("[E3003] Pipeline service unavailable: {0}")]
    ApiServiceUnavailable(String),

    /// Acknowledgement did not arrive in time
    #[error("[E3004] Request timed out after {0} seconds")]
    RequestTimeout(u64),

    /// Backend answered with a non-success status
    #[error("[E3005] Pipeline service returned {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// Backend does not know the run handle
    #[error("[E3006] Run not found: {0}")]
    RunNotFound(String),

    // ========================================================================
    // Stream Errors (E4001-E4099)
    // ========================================================================
    /// Byte stream raised a fault after it was opened
    #[error("[E4001] Event stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Run was cancelled by the observer
    #[error("[E4002] Run cancelled")]
    RunCancelled,

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("[E9005] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[E9006] Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for testpilot operations.
pub type TestPilotResult<T> = Result<T, TestPilotError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

/// Timeouts are not mapped here; only the backend knows the configured limit.
impl From<reqwest::Error> for TestPilotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TestPilotError::ApiServiceUnavailable(err.to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) => TestPilotError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: err.to_string(),
                },
                None => TestPilotError::ApiRequestFailed(err.to_string()),
            }
        } else if err.is_decode() {
            TestPilotError::ApiParseError(err.to_string())
        } else if err.is_body() {
            TestPilotError::StreamInterrupted(err.to_string())
        } else {
            TestPilotError::ApiRequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TestPilotError {
    fn from(err: serde_json::Error) -> Self {
        TestPilotError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for TestPilotError {
    fn from(err: std::io::Error) -> Self {
        TestPilotError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for TestPilotError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => TestPilotError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => TestPilotError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => TestPilotError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => TestPilotError::ConfigParseError(err.to_string()),
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl TestPilotError {
    /// Returns true if the input was rejected before any side effect.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            TestPilotError::EmptyIdentifiers | TestPilotError::ValidationError(_)
        )
    }

    /// Returns true if this error is related to configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TestPilotError::ConfigParseError(_) | TestPilotError::InvalidConfigValue { .. }
        )
    }

    /// Returns true if this error came from talking to the pipeline service.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            TestPilotError::ApiRequestFailed(_)
                | TestPilotError::ApiParseError(_)
                | TestPilotError::ApiServiceUnavailable(_)
                | TestPilotError::RequestTimeout(_)
                | TestPilotError::UnexpectedStatus { .. }
                | TestPilotError::RunNotFound(_)
                | TestPilotError::StreamInterrupted(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, TestPilotError::RunCancelled)
    }

    /// Returns true if a new run might succeed where this one did not.
    ///
    /// Nothing in the core retries; callers decide whether to start again.
    pub fn is_transient(&self) -> bool {
        match self {
            TestPilotError::ApiServiceUnavailable(_)
            | TestPilotError::RequestTimeout(_)
            | TestPilotError::StreamInterrupted(_) => true,
            TestPilotError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            TestPilotError::EmptyIdentifiers => "E1001",
            TestPilotError::ValidationError(_) => "E1002",
            TestPilotError::ConfigParseError(_) => "E2001",
            TestPilotError::InvalidConfigValue { .. } => "E2002",
            TestPilotError::ApiRequestFailed(_) => "E3001",
            TestPilotError::ApiParseError(_) => "E3002",
            TestPilotError::ApiServiceUnavailable(_) => "E3003",
            TestPilotError::RequestTimeout(_) => "E3004",
            TestPilotError::UnexpectedStatus { .. } => "E3005",
            TestPilotError::RunNotFound(_) => "E3006",
            TestPilotError::StreamInterrupted(_) => "E4001",
            TestPilotError::RunCancelled => "E4002",
            TestPilotError::Internal(_) => "E9001",
            TestPilotError::IoError(_) => "E9005",
            TestPilotError::SerializationError(_) => "E9006",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            TestPilotError::EmptyIdentifiers => {
                Some("Pass at least one repository URL, e.g. 'testpilot run https://github.com/org/repo'")
            }
            TestPilotError::ApiServiceUnavailable(_) => {
                Some("Check that the pipeline service is running and server.base_url is correct")
            }
            TestPilotError::RequestTimeout(_) => {
                Some("The pipeline service is slow to respond; raise server.request_timeout_secs")
            }
            TestPilotError::RunNotFound(_) => {
                Some("The service may have restarted; start a new run")
            }
            TestPilotError::ConfigParseError(_) | TestPilotError::InvalidConfigValue { .. } => {
                Some("Run 'testpilot config' to inspect the effective configuration")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with its suggestion.
pub struct CliErrorDisplay<'a> {
    error: &'a TestPilotError,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a TestPilotError) -> Self {
        Self { error }
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if let Some(suggestion) = self.error.user_suggestion() {
            writeln!(f)?;
            writeln!(f, "  Suggestion: {}", suggestion)?;
        }

        if self.error.is_transient() {
            writeln!(f)?;
            writeln!(f, "  This error may be temporary. Start the run again.")?;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
