//! Error types for Testwright

use thiserror::Error;

/// Result type alias using the Testwright Error
pub type Result<T> = std::result::Result<T, Error>;

/// Testwright error taxonomy
///
/// Every variant aborts only the test case it occurred in; the runner
/// isolates it and continues with subsequent cases.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Timed out waiting for {what} after {budget_ms}ms")]
    Timeout { what: String, budget_ms: u64 },

    #[error("Element not actionable: {selector} ({reason})")]
    ElementNotActionable { selector: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Assertion failed: {detail} (last seen: {last_seen})")]
    Assertion { detail: String, last_seen: String },

    #[error("Page error: {0}")]
    Page(String),

    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Report-facing failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Setup,
    Timeout,
    ElementNotActionable,
    Configuration,
    Assertion,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Setup => write!(f, "setup"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::ElementNotActionable => write!(f, "element_not_actionable"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Assertion => write!(f, "assertion"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Category under which this error appears in the final report.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Setup(_) => ErrorCategory::Setup,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::ElementNotActionable { .. } => ErrorCategory::ElementNotActionable,
            Error::Configuration(_) => ErrorCategory::Configuration,
            Error::Assertion { .. } => ErrorCategory::Assertion,
            Error::Page(_) | Error::Proxy(_) => ErrorCategory::Internal,
            Error::Io(_) | Error::Json(_) | Error::Yaml(_) | Error::Http(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether this error is a per-call budget expiry (as opposed to a
    /// programmer error or hard failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
