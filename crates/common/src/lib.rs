//! Testwright Common Library
//!
//! Shared types, error taxonomy, and report data model for the Testwright
//! test-orchestration engine.

pub mod error;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorCategory, Result};
pub use report::{CaseReport, CaseStatus, FailureDetail, RunReport, StepReport, StepStatus};
pub use types::{
    InterceptionRecord, InterceptionRule, Method, MethodMatcher, PathPattern, ResponseOverride,
    RuleId,
};

/// Testwright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
