//! External collaborators invoked as opaque steps
//!
//! Accessibility audits and visual snapshot comparison are not owned by the
//! engine: it calls them through these traits and propagates pass/fail.

use async_trait::async_trait;

use testwright_common::Result;

/// Outcome of an accessibility audit over a scope
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub passed: bool,
    pub violations: Vec<String>,
}

#[async_trait]
pub trait AccessibilityAuditor: Send + Sync {
    /// Audit the page, optionally scoped to a selector.
    async fn audit(&self, scope: Option<&str>) -> Result<AuditOutcome>;
}

/// Outcome of comparing an element snapshot against its named baseline
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub matches: bool,
    pub detail: String,
}

#[async_trait]
pub trait SnapshotComparator: Send + Sync {
    async fn compare(&self, selector: &str, name: &str) -> Result<SnapshotOutcome>;
}
