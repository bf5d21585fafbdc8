//! Machine-readable run report produced at the runner boundary

use serde::{Deserialize, Serialize};

use crate::error::ErrorCategory;

/// Lifecycle of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// Terminal status of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
}

/// Captured failure of a case: which step, what category, and the
/// diagnostic payload (last-seen mismatch, timed-out rule, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub step_index: usize,
    pub step_label: String,
    pub category: ErrorCategory,
    pub detail: String,
}

/// Terminal (or never-reached) state of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub label: String,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Result of running a single test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub suite: String,
    pub name: String,
    pub status: CaseStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepReport>,
    pub failure: Option<FailureDetail>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

/// Result of an entire run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    pub fn from_cases(cases: Vec<CaseReport>, duration_ms: u64) -> Self {
        let passed = cases.iter().filter(|case| case.passed()).count();
        Self {
            total: cases.len(),
            passed,
            failed: cases.len() - passed,
            duration_ms,
            cases,
        }
    }

    /// A run succeeds iff every case passed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_report_tallies_cases() {
        let cases = vec![
            CaseReport {
                suite: "badges".into(),
                name: "delete badge".into(),
                status: CaseStatus::Passed,
                duration_ms: 120,
                steps: vec![StepReport {
                    label: "visit:/administrator/projects/proj1/badges".into(),
                    status: StepStatus::Succeeded,
                    duration_ms: 40,
                }],
                failure: None,
            },
            CaseReport {
                suite: "badges".into(),
                name: "name validation".into(),
                status: CaseStatus::Failed,
                duration_ms: 88,
                steps: vec![
                    StepReport {
                        label: "type:#badgeName".into(),
                        status: StepStatus::Succeeded,
                        duration_ms: 12,
                    },
                    StepReport {
                        label: "assert_text:[data-cy=idError]".into(),
                        status: StepStatus::Failed,
                        duration_ms: 76,
                    },
                    StepReport {
                        label: "click:[data-cy=saveBadgeButton]".into(),
                        status: StepStatus::Pending,
                        duration_ms: 0,
                    },
                ],
                failure: Some(FailureDetail {
                    step_index: 1,
                    step_label: "assert_text:[data-cy=idError]".into(),
                    category: ErrorCategory::Assertion,
                    detail: "expected substring not found".into(),
                }),
            },
        ];

        let report = RunReport::from_cases(cases, 250);
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.success());

        // report must survive a JSON round trip for CI consumers
        let json = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.failed, 1);
        assert_eq!(parsed.cases[1].failure.as_ref().unwrap().step_index, 1);
        // steps after the failure stay pending
        assert!(matches!(parsed.cases[1].steps[2].status, StepStatus::Pending));
    }
}
