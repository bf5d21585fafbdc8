//! Case runner: isolated contexts, failure containment, and reporting
//!
//! Every case gets its own fixture client, interceptor, proxy, and page
//! session. A failing step aborts only that case's remaining steps; the
//! runner continues with the rest and reports per-case status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::collab::{AccessibilityAuditor, SnapshotComparator};
use crate::dom::{DomDriver, GatePolicy};
use crate::fixture::FixtureClient;
use crate::intercept::Interceptor;
use crate::page::PageFactory;
use crate::proxy::InterceptProxy;
use crate::retry::{Assertions, RetryPolicy};
use crate::step::StepExecutor;
use crate::suite::{TestCase, TestSuite};
use testwright_common::{
    CaseReport, CaseStatus, FailureDetail, Result, RunReport, StepReport, StepStatus,
};

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the system under test (proxy upstream, fixture target)
    pub backend_url: String,

    /// Concurrent cases per suite (1 = strictly sequential)
    pub parallelism: usize,

    /// Actionability gate budget and backoff
    pub gate: GatePolicy,

    /// Default assertion poll cadence and budget
    pub retry: RetryPolicy,

    /// Output directory for the JSON report
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8080".to_string(),
            parallelism: 1,
            gate: GatePolicy::default(),
            retry: RetryPolicy::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Main test runner
#[derive(Clone)]
pub struct Runner {
    config: RunnerConfig,
    pages: Arc<dyn PageFactory>,
    auditor: Option<Arc<dyn AccessibilityAuditor>>,
    snapshots: Option<Arc<dyn SnapshotComparator>>,
}

impl Runner {
    pub fn new(config: RunnerConfig, pages: Arc<dyn PageFactory>) -> Self {
        Self {
            config,
            pages,
            auditor: None,
            snapshots: None,
        }
    }

    pub fn with_auditor(mut self, auditor: Arc<dyn AccessibilityAuditor>) -> Self {
        self.auditor = Some(auditor);
        self
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotComparator>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Run every case of every suite and aggregate the report.
    pub async fn run_suites(&self, suites: &[TestSuite]) -> RunReport {
        let start = Instant::now();
        let mut cases = Vec::new();

        for suite in suites {
            info!(suite = %suite.name, cases = suite.cases.len(), "running suite");
            cases.extend(self.run_suite(suite).await);
        }

        let report = RunReport::from_cases(cases, start.elapsed().as_millis() as u64);
        info!(
            "Run finished: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );
        report
    }

    /// Run one suite's cases, concurrently up to the configured parallelism.
    pub async fn run_suite(&self, suite: &TestSuite) -> Vec<CaseReport> {
        if self.config.parallelism <= 1 {
            let mut reports = Vec::with_capacity(suite.cases.len());
            for case in &suite.cases {
                reports.push(self.run_case(suite, case).await);
            }
            return reports;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let mut join = JoinSet::new();
        for (index, case) in suite.cases.iter().cloned().enumerate() {
            let runner = self.clone();
            let suite = suite.clone();
            let semaphore = Arc::clone(&semaphore);
            join.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                (index, runner.run_case(&suite, &case).await)
            });
        }

        let mut indexed = Vec::with_capacity(suite.cases.len());
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(err) => error!(%err, "case task panicked"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, report)| report).collect()
    }

    /// Run a single case with a fresh, isolated context.
    pub async fn run_case(&self, suite: &TestSuite, case: &TestCase) -> CaseReport {
        let start = Instant::now();

        let all_steps: Vec<_> = suite
            .before_each
            .iter()
            .chain(case.steps.iter())
            .collect();
        let mut step_reports: Vec<StepReport> = all_steps
            .iter()
            .map(|step| StepReport {
                label: step.label(),
                status: StepStatus::Pending,
                duration_ms: 0,
            })
            .collect();

        let built = self.build_context().await;
        let (mut executor, mut proxy) = match built {
            Ok(context) => context,
            Err(err) => {
                error!(case = %case.name, %err, "context setup failed");
                return CaseReport {
                    suite: suite.name.clone(),
                    name: case.name.clone(),
                    status: CaseStatus::Failed,
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps: step_reports,
                    failure: Some(FailureDetail {
                        step_index: 0,
                        step_label: "context".to_string(),
                        category: err.category(),
                        detail: err.to_string(),
                    }),
                };
            }
        };

        let mut failure = None;
        for (index, step) in all_steps.iter().enumerate() {
            step_reports[index].status = StepStatus::Running;
            let step_start = Instant::now();
            let outcome = executor.execute(step).await;
            step_reports[index].duration_ms = step_start.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => step_reports[index].status = StepStatus::Succeeded,
                Err(err) => {
                    error!(case = %case.name, step = %step.label(), %err, "step failed");
                    step_reports[index].status = if err.is_timeout() {
                        StepStatus::TimedOut
                    } else {
                        StepStatus::Failed
                    };
                    failure = Some(FailureDetail {
                        step_index: index,
                        step_label: step.label(),
                        category: err.category(),
                        detail: err.to_string(),
                    });
                    // remaining steps stay pending; outstanding waits die
                    // with the context below
                    break;
                }
            }
        }

        proxy.stop();
        let duration_ms = start.elapsed().as_millis() as u64;
        let status = if failure.is_none() {
            info!(case = %case.name, duration_ms, "case passed");
            CaseStatus::Passed
        } else {
            CaseStatus::Failed
        };

        CaseReport {
            suite: suite.name.clone(),
            name: case.name.clone(),
            status,
            duration_ms,
            steps: step_reports,
            failure,
        }
    }

    async fn build_context(&self) -> Result<(StepExecutor, InterceptProxy)> {
        let interceptor = Interceptor::new();
        let proxy = InterceptProxy::start(interceptor.clone(), self.config.backend_url.clone())
            .await?;
        let page = self.pages.open(&proxy.base_url()).await?;
        let fixtures = FixtureClient::new(self.config.backend_url.clone())?;
        let driver = DomDriver::new(Arc::clone(&page), self.config.gate.clone());
        let asserts = Assertions::new(page, self.config.retry.clone());

        Ok((
            StepExecutor::new(
                fixtures,
                interceptor,
                driver,
                asserts,
                self.auditor.clone(),
                self.snapshots.clone(),
            ),
            proxy,
        ))
    }

    /// Write the JSON report for CI consumption.
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join("report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        info!("report written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{BoundingBox, ElementSnapshot, Page, PageFactory};
    use crate::step::Step;
    use crate::testutil::MockPage;
    use async_trait::async_trait;

    struct ScriptedFactory;

    #[async_trait]
    impl PageFactory for ScriptedFactory {
        async fn open(&self, _base_url: &str) -> Result<Arc<dyn Page>> {
            let page = MockPage::new();
            page.script_find(
                "[data-cy=pageTitle]",
                vec![ElementSnapshot {
                    element_id: "title".to_string(),
                    attached: true,
                    visible: true,
                    obscured: false,
                    disabled: false,
                    text: "Badges".to_string(),
                    value: None,
                    bbox: BoundingBox::default(),
                }],
            );
            Ok(Arc::new(page))
        }
    }

    fn quick_config(output_dir: PathBuf) -> RunnerConfig {
        RunnerConfig {
            backend_url: "http://127.0.0.1:1".to_string(),
            parallelism: 1,
            gate: GatePolicy {
                timeout: std::time::Duration::from_millis(100),
                initial_backoff: std::time::Duration::from_millis(10),
                max_backoff: std::time::Duration::from_millis(20),
            },
            retry: RetryPolicy {
                poll_interval: std::time::Duration::from_millis(10),
                timeout: std::time::Duration::from_millis(100),
            },
            output_dir,
        }
    }

    fn suite_with_failure() -> TestSuite {
        TestSuite {
            name: "isolation".to_string(),
            description: String::new(),
            tags: vec![],
            before_each: vec![],
            cases: vec![
                TestCase {
                    name: "fails on unbound alias".to_string(),
                    steps: vec![Step::WaitFor {
                        alias: "never".to_string(),
                        timeout_ms: Some(50),
                    }],
                },
                TestCase {
                    name: "passes after a failed sibling".to_string(),
                    steps: vec![Step::AssertText {
                        selector: "[data-cy=pageTitle]".to_string(),
                        contains: "Badges".to_string(),
                        timeout_ms: Some(100),
                    }],
                },
            ],
        }
    }

    #[tokio::test]
    async fn failing_case_does_not_abort_subsequent_cases() {
        let out = tempfile::tempdir().unwrap();
        let runner = Runner::new(
            quick_config(out.path().to_path_buf()),
            Arc::new(ScriptedFactory),
        );

        let report = runner.run_suites(&[suite_with_failure()]).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.passed, 1);
        assert!(!report.success());

        let failure = report.cases[0].failure.as_ref().unwrap();
        assert_eq!(failure.step_index, 0);
        assert_eq!(failure.step_label, "wait_for:never");
        assert_eq!(
            failure.category,
            testwright_common::error::ErrorCategory::Configuration
        );
    }

    #[tokio::test]
    async fn report_is_written_as_json() {
        let out = tempfile::tempdir().unwrap();
        let runner = Runner::new(
            quick_config(out.path().to_path_buf()),
            Arc::new(ScriptedFactory),
        );

        let report = runner.run_suites(&[suite_with_failure()]).await;
        let path = runner.write_report(&report).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.total, report.total);
    }

    #[tokio::test]
    async fn parallel_cases_keep_report_order() {
        let out = tempfile::tempdir().unwrap();
        let mut config = quick_config(out.path().to_path_buf());
        config.parallelism = 4;
        let runner = Runner::new(config, Arc::new(ScriptedFactory));

        let report = runner.run_suites(&[suite_with_failure()]).await;
        assert_eq!(report.cases[0].name, "fails on unbound alias");
        assert_eq!(report.cases[1].name, "passes after a failed sibling");
    }
}
