//! Declarative step catalogue and per-case executor
//!
//! A step is atomic: it either fully succeeds or raises the error that
//! fails the case. Interception aliases are case-scoped names bound to rule
//! ids when an `intercept` step executes; referencing an unbound alias is a
//! configuration error, not a timeout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::collab::{AccessibilityAuditor, SnapshotComparator};
use crate::dom::DomDriver;
use crate::fixture::FixtureClient;
use crate::intercept::Interceptor;
use crate::retry::{Assertions, CellMatch};
use testwright_common::{
    Error, Method, MethodMatcher, PathPattern, ResponseOverride, Result, RuleId,
};

const DEFAULT_WAIT_MS: u64 = 5000;

fn default_page_size() -> usize {
    5
}

/// A single action or assertion with its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Seed backend state through the fixture client
    Request {
        method: Method,
        path: String,
        #[serde(default)]
        body: Option<serde_json::Value>,
    },

    /// Register an interception rule under a case-scoped alias
    Intercept {
        alias: String,
        #[serde(default)]
        method: Option<Method>,
        path: String,
        #[serde(default)]
        respond: Option<ResponseOverride>,
    },

    /// Block until the aliased rule matches traffic (FIFO per rule)
    WaitFor {
        alias: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Visit {
        path: String,
    },

    Reload,

    Click {
        selector: String,
    },

    Type {
        selector: String,
        text: String,
    },

    Clear {
        selector: String,
    },

    Select {
        selector: String,
        value: String,
    },

    /// Pointer-driven reorder; optionally blocks on the persistence call
    DragAndDrop {
        source: String,
        target: String,
        #[serde(default)]
        await_alias: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertText {
        selector: String,
        contains: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertExists {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertAbsent {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertEnabled {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertDisabled {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertValue {
        selector: String,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Ordered equality of rendered element texts
    AssertOrder {
        selector: String,
        expected: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Tabular match by (column index -> expected substring)
    AssertTable {
        selector: String,
        rows: Vec<Vec<CellMatch>>,
        #[serde(default = "default_page_size")]
        page_size: usize,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    RunAccessibilityAudit {
        #[serde(default)]
        scope: Option<String>,
    },

    CompareSnapshot {
        selector: String,
        name: String,
    },
}

impl Step {
    /// Display label used in logs and failure reports
    pub fn label(&self) -> String {
        match self {
            Step::Request { method, path, .. } => format!("request:{method} {path}"),
            Step::Intercept { alias, .. } => format!("intercept:{alias}"),
            Step::WaitFor { alias, .. } => format!("wait_for:{alias}"),
            Step::Visit { path } => format!("visit:{path}"),
            Step::Reload => "reload".to_string(),
            Step::Click { selector } => format!("click:{selector}"),
            Step::Type { selector, .. } => format!("type:{selector}"),
            Step::Clear { selector } => format!("clear:{selector}"),
            Step::Select { selector, .. } => format!("select:{selector}"),
            Step::DragAndDrop { source, target, .. } => {
                format!("drag_and_drop:{source}->{target}")
            }
            Step::AssertText { selector, .. } => format!("assert_text:{selector}"),
            Step::AssertExists { selector, .. } => format!("assert_exists:{selector}"),
            Step::AssertAbsent { selector, .. } => format!("assert_absent:{selector}"),
            Step::AssertEnabled { selector, .. } => format!("assert_enabled:{selector}"),
            Step::AssertDisabled { selector, .. } => format!("assert_disabled:{selector}"),
            Step::AssertValue { selector, .. } => format!("assert_value:{selector}"),
            Step::AssertOrder { selector, .. } => format!("assert_order:{selector}"),
            Step::AssertTable { selector, .. } => format!("assert_table:{selector}"),
            Step::RunAccessibilityAudit { scope } => format!(
                "run_accessibility_audit:{}",
                scope.as_deref().unwrap_or("page")
            ),
            Step::CompareSnapshot { name, .. } => format!("compare_snapshot:{name}"),
        }
    }
}

fn budget(timeout_ms: &Option<u64>) -> Option<Duration> {
    timeout_ms.map(Duration::from_millis)
}

/// Executes steps against one case's injected components
pub struct StepExecutor {
    fixtures: FixtureClient,
    interceptor: Interceptor,
    driver: DomDriver,
    asserts: Assertions,
    auditor: Option<Arc<dyn AccessibilityAuditor>>,
    snapshots: Option<Arc<dyn SnapshotComparator>>,
    aliases: HashMap<String, RuleId>,
}

impl StepExecutor {
    pub fn new(
        fixtures: FixtureClient,
        interceptor: Interceptor,
        driver: DomDriver,
        asserts: Assertions,
        auditor: Option<Arc<dyn AccessibilityAuditor>>,
        snapshots: Option<Arc<dyn SnapshotComparator>>,
    ) -> Self {
        Self {
            fixtures,
            interceptor,
            driver,
            asserts,
            auditor,
            snapshots,
            aliases: HashMap::new(),
        }
    }

    fn resolve_alias(&self, alias: &str) -> Result<RuleId> {
        self.aliases.get(alias).cloned().ok_or_else(|| {
            Error::Configuration(format!("no interception registered under alias {alias:?}"))
        })
    }

    pub async fn execute(&mut self, step: &Step) -> Result<()> {
        info!(step = %step.label(), "executing step");
        match step {
            Step::Request { method, path, body } => {
                self.fixtures.request(*method, path, body.as_ref()).await?;
                Ok(())
            }

            Step::Intercept {
                alias,
                method,
                path,
                respond,
            } => {
                let matcher = method.map_or(MethodMatcher::Any, MethodMatcher::Is);
                let rule = self.interceptor.intercept(
                    matcher,
                    PathPattern::new(path.clone()),
                    respond.clone(),
                );
                // re-aliasing an existing name replaces the binding
                self.aliases.insert(alias.clone(), rule);
                Ok(())
            }

            Step::WaitFor { alias, timeout_ms } => {
                let rule = self.resolve_alias(alias)?;
                let wait = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_MS));
                self.interceptor.wait_for(&rule, wait).await?;
                Ok(())
            }

            Step::Visit { path } => self.driver.page().visit(path).await,
            Step::Reload => self.driver.page().reload().await,

            Step::Click { selector } => self.driver.click(selector).await,
            Step::Type { selector, text } => self.driver.type_text(selector, text).await,
            Step::Clear { selector } => self.driver.clear(selector).await,
            Step::Select { selector, value } => self.driver.select(selector, value).await,

            Step::DragAndDrop {
                source,
                target,
                await_alias,
                timeout_ms,
            } => match await_alias {
                Some(alias) => {
                    let rule = self.resolve_alias(alias)?;
                    let wait = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_MS));
                    self.driver
                        .drag_and_drop_awaiting(source, target, &self.interceptor, &rule, wait)
                        .await?;
                    Ok(())
                }
                None => self.driver.drag_and_drop(source, target).await,
            },

            Step::AssertText {
                selector,
                contains,
                timeout_ms,
            } => {
                self.asserts
                    .text_contains(selector, contains, budget(timeout_ms))
                    .await
            }
            Step::AssertExists {
                selector,
                timeout_ms,
            } => self.asserts.exists(selector, budget(timeout_ms)).await,
            Step::AssertAbsent {
                selector,
                timeout_ms,
            } => self.asserts.absent(selector, budget(timeout_ms)).await,
            Step::AssertEnabled {
                selector,
                timeout_ms,
            } => self.asserts.enabled(selector, budget(timeout_ms)).await,
            Step::AssertDisabled {
                selector,
                timeout_ms,
            } => self.asserts.disabled(selector, budget(timeout_ms)).await,
            Step::AssertValue {
                selector,
                value,
                timeout_ms,
            } => {
                self.asserts
                    .value_is(selector, value, budget(timeout_ms))
                    .await
            }
            Step::AssertOrder {
                selector,
                expected,
                timeout_ms,
            } => {
                self.asserts
                    .elements_order(selector, expected, budget(timeout_ms))
                    .await
            }
            Step::AssertTable {
                selector,
                rows,
                page_size,
                timeout_ms,
            } => {
                self.asserts
                    .table_rows(selector, rows, *page_size, budget(timeout_ms))
                    .await
            }

            Step::RunAccessibilityAudit { scope } => {
                let auditor = self.auditor.as_ref().ok_or_else(|| {
                    Error::Configuration("no accessibility auditor installed".to_string())
                })?;
                let outcome = auditor.audit(scope.as_deref()).await?;
                if outcome.passed {
                    Ok(())
                } else {
                    Err(Error::Assertion {
                        detail: "accessibility audit".to_string(),
                        last_seen: outcome.violations.join("; "),
                    })
                }
            }

            Step::CompareSnapshot { selector, name } => {
                let snapshots = self.snapshots.as_ref().ok_or_else(|| {
                    Error::Configuration("no snapshot comparator installed".to_string())
                })?;
                let outcome = snapshots.compare(selector, name).await?;
                if outcome.matches {
                    Ok(())
                } else {
                    Err(Error::Assertion {
                        detail: format!("snapshot {name}"),
                        last_seen: outcome.detail,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::GatePolicy;
    use crate::retry::RetryPolicy;
    use crate::testutil::MockPage;
    use testwright_common::Method;

    fn executor_with(page: Arc<MockPage>) -> (StepExecutor, Interceptor) {
        let interceptor = Interceptor::new();
        let driver = DomDriver::new(page.clone(), GatePolicy::default());
        let asserts = Assertions::new(page, RetryPolicy::default());
        let fixtures = FixtureClient::new("http://127.0.0.1:1").unwrap();
        let executor = StepExecutor::new(
            fixtures,
            interceptor.clone(),
            driver,
            asserts,
            None,
            None,
        );
        (executor, interceptor)
    }

    #[tokio::test]
    async fn wait_for_unbound_alias_is_a_configuration_error() {
        let (mut executor, _interceptor) = executor_with(Arc::new(MockPage::new()));
        let err = executor
            .execute(&Step::WaitFor {
                alias: "loadBadges".to_string(),
                timeout_ms: Some(5000),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn intercept_binds_alias_for_later_waits() {
        let (mut executor, interceptor) = executor_with(Arc::new(MockPage::new()));
        executor
            .execute(&Step::Intercept {
                alias: "loadBadges".to_string(),
                method: Some(Method::Get),
                path: "/admin/projects/proj1/badges".to_string(),
                respond: None,
            })
            .await
            .unwrap();

        // simulate the proxy observing matching traffic
        let token = interceptor
            .begin(Method::Get, "/admin/projects/proj1/badges")
            .expect("registered rule should match");
        interceptor.complete(
            token,
            crate::intercept::CompletedExchange {
                method: Method::Get,
                path: "/admin/projects/proj1/badges".to_string(),
                request_body: None,
                status: 200,
                response_headers: Default::default(),
                response_body: None,
            },
        );

        executor
            .execute(&Step::WaitFor {
                alias: "loadBadges".to_string(),
                timeout_ms: Some(500),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn collaborator_steps_require_an_installed_collaborator() {
        let (mut executor, _interceptor) = executor_with(Arc::new(MockPage::new()));
        let err = executor
            .execute(&Step::RunAccessibilityAudit { scope: None })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = executor
            .execute(&Step::CompareSnapshot {
                selector: "[data-cy=badgeCard]".to_string(),
                name: "badge-card".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn labels_identify_the_step_kind_and_target() {
        let step = Step::DragAndDrop {
            source: "[data-cy=handle1]".to_string(),
            target: "[data-cy=handle4]".to_string(),
            await_alias: None,
            timeout_ms: None,
        };
        assert_eq!(step.label(), "drag_and_drop:[data-cy=handle1]->[data-cy=handle4]");
        assert_eq!(Step::Reload.label(), "reload");
    }
}
