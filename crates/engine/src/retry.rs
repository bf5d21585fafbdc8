//! Bounded polling for asynchronous UI state
//!
//! `assert_eventually` is the single primitive every assertion goes through:
//! poll a predicate at a fixed interval until it holds or the budget
//! elapses, then fail with the last observed mismatch. Built on top are the
//! element text/existence checks, ordered-list equality, and tabular
//! validation the step catalogue exposes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::page::Page;
use testwright_common::{Error, Result};

/// Poll cadence and budget for one assertion
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(75),
            timeout: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// One evaluation of a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Pass,
    Mismatch(String),
}

impl Check {
    pub fn from_bool(passed: bool, mismatch: impl Into<String>) -> Self {
        if passed {
            Check::Pass
        } else {
            Check::Mismatch(mismatch.into())
        }
    }
}

/// Poll `probe` until it passes or the budget elapses.
///
/// An always-true predicate returns within one poll; an always-false
/// predicate raises exactly one `Assertion` error, at or after the budget,
/// carrying the last observed mismatch.
pub async fn assert_eventually<F, Fut>(policy: &RetryPolicy, what: &str, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Check>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut last_seen = String::from("predicate was never evaluated");

    loop {
        match probe().await? {
            Check::Pass => return Ok(()),
            Check::Mismatch(mismatch) => {
                debug!(what, %mismatch, "assertion poll mismatch");
                last_seen = mismatch;
            }
        }

        if Instant::now() >= deadline {
            return Err(Error::Assertion {
                detail: what.to_string(),
                last_seen,
            });
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// One expected cell of a table row: column index and expected substring
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CellMatch {
    pub col: usize,
    pub value: String,
}

/// Page-level assertions, each polling through [`assert_eventually`]
pub struct Assertions {
    page: Arc<dyn Page>,
    policy: RetryPolicy,
}

impl Assertions {
    pub fn new(page: Arc<dyn Page>, policy: RetryPolicy) -> Self {
        Self { page, policy }
    }

    fn policy_for(&self, budget: Option<Duration>) -> RetryPolicy {
        match budget {
            Some(timeout) => RetryPolicy {
                timeout,
                ..self.policy.clone()
            },
            None => self.policy.clone(),
        }
    }

    pub async fn text_contains(
        &self,
        selector: &str,
        expected: &str,
        budget: Option<Duration>,
    ) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} contains {expected:?}");
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                let texts: Vec<&str> = found.iter().map(|el| el.text.as_str()).collect();
                Ok(Check::from_bool(
                    texts.iter().any(|text| text.contains(expected)),
                    format!("texts were {texts:?}"),
                ))
            }
        })
        .await
    }

    pub async fn exists(&self, selector: &str, budget: Option<Duration>) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} exists");
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                Ok(Check::from_bool(
                    found.iter().any(|el| el.attached),
                    "no attached element matched".to_string(),
                ))
            }
        })
        .await
    }

    pub async fn absent(&self, selector: &str, budget: Option<Duration>) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} is absent");
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                Ok(Check::from_bool(
                    found.iter().all(|el| !el.attached),
                    format!("{} element(s) still attached", found.len()),
                ))
            }
        })
        .await
    }

    pub async fn enabled(&self, selector: &str, budget: Option<Duration>) -> Result<()> {
        self.enabled_state(selector, false, budget).await
    }

    pub async fn disabled(&self, selector: &str, budget: Option<Duration>) -> Result<()> {
        self.enabled_state(selector, true, budget).await
    }

    async fn enabled_state(
        &self,
        selector: &str,
        want_disabled: bool,
        budget: Option<Duration>,
    ) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!(
            "{selector} is {}",
            if want_disabled { "disabled" } else { "enabled" }
        );
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                match found.first() {
                    None => Ok(Check::Mismatch("no element matched".to_string())),
                    Some(el) => Ok(Check::from_bool(
                        el.disabled == want_disabled,
                        format!("disabled was {}", el.disabled),
                    )),
                }
            }
        })
        .await
    }

    pub async fn value_is(
        &self,
        selector: &str,
        expected: &str,
        budget: Option<Duration>,
    ) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} has value {expected:?}");
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                match found.first() {
                    None => Ok(Check::Mismatch("no element matched".to_string())),
                    Some(el) => {
                        let value = el.value.clone().unwrap_or_default();
                        Ok(Check::from_bool(
                            value == expected,
                            format!("value was {value:?}"),
                        ))
                    }
                }
            }
        })
        .await
    }

    /// Ordered equality of the rendered texts matching `selector`.
    /// Idempotent: re-running against an unchanged DOM yields the same
    /// result.
    pub async fn elements_order(
        &self,
        selector: &str,
        expected: &[String],
        budget: Option<Duration>,
    ) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} renders in order {expected:?}");
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let found = page.find(selector).await?;
                let texts: Vec<String> = found
                    .iter()
                    .map(|el| el.text.trim().to_string())
                    .collect();
                let matched = texts.len() == expected.len()
                    && texts
                        .iter()
                        .zip(expected.iter())
                        .all(|(text, want)| text.contains(want.as_str()));
                Ok(Check::from_bool(matched, format!("order was {texts:?}")))
            }
        })
        .await
    }

    /// Tabular validation: each expected row matches by (column index →
    /// expected substring). Rows beyond the expected count are tolerated
    /// only within the page-size allowance.
    pub async fn table_rows(
        &self,
        selector: &str,
        expected: &[Vec<CellMatch>],
        page_size: usize,
        budget: Option<Duration>,
    ) -> Result<()> {
        let page = Arc::clone(&self.page);
        let what = format!("{selector} matches {} expected row(s)", expected.len());
        assert_eventually(&self.policy_for(budget), &what, || {
            let page = Arc::clone(&page);
            async move {
                let tables = page.find(selector).await?;
                let Some(table) = tables.first() else {
                    return Ok(Check::Mismatch("table not found".to_string()));
                };
                let rows = page.find_within(&table.element_id, "tr").await?;

                let allowed = expected.len().max(page_size);
                if rows.len() < expected.len() || rows.len() > allowed {
                    return Ok(Check::Mismatch(format!(
                        "expected {} row(s) (page size {}), found {}",
                        expected.len(),
                        page_size,
                        rows.len()
                    )));
                }

                for (row_index, (row, wanted)) in rows.iter().zip(expected.iter()).enumerate() {
                    let cells = page.find_within(&row.element_id, "td").await?;
                    for cell_match in wanted {
                        let Some(cell) = cells.get(cell_match.col) else {
                            return Ok(Check::Mismatch(format!(
                                "row {row_index} has no column {}",
                                cell_match.col
                            )));
                        };
                        if !cell.text.contains(&cell_match.value) {
                            return Ok(Check::Mismatch(format!(
                                "row {row_index} col {}: expected {:?}, saw {:?}",
                                cell_match.col, cell_match.value, cell.text
                            )));
                        }
                    }
                }
                Ok(Check::Pass)
            }
        })
        .await
    }
}
