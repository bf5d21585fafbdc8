//! DOM action driver with actionability gating
//!
//! Every semantic action first resolves its target and passes the
//! actionability gate: attached, visible, unobscured, and (for input
//! actions) enabled. The gate polls with backoff up to a bounded timeout
//! before raising `ElementNotActionable` with the last failing precondition.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::intercept::Interceptor;
use crate::page::{ElementSnapshot, Page};
use testwright_common::{Error, InterceptionRecord, Result, RuleId};

/// Actionability gate budget and backoff shape
#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(4000),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(400),
        }
    }
}

/// Performs semantic UI actions against a live page
pub struct DomDriver {
    page: Arc<dyn Page>,
    gate: GatePolicy,
}

impl DomDriver {
    pub fn new(page: Arc<dyn Page>, gate: GatePolicy) -> Self {
        Self { page, gate }
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// Resolve `selector` and wait until its first match is actionable.
    async fn actionable(&self, selector: &str, needs_enabled: bool) -> Result<ElementSnapshot> {
        let deadline = Instant::now() + self.gate.timeout;
        let mut backoff = self.gate.initial_backoff;
        let mut last_reason = String::from("no element matched the selector");

        loop {
            let candidates = self.page.find(selector).await?;
            match candidates.first() {
                None => last_reason = "no element matched the selector".to_string(),
                Some(element) => match element.blocked_reason(needs_enabled) {
                    None => return Ok(element.clone()),
                    Some(reason) => last_reason = reason.to_string(),
                },
            }

            if Instant::now() >= deadline {
                return Err(Error::ElementNotActionable {
                    selector: selector.to_string(),
                    reason: last_reason,
                });
            }
            debug!(selector, %last_reason, "actionability gate retry");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.gate.max_backoff);
        }
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let element = self.actionable(selector, true).await?;
        self.page.click(&element.element_id).await
    }

    pub async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.actionable(selector, true).await?;
        self.page.type_text(&element.element_id, text).await
    }

    pub async fn clear(&self, selector: &str) -> Result<()> {
        let element = self.actionable(selector, true).await?;
        self.page.clear(&element.element_id).await
    }

    pub async fn select(&self, selector: &str, value: &str) -> Result<()> {
        let element = self.actionable(selector, true).await?;
        self.page.select(&element.element_id, value).await
    }

    /// Compound gesture: press on the source's handle, move through the
    /// target's bounding box, release. Triggers the same reorder events a
    /// real pointer sequence would.
    pub async fn drag_and_drop(&self, source: &str, target: &str) -> Result<()> {
        let from = self.actionable(source, true).await?;
        let to = self.actionable(target, false).await?;

        let (fx, fy) = from.bbox.center();
        let (tx, ty) = to.bbox.center();

        self.page.pointer_press(fx, fy).await?;
        // pass through intermediate points so drag-over handlers fire
        for step in 1..=3 {
            let frac = f64::from(step) / 3.0;
            self.page
                .pointer_move(fx + (tx - fx) * frac, fy + (ty - fy) * frac)
                .await?;
        }
        self.page.pointer_release().await
    }

    /// Drag and drop, then block until the resulting asynchronous
    /// persistence call (observed via the interceptor) has completed.
    pub async fn drag_and_drop_awaiting(
        &self,
        source: &str,
        target: &str,
        interceptor: &Interceptor,
        rule: &RuleId,
        budget: Duration,
    ) -> Result<InterceptionRecord> {
        self.drag_and_drop(source, target).await?;
        interceptor.wait_for(rule, budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::BoundingBox;
    use crate::testutil::MockPage;

    fn visible(element_id: &str, x: f64, y: f64) -> ElementSnapshot {
        ElementSnapshot {
            element_id: element_id.to_string(),
            attached: true,
            visible: true,
            obscured: false,
            disabled: false,
            text: String::new(),
            value: None,
            bbox: BoundingBox {
                x,
                y,
                width: 40.0,
                height: 20.0,
            },
        }
    }

    fn quick_gate() -> GatePolicy {
        GatePolicy {
            timeout: Duration::from_millis(300),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn gate_retries_until_element_becomes_actionable() {
        let page = Arc::new(MockPage::new());
        let mut hidden = visible("save", 0.0, 0.0);
        hidden.visible = false;
        // two hidden snapshots, then the element appears
        page.script_find("[data-cy=saveBadgeButton]", vec![hidden.clone()]);
        page.script_find("[data-cy=saveBadgeButton]", vec![hidden]);
        page.script_find("[data-cy=saveBadgeButton]", vec![visible("save", 0.0, 0.0)]);

        let driver = DomDriver::new(page.clone(), quick_gate());
        driver.click("[data-cy=saveBadgeButton]").await.unwrap();
        assert_eq!(page.events(), vec!["click:save"]);
    }

    #[tokio::test]
    async fn gate_reports_last_failing_precondition() {
        let page = Arc::new(MockPage::new());
        let mut disabled = visible("save", 0.0, 0.0);
        disabled.disabled = true;
        page.script_find("[data-cy=saveBadgeButton]", vec![disabled]);

        let driver = DomDriver::new(page, quick_gate());
        let err = driver.click("[data-cy=saveBadgeButton]").await.unwrap_err();
        match err {
            Error::ElementNotActionable { selector, reason } => {
                assert_eq!(selector, "[data-cy=saveBadgeButton]");
                assert_eq!(reason, "disabled");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_element_is_not_actionable() {
        let page = Arc::new(MockPage::new());
        page.script_find("[data-cy=ghost]", vec![]);

        let driver = DomDriver::new(page, quick_gate());
        let err = driver.click("[data-cy=ghost]").await.unwrap_err();
        assert!(matches!(err, Error::ElementNotActionable { .. }));
    }

    #[tokio::test]
    async fn drag_emits_press_moves_release_through_target() {
        let page = Arc::new(MockPage::new());
        page.script_find("[data-cy=handle1]", vec![visible("h1", 0.0, 0.0)]);
        page.script_find("[data-cy=handle4]", vec![visible("h4", 0.0, 300.0)]);

        let driver = DomDriver::new(page.clone(), quick_gate());
        driver
            .drag_and_drop("[data-cy=handle1]", "[data-cy=handle4]")
            .await
            .unwrap();

        let events = page.events();
        assert_eq!(events.first().unwrap(), "press:20,10");
        assert_eq!(events.last().unwrap(), "release");
        // interpolated moves end at the target center
        assert_eq!(events[events.len() - 2], "move:20,310");
        assert_eq!(events.len(), 5);
    }
}
