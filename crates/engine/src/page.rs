//! Narrow interface to the rendered page
//!
//! The engine never inspects page internals beyond what selectors resolve
//! to: a `Page` yields element snapshots and performs raw interactions. The
//! actionability policy lives in [`crate::dom`], on top of this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use testwright_common::Result;

/// Screen-space box of an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Observed state of one resolved element
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    /// Opaque element reference, valid for follow-up interactions
    pub element_id: String,
    pub attached: bool,
    pub visible: bool,
    pub obscured: bool,
    pub disabled: bool,
    pub text: String,
    pub value: Option<String>,
    pub bbox: BoundingBox,
}

impl ElementSnapshot {
    /// The actionability preconditions, in check order. `None` means the
    /// element is actionable; input actions additionally require enabled.
    pub fn blocked_reason(&self, needs_enabled: bool) -> Option<&'static str> {
        if !self.attached {
            Some("detached from the DOM")
        } else if !self.visible {
            Some("not visible")
        } else if self.obscured {
            Some("covered by another element")
        } else if needs_enabled && self.disabled {
            Some("disabled")
        } else {
            None
        }
    }
}

/// The rendered page, reached only through opaque selectors
#[async_trait]
pub trait Page: Send + Sync {
    /// Resolve a selector to element snapshots, in DOM order.
    async fn find(&self, selector: &str) -> Result<Vec<ElementSnapshot>>;

    /// Resolve a selector relative to a previously returned element.
    async fn find_within(&self, element_id: &str, selector: &str)
        -> Result<Vec<ElementSnapshot>>;

    async fn click(&self, element_id: &str) -> Result<()>;
    async fn type_text(&self, element_id: &str, text: &str) -> Result<()>;
    async fn clear(&self, element_id: &str) -> Result<()>;
    async fn select(&self, element_id: &str, value: &str) -> Result<()>;

    /// Raw pointer interactions used by compound gestures
    async fn pointer_press(&self, x: f64, y: f64) -> Result<()>;
    async fn pointer_move(&self, x: f64, y: f64) -> Result<()>;
    async fn pointer_release(&self) -> Result<()>;

    /// Navigate to a path relative to the page's base URL
    async fn visit(&self, path: &str) -> Result<()>;
    async fn reload(&self) -> Result<()>;
}

/// Opens an isolated page session per test case, pointed at that case's
/// interception proxy.
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open(&self, base_url: &str) -> Result<Arc<dyn Page>>;
}
