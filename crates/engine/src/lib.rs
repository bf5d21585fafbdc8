//! Testwright Engine
//!
//! A declarative end-to-end test orchestration engine that:
//! - Seeds backend state over HTTP before a case runs
//! - Places an interception proxy between the page and the real backend
//! - Drives a live page through a narrow DOM interface with actionability gates
//! - Asserts on asynchronous UI state with bounded, race-free polling
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Runner (per case)                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  FixtureClient ── seeds backend state (fatal on non-2xx)     │
//! │  Interceptor ──── rules, record queues, wait_for(rule, t/o)  │
//! │  InterceptProxy ─ axum server: override | observe | forward  │
//! │  DomDriver ────── click/type/drag with actionability gate    │
//! │  retry ────────── assert_eventually + order/table validators │
//! ├──────────────────────────────────────────────────────────────┤
//! │  TestSuite (YAML)                                            │
//! │    ├── before_each: [Step]                                   │
//! │    └── cases: [{ name, steps: [Step] }]                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every case receives fresh, injected component instances; no interception
//! rule or recorded traffic crosses a case boundary.

pub mod collab;
pub mod dom;
pub mod fixture;
pub mod intercept;
pub mod page;
pub mod proxy;
pub mod retry;
pub mod runner;
pub mod step;
pub mod suite;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testutil;

pub use dom::{DomDriver, GatePolicy};
pub use fixture::{FixtureClient, FixtureResponse};
pub use intercept::Interceptor;
pub use page::{BoundingBox, ElementSnapshot, Page, PageFactory};
pub use proxy::InterceptProxy;
pub use retry::{assert_eventually, Check, RetryPolicy};
pub use runner::{Runner, RunnerConfig};
pub use suite::{TestCase, TestSuite};
pub use testwright_common::{Error, Result};
