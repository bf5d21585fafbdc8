//! Network interception rules, record queues, and the blocking waiter
//!
//! The `Interceptor` is the shared state between a case's step sequence and
//! its proxy. The proxy matches live traffic against registered rules and
//! appends realized records; `wait_for` consumes them in arrival order.
//!
//! A case has at most one outstanding `wait_for` at a time (steps execute
//! strictly in declared order), which keeps the wakeup protocol a simple
//! check-queue-then-park loop on a single `Notify`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use testwright_common::{
    Error, InterceptionRecord, InterceptionRule, Method, MethodMatcher, PathPattern,
    ResponseOverride, Result, RuleId,
};

/// Handed to the proxy when a request matches a rule; joins the observed
/// request to the record completed once the response is released.
#[derive(Debug)]
pub struct MatchToken {
    pub rule_id: RuleId,
    pub correlation_id: String,
    pub respond: Option<ResponseOverride>,
}

/// The realized exchange the proxy reports back on completion
#[derive(Debug)]
pub struct CompletedExchange {
    pub method: Method,
    pub path: String,
    pub request_body: Option<serde_json::Value>,
    pub status: u16,
    pub response_headers: std::collections::HashMap<String, String>,
    pub response_body: Option<serde_json::Value>,
}

struct RuleState {
    rule: InterceptionRule,
    queue: VecDeque<InterceptionRecord>,
    in_flight: usize,
    matched: u64,
}

struct Inner {
    rules: Mutex<Vec<RuleState>>,
    notify: Notify,
}

/// Per-case interception registry and waiter
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Inner>,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rules: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Register a rule. Must happen strictly before the action that triggers
    /// the matching request.
    pub fn intercept(
        &self,
        method: MethodMatcher,
        path: PathPattern,
        respond: Option<ResponseOverride>,
    ) -> RuleId {
        let id = RuleId::generate();
        debug!(rule = %id, %method, %path, stubbed = respond.is_some(), "interception registered");
        self.inner.rules.lock().push(RuleState {
            rule: InterceptionRule {
                id: id.clone(),
                method,
                path,
                respond,
            },
            queue: VecDeque::new(),
            in_flight: 0,
            matched: 0,
        });
        id
    }

    /// Suspend until a record matching `id` is available, consuming it.
    ///
    /// Sequential waits on the same rule consume matches FIFO. Waiting on a
    /// rule that was never registered is a configuration error and fails
    /// immediately; absence of traffic is a timeout at `budget`.
    pub async fn wait_for(&self, id: &RuleId, budget: Duration) -> Result<InterceptionRecord> {
        let deadline = Instant::now() + budget;
        loop {
            let parked = self.inner.notify.notified();
            {
                let mut rules = self.inner.rules.lock();
                let state = rules
                    .iter_mut()
                    .find(|state| state.rule.id == *id)
                    .ok_or_else(|| {
                        Error::Configuration(format!("wait_for references unregistered rule {id}"))
                    })?;
                if let Some(record) = state.queue.pop_front() {
                    debug!(rule = %id, correlation = %record.correlation_id, "wait_for matched");
                    return Ok(record);
                }
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(self.timeout_error(id, budget));
            };
            if tokio::time::timeout(remaining, parked).await.is_err() {
                return Err(self.timeout_error(id, budget));
            }
        }
    }

    fn timeout_error(&self, id: &RuleId, budget: Duration) -> Error {
        let rules = self.inner.rules.lock();
        let what = rules
            .iter()
            .find(|state| state.rule.id == *id)
            .map(|state| format!("interception {} {}", state.rule.method, state.rule.path))
            .unwrap_or_else(|| format!("interception {id}"));
        Error::Timeout {
            what,
            budget_ms: budget.as_millis() as u64,
        }
    }

    /// Proxy side: match an arriving request against registered rules.
    /// The most recently registered matching rule wins.
    pub fn begin(&self, method: Method, path: &str) -> Option<MatchToken> {
        let mut rules = self.inner.rules.lock();
        let state = rules
            .iter_mut()
            .rev()
            .find(|state| state.rule.matches(method, path))?;
        state.in_flight += 1;
        state.matched += 1;
        Some(MatchToken {
            rule_id: state.rule.id.clone(),
            correlation_id: Uuid::new_v4().to_string(),
            respond: state.rule.respond.clone(),
        })
    }

    /// Proxy side: the response for a matched request has been released.
    /// Appends the realized record and wakes the waiter, if any.
    pub fn complete(&self, token: MatchToken, exchange: CompletedExchange) {
        let mut rules = self.inner.rules.lock();
        if let Some(state) = rules.iter_mut().find(|state| state.rule.id == token.rule_id) {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.queue.push_back(InterceptionRecord {
                correlation_id: token.correlation_id,
                rule_id: token.rule_id,
                method: exchange.method,
                path: exchange.path,
                request_body: exchange.request_body,
                status: exchange.status,
                response_headers: exchange.response_headers,
                response_body: exchange.response_body,
                recorded_at: chrono::Utc::now(),
            });
        }
        drop(rules);
        self.inner.notify.notify_one();
    }

    /// Whether a matched request for this rule is still awaiting its
    /// (possibly delayed) response.
    pub fn in_flight(&self, id: &RuleId) -> Result<bool> {
        let rules = self.inner.rules.lock();
        rules
            .iter()
            .find(|state| state.rule.id == *id)
            .map(|state| state.in_flight > 0)
            .ok_or_else(|| Error::Configuration(format!("unknown interception rule {id}")))
    }

    /// Total requests this rule has matched so far
    pub fn match_count(&self, id: &RuleId) -> Result<u64> {
        let rules = self.inner.rules.lock();
        rules
            .iter()
            .find(|state| state.rule.id == *id)
            .map(|state| state.matched)
            .ok_or_else(|| Error::Configuration(format!("unknown interception rule {id}")))
    }
}
