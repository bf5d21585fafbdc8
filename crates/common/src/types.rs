//! Core types for network interception

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use uuid::Uuid;

/// HTTP method used by fixture requests and interception matchers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Parse from a wire-format method name. Unknown methods are rejected
    /// rather than coerced.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "HEAD" => Some(Method::Head),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        };
        write!(f, "{label}")
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Method side of an interception matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MethodMatcher {
    /// Match any method
    #[default]
    Any,
    /// Match one specific method
    Is(Method),
}

impl MethodMatcher {
    pub fn matches(&self, method: Method) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::Is(expected) => *expected == method,
        }
    }
}

impl Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::Any => write!(f, "*"),
            MethodMatcher::Is(method) => write!(f, "{method}"),
        }
    }
}

/// Path side of an interception matcher: an exact path, or a glob where
/// `*` matches within one path segment and `**` matches across segments
/// (including the query string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathPattern(String);

impl PathPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the pattern contains glob metacharacters
    pub fn is_exact(&self) -> bool {
        !self.0.contains('*')
    }

    /// Match a concrete request path (with query string, if any)
    pub fn matches(&self, path: &str) -> bool {
        glob_match(self.0.as_bytes(), path.as_bytes())
    }
}

impl Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PathPattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn glob_match(pattern: &[u8], path: &[u8]) -> bool {
    match pattern {
        [] => path.is_empty(),
        [b'*', b'*', rest @ ..] => {
            // `**` consumes any remainder, one byte at a time
            (0..=path.len()).any(|i| glob_match(rest, &path[i..]))
        }
        [b'*', rest @ ..] => {
            // `*` stays within the current segment
            (0..=path.len())
                .take_while(|&i| i == 0 || path[i - 1] != b'/')
                .any(|i| glob_match(rest, &path[i..]))
        }
        [ch, rest @ ..] => path.first() == Some(ch) && glob_match(rest, &path[1..]),
    }
}

/// Opaque identifier of a registered interception rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Synthesized response for an override rule
///
/// When present on a rule, the proxy short-circuits the upstream call and
/// releases this response instead. `delay_ms` postpones only the release of
/// the response; the request itself is observed at arrival.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseOverride {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub body: serde_json::Value,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub delay_ms: Option<u64>,
}

fn default_status() -> u16 {
    200
}

/// A registered interception rule
#[derive(Debug, Clone)]
pub struct InterceptionRule {
    pub id: RuleId,
    pub method: MethodMatcher,
    pub path: PathPattern,
    pub respond: Option<ResponseOverride>,
}

impl InterceptionRule {
    pub fn matches(&self, method: Method, path: &str) -> bool {
        self.method.matches(method) && self.path.matches(path)
    }
}

/// The realized request/response pair matched by a rule
///
/// Produced once the response has been released (after any injected delay)
/// and consumed exactly once by a `wait_for`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptionRecord {
    pub correlation_id: String,
    pub rule_id: RuleId,
    pub method: Method,
    pub path: String,
    pub request_body: Option<serde_json::Value>,
    pub status: u16,
    pub response_headers: HashMap<String, String>,
    pub response_body: Option<serde_json::Value>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl InterceptionRecord {
    /// Response header lookup, case-insensitive per HTTP semantics
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
