//! W3C WebDriver adapter for the `Page` trait
//!
//! Talks plain HTTP+JSON to any WebDriver remote end (chromedriver,
//! geckodriver, a Selenium grid). The engine stays browser-agnostic; this
//! module is the production adapter a CLI run wires in.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::page::{BoundingBox, ElementSnapshot, Page, PageFactory};
use testwright_common::{Error, Result};

/// W3C element identifier key in wire payloads
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const OBSCURED_PROBE: &str = r"
const el = arguments[0];
const rect = el.getBoundingClientRect();
const top = document.elementFromPoint(rect.x + rect.width / 2, rect.y + rect.height / 2);
return !(top === el || el.contains(top) || (top !== null && top.contains(el)));
";

const SELECT_SCRIPT: &str = r"
const el = arguments[0];
el.value = arguments[1];
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
";

/// One WebDriver session bound to a case's proxy base URL
pub struct WebDriverPage {
    client: reqwest::Client,
    session_url: String,
    base_url: String,
}

impl WebDriverPage {
    /// Create a session against `remote` and point it at `base_url`.
    pub async fn open(remote: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let remote = remote.trim_end_matches('/');

        let created: Value = client
            .post(format!("{remote}/session"))
            .json(&json!({ "capabilities": { "alwaysMatch": {} } }))
            .send()
            .await?
            .json()
            .await?;
        let session_id = created["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| Error::Page(format!("session creation returned {created}")))?
            .to_string();
        debug!(%session_id, "webdriver session created");

        Ok(Self {
            client,
            session_url: format!("{remote}/session/{session_id}"),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// End the session. Failures are ignored; the remote reaps sessions.
    pub async fn close(&self) {
        let _ = self.client.delete(&self.session_url).send().await;
    }

    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.session_url, path);
        let mut builder = self.client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let mut payload: Value = builder.send().await?.json().await?;
        if let Some(error) = payload["value"]["error"].as_str() {
            let message = payload["value"]["message"].as_str().unwrap_or(error);
            return Err(Error::Page(format!("{error}: {message}")));
        }
        Ok(payload["value"].take())
    }

    fn element_refs(found: &Value) -> Vec<String> {
        found
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry[ELEMENT_KEY].as_str().map(str::to_string))
            .collect()
    }

    fn is_stale(err: &Error) -> bool {
        matches!(err, Error::Page(message) if message.contains("stale element reference"))
    }

    async fn snapshot(&self, element_ref: String) -> Result<ElementSnapshot> {
        let displayed = self
            .command(reqwest::Method::GET, &format!("/element/{element_ref}/displayed"), None)
            .await;
        let displayed = match displayed {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) if Self::is_stale(&err) => {
                return Ok(ElementSnapshot {
                    element_id: element_ref,
                    attached: false,
                    visible: false,
                    obscured: false,
                    disabled: false,
                    text: String::new(),
                    value: None,
                    bbox: BoundingBox::default(),
                });
            }
            Err(err) => return Err(err),
        };

        let enabled = self
            .command(reqwest::Method::GET, &format!("/element/{element_ref}/enabled"), None)
            .await?
            .as_bool()
            .unwrap_or(true);
        let text = self
            .command(reqwest::Method::GET, &format!("/element/{element_ref}/text"), None)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let rect = self
            .command(reqwest::Method::GET, &format!("/element/{element_ref}/rect"), None)
            .await?;
        let bbox = BoundingBox {
            x: rect["x"].as_f64().unwrap_or(0.0),
            y: rect["y"].as_f64().unwrap_or(0.0),
            width: rect["width"].as_f64().unwrap_or(0.0),
            height: rect["height"].as_f64().unwrap_or(0.0),
        };
        let value = self
            .command(
                reqwest::Method::GET,
                &format!("/element/{element_ref}/property/value"),
                None,
            )
            .await?
            .as_str()
            .map(str::to_string);

        let obscured = if displayed {
            self.command(
                reqwest::Method::POST,
                "/execute/sync",
                Some(json!({
                    "script": OBSCURED_PROBE,
                    "args": [{ ELEMENT_KEY: element_ref }],
                })),
            )
            .await?
            .as_bool()
            .unwrap_or(false)
        } else {
            false
        };

        Ok(ElementSnapshot {
            element_id: element_ref,
            attached: true,
            visible: displayed,
            obscured,
            disabled: !enabled,
            text,
            value,
            bbox,
        })
    }

    async fn snapshot_all(&self, refs: Vec<String>) -> Result<Vec<ElementSnapshot>> {
        let mut snapshots = Vec::with_capacity(refs.len());
        for element_ref in refs {
            snapshots.push(self.snapshot(element_ref).await?);
        }
        Ok(snapshots)
    }

    async fn pointer_actions(&self, actions: Value) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            "/actions",
            Some(json!({
                "actions": [{
                    "type": "pointer",
                    "id": "mouse",
                    "parameters": { "pointerType": "mouse" },
                    "actions": actions,
                }],
            })),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn find(&self, selector: &str) -> Result<Vec<ElementSnapshot>> {
        let found = self
            .command(
                reqwest::Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        self.snapshot_all(Self::element_refs(&found)).await
    }

    async fn find_within(
        &self,
        element_id: &str,
        selector: &str,
    ) -> Result<Vec<ElementSnapshot>> {
        let found = self
            .command(
                reqwest::Method::POST,
                &format!("/element/{element_id}/elements"),
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        self.snapshot_all(Self::element_refs(&found)).await
    }

    async fn click(&self, element_id: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element_id}/click"),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn type_text(&self, element_id: &str, text: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element_id}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn clear(&self, element_id: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element_id}/clear"),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn select(&self, element_id: &str, value: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            "/execute/sync",
            Some(json!({
                "script": SELECT_SCRIPT,
                "args": [{ ELEMENT_KEY: element_id }, value],
            })),
        )
        .await
        .map(|_| ())
    }

    async fn pointer_press(&self, x: f64, y: f64) -> Result<()> {
        self.pointer_actions(json!([
            { "type": "pointerMove", "duration": 0, "x": x as i64, "y": y as i64 },
            { "type": "pointerDown", "button": 0 },
        ]))
        .await
    }

    async fn pointer_move(&self, x: f64, y: f64) -> Result<()> {
        self.pointer_actions(json!([
            { "type": "pointerMove", "duration": 50, "x": x as i64, "y": y as i64 },
        ]))
        .await
    }

    async fn pointer_release(&self) -> Result<()> {
        self.pointer_actions(json!([{ "type": "pointerUp", "button": 0 }])).await
    }

    async fn visit(&self, path: &str) -> Result<()> {
        self.command(
            reqwest::Method::POST,
            "/url",
            Some(json!({ "url": format!("{}{}", self.base_url, path) })),
        )
        .await
        .map(|_| ())
    }

    async fn reload(&self) -> Result<()> {
        self.command(reqwest::Method::POST, "/refresh", Some(json!({})))
            .await
            .map(|_| ())
    }
}

/// Opens one WebDriver session per case
pub struct WebDriverFactory {
    remote: String,
}

impl WebDriverFactory {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
        }
    }
}

#[async_trait]
impl PageFactory for WebDriverFactory {
    async fn open(&self, base_url: &str) -> Result<Arc<dyn Page>> {
        let page = WebDriverPage::open(&self.remote, base_url).await?;
        page.visit("/").await?;
        Ok(Arc::new(page))
    }
}
