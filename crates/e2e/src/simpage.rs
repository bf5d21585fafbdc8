//! Simulated badge-administration page
//!
//! Implements the engine's `Page` trait over an in-memory widget model of
//! the dashboard: badge cards with sort handles and delete buttons, a
//! new-badge dialog with derived-identifier validation, and an "updating
//! sort order" overlay during persistence. All backend traffic goes through
//! the case's interception proxy, exactly as a browser would.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::Badge;
use testwright_common::{Error, Result};
use testwright_engine::page::{BoundingBox, ElementSnapshot, Page, PageFactory};

const ID_MAX_LEN: usize = 50;
const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 50;

/// Derive a badge identifier from its name: alphanumerics only, suffixed
/// with "Badge".
pub fn derive_badge_id(name: &str) -> String {
    let mut id: String = name.chars().filter(|ch| ch.is_ascii_alphanumeric()).collect();
    id.push_str("Badge");
    id
}

#[derive(Debug, Default)]
struct Dialog {
    name: String,
    name_error: Option<String>,
    id_error: Option<String>,
}

impl Dialog {
    fn derived_id(&self) -> String {
        derive_badge_id(&self.name)
    }

    fn revalidate(&mut self) {
        self.name_error = if self.name.is_empty() {
            None
        } else if self.name.len() < NAME_MIN_LEN {
            Some(format!("Badge Name cannot be less than {NAME_MIN_LEN} characters"))
        } else if self.name.len() > NAME_MAX_LEN {
            Some(format!("Badge Name cannot exceed {NAME_MAX_LEN} characters"))
        } else {
            None
        };
        self.id_error = if self.derived_id().len() > ID_MAX_LEN {
            Some(format!("Badge ID cannot exceed {ID_MAX_LEN} characters"))
        } else {
            None
        };
    }

    fn save_enabled(&self) -> bool {
        !self.name.is_empty() && self.name_error.is_none() && self.id_error.is_none()
    }
}

#[derive(Default)]
struct PageState {
    project_id: String,
    badges: Vec<Badge>,
    dialog: Option<Dialog>,
    confirm_delete: Option<String>,
    overlay: Option<String>,
    drag_source: Option<String>,
    last_pointer: (f64, f64),
}

struct Inner {
    client: reqwest::Client,
    base_url: String,
    state: Mutex<PageState>,
}

/// The simulated page, one instance per case
pub struct SimPage {
    inner: Arc<Inner>,
}

impl SimPage {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                state: Mutex::new(PageState::default()),
            }),
        })
    }

    async fn refresh_badges(&self) -> Result<()> {
        let project_id = self.inner.state.lock().project_id.clone();
        let url = format!(
            "{}/admin/projects/{}/badges",
            self.inner.base_url, project_id
        );
        let response = self.inner.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Page(format!(
                "badge listing returned {}",
                response.status()
            )));
        }
        let badges: Vec<Badge> = response.json().await.unwrap_or_default();
        self.inner.state.lock().badges = badges;
        Ok(())
    }

    async fn save_badge(&self) -> Result<()> {
        let (project_id, badge_id, name) = {
            let mut state = self.inner.state.lock();
            let Some(dialog) = state.dialog.take() else {
                return Err(Error::Page("save clicked with no open dialog".to_string()));
            };
            (state.project_id.clone(), dialog.derived_id(), dialog.name)
        };

        let url = format!(
            "{}/admin/projects/{}/badges/{}",
            self.inner.base_url, project_id, badge_id
        );
        self.inner
            .client
            .post(&url)
            .json(&json!({ "projectId": project_id, "badgeId": badge_id, "name": name }))
            .send()
            .await?;
        self.refresh_badges().await
    }

    async fn confirm_delete(&self) -> Result<()> {
        let (project_id, badge_id) = {
            let mut state = self.inner.state.lock();
            let Some(badge_id) = state.confirm_delete.take() else {
                return Err(Error::Page("no delete pending confirmation".to_string()));
            };
            (state.project_id.clone(), badge_id)
        };

        let url = format!(
            "{}/admin/projects/{}/badges/{}",
            self.inner.base_url, project_id, badge_id
        );
        self.inner.client.delete(&url).send().await?;
        self.refresh_badges().await
    }

    /// Apply the reorder locally, show the overlay, and persist in the
    /// background. The overlay clears only when the persistence response is
    /// released by the proxy.
    fn finish_drag(&self, source: String, target: String) {
        let (project_id, new_index) = {
            let mut state = self.inner.state.lock();
            let Some(from) = state
                .badges
                .iter()
                .position(|badge| badge.badge_id == source)
            else {
                return;
            };
            let Some(to) = state
                .badges
                .iter()
                .position(|badge| badge.badge_id == target)
            else {
                return;
            };
            let moved = state.badges.remove(from);
            state.badges.insert(to, moved);
            state.overlay = Some(source.clone());
            (state.project_id.clone(), to)
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let url = format!(
                "{}/admin/projects/{}/badges/{}",
                inner.base_url, project_id, source
            );
            let outcome = inner
                .client
                .patch(&url)
                .json(&json!({ "newDisplayOrderIndex": new_index }))
                .send()
                .await;
            if let Err(err) = outcome {
                debug!(%err, "sort persistence failed");
            }
            inner.state.lock().overlay = None;
        });
    }
}

// layout constants shared by snapshot building and pointer hit-testing
fn card_bbox(index: usize) -> BoundingBox {
    BoundingBox {
        x: 0.0,
        y: 80.0 + 100.0 * index as f64,
        width: 300.0,
        height: 90.0,
    }
}

fn handle_bbox(index: usize) -> BoundingBox {
    let card = card_bbox(index);
    BoundingBox {
        x: 8.0,
        y: card.y + 8.0,
        width: 24.0,
        height: 24.0,
    }
}

fn delete_bbox(index: usize) -> BoundingBox {
    let card = card_bbox(index);
    BoundingBox {
        x: 260.0,
        y: card.y + 8.0,
        width: 24.0,
        height: 24.0,
    }
}

/// One virtual widget in the simulated DOM
struct VNode {
    id: String,
    parent: Option<String>,
    data_cy: Vec<String>,
    aria_label: Option<String>,
    html_id: Option<String>,
    text: String,
    value: Option<String>,
    disabled: bool,
    bbox: BoundingBox,
}

impl VNode {
    fn leaf(id: &str, parent: Option<&str>, bbox: BoundingBox) -> Self {
        Self {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            data_cy: Vec::new(),
            aria_label: None,
            html_id: None,
            text: String::new(),
            value: None,
            disabled: false,
            bbox,
        }
    }

    fn cy(mut self, value: &str) -> Self {
        self.data_cy.push(value.to_string());
        self
    }

    fn text(mut self, value: &str) -> Self {
        self.text = value.to_string();
        self
    }
}

fn build_nodes(state: &PageState) -> Vec<VNode> {
    let mut nodes = Vec::new();

    let mut new_badge = VNode::leaf(
        "newBadgeBtn",
        None,
        BoundingBox {
            x: 0.0,
            y: 20.0,
            width: 120.0,
            height: 32.0,
        },
    )
    .text("Badge");
    new_badge.aria_label = Some("new badge".to_string());
    nodes.push(new_badge);

    if state.badges.is_empty() {
        nodes.push(
            VNode::leaf("noContent", None, BoundingBox::default()).cy("noContent").text("No Badges Yet"),
        );
    }

    let show_handles = state.badges.len() > 1;
    for (index, badge) in state.badges.iter().enumerate() {
        let card_id = format!("card:{}", badge.badge_id);
        nodes.push(
            VNode::leaf(&card_id, None, card_bbox(index))
                .cy("badgeCard")
                .cy(&format!("badgeCard-{}", badge.badge_id))
                .text(&badge.name),
        );
        nodes.push(
            VNode::leaf(&format!("title:{}", badge.badge_id), Some(&card_id), card_bbox(index))
                .cy("titleLink")
                .text(&badge.name),
        );
        nodes.push(
            VNode::leaf(
                &format!("deleteBtn:{}", badge.badge_id),
                Some(&card_id),
                delete_bbox(index),
            )
            .cy("deleteBtn"),
        );
        if show_handles {
            nodes.push(
                VNode::leaf(
                    &format!("handle:{}", badge.badge_id),
                    Some(&card_id),
                    handle_bbox(index),
                )
                .cy("sortControlHandle"),
            );
        }
        if state.overlay.as_deref() == Some(badge.badge_id.as_str()) {
            let overlay_id = format!("overlay:{}", badge.badge_id);
            nodes.push(
                VNode::leaf(&overlay_id, Some(&card_id), card_bbox(index))
                    .cy(&format!("{}_overlayShown", badge.badge_id)),
            );
            nodes.push(
                VNode::leaf(
                    &format!("updatingMsg:{}", badge.badge_id),
                    Some(&overlay_id),
                    card_bbox(index),
                )
                .cy("updatingSortMsg")
                .text("Updating sort order"),
            );
        }
    }

    if let Some(dialog) = &state.dialog {
        let input_bbox = BoundingBox {
            x: 340.0,
            y: 80.0,
            width: 200.0,
            height: 28.0,
        };
        let mut name_input = VNode::leaf("nameInput", None, input_bbox).cy("badgeName");
        name_input.html_id = Some("badgeName".to_string());
        name_input.value = Some(dialog.name.clone());
        nodes.push(name_input);

        let mut id_input = VNode::leaf(
            "idInput",
            None,
            BoundingBox {
                y: 120.0,
                ..input_bbox
            },
        )
        .cy("idInputValue");
        id_input.value = Some(dialog.derived_id());
        nodes.push(id_input);

        if let Some(message) = &dialog.name_error {
            nodes.push(
                VNode::leaf("nameError", None, BoundingBox::default())
                    .cy("badgeNameError")
                    .text(message),
            );
        }
        if let Some(message) = &dialog.id_error {
            nodes.push(
                VNode::leaf("idError", None, BoundingBox::default())
                    .cy("idError")
                    .text(message),
            );
        }

        let mut save = VNode::leaf(
            "saveBtn",
            None,
            BoundingBox {
                y: 200.0,
                width: 80.0,
                ..input_bbox
            },
        )
        .cy("saveBadgeButton")
        .text("Save");
        save.disabled = !dialog.save_enabled();
        nodes.push(save);

        nodes.push(
            VNode::leaf(
                "closeBtn",
                None,
                BoundingBox {
                    x: 430.0,
                    y: 200.0,
                    width: 80.0,
                    height: 28.0,
                },
            )
            .cy("closeBadgeButton")
            .text("Cancel"),
        );
    }

    if state.confirm_delete.is_some() {
        nodes.push(
            VNode::leaf(
                "confirmYes",
                None,
                BoundingBox {
                    x: 340.0,
                    y: 300.0,
                    width: 120.0,
                    height: 28.0,
                },
            )
            .cy("confirmDeleteYes")
            .text("YES, Delete It!"),
        );
    }

    nodes
}

/// One selector part: `#id`, `[data-cy=value]`, or `[aria-label="value"]`
enum Part {
    HtmlId(String),
    DataCy(String),
    AriaLabel(String),
}

fn parse_part(part: &str) -> Result<Part> {
    if let Some(id) = part.strip_prefix('#') {
        return Ok(Part::HtmlId(id.to_string()));
    }
    if let Some(body) = part.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        let (attr, raw) = body
            .split_once('=')
            .ok_or_else(|| Error::Page(format!("unsupported selector part: {part}")))?;
        let value = raw.trim_matches(|ch| ch == '"' || ch == '\'').to_string();
        return match attr {
            "data-cy" => Ok(Part::DataCy(value)),
            "aria-label" => Ok(Part::AriaLabel(value)),
            _ => Err(Error::Page(format!("unsupported attribute: {attr}"))),
        };
    }
    Err(Error::Page(format!("unsupported selector part: {part}")))
}

fn part_matches(part: &Part, node: &VNode) -> bool {
    match part {
        Part::HtmlId(id) => node.html_id.as_deref() == Some(id.as_str()),
        Part::DataCy(value) => node.data_cy.iter().any(|cy| cy == value),
        Part::AriaLabel(value) => node.aria_label.as_deref() == Some(value.as_str()),
    }
}

fn is_descendant(nodes: &[VNode], node: &VNode, ancestor_id: &str) -> bool {
    let mut current = node.parent.as_deref();
    while let Some(parent_id) = current {
        if parent_id == ancestor_id {
            return true;
        }
        current = nodes
            .iter()
            .find(|candidate| candidate.id == parent_id)
            .and_then(|candidate| candidate.parent.as_deref());
    }
    false
}

/// Split a selector into descendant parts; whitespace inside an attribute
/// bracket (e.g. `[aria-label="new badge"]`) does not separate parts.
fn split_parts(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in selector.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ch if ch.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            ch => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn resolve<'nodes>(nodes: &'nodes [VNode], selector: &str) -> Result<Vec<&'nodes VNode>> {
    let mut parts = Vec::new();
    for raw in split_parts(selector) {
        parts.push(parse_part(&raw)?);
    }
    if parts.is_empty() {
        return Err(Error::Page("empty selector".to_string()));
    }

    let mut matched: Vec<&VNode> = nodes
        .iter()
        .filter(|node| part_matches(&parts[0], node))
        .collect();
    for part in &parts[1..] {
        let scopes: Vec<String> = matched.iter().map(|node| node.id.clone()).collect();
        matched = nodes
            .iter()
            .filter(|node| {
                part_matches(part, node)
                    && scopes.iter().any(|scope| is_descendant(nodes, node, scope))
            })
            .collect();
    }
    Ok(matched)
}

fn snapshot(node: &VNode) -> ElementSnapshot {
    ElementSnapshot {
        element_id: node.id.clone(),
        attached: true,
        visible: true,
        obscured: false,
        disabled: node.disabled,
        text: node.text.clone(),
        value: node.value.clone(),
        bbox: node.bbox,
    }
}

#[async_trait]
impl Page for SimPage {
    async fn find(&self, selector: &str) -> Result<Vec<ElementSnapshot>> {
        let state = self.inner.state.lock();
        let nodes = build_nodes(&state);
        Ok(resolve(&nodes, selector)?.into_iter().map(snapshot).collect())
    }

    async fn find_within(
        &self,
        element_id: &str,
        selector: &str,
    ) -> Result<Vec<ElementSnapshot>> {
        let state = self.inner.state.lock();
        let nodes = build_nodes(&state);
        // bare structural selectors (tr/td) resolve to nothing here; the
        // simulated dashboard renders cards, not tables
        let Ok(matched) = resolve(&nodes, selector) else {
            return Ok(Vec::new());
        };
        Ok(matched
            .into_iter()
            .filter(|node| is_descendant(&nodes, node, element_id))
            .map(snapshot)
            .collect())
    }

    async fn click(&self, element_id: &str) -> Result<()> {
        debug!(element_id, "sim click");
        match element_id {
            "newBadgeBtn" => {
                self.inner.state.lock().dialog = Some(Dialog::default());
                Ok(())
            }
            "closeBtn" => {
                self.inner.state.lock().dialog = None;
                Ok(())
            }
            "saveBtn" => self.save_badge().await,
            "confirmYes" => self.confirm_delete().await,
            other => {
                if let Some(badge_id) = other.strip_prefix("deleteBtn:") {
                    self.inner.state.lock().confirm_delete = Some(badge_id.to_string());
                    Ok(())
                } else if other.starts_with("title:") || other.starts_with("card:") {
                    Ok(())
                } else {
                    Err(Error::Page(format!("element {other} is not clickable")))
                }
            }
        }
    }

    async fn type_text(&self, element_id: &str, text: &str) -> Result<()> {
        if element_id != "nameInput" {
            return Err(Error::Page(format!("element {element_id} is not an input")));
        }
        let mut state = self.inner.state.lock();
        let dialog = state
            .dialog
            .as_mut()
            .ok_or_else(|| Error::Page("dialog is not open".to_string()))?;
        dialog.name.push_str(text);
        dialog.revalidate();
        Ok(())
    }

    async fn clear(&self, element_id: &str) -> Result<()> {
        if element_id != "nameInput" {
            return Err(Error::Page(format!("element {element_id} is not an input")));
        }
        let mut state = self.inner.state.lock();
        let dialog = state
            .dialog
            .as_mut()
            .ok_or_else(|| Error::Page("dialog is not open".to_string()))?;
        dialog.name.clear();
        dialog.revalidate();
        Ok(())
    }

    async fn select(&self, element_id: &str, _value: &str) -> Result<()> {
        Err(Error::Page(format!(
            "element {element_id} is not a select control"
        )))
    }

    async fn pointer_press(&self, x: f64, y: f64) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.last_pointer = (x, y);
        state.drag_source = state
            .badges
            .iter()
            .enumerate()
            .find(|(index, _)| handle_bbox(*index).contains(x, y))
            .map(|(_, badge)| badge.badge_id.clone());
        Ok(())
    }

    async fn pointer_move(&self, x: f64, y: f64) -> Result<()> {
        self.inner.state.lock().last_pointer = (x, y);
        Ok(())
    }

    async fn pointer_release(&self) -> Result<()> {
        let (source, target) = {
            let mut state = self.inner.state.lock();
            let Some(source) = state.drag_source.take() else {
                return Ok(());
            };
            let (x, y) = state.last_pointer;
            let target = state
                .badges
                .iter()
                .enumerate()
                .find(|(index, _)| card_bbox(*index).contains(x, y))
                .map(|(_, badge)| badge.badge_id.clone());
            match target {
                Some(target) if target != source => (source, target),
                _ => return Ok(()),
            }
        };
        self.finish_drag(source, target);
        Ok(())
    }

    async fn visit(&self, path: &str) -> Result<()> {
        // /administrator/projects/{projectId}/badges
        let project_id = path
            .split('/')
            .nth(3)
            .unwrap_or("proj1")
            .to_string();
        {
            let mut state = self.inner.state.lock();
            state.project_id = project_id;
            state.dialog = None;
            state.confirm_delete = None;
            state.overlay = None;
        }
        self.refresh_badges().await
    }

    async fn reload(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.dialog = None;
            state.confirm_delete = None;
            state.overlay = None;
        }
        self.refresh_badges().await
    }
}

/// Opens a fresh simulated page per case
pub struct SimPageFactory;

#[async_trait]
impl PageFactory for SimPageFactory {
    async fn open(&self, base_url: &str) -> Result<Arc<dyn Page>> {
        Ok(Arc::new(SimPage::new(base_url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_strips_special_characters() {
        assert_eq!(
            derive_badge_id("!L@o#t$s of %s^p&e*c(i)a_l++_|}{P/ c'ha'rs"),
            "LotsofspecialPcharsBadge"
        );
        assert_eq!(derive_badge_id("a name"), "anameBadge");
    }

    #[test]
    fn forty_six_character_name_overflows_the_id_budget() {
        let name = "a".repeat(46);
        let mut dialog = Dialog {
            name,
            ..Dialog::default()
        };
        dialog.revalidate();
        assert_eq!(dialog.derived_id().len(), 51);
        assert_eq!(
            dialog.id_error.as_deref(),
            Some("Badge ID cannot exceed 50 characters")
        );
        assert!(!dialog.save_enabled());

        // one character less and the badge can be saved again
        dialog.name.pop();
        dialog.revalidate();
        assert!(dialog.id_error.is_none());
        assert!(dialog.save_enabled());
    }

    #[test]
    fn selector_resolution_supports_descendants() {
        let state = PageState {
            badges: vec![
                Badge {
                    badge_id: "badge1".into(),
                    name: "Badge 1".into(),
                    display_order: 0,
                },
                Badge {
                    badge_id: "badge2".into(),
                    name: "Badge 2".into(),
                    display_order: 1,
                },
            ],
            ..PageState::default()
        };
        let nodes = build_nodes(&state);

        let cards = resolve(&nodes, r#"[data-cy="badgeCard"]"#).unwrap();
        assert_eq!(cards.len(), 2);

        let delete = resolve(&nodes, r#"[data-cy="badgeCard-badge2"] [data-cy="deleteBtn"]"#)
            .unwrap();
        assert_eq!(delete.len(), 1);
        assert_eq!(delete[0].id, "deleteBtn:badge2");

        let ghost = resolve(&nodes, r#"[data-cy="badgeCard-badge9"]"#).unwrap();
        assert!(ghost.is_empty());
    }

    #[test]
    fn selector_splitting_keeps_bracketed_whitespace_together() {
        assert_eq!(
            split_parts(r#"[aria-label="new badge"]"#),
            vec![r#"[aria-label="new badge"]"#]
        );
        assert_eq!(
            split_parts(r#"[data-cy="badgeCard-badge1"] [data-cy="sortControlHandle"]"#),
            vec![
                r#"[data-cy="badgeCard-badge1"]"#,
                r#"[data-cy="sortControlHandle"]"#
            ]
        );
    }

    #[test]
    fn single_badge_renders_no_sort_handle() {
        let state = PageState {
            badges: vec![Badge {
                badge_id: "badge1".into(),
                name: "Badge 1".into(),
                display_order: 0,
            }],
            ..PageState::default()
        };
        let nodes = build_nodes(&state);
        assert!(resolve(&nodes, r#"[data-cy="sortControlHandle"]"#).unwrap().is_empty());
    }
}
