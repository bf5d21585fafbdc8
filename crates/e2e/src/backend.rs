//! In-process dashboard backend used as the system under test
//!
//! A small axum server with project and badge administration endpoints and
//! sort-order persistence. Spawned on an ephemeral port per test.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use testwright_common::Result;

/// Version header attached to badge listings, asserted on by suites
pub const CLIENT_LIB_VERSION: &str = "1.4.2";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub badge_id: String,
    pub name: String,
    pub display_order: usize,
}

#[derive(Debug, Default)]
struct Project {
    name: String,
    badges: Vec<Badge>,
}

#[derive(Default)]
struct BackendState {
    projects: HashMap<String, Project>,
}

impl BackendState {
    fn renumber(&mut self, project_id: &str) {
        if let Some(project) = self.projects.get_mut(project_id) {
            for (index, badge) in project.badges.iter_mut().enumerate() {
                badge.display_order = index;
            }
        }
    }
}

type Shared = Arc<RwLock<BackendState>>;

/// Handle to the running backend
pub struct BackendHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BackendHandle {
    pub async fn spawn() -> Result<Self> {
        let state: Shared = Arc::new(RwLock::new(BackendState::default()));

        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/app/projects/:project_id", post(create_project))
            .route("/admin/projects/:project_id/badges", get(list_badges))
            .route(
                "/admin/projects/:project_id/badges/:badge_id",
                post(upsert_badge).delete(delete_badge).patch(move_badge),
            )
            .route(
                "/admin/projects/:project_id/badgeNameExists",
                post(badge_name_exists),
            )
            .with_state(state);

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "dashboard backend listening");

        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            let _ = server.await;
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.stop();
        self.task.abort();
    }
}

async fn create_project(
    State(state): State<Shared>,
    Path(project_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let name = body["name"].as_str().unwrap_or(&project_id).to_string();
    state
        .write()
        .projects
        .entry(project_id)
        .or_insert_with(|| Project {
            name,
            badges: Vec::new(),
        });
    Json(json!({})).into_response()
}

async fn list_badges(
    State(state): State<Shared>,
    Path(project_id): Path<String>,
) -> Response {
    let guard = state.read();
    let Some(project) = guard.projects.get(&project_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut badges = project.badges.clone();
    badges.sort_by_key(|badge| badge.display_order);
    (
        [("skills-client-lib-version", CLIENT_LIB_VERSION)],
        Json(badges),
    )
        .into_response()
}

async fn upsert_badge(
    State(state): State<Shared>,
    Path((project_id, badge_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut guard = state.write();
    let Some(project) = guard.projects.get_mut(&project_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let name = body["name"].as_str().unwrap_or(&badge_id).to_string();

    match project
        .badges
        .iter_mut()
        .find(|badge| badge.badge_id == badge_id)
    {
        Some(existing) => existing.name = name,
        None => {
            let display_order = project.badges.len();
            project.badges.push(Badge {
                badge_id,
                name,
                display_order,
            });
        }
    }
    Json(json!({})).into_response()
}

async fn delete_badge(
    State(state): State<Shared>,
    Path((project_id, badge_id)): Path<(String, String)>,
) -> Response {
    let mut guard = state.write();
    let Some(project) = guard.projects.get_mut(&project_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let before = project.badges.len();
    project.badges.retain(|badge| badge.badge_id != badge_id);
    if project.badges.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    guard.renumber(&project_id);
    Json(json!({})).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveBadge {
    new_display_order_index: usize,
}

async fn move_badge(
    State(state): State<Shared>,
    Path((project_id, badge_id)): Path<(String, String)>,
    Json(body): Json<MoveBadge>,
) -> Response {
    let mut guard = state.write();
    let Some(project) = guard.projects.get_mut(&project_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    project.badges.sort_by_key(|badge| badge.display_order);
    let Some(from) = project
        .badges
        .iter()
        .position(|badge| badge.badge_id == badge_id)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let badge = project.badges.remove(from);
    let to = body.new_display_order_index.min(project.badges.len());
    project.badges.insert(to, badge);
    guard.renumber(&project_id);
    Json(json!({})).into_response()
}

async fn badge_name_exists(
    State(state): State<Shared>,
    Path(project_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let wanted = body["name"].as_str().unwrap_or_default();
    let guard = state.read();
    let exists = guard
        .projects
        .get(&project_id)
        .map(|project| project.badges.iter().any(|badge| badge.name == wanted))
        .unwrap_or(false);
    Json(json!(exists)).into_response()
}
