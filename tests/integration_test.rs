use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use gitlab_composer::{
    error::{RemoteError, RemoteResult},
    gitlab::{Project, Reference},
    poller::poll_once,
    repository::{ComposerRepository, EngineOptions, RemoteState},
    server::{self, PACKAGES_PATH},
};

/// Remote serving a fixed set of projects, tags and composer.json files
#[derive(Default)]
struct StaticRemote {
    projects: Mutex<Vec<Project>>,
    tags: Mutex<HashMap<u64, Vec<Reference>>>,
    files: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    file_fetches: AtomicUsize,
}

impl StaticRemote {
    fn publish(&self, id: u64, path: &str, activity: i64, tag: &str, commit: &str, composer: &str) {
        let project = Project {
            id,
            name: path.to_string(),
            ssh_url_to_repo: format!("git@gitlab.example.com:{path}.git"),
            last_activity: Utc.timestamp_opt(activity, 0).unwrap(),
            path_with_namespace: path.to_string(),
        };
        let mut projects = self.projects.lock().unwrap();
        projects.retain(|p| p.id != id);
        projects.push(project);
        self.tags
            .lock()
            .unwrap()
            .insert(id, vec![Reference::new(tag, commit)]);
        self.files
            .lock()
            .unwrap()
            .insert(commit.to_string(), composer.to_string());
    }
}

impl RemoteState for StaticRemote {
    fn list_projects(&self, page: u32, _per_page: u32) -> RemoteResult<Vec<Project>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Status(503));
        }
        if page > 1 {
            return Ok(Vec::new());
        }
        Ok(self.projects.lock().unwrap().clone())
    }

    fn list_branches(&self, _project_id: u64) -> RemoteResult<Vec<Reference>> {
        Ok(Vec::new())
    }

    fn list_tags(&self, project_id: u64) -> RemoteResult<Vec<Reference>> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_file(&self, _project_id: u64, commit_id: &str, _path: &str) -> RemoteResult<Vec<u8>> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(commit_id)
            .map(|content| content.as_bytes().to_vec())
            .ok_or(RemoteError::NotFound)
    }
}

fn repository() -> ComposerRepository<StaticRemote> {
    ComposerRepository::new(
        StaticRemote::default(),
        EngineOptions {
            per_page: 20,
            ..EngineOptions::default()
        },
    )
}

async fn get(app: &Router, headers: &[(header::HeaderName, &str)]) -> Response {
    let mut request = Request::builder().uri(PACKAGES_PATH);
    for (name, value) in headers {
        request = request.header(name, *value);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_empty_repository_document() {
    let repo = repository();
    let app = server::router(repo.cache());

    let response = get(&app, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert!(response.headers().contains_key(header::LAST_MODIFIED));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"{"packages":{}}"#);
}

#[tokio::test]
async fn test_mirrored_packages_are_served() {
    let repo = repository();
    repo.remote()
        .publish(1, "org/a", 100, "1.0.0", "c1", r#"{"name":"org/a","license":"MIT"}"#);
    repo.remote()
        .publish(2, "org/b", 100, "v2.1", "c9", r#"{"name":"org/b"}"#);
    repo.update().unwrap();

    let app = server::router(repo.cache());
    let document = body_json(get(&app, &[]).await).await;

    let a = &document["packages"]["org/a"]["1.0.0"];
    assert_eq!(a["license"], "MIT");
    assert_eq!(a["version"], "1.0.0");
    assert_eq!(a["source"]["reference"], "c1");
    assert_eq!(a["source"]["type"], "git");
    assert_eq!(document["packages"]["org/b"]["v2.1"]["source"]["reference"], "c9");
}

#[tokio::test]
async fn test_three_cycle_scenario_over_http() {
    let repo = repository();
    let app = server::router(repo.cache());
    repo.remote()
        .publish(1, "org/a", 100, "1.0.0", "c1", r#"{"name":"org/a"}"#);

    repo.update().unwrap();
    let document = body_json(get(&app, &[]).await).await;
    assert_eq!(document["packages"]["org/a"]["1.0.0"]["source"]["reference"], "c1");
    assert_eq!(repo.remote().file_fetches.load(Ordering::SeqCst), 1);

    repo.update().unwrap();
    assert_eq!(repo.remote().file_fetches.load(Ordering::SeqCst), 1);

    repo.remote()
        .publish(1, "org/a", 200, "1.0.0", "c2", r#"{"name":"org/a"}"#);
    repo.update().unwrap();
    assert_eq!(repo.remote().file_fetches.load(Ordering::SeqCst), 2);

    let document = body_json(get(&app, &[]).await).await;
    assert_eq!(document["packages"]["org/a"]["1.0.0"]["source"]["reference"], "c2");
    assert_eq!(document["packages"]["org/a"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_conditional_get() {
    let repo = repository();
    let app = server::router(repo.cache());

    let response = get(&app, &[]).await;
    let last_modified = response.headers()[header::LAST_MODIFIED]
        .to_str()
        .unwrap()
        .to_string();

    let response = get(&app, &[(header::IF_MODIFIED_SINCE, last_modified.as_str())]).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());

    let response = get(
        &app,
        &[(header::IF_MODIFIED_SINCE, "Sun, 06 Nov 1994 08:49:37 GMT")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_range_requests() {
    let repo = repository();
    let app = server::router(repo.cache());
    let len = repo.content().unwrap().len();

    let response = get(&app, &[(header::RANGE, "bytes=0-9")]).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes 0-9/{len}").as_str()
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"{\"packages");

    let response = get(&app, &[(header::RANGE, "bytes=-2")]).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"}}");

    let response = get(&app, &[(header::RANGE, "bytes=5000-")]).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        format!("bytes */{len}").as_str()
    );

    // A stale If-Range falls back to the full document
    let response = get(
        &app,
        &[
            (header::RANGE, "bytes=0-9"),
            (header::IF_RANGE, "Sun, 06 Nov 1994 08:49:37 GMT"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_last_good_snapshot_survives_failed_cycle() {
    let repo = repository();
    let app = server::router(repo.cache());
    repo.remote()
        .publish(1, "org/a", 100, "1.0.0", "c1", r#"{"name":"org/a"}"#);
    poll_once(&repo);
    let before = to_bytes(get(&app, &[]).await.into_body(), usize::MAX)
        .await
        .unwrap();

    repo.remote().offline.store(true, Ordering::SeqCst);
    poll_once(&repo);
    assert!(repo.update().is_err());

    let response = get(&app, &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let after = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let repo = repository();
    let app = server::router(repo.cache());

    let response = app
        .oneshot(Request::builder().uri("/other.json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
