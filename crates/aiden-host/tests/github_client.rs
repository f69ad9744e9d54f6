#![cfg(unix)]

mod common;

use aiden_host::{GithubClient, HostError};
use aiden_store::Store;
use axum::extract::{Path, RawQuery};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::process::Command;
use std::sync::Arc;

const GOOD: &str = "ghp_good";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD}"))
}

fn bad_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Bad credentials"})),
    )
        .into_response()
}

async fn user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return bad_credentials();
    }
    Json(json!({
        "login": "octocat",
        "name": "The Octocat",
        "avatar_url": null,
        "html_url": "https://github.com/octocat"
    }))
    .into_response()
}

async fn repos(headers: HeaderMap, RawQuery(query): RawQuery) -> Response {
    if !authorized(&headers) {
        return bad_credentials();
    }
    assert_eq!(query.as_deref(), Some("sort=updated&per_page=100"));
    Json(json!([{
        "id": 1,
        "name": "hello",
        "full_name": "octocat/hello",
        "description": null,
        "private": false,
        "html_url": "https://github.com/octocat/hello",
        "clone_url": "https://github.com/octocat/hello.git",
        "default_branch": "main",
        "updated_at": "2026-01-01T00:00:00Z"
    }]))
    .into_response()
}

async fn branches(headers: HeaderMap, Path((owner, repo)): Path<(String, String)>) -> Response {
    if !authorized(&headers) {
        return bad_credentials();
    }
    if (owner.as_str(), repo.as_str()) != ("octocat", "hello") {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    }
    Json(json!([{"name": "main"}, {"name": "dev"}])).into_response()
}

async fn fake_github() -> String {
    let app = Router::new()
        .route("/user", get(user))
        .route("/user/repos", get(repos))
        .route("/repos/{owner}/{repo}/branches", get(branches));
    common::serve(app).await
}

fn client(api_url: &str) -> (Arc<Store>, GithubClient) {
    let store = Arc::new(Store::in_memory().unwrap());
    let client = GithubClient::new(api_url, store.clone(), "u1");
    (store, client)
}

// ── token handling ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn authenticate_remembers_a_valid_token() {
    let (store, github) = client(&fake_github().await);

    assert_eq!(github.user().await.unwrap(), None);

    let err = github.authenticate("ghp_bad").await.unwrap_err();
    assert!(
        matches!(&err, HostError::Github { status: 401, message } if message == "Bad credentials"),
        "{err:?}"
    );
    assert_eq!(store.settings("u1").unwrap(), None);

    let user = github.authenticate(GOOD).await.unwrap();
    assert_eq!(user.login, "octocat");
    let settings = store.settings("u1").unwrap().unwrap();
    assert_eq!(settings["githubAccessToken"], GOOD);
    assert_eq!(github.user().await.unwrap().unwrap().login, "octocat");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn revoked_token_reads_as_signed_out() {
    let (store, github) = client(&fake_github().await);
    store
        .upsert_settings("u1", json!({"githubAccessToken": "ghp_revoked"}))
        .unwrap();
    assert_eq!(github.user().await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_needs_a_token() {
    let (_store, github) = client(&fake_github().await);
    let err = github.repos().await.unwrap_err();
    assert!(matches!(err, HostError::CredentialMissing(_)), "{err:?}");
    let err = github.branches("octocat", "hello").await.unwrap_err();
    assert!(matches!(err, HostError::CredentialMissing(_)), "{err:?}");
}

// ── listing ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repos_and_branches_are_listed() {
    let (_store, github) = client(&fake_github().await);
    github.authenticate(GOOD).await.unwrap();

    let repos = github.repos().await.unwrap();
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].full_name, "octocat/hello");
    assert_eq!(repos[0].default_branch, "main");

    assert_eq!(
        github.branches("octocat", "hello").await.unwrap(),
        vec!["main".to_string(), "dev".to_string()]
    );
    let err = github.branches("octocat", "missing").await.unwrap_err();
    assert!(matches!(err, HostError::Github { status: 404, .. }), "{err:?}");
}

// ── clone ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clone_without_a_token_is_anonymous() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin");
    let bare = origin.join("octocat").join("hello.git");
    std::fs::create_dir_all(&bare).unwrap();
    let status = Command::new("git")
        .args(["init", "-q", "--bare"])
        .current_dir(&bare)
        .status()
        .unwrap();
    assert!(status.success());

    let (_store, github) = client("http://127.0.0.1:9");
    let github = github.with_clone_base(&format!("file://{}", origin.display()));
    let dest = dir.path().join("work").join("hello");
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();

    let cloned = github.clone_repo("octocat", "hello", &dest, None).await.unwrap();
    assert_eq!(cloned, dest);
    assert!(dest.join(".git").is_dir());

    let err = github
        .clone_repo("octocat", "missing", &dir.path().join("work").join("missing"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Git(_)), "{err:?}");
}
