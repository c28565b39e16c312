use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use db::{
    DBService,
    models::user::{ApiToken, User},
    test_utils::{Fixture, create_test_pool, seed_fixture, seed_user},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{AppState, routes};
use services::services::config::Config;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    pool: SqlitePool,
    fixture: Fixture,
    token: String,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let (pool, temp_dir) = create_test_pool().await;
        let fixture = seed_fixture(&pool).await;
        let token = issue_token(&pool, &fixture.user).await;
        let state = AppState::new(DBService::from_pool(pool.clone()), Config::default());
        Self {
            router: routes::router(state),
            pool,
            fixture,
            token,
            _temp_dir: temp_dir,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(&self.token), None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(&self.token), Some(body)).await
    }

    async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PUT, uri, Some(&self.token), Some(body)).await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(&self.token), None).await
    }

    fn workspace_uri(&self, rest: &str) -> String {
        format!("/api/workspaces/{}{rest}", self.fixture.workspace.id)
    }

    /// Todo/Done statuses in a pipeline, returning `(pipeline_id, todo_id, done_id)`.
    async fn board(&self) -> (String, String, String) {
        let (_, todo) = self
            .post(&self.workspace_uri("/statuses"), json!({ "name": "Todo" }))
            .await;
        let (_, done) = self
            .post(
                &self.workspace_uri("/statuses"),
                json!({ "name": "Done", "is_completed": true }),
            )
            .await;
        let todo_id = todo["data"]["id"].as_str().unwrap().to_string();
        let done_id = done["data"]["id"].as_str().unwrap().to_string();

        let (status, pipeline) = self
            .post(
                &self.workspace_uri("/pipelines"),
                json!({ "name": "Board", "status_ids": [todo_id, done_id] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let pipeline_id = pipeline["data"]["id"].as_str().unwrap().to_string();
        (pipeline_id, todo_id, done_id)
    }

    async fn project(&self, name: &str, pipeline_id: Option<&str>) -> String {
        let (status, body) = self
            .post(
                &self.workspace_uri("/projects"),
                json!({ "name": name, "pipeline_id": pipeline_id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

async fn issue_token(pool: &SqlitePool, user: &User) -> String {
    ApiToken::issue(pool, user.id, "tests")
        .await
        .unwrap()
        .plain_text
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database_ready"], true);
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/workspaces", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthenticated.");

    let (status, _) = app
        .call(Method::GET, "/api/workspaces", Some("orb_not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_project_and_validation_errors() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(&app.workspace_uri("/projects"), json!({ "name": "" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["errors"]["name"].is_array());

    let id = app.project("Website", None).await;
    let (status, body) = app.get(&format!("/api/projects/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Website");
}

#[tokio::test]
async fn test_undecodable_body_is_keyed_by_field() {
    let app = TestApp::new().await;
    let uri = app.workspace_uri("/projects");

    let (status, body) = app.post(&uri, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"]["name"][0], "The name field is required.");

    let (status, body) = app.post(&uri, json!({ "name": 5 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["name"].is_array());
}

#[tokio::test]
async fn test_null_clears_nullable_task_fields() {
    let app = TestApp::new().await;
    let project_id = app.project("Roadmap", None).await;
    let tasks_uri = format!("/api/projects/{project_id}/tasks");

    let (_, parent) = app.post(&tasks_uri, json!({ "title": "Epic" })).await;
    let parent_id = parent["data"]["id"].as_str().unwrap().to_string();
    let (status, child) = app
        .post(
            &tasks_uri,
            json!({ "title": "Story", "parent_id": parent_id, "due_on": "2025-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let child_uri = format!("/api/tasks/{}", child["data"]["id"].as_str().unwrap());

    let (status, body) = app.put(&child_uri, json!({ "title": "Story v2" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["parent_id"], parent_id.as_str());
    assert_eq!(body["data"]["due_on"], "2025-01-01");

    let (status, body) = app
        .put(&child_uri, json!({ "parent_id": null, "due_on": null }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["parent_id"].is_null());
    assert!(body["data"]["due_on"].is_null());
    assert_eq!(body["data"]["title"], "Story v2");
}

#[tokio::test]
async fn test_other_workspace_is_forbidden() {
    let app = TestApp::new().await;
    let project_id = app.project("Secret", None).await;

    let outsider = seed_user(&app.pool, "Eve").await;
    let outsider_token = issue_token(&app.pool, &outsider).await;

    let (status, _) = app
        .call(
            Method::GET,
            &app.workspace_uri("/projects"),
            Some(&outsider_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/projects/{project_id}"),
            Some(&outsider_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_project_list_is_paginated() {
    let app = TestApp::new().await;
    for name in ["Alpha", "Beta", "Gamma"] {
        app.project(name, None).await;
    }

    let path = app.workspace_uri("/projects");
    let (status, body) = app.get(&format!("{path}?per_page=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["last_page"], 2);
    assert_eq!(body["meta"]["path"], path);
    assert_eq!(body["links"]["next"], format!("{path}?page=2&per_page=2"));
    assert!(body["links"]["prev"].is_null());

    let (_, body) = app.get(&format!("{path}?page=2&per_page=2")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["from"], 3);
}

#[tokio::test]
async fn test_reorder_requires_every_status_once() {
    let app = TestApp::new().await;
    let (pipeline_id, todo_id, done_id) = app.board().await;
    let uri = format!("/api/pipelines/{pipeline_id}/reorder");

    let (status, body) = app.post(&uri, json!({ "status_ids": [todo_id] })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["status_ids"].is_array());

    let (status, body) = app
        .post(&uri, json!({ "status_ids": [done_id, todo_id] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], done_id.as_str());
    assert_eq!(body["data"][0]["position"], 0);
    assert_eq!(body["data"][1]["position"], 1);
}

#[tokio::test]
async fn test_complete_task_moves_to_done() {
    let app = TestApp::new().await;
    let (pipeline_id, todo_id, done_id) = app.board().await;
    let project_id = app.project("Launch", Some(&pipeline_id)).await;

    let (status, body) = app
        .post(
            &format!("/api/projects/{project_id}/tasks"),
            json!({ "title": "Ship it" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status_id"], todo_id.as_str());
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(&format!("/api/tasks/{task_id}/complete"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["task"]["status_id"], done_id.as_str());
    assert!(body["data"]["next_occurrence"].is_null());
}

#[tokio::test]
async fn test_deleted_task_is_hidden() {
    let app = TestApp::new().await;
    let project_id = app.project("Cleanup", None).await;
    let (_, body) = app
        .post(
            &format!("/api/projects/{project_id}/tasks"),
            json!({ "title": "Temporary" }),
        )
        .await;
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app.delete(&format!("/api/tasks/{task_id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/tasks/{task_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get(&format!("/api/projects/{project_id}/tasks")).await;
    assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn test_comment_on_task_and_author_delete() {
    let app = TestApp::new().await;
    let project_id = app.project("Chatter", None).await;
    let (_, body) = app
        .post(
            &format!("/api/projects/{project_id}/tasks"),
            json!({ "title": "Discuss" }),
        )
        .await;
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &format!("/api/comments?entity_type=task&entity_id={task_id}"),
            json!({ "body": "Looks good" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .get(&format!("/api/comments?entity_type=task&entity_id={task_id}"))
        .await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["body"], "Looks good");

    let (status, _) = app.delete(&format!("/api/comments/{comment_id}")).await;
    assert_eq!(status, StatusCode::OK);
}
