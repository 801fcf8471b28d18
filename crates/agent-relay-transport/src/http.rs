//! JSON control surface.

use std::sync::Arc;

use agent_relay_core::{EventHub, Executor};
use agent_relay_session::SessionRegistry;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    protocol::{
        CreateSessionRequest, CreateSessionResponse, HealthResponse, ListSessionsResponse,
        TerminateSessionResponse,
    },
    sse::events_handler,
    websocket::ws_handler,
};

/// State shared by every handler.
pub struct AppState<E>
where
    E: Executor,
{
    pub registry: Arc<SessionRegistry<E>>,
}

impl<E> AppState<E>
where
    E: Executor,
{
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry<E>>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<EventHub> {
        self.registry.hub()
    }
}

impl<E> Clone for AppState<E>
where
    E: Executor,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Router for the control surface and both event channels.
pub fn create_router<E>(state: AppState<E>) -> Router
where
    E: Executor + 'static,
{
    Router::new()
        .route(
            "/api/sessions",
            get(list_sessions::<E>).post(create_session::<E>),
        )
        .route("/api/sessions/{id}", delete(terminate_session::<E>))
        .route("/api/health", get(health::<E>))
        .route("/api/events", get(events_handler::<E>))
        .route("/ws", get(ws_handler::<E>))
        .with_state(state)
}

async fn create_session<E>(
    State(state): State<AppState<E>>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError>
where
    E: Executor + 'static,
{
    let Json(req) = body.map_err(|e| ApiError::invalid_argument(e.body_text()))?;
    let session_id = state
        .registry
        .create_session(&req.prompt, req.working_directory)
        .await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

async fn list_sessions<E>(State(state): State<AppState<E>>) -> Json<ListSessionsResponse>
where
    E: Executor + 'static,
{
    Json(ListSessionsResponse {
        sessions: state.registry.list_sessions().await,
    })
}

async fn terminate_session<E>(
    State(state): State<AppState<E>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TerminateSessionResponse>), ApiError>
where
    E: Executor + 'static,
{
    let session_id =
        Uuid::parse_str(&id).map_err(|_| ApiError::not_found(format!("Session not found: {id}")))?;
    state.registry.terminate_session(session_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TerminateSessionResponse {
            session_id,
            status: "terminating",
        }),
    ))
}

async fn health<E>(State(state): State<AppState<E>>) -> Json<HealthResponse>
where
    E: Executor + 'static,
{
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.active_count().await,
        observers: state.hub().observer_count(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use agent_relay_core::{EventKind, ExecutionContext, ExecutorError, SpawnedProcess};
    use agent_relay_executor::spawn_resolved;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, Response, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    struct ScriptExecutor(&'static str);

    #[async_trait]
    impl Executor for ScriptExecutor {
        async fn spawn(
            &self,
            ctx: &ExecutionContext,
            _prompt: &str,
        ) -> Result<SpawnedProcess, ExecutorError> {
            spawn_resolved("sh", &["-c".to_string(), self.0.to_string()], &ctx.working_dir).await
        }
    }

    fn app(script: &'static str, dir: &std::path::Path) -> (Router, Arc<SessionRegistry<ScriptExecutor>>) {
        let registry = Arc::new(SessionRegistry::new(
            ScriptExecutor(script),
            Arc::new(EventHub::new()),
            dir,
        ));
        (create_router(AppState::new(Arc::clone(&registry))), registry)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app("true", dir.path());

        let response = app.oneshot(request("GET", "/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"status": "ok", "activeSessions": 0, "observers": 0})
        );
    }

    #[tokio::test]
    async fn test_create_rejects_empty_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let (app, registry) = app("true", dir.path());

        let response = app
            .oneshot(post_json("/api/sessions", r#"{"prompt":""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "invalid_argument");
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_body() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app("true", dir.path());

        let response = app
            .oneshot(post_json("/api/sessions", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let (app, registry) = app("true", dir.path());

        let response = app
            .oneshot(post_json(
                "/api/sessions",
                r#"{"prompt":"hi","workingDirectory":"does-not-exist"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"]["code"], "spawn_failed");
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, registry) = app("sleep 30", dir.path());
        let mut rx = registry.hub().subscribe();

        let response = app
            .clone()
            .oneshot(post_json("/api/sessions", r#"{"prompt":"wait here"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["sessionId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(request("GET", "/api/sessions"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let sessions = body["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], id.as_str());
        assert_eq!(sessions[0]["prompt"], "wait here");
        assert!(sessions[0]["startedAt"].is_string());
        assert!(sessions[0]["workingDirectory"].is_string());

        let response = app
            .clone()
            .oneshot(request("DELETE", &format!("/api/sessions/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            json_body(response).await,
            json!({"sessionId": id.clone(), "status": "terminating"})
        );

        let ended = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = rx.recv().await.unwrap();
                if matches!(event.kind, EventKind::SessionEnd { .. }) {
                    break event;
                }
            }
        })
        .await
        .expect("session did not end");
        assert_eq!(ended.session_id.map(|s| s.to_string()), Some(id));
    }

    #[tokio::test]
    async fn test_terminate_unknown_or_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app("true", dir.path());

        let unknown = format!("/api/sessions/{}", Uuid::new_v4());
        for uri in [unknown.as_str(), "/api/sessions/not-a-uuid"] {
            let response = app.clone().oneshot(request("DELETE", uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(response).await["error"]["code"], "not_found");
        }
    }

    #[tokio::test]
    async fn test_events_endpoint_is_sse() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app("true", dir.path());

        let response = app.oneshot(request("GET", "/api/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
    }

    #[tokio::test]
    async fn test_events_response_ends_when_hub_closes() {
        let dir = tempfile::tempdir().unwrap();
        let (app, registry) = app("true", dir.path());

        let response = app.oneshot(request("GET", "/api/events")).await.unwrap();
        registry.hub().close();

        let body = tokio::time::timeout(Duration::from_secs(5), response.into_body().collect())
            .await
            .expect("event stream did not end after close");
        assert!(body.is_ok());
    }
}
