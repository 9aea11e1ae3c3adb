//! HTTP routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use shellgate_core::{
    AuditFilter, AuditRecord, AuditStatus, BrokerError, BrokerStorage, ErrorKind, RemoteConnector,
    SessionHandle, Target, TargetPatch, TargetSummary,
};
use shellgate_session::{
    CreatedSession, SessionManager, SessionSnapshot, TargetQuery, TargetRegistry,
};
use shellgate_transport::{Bridge, websocket::create_ws_router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::page::TERMINAL_HTML;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: TargetRegistry<dyn BrokerStorage>,
    pub sessions: Arc<SessionManager<dyn BrokerStorage>>,
}

/// Build the full router.
pub fn router(state: AppState, bridge: Bridge<dyn BrokerStorage, dyn RemoteConnector>) -> Router {
    Router::new()
        .route("/api/targets", get(list_targets).post(create_target))
        .route(
            "/api/targets/{id}",
            get(get_target).patch(update_target).delete(delete_target),
        )
        .route("/api/resolve", get(resolve_target))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/audit", get(list_audit))
        .route("/terminal/{handle}", get(terminal_page))
        .with_state(state)
        .merge(create_ws_router(bridge))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// [`BrokerError`] as an HTTP response.
#[derive(Debug)]
pub struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    candidates: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Ambiguous => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamUnavailable | ErrorKind::AuthenticationFailed => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "Request failed");
        }

        let candidates = match &self.0 {
            BrokerError::NotFound { suggestions, .. } => suggestions.clone(),
            BrokerError::Ambiguous { candidates, .. } => candidates.clone(),
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: kind.code(),
            message: self.0.to_string(),
            candidates,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn list_targets(State(state): State<AppState>) -> ApiResult<Json<Vec<TargetSummary>>> {
    let targets = state.registry.list().await?;
    Ok(Json(targets.iter().map(TargetSummary::from).collect()))
}

async fn create_target(
    State(state): State<AppState>,
    Json(target): Json<Target>,
) -> ApiResult<(StatusCode, Json<TargetSummary>)> {
    let target = state.registry.create(target).await?;
    Ok((StatusCode::CREATED, Json(TargetSummary::from(&target))))
}

async fn get_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TargetSummary>> {
    let target = state.registry.get(&id).await?;
    Ok(Json(TargetSummary::from(&target)))
}

async fn update_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TargetPatch>,
) -> ApiResult<Json<TargetSummary>> {
    let target = state.registry.update(&id, patch).await?;
    Ok(Json(TargetSummary::from(&target)))
}

async fn delete_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ResolveParams {
    q: Option<String>,
}

async fn resolve_target(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> ApiResult<Json<TargetSummary>> {
    let query = TargetQuery::from_parts(None, params.q);
    let target = state.registry.resolve(&query).await?;
    Ok(Json(TargetSummary::from(&target)))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    /// Exact target id.
    target: Option<String>,
    /// Free-text hint, used when `target` is absent.
    hint: Option<String>,
    #[serde(default)]
    reason: String,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CreatedSession>)> {
    if request.reason.trim().is_empty() {
        return Err(BrokerError::Validation("reason is required".to_string()).into());
    }
    let query = TargetQuery::from_parts(request.target, request.hint);
    let target = state.registry.resolve(&query).await?;
    let created = state
        .sessions
        .create_session(&target.id, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.sessions.live_sessions())
}

#[derive(Debug, Deserialize)]
struct AuditParams {
    target: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<AuditStatus>)
        .transpose()
        .map_err(BrokerError::Validation)?;
    let filter = AuditFilter {
        target_id: params.target,
        status,
        limit: params.limit,
    };
    Ok(Json(state.sessions.audit_records(filter).await?))
}

async fn terminal_page(
    State(state): State<AppState>,
    Path(handle): Path<SessionHandle>,
) -> ApiResult<Html<&'static str>> {
    state
        .sessions
        .lookup(handle)
        .ok_or_else(|| BrokerError::not_found(format!("Session {handle}")))?;
    Ok(Html(TERMINAL_HTML))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::{Value, json};
    use shellgate_session::{SessionConfig, storage::MemoryStorage};
    use shellgate_ssh::{SshConfig, SshConnector};
    use shellgate_transport::BridgeConfig;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        app_with_sessions().0
    }

    fn app_with_sessions() -> (Router, Arc<SessionManager<dyn BrokerStorage>>) {
        let storage: Arc<dyn BrokerStorage> = Arc::new(MemoryStorage::new());
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&storage),
            SessionConfig::default().public_base_url("https://gate.example.com"),
        ));
        let connector: Arc<dyn RemoteConnector> = Arc::new(SshConnector::new(SshConfig::default()));
        let bridge = Bridge::new(Arc::clone(&sessions), connector, BridgeConfig::default());
        let app = router(
            AppState {
                registry: TargetRegistry::new(storage),
                sessions: Arc::clone(&sessions),
            },
            bridge,
        );
        (app, sessions)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn seeded() -> Router {
        let app = app();
        seed_target(&app).await;
        app
    }

    async fn seed_target(app: &Router) {
        let (status, _) = call(
            app,
            "POST",
            "/api/targets",
            Some(json!({
                "id": "prod-a",
                "host": "10.0.0.5",
                "username": "root",
                "displayName": "prod",
                "password": "hunter2"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_target_listing_hides_credentials() {
        let app = seeded().await;
        let (status, body) = call(&app, "GET", "/api/targets", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "prod-a");
        assert_eq!(body[0]["hasPassword"], true);
        assert!(body[0].get("password").is_none());
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_target_crud_errors() {
        let app = seeded().await;

        let (status, body) = call(&app, "GET", "/api/targets/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, body) = call(
            &app,
            "POST",
            "/api/targets",
            Some(json!({"id": "prod-a", "host": "h", "username": "u"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = call(
            &app,
            "PATCH",
            "/api/targets/prod-a",
            Some(json!({"port": 2222, "password": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["port"], 2222);
        assert_eq!(body["hasPassword"], false);

        let (status, _) = call(&app, "DELETE", "/api/targets/prod-a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", "/api/targets/prod-a", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resolve_by_hint() {
        let app = seeded().await;

        let (status, body) = call(&app, "GET", "/api/resolve?q=PROD", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "prod-a");

        let (status, body) = call(&app, "GET", "/api/resolve?q=stage", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["candidates"], json!(["prod (prod-a)"]));
        assert!(body["message"].as_str().unwrap().contains("prod (prod-a)"));

        let (status, body) = call(&app, "GET", "/api/resolve", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "prod-a");
    }

    #[tokio::test]
    async fn test_ambiguous_hint_is_conflict() {
        let app = seeded().await;
        call(
            &app,
            "POST",
            "/api/targets",
            Some(json!({"id": "prod-b", "host": "10.0.0.6", "username": "root"})),
        )
        .await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({"hint": "prod-", "reason": "deploy"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "ambiguous");
        assert_eq!(body["candidates"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_session_flow() {
        let app = seeded().await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({"hint": "prod", "reason": "incident-123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let handle = body["handle"].as_str().unwrap().to_string();
        assert_eq!(
            body["attachUrl"],
            format!("https://gate.example.com/terminal/{handle}")
        );

        let (status, body) = call(&app, "GET", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["handle"], handle.as_str());
        assert_eq!(body[0]["state"], "created");
        assert_eq!(body[0]["attachments"], 0);

        let (status, body) = call(&app, "GET", "/api/audit?status=connected", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["reason"], "incident-123");
        assert_eq!(body[0]["endTime"], Value::Null);

        let request = Request::get(format!("/terminal/{handle}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_session_request_validation() {
        let app = seeded().await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({"target": "prod-a", "reason": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({"target": "nope", "reason": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", "/api/audit?status=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) = call(&app, "GET", "/api/audit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_terminal_is_not_found() {
        let app = app();
        let (status, _) = call(
            &app,
            "GET",
            &format!("/terminal/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_spent_session_terminal_is_not_found() {
        let (app, sessions) = app_with_sessions();
        seed_target(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({"target": "prod-a", "reason": "incident-123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let handle: SessionHandle = body["handle"].as_str().unwrap().parse().unwrap();

        sessions.admit(handle).await.unwrap();
        sessions
            .release(handle, shellgate_core::SessionOutcome::Disconnected)
            .await
            .unwrap();

        let (status, _) = call(&app, "GET", &format!("/terminal/{handle}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/api/sessions", None).await;
        assert_eq!(body[0]["state"], "closed");
        assert_eq!(body[0]["outcome"], "disconnected");
    }
}
