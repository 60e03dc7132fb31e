//! HTTP transport.
//!
//! JSON endpoints over the admission policy plus `/health` and the Prometheus
//! `/metrics` endpoint. Each handler is a thin translation: parse the body,
//! call the policy, map the outcome onto a status code.

use crate::error::{ErrorKind, GuardError};
use crate::metrics;
use crate::security::admission::AdmissionPolicy;
use crate::security::buckets::{KeyType, ParseKeyTypeError};
use crate::security::ip_range::IpRange;
use crate::telemetry::RequestTimer;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{error, warn};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    policy: AdmissionPolicy,
    admin_timeout: Duration,
}

impl AppState {
    pub fn new(policy: AdmissionPolicy, admin_timeout: Duration) -> Self {
        Self {
            policy,
            admin_timeout,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.admin_timeout
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub ip: String,
    pub login: String,
    pub password: String,
}

/// Prefix length as sent by clients: `24` and `"24"` are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MaskField {
    Number(u64),
    Text(String),
}

impl MaskField {
    fn as_text(&self) -> String {
        match self {
            MaskField::Number(n) => n.to_string(),
            MaskField::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RangeRequest {
    pub ip: String,
    pub mask: MaskField,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub kind: String,
    pub key: String,
}

// ============================================================================
// Errors
// ============================================================================

/// A failed request, tagged with the operation for metrics.
#[derive(Debug)]
pub enum ApiError {
    Guard {
        op: &'static str,
        source: GuardError,
    },
    UnknownKind(ParseKeyTypeError),
    /// Body was not JSON or did not match the request shape.
    InvalidBody(JsonRejection),
}

impl ApiError {
    fn guard(op: &'static str) -> impl FnOnce(GuardError) -> ApiError {
        move |source| ApiError::Guard { op, source }
    }
}

/// Status code for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Guard { op, source } => {
                metrics::record_error(op, source.error_code());
                let kind = source.kind();
                let message = match kind {
                    ErrorKind::StorageFailure => {
                        error!(op, error = %source, "request failed");
                        "storage unavailable".to_string()
                    }
                    ErrorKind::InvalidInput | ErrorKind::Conflict | ErrorKind::Cancelled => {
                        warn!(op, error = %source, "request rejected");
                        source.to_string()
                    }
                    ErrorKind::NotFound => source.to_string(),
                };
                (status_for(kind), source.error_code(), message)
            }
            ApiError::UnknownKind(e) => {
                metrics::record_error("bucket_reset", "invalid_kind");
                (StatusCode::BAD_REQUEST, "invalid_kind", e.to_string())
            }
            ApiError::InvalidBody(rejection) => {
                metrics::record_error("request", "invalid_request");
                let message = rejection.body_text();
                warn!(error = %message, "malformed request body");
                (StatusCode::BAD_REQUEST, "invalid_request", message)
            }
        };

        let body = json!({ "error": { "code": code, "message": message } });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `Json` extractor whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ApiError::InvalidBody)?;
        Ok(ApiJson(value))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn auth(State(state): State<AppState>, ApiJson(req): ApiJson<AuthRequest>) -> ApiResult<Json<Value>> {
    let _timer = RequestTimer::new("auth");
    let ok = state
        .policy
        .authorize(&req.ip, &req.login, &req.password)
        .await
        .map_err(ApiError::guard("auth"))?;
    Ok(Json(json!({ "ok": ok })))
}

async fn add_white(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RangeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let _timer = RequestTimer::new("whitelist_add");
    state
        .policy
        .add_white(&req.ip, &req.mask.as_text(), state.deadline())
        .await
        .map_err(ApiError::guard("whitelist_add"))?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "added" }))))
}

async fn add_black(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RangeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let _timer = RequestTimer::new("blacklist_add");
    state
        .policy
        .add_black(&req.ip, &req.mask.as_text(), state.deadline())
        .await
        .map_err(ApiError::guard("blacklist_add"))?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "added" }))))
}

async fn del_white(State(state): State<AppState>, Path(ip): Path<String>) -> ApiResult<Json<Value>> {
    let _timer = RequestTimer::new("whitelist_remove");
    state
        .policy
        .del_white(&ip, state.deadline())
        .await
        .map_err(ApiError::guard("whitelist_remove"))?;
    Ok(Json(json!({ "status": "removed" })))
}

async fn del_black(State(state): State<AppState>, Path(ip): Path<String>) -> ApiResult<Json<Value>> {
    let _timer = RequestTimer::new("blacklist_remove");
    state
        .policy
        .del_black(&ip, state.deadline())
        .await
        .map_err(ApiError::guard("blacklist_remove"))?;
    Ok(Json(json!({ "status": "removed" })))
}

async fn list_white(State(state): State<AppState>) -> Json<Vec<IpRange>> {
    let _timer = RequestTimer::new("whitelist_list");
    Json(state.policy.list_white())
}

async fn list_black(State(state): State<AppState>) -> Json<Vec<IpRange>> {
    let _timer = RequestTimer::new("blacklist_list");
    Json(state.policy.list_black())
}

async fn reset_bucket(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetRequest>,
) -> ApiResult<Json<Value>> {
    let _timer = RequestTimer::new("bucket_reset");
    let kind: KeyType = req.kind.parse().map_err(ApiError::UnknownKind)?;
    state
        .policy
        .reset_bucket(kind, &req.key, state.deadline())
        .await
        .map_err(ApiError::guard("bucket_reset"))?;
    Ok(Json(json!({ "status": "reset" })))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

// ============================================================================
// Server
// ============================================================================

/// Build the router. `/metrics` is mounted only when `expose_metrics` is set.
pub fn router(state: AppState, expose_metrics: bool) -> Router {
    let mut app = Router::new()
        .route("/auth", post(auth))
        .route("/whitelist", get(list_white).post(add_white))
        .route("/whitelist/:ip", delete(del_white))
        .route("/blacklist", get(list_black).post(add_black))
        .route("/blacklist/:ip", delete(del_black))
        .route("/buckets/reset", post(reset_bucket))
        .route("/health", get(health));
    if expose_metrics {
        app = app.route("/metrics", get(metrics_handler));
    }
    app.with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain in-flight requests.
pub async fn run_http_server<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
