//! API Server module
//!
//! HTTP surface of taskforge: auth endpoints, task CRUD and task generation.
//! Handlers validate the raw body, call the services and convert
//! [`AppError`] into a status code and `{statusCode, message, data?}` body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::auth::{AuthError, AuthProvider};
use crate::error::AppError;
use crate::generation::GenerationService;
use crate::llm::LlmGateway;
use crate::models::{AuthUser, LoginResponse, SuccessResponse, UserResponse};
use crate::store::{GenerationRepository, TaskRepository};
use crate::tasks::{TaskService, DEFAULT_PAGE_LIMIT};
use crate::validation::{self, FieldErrors};

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// Shared handles given to every handler
#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskService,
    pub generations: GenerationService,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Wires the services over the given store, auth provider and gateway
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        generations: Arc<dyn GenerationRepository>,
        auth: Arc<dyn AuthProvider>,
        gateway: LlmGateway,
    ) -> Self {
        Self {
            tasks: TaskService::new(tasks, generations.clone()),
            generations: GenerationService::new(gateway, generations),
            auth,
        }
    }
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<FieldErrors>,
}

/// Status for each error kind
pub(crate) fn status_of(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::UpstreamProvider(_) | AppError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Message shown to the caller; upstream and internal detail stays in the logs
pub(crate) fn public_message(err: &AppError) -> String {
    match err {
        AppError::Validation(_) => "Invalid request data".to_string(),
        AppError::BadRequest(msg) | AppError::Unauthorized(msg) | AppError::NotFound(msg) => {
            msg.clone()
        }
        AppError::UpstreamProvider(_) => "Failed to generate tasks".to_string(),
        AppError::Internal(_) => "Internal server error".to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_of(&self);
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }
        let body = ErrorBody {
            status_code: status.as_u16(),
            message: public_message(&self),
            data: match self {
                AppError::Validation(fields) => Some(fields),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Unwraps a JSON body, turning extractor rejections into a field error
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::invalid("body", rejection.body_text()))
}

/// Path ids that are not UUIDs can't name an owned task
fn task_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::not_found("Task not found or does not belong to the user"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// The authenticated caller, resolved from the bearer token
pub struct CurrentUser {
    pub user: AuthUser,
    pub access_token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Unauthorized("Unauthorized".to_string());
        let access_token = bearer_token(&parts.headers).ok_or_else(unauthorized)?;
        let user = state
            .auth
            .current_user(&access_token)
            .await
            .map_err(|err| match err {
                AuthError::InvalidSession | AuthError::InvalidCredentials(_) => {
                    tracing::debug!("Rejected bearer token: {}", err);
                    unauthorized()
                }
                other => AppError::from(other),
            })?;
        Ok(Self { user, access_token })
    }
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // --- Auth --- //
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        .route("/api/auth/session", get(session_handler))
        // --- Tasks --- //
        .route("/api/tasks", get(list_tasks_handler).post(create_task_handler))
        .route(
            "/api/tasks/:id",
            put(update_task_handler).delete(delete_task_handler),
        )
        .route("/api/tasks/:id/complete", patch(complete_task_handler))
        // --- Generations --- //
        .route("/api/generations", post(create_generation_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Installs the log subscriber; `RUST_LOG` overrides the `info` default.
///
/// Call once per process, before `serve`; a second call is an error.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()
}

/// Start the API server
pub async fn serve(state: AppState, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    // Start server
    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Auth Handlers --- //

async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let form = validation::validate_login(&json_body(payload)?)?;
    let signed_in = state.auth.sign_in(&form.email, &form.password).await?;
    tracing::info!(user_id = %signed_in.user.id, "User signed in");
    Ok(Json(LoginResponse {
        user: signed_in.user,
        session: signed_in.session,
    }))
}

async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(token) = bearer_token(&headers) {
        state.auth.sign_out(&token).await?;
    }
    Ok(Json(SuccessResponse::ok()))
}

async fn register_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let form = validation::validate_register(&json_body(payload)?)?;
    let user = state.auth.sign_up(&form.email, &form.password).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

async fn forgot_password_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let form = validation::validate_forgot_password(&json_body(payload)?)?;
    state.auth.request_password_reset(&form.email).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn reset_password_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let form = validation::validate_reset_password(&json_body(payload)?)?;
    state
        .auth
        .reset_password(&form.token, &form.new_password)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn session_handler(current: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { user: current.user })
}

// --- Task Handlers --- //

/// Paging parameters; unparseable values fall back to the defaults
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListTasksQuery {
    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }

    fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
    }
}

async fn list_tasks_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListTasksQuery>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .tasks
        .get_tasks(current.user.id, query.page(), query.limit())
        .await?;
    Ok(Json(response))
}

async fn create_task_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let command = validation::validate_create_task(&json_body(payload)?)?;
    let created = state.tasks.create_task(command, current.user.id).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_task_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = task_id(&id)?;
    let command = validation::validate_update_task(&json_body(payload)?)?;
    let updated = state
        .tasks
        .update_task(id, command, current.user.id)
        .await?;
    Ok(Json(updated))
}

async fn delete_task_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = task_id(&id)?;
    Ok(Json(state.tasks.delete_task(id, current.user.id).await?))
}

async fn complete_task_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = task_id(&id)?;
    Ok(Json(state.tasks.complete_task(id, current.user.id).await?))
}

// --- Generation Handlers --- //

async fn create_generation_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let command = validation::validate_generation(&json_body(payload)?)?;
    let response = state
        .generations
        .generate_tasks(current.user.id, &command.description)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}
