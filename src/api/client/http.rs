//! HTTP client implementation

use std::sync::Arc;

use reqwest::{Client as ReqwestClient, Error as ReqwestError, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use super::TodoClient;
use crate::api::server::ErrorBody;
use crate::models::{
    CreateGenerationResponse, CreateTaskCommand, CreateTaskResponse, LoginResponse,
    MessageResponse, SuccessResponse, TaskListResponse, UpdateTaskCommand, UpdateTaskResponse,
    UserResponse,
};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bearer token sent with every request
    pub access_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            access_token: None,
        }
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    /// The server answered with an error status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A subtask was refused because its parent is full
    #[error("A task can have at most {0} subtasks")]
    SubtaskLimit(usize),

    #[error("Task not found in the local tree: {0}")]
    UnknownTask(Uuid),
}

impl ClientError {
    /// HTTP status when the server produced the error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// API client for the taskforge service
#[derive(Debug, Clone)]
pub struct HttpClient {
    http_client: Arc<ReqwestClient>,
    config: ClientConfig,
}

impl HttpClient {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Decodes a success body, or turns the error body into `ClientError::Api`
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Unknown API error")
                .to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Sign in; the returned access token is what `ClientConfig::access_token` expects
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let response = self
            .http_client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn logout(&self) -> Result<SuccessResponse, ClientError> {
        let request = self.authorized(self.http_client.post(self.url("/api/auth/logout")));
        Self::decode(request.send().await?).await
    }

    /// The user the configured token belongs to
    pub async fn session(&self) -> Result<UserResponse, ClientError> {
        let request = self.authorized(self.http_client.get(self.url("/api/auth/session")));
        Self::decode(request.send().await?).await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TodoClient for HttpClient {
    async fn fetch_tasks(&self, page: u32, limit: u32) -> Result<TaskListResponse, ClientError> {
        let request = self
            .authorized(self.http_client.get(self.url("/api/tasks")))
            .query(&[("page", page), ("limit", limit)]);
        Self::decode(request.send().await?).await
    }

    async fn create_task(
        &self,
        command: &CreateTaskCommand,
    ) -> Result<CreateTaskResponse, ClientError> {
        let request = self
            .authorized(self.http_client.post(self.url("/api/tasks")))
            .json(command);
        Self::decode(request.send().await?).await
    }

    async fn update_task(
        &self,
        id: Uuid,
        command: &UpdateTaskCommand,
    ) -> Result<UpdateTaskResponse, ClientError> {
        let request = self
            .authorized(self.http_client.put(self.url(&format!("/api/tasks/{}", id))))
            .json(command);
        Self::decode(request.send().await?).await
    }

    async fn delete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let request =
            self.authorized(self.http_client.delete(self.url(&format!("/api/tasks/{}", id))));
        Self::decode(request.send().await?).await
    }

    async fn complete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let request = self.authorized(
            self.http_client
                .patch(self.url(&format!("/api/tasks/{}/complete", id))),
        );
        Self::decode(request.send().await?).await
    }

    async fn generate(&self, description: &str) -> Result<CreateGenerationResponse, ClientError> {
        let request = self
            .authorized(self.http_client.post(self.url("/api/generations")))
            .json(&json!({ "description": description }));
        Self::decode(request.send().await?).await
    }
}
