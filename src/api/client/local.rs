//! In-process client implementation
//!
//! Calls the services directly on behalf of one user, with the same
//! validation and error shapes as the HTTP client but without the HTTP hop.

use serde::Serialize;
use uuid::Uuid;

use super::{ClientError, TodoClient};
use crate::api::server::{public_message, status_of, AppState};
use crate::error::AppError;
use crate::models::{
    CreateGenerationResponse, CreateTaskCommand, CreateTaskResponse, MessageResponse,
    TaskListResponse, UpdateTaskCommand, UpdateTaskResponse,
};
use crate::validation;

/// A client that wraps the services directly
#[derive(Clone)]
pub struct LocalClient {
    state: AppState,
    user_id: Uuid,
}

impl LocalClient {
    pub fn new(state: AppState, user_id: Uuid) -> Self {
        Self { state, user_id }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Convert AppError to ClientError the way the server would report it
impl From<AppError> for ClientError {
    fn from(err: AppError) -> Self {
        ClientError::Api {
            status: status_of(&err).as_u16(),
            message: public_message(&err),
        }
    }
}

/// Runs a command through the same validator the server uses
fn revalidate<T, C>(
    command: &C,
    validate: fn(&serde_json::Value) -> Result<T, validation::FieldErrors>,
) -> Result<T, ClientError>
where
    C: Serialize,
{
    let body = serde_json::to_value(command)
        .map_err(|err| AppError::invalid("body", err.to_string()))?;
    Ok(validate(&body).map_err(AppError::Validation)?)
}

#[async_trait::async_trait]
impl TodoClient for LocalClient {
    async fn fetch_tasks(&self, page: u32, limit: u32) -> Result<TaskListResponse, ClientError> {
        Ok(self
            .state
            .tasks
            .get_tasks(self.user_id, page as i64, limit as i64)
            .await?)
    }

    async fn create_task(
        &self,
        command: &CreateTaskCommand,
    ) -> Result<CreateTaskResponse, ClientError> {
        let command = revalidate(command, validation::validate_create_task)?;
        Ok(self.state.tasks.create_task(command, self.user_id).await?)
    }

    async fn update_task(
        &self,
        id: Uuid,
        command: &UpdateTaskCommand,
    ) -> Result<UpdateTaskResponse, ClientError> {
        let command = revalidate(command, validation::validate_update_task)?;
        Ok(self
            .state
            .tasks
            .update_task(id, command, self.user_id)
            .await?)
    }

    async fn delete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        Ok(self.state.tasks.delete_task(id, self.user_id).await?)
    }

    async fn complete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        Ok(self.state.tasks.complete_task(id, self.user_id).await?)
    }

    async fn generate(&self, description: &str) -> Result<CreateGenerationResponse, ClientError> {
        let command = validation::validate_generation(&serde_json::json!({
            "description": description,
        }))
        .map_err(AppError::Validation)?;
        Ok(self
            .state
            .generations
            .generate_tasks(self.user_id, &command.description)
            .await?)
    }
}
