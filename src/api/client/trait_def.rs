//! Client trait definition
//!
//! This module defines the `TodoClient` trait that abstracts over the HTTP
//! and in-process client implementations.

use uuid::Uuid;

use super::ClientError;
use crate::models::{
    CreateGenerationResponse, CreateTaskCommand, CreateTaskResponse, MessageResponse,
    TaskListResponse, UpdateTaskCommand, UpdateTaskResponse,
};

/// Operations the client-side containers need from the API
#[async_trait::async_trait]
pub trait TodoClient: Send + Sync {
    /// Fetch one page of top-level tasks with their subtasks
    async fn fetch_tasks(&self, page: u32, limit: u32) -> Result<TaskListResponse, ClientError>;

    /// Create a task or subtask
    async fn create_task(
        &self,
        command: &CreateTaskCommand,
    ) -> Result<CreateTaskResponse, ClientError>;

    /// Replace a task's title and description
    async fn update_task(
        &self,
        id: Uuid,
        command: &UpdateTaskCommand,
    ) -> Result<UpdateTaskResponse, ClientError>;

    /// Delete a task (and its subtasks when top-level)
    async fn delete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError>;

    /// Toggle completion
    async fn complete_task(&self, id: Uuid) -> Result<MessageResponse, ClientError>;

    /// Ask for task proposals
    async fn generate(&self, description: &str) -> Result<CreateGenerationResponse, ClientError>;
}
