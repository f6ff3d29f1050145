//! Core models for the taskforge library
//!
//! This module contains the stored records (tasks, generation processes and
//! their error log) and the JSON shapes exchanged over the HTTP API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance tag carried by every task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Typed in by the user
    Manual,
    /// Accepted unchanged from a generation
    AiFull,
    /// Accepted from a generation after the user edited it
    AiEdited,
}

impl TaskSource {
    pub const ALL: [TaskSource; 3] = [TaskSource::AiFull, TaskSource::AiEdited, TaskSource::Manual];

    /// Returns the wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Manual => "manual",
            TaskSource::AiFull => "ai_full",
            TaskSource::AiEdited => "ai_edited",
        }
    }

    /// True for the sources that must reference a generation
    pub fn is_ai_derived(&self) -> bool {
        matches!(self, TaskSource::AiFull | TaskSource::AiEdited)
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored or submitted source tag is unknown
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task source: {0}")]
pub struct ParseTaskSourceError(pub String);

impl FromStr for TaskSource {
    type Err = ParseTaskSourceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "manual" => Ok(TaskSource::Manual),
            "ai_full" => Ok(TaskSource::AiFull),
            "ai_edited" => Ok(TaskSource::AiEdited),
            other => Err(ParseTaskSourceError(other.to_string())),
        }
    }
}

// --- Stored records --- //

/// A task row as held by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub parent_task_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub position: i32,
}

impl Task {
    /// Returns true when the task has no parent
    pub fn is_top_level(&self) -> bool {
        self.parent_task_id.is_none()
    }
}

/// Insert payload for a task; the store assigns the id and creation time
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub parent_task_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub position: i32,
}

/// One recorded invocation of the LLM gateway
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationProcess {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model: String,
    pub source_text_hash: String,
    pub duration_ms: i64,
    pub generated_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGenerationProcess {
    pub user_id: Uuid,
    pub model: String,
    pub source_text_hash: String,
    pub duration_ms: i64,
    pub generated_count: i32,
}

/// Append-only record of a failed generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationErrorLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_text_hash: String,
    pub model: String,
    pub error_code: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGenerationErrorLog {
    pub user_id: Uuid,
    pub source_text_hash: String,
    pub model: String,
    pub error_code: String,
    pub error_message: String,
}

// --- Commands --- //

/// Validated input for task creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskCommand {
    pub title: String,
    pub description: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub source: TaskSource,
    pub generation_id: Option<Uuid>,
}

impl CreateTaskCommand {
    /// A top-level manual task
    pub fn manual(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            title: title.into(),
            description,
            parent_task_id: None,
            source: TaskSource::Manual,
            generation_id: None,
        }
    }

    /// Places the task under the given parent
    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }
}

/// Validated input for a task edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskCommand {
    pub title: String,
    pub description: Option<String>,
}

/// Validated input for a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateTasksCommand {
    pub description: String,
}

// --- Responses --- //

/// A subtask as listed under its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for SubtaskItem {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            source: task.source,
            completed: task.completed,
            created_at: task.created_at,
        }
    }
}

/// A top-level task with its subtasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub subtasks: Vec<SubtaskItem>,
}

impl TaskListItem {
    pub fn from_task(task: &Task, subtasks: Vec<SubtaskItem>) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            source: task.source,
            completed: task.completed,
            created_at: task.created_at,
            subtasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// `GET /api/tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskListItem>,
    pub pagination: Pagination,
}

/// `POST /api/tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for CreateTaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            source: task.source,
            created_at: task.created_at,
        }
    }
}

/// `PUT /api/tasks/{id}`; `updated_at` is synthesized, not stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Body of the delete and complete endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A generated, not yet persisted, task candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProposal {
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
}

/// `POST /api/generations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGenerationResponse {
    pub generation_id: Uuid,
    pub tasks: Vec<GenerationProposal>,
    #[serde(rename = "generated_count")]
    pub generated_count: i32,
    pub created_at: DateTime<Utc>,
}

// --- Auth --- //

/// The authenticated user as exposed by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Session tokens issued on sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `POST /api/auth/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: AuthUser,
    pub session: AuthSession,
}

/// `POST /api/auth/register` and `GET /api/auth/session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: AuthUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
