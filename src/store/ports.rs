//! Repository ports for tasks and generation records.
//!
//! Every lookup is scoped to the owning user; a row owned by someone else is
//! reported exactly like a missing one.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    GenerationErrorLog, GenerationProcess, NewGenerationErrorLog, NewGenerationProcess, NewTask,
    Task,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No row with this id is visible to the user
    #[error("record not found: {0}")]
    NotFound(Uuid),

    /// A stored value could not be mapped back into the domain
    #[error("corrupt record {id}: {message}")]
    Corrupt { id: Uuid, message: String },

    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps an adapter error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts a task with `completed = false`, assigning its id and creation time.
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task>;

    async fn find_task(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<Option<Task>>;

    /// Number of top-level tasks the user owns.
    async fn count_top_level(&self, user_id: Uuid) -> StoreResult<u64>;

    /// One page of top-level tasks, newest first.
    async fn list_top_level(&self, user_id: Uuid, offset: u64, limit: u64)
        -> StoreResult<Vec<Task>>;

    /// All subtasks of the given parents, newest first.
    async fn list_subtasks(&self, user_id: Uuid, parent_ids: &[Uuid]) -> StoreResult<Vec<Task>>;

    /// Replaces title and description; `NotFound` when the user has no such task.
    async fn update_task_content(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> StoreResult<Task>;

    /// Removes the task and, for a top-level task, its direct subtasks in one
    /// transaction. Returns the number of rows removed.
    async fn delete_task_cascade(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<u64>;

    /// Sets the completion flag. With `cascade`, the task's direct subtasks are
    /// set to the same value in the same transaction.
    async fn set_completed(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        completed: bool,
        cascade: bool,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait GenerationRepository: Send + Sync {
    async fn insert_generation(&self, record: NewGenerationProcess)
        -> StoreResult<GenerationProcess>;

    async fn find_generation(
        &self,
        user_id: Uuid,
        generation_id: Uuid,
    ) -> StoreResult<Option<GenerationProcess>>;

    async fn insert_error_log(&self, record: NewGenerationErrorLog)
        -> StoreResult<GenerationErrorLog>;
}
