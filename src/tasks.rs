//! Task service
//!
//! CRUD over the two-level task hierarchy, scoped to the authenticated user.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    CreateTaskCommand, CreateTaskResponse, MessageResponse, NewTask, Pagination, SubtaskItem,
    Task, TaskListItem, TaskListResponse, UpdateTaskCommand, UpdateTaskResponse,
};
use crate::store::{GenerationRepository, TaskRepository};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

const TASK_NOT_FOUND: &str = "Task not found or does not belong to the user";
const PARENT_NOT_FOUND: &str = "Parent task not found or does not belong to the user";
const GENERATION_NOT_FOUND: &str = "Generation not found or does not belong to the user";
const NESTING_EXCEEDED: &str = "Maximum nesting level exceeded (max 2 levels)";

/// Clamps requested paging to `page >= 1` and `1 <= limit <= 100`.
pub fn clamp_pagination(page: i64, limit: i64) -> (u32, u32) {
    let page = if page < 1 { 1 } else { page.min(u32::MAX as i64) as u32 };
    let limit = if limit < 1 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT as i64) as u32
    };
    (page, limit)
}

/// Depth marker stored on a new task.
///
/// A grandchild (3) can't get past the nesting check in `create_task`, the
/// branch mirrors the stored column's full range.
pub fn position_for(parent: Option<&Task>) -> i32 {
    match parent {
        None => 1,
        Some(parent) if parent.parent_task_id.is_some() => 3,
        Some(_) => 2,
    }
}

#[derive(Clone)]
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    generations: Arc<dyn GenerationRepository>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepository>, generations: Arc<dyn GenerationRepository>) -> Self {
        Self { tasks, generations }
    }

    async fn owned_task(&self, user_id: Uuid, task_id: Uuid) -> AppResult<Task> {
        self.tasks
            .find_task(user_id, task_id)
            .await?
            .ok_or_else(|| AppError::not_found(TASK_NOT_FOUND))
    }

    /// Lists top-level tasks with their subtasks.
    pub async fn get_tasks(&self, user_id: Uuid, page: i64, limit: i64) -> AppResult<TaskListResponse> {
        let (page, limit) = clamp_pagination(page, limit);
        let offset = (page as u64 - 1) * limit as u64;

        let total = self.tasks.count_top_level(user_id).await?;
        let parents = self
            .tasks
            .list_top_level(user_id, offset, limit as u64)
            .await?;

        let parent_ids: Vec<Uuid> = parents.iter().map(|t| t.id).collect();
        let subtasks = self.tasks.list_subtasks(user_id, &parent_ids).await?;

        // Subtasks arrive newest first; grouping keeps that order.
        let mut by_parent: HashMap<Uuid, Vec<SubtaskItem>> = HashMap::new();
        for subtask in &subtasks {
            if let Some(parent_id) = subtask.parent_task_id {
                by_parent
                    .entry(parent_id)
                    .or_default()
                    .push(SubtaskItem::from(subtask));
            }
        }

        let tasks = parents
            .iter()
            .map(|parent| {
                TaskListItem::from_task(parent, by_parent.remove(&parent.id).unwrap_or_default())
            })
            .collect();

        Ok(TaskListResponse {
            tasks,
            pagination: Pagination { page, limit, total },
        })
    }

    /// Creates a task from a validated command.
    pub async fn create_task(
        &self,
        command: CreateTaskCommand,
        user_id: Uuid,
    ) -> AppResult<CreateTaskResponse> {
        let parent = match command.parent_task_id {
            Some(parent_id) => {
                let parent = self
                    .tasks
                    .find_task(user_id, parent_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(PARENT_NOT_FOUND))?;
                if !parent.is_top_level() {
                    return Err(AppError::BadRequest(NESTING_EXCEEDED.to_string()));
                }
                Some(parent)
            }
            None => None,
        };

        if let Some(generation_id) = command.generation_id {
            self.generations
                .find_generation(user_id, generation_id)
                .await?
                .ok_or_else(|| AppError::not_found(GENERATION_NOT_FOUND))?;
        }

        let description = command.description.filter(|d| !d.is_empty());
        let task = self
            .tasks
            .insert_task(NewTask {
                user_id,
                title: command.title,
                description,
                source: command.source,
                parent_task_id: command.parent_task_id,
                generation_id: command.generation_id,
                position: position_for(parent.as_ref()),
            })
            .await?;

        debug!(task_id = %task.id, source = %task.source, "Created task");
        Ok(CreateTaskResponse::from(&task))
    }

    pub async fn update_task(
        &self,
        task_id: Uuid,
        command: UpdateTaskCommand,
        user_id: Uuid,
    ) -> AppResult<UpdateTaskResponse> {
        self.owned_task(user_id, task_id).await?;

        let task = self
            .tasks
            .update_task_content(user_id, task_id, command.title, command.description)
            .await?;

        Ok(UpdateTaskResponse {
            id: task.id,
            title: task.title,
            description: task.description,
            updated_at: Utc::now(),
        })
    }

    /// Deletes a task; a top-level task takes its subtasks with it.
    pub async fn delete_task(&self, task_id: Uuid, user_id: Uuid) -> AppResult<MessageResponse> {
        self.owned_task(user_id, task_id).await?;

        let removed = self.tasks.delete_task_cascade(user_id, task_id).await?;
        info!(task_id = %task_id, removed, "Deleted task");
        Ok(MessageResponse::new("Task deleted successfully"))
    }

    /// Toggles completion. Completing a top-level task completes its subtasks;
    /// un-completing leaves them alone.
    pub async fn complete_task(&self, task_id: Uuid, user_id: Uuid) -> AppResult<MessageResponse> {
        let task = self.owned_task(user_id, task_id).await?;

        let completed = !task.completed;
        let cascade = completed && task.is_top_level();
        self.tasks
            .set_completed(user_id, task_id, completed, cascade)
            .await?;

        Ok(MessageResponse::new("Task completion status updated successfully"))
    }
}
