//! In-memory store for tests and local runs.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::ports::{GenerationRepository, StoreError, StoreResult, TaskRepository};
use crate::models::{
    GenerationErrorLog, GenerationProcess, NewGenerationErrorLog, NewGenerationProcess, NewTask,
    Task,
};

/// Thread-safe in-memory implementation of both repository ports.
///
/// Rows are kept in insertion order. Each cascading operation runs under a
/// single write lock, which is what gives it all-or-nothing behaviour.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    tasks: Vec<Task>,
    generations: Vec<GenerationProcess>,
    error_logs: Vec<GenerationErrorLog>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, InMemoryState>> {
        self.state
            .read()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, InMemoryState>> {
        self.state
            .write()
            .map_err(|err| StoreError::persistence(std::io::Error::other(err.to_string())))
    }

    /// Snapshot of every stored task.
    pub fn tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.read()?.tasks.clone())
    }

    /// Snapshot of every recorded generation.
    pub fn generations(&self) -> StoreResult<Vec<GenerationProcess>> {
        Ok(self.read()?.generations.clone())
    }

    /// Snapshot of the generation error log.
    pub fn error_logs(&self) -> StoreResult<Vec<GenerationErrorLog>> {
        Ok(self.read()?.error_logs.clone())
    }
}

/// Newest first; among equal timestamps the later insert wins.
fn newest_first<'a>(tasks: impl DoubleEndedIterator<Item = &'a Task>) -> Vec<Task> {
    let mut rows: Vec<Task> = tasks.rev().cloned().collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let row = Task {
            id: Uuid::new_v4(),
            user_id: task.user_id,
            title: task.title,
            description: task.description,
            source: task.source,
            completed: false,
            created_at: Utc::now(),
            parent_task_id: task.parent_task_id,
            generation_id: task.generation_id,
            position: task.position,
        };
        self.write()?.tasks.push(row.clone());
        Ok(row)
    }

    async fn find_task(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self
            .read()?
            .tasks
            .iter()
            .find(|t| t.id == task_id && t.user_id == user_id)
            .cloned())
    }

    async fn count_top_level(&self, user_id: Uuid) -> StoreResult<u64> {
        let state = self.read()?;
        let count = state
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && t.is_top_level())
            .count();
        Ok(count as u64)
    }

    async fn list_top_level(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        let rows = newest_first(
            state
                .tasks
                .iter()
                .filter(|t| t.user_id == user_id && t.is_top_level()),
        );
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_subtasks(&self, user_id: Uuid, parent_ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(newest_first(state.tasks.iter().filter(|t| {
            t.user_id == user_id
                && t.parent_task_id
                    .map(|parent| parent_ids.contains(&parent))
                    .unwrap_or(false)
        })))
    }

    async fn update_task_content(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> StoreResult<Task> {
        let mut state = self.write()?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.user_id == user_id)
            .ok_or(StoreError::NotFound(task_id))?;
        task.title = title;
        task.description = description;
        Ok(task.clone())
    }

    async fn delete_task_cascade(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<u64> {
        let mut state = self.write()?;
        let target = state
            .tasks
            .iter()
            .find(|t| t.id == task_id && t.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound(task_id))?;

        let before = state.tasks.len();
        let cascade = target.is_top_level();
        state.tasks.retain(|t| {
            let is_target = t.id == task_id;
            let is_child = cascade && t.user_id == user_id && t.parent_task_id == Some(task_id);
            !(is_target || is_child)
        });
        Ok((before - state.tasks.len()) as u64)
    }

    async fn set_completed(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        completed: bool,
        cascade: bool,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state
            .tasks
            .iter()
            .any(|t| t.id == task_id && t.user_id == user_id)
        {
            return Err(StoreError::NotFound(task_id));
        }

        for task in state.tasks.iter_mut().filter(|t| t.user_id == user_id) {
            if task.id == task_id || (cascade && task.parent_task_id == Some(task_id)) {
                task.completed = completed;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationRepository for InMemoryStore {
    async fn insert_generation(
        &self,
        record: NewGenerationProcess,
    ) -> StoreResult<GenerationProcess> {
        let row = GenerationProcess {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            model: record.model,
            source_text_hash: record.source_text_hash,
            duration_ms: record.duration_ms,
            generated_count: record.generated_count,
            created_at: Utc::now(),
        };
        self.write()?.generations.push(row.clone());
        Ok(row)
    }

    async fn find_generation(
        &self,
        user_id: Uuid,
        generation_id: Uuid,
    ) -> StoreResult<Option<GenerationProcess>> {
        Ok(self
            .read()?
            .generations
            .iter()
            .find(|g| g.id == generation_id && g.user_id == user_id)
            .cloned())
    }

    async fn insert_error_log(
        &self,
        record: NewGenerationErrorLog,
    ) -> StoreResult<GenerationErrorLog> {
        let row = GenerationErrorLog {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            source_text_hash: record.source_text_hash,
            model: record.model,
            error_code: record.error_code,
            error_message: record.error_message,
            created_at: Utc::now(),
        };
        self.write()?.error_logs.push(row.clone());
        Ok(row)
    }
}
