//! Diesel row models.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{generation_process, generation_process_error_logs, tasks};
use crate::models::{GenerationErrorLog, GenerationProcess, Task, TaskSource};
use crate::store::ports::{StoreError, StoreResult};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub parent_task_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub position: i32,
}

impl TaskRow {
    pub fn into_task(self) -> StoreResult<Task> {
        let source = self
            .source
            .parse::<TaskSource>()
            .map_err(|err| StoreError::Corrupt {
                id: self.id,
                message: err.to_string(),
            })?;
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            source,
            completed: self.completed,
            created_at: self.created_at,
            parent_task_id: self.parent_task_id,
            generation_id: self.generation_id,
            position: self.position,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub parent_task_id: Option<Uuid>,
    pub generation_id: Option<Uuid>,
    pub position: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = generation_process)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GenerationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model: String,
    pub source_text_hash: String,
    pub duration_ms: i64,
    pub generated_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<GenerationRow> for GenerationProcess {
    fn from(row: GenerationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            model: row.model,
            source_text_hash: row.source_text_hash,
            duration_ms: row.duration_ms,
            generated_count: row.generated_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = generation_process_error_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ErrorLogRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_text_hash: String,
    pub model: String,
    pub error_code: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

impl From<ErrorLogRow> for GenerationErrorLog {
    fn from(row: ErrorLogRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            source_text_hash: row.source_text_hash,
            model: row.model,
            error_code: row.error_code,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}
