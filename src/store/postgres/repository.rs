//! `PostgreSQL` implementation of the repository ports.

use async_trait::async_trait;
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::Error as DieselError;
use uuid::Uuid;

use super::models::{ErrorLogRow, GenerationRow, NewTaskRow, TaskRow};
use super::schema::{generation_process, generation_process_error_logs, tasks};
use crate::models::{
    GenerationErrorLog, GenerationProcess, NewGenerationErrorLog, NewGenerationProcess, NewTask,
    Task,
};
use crate::store::ports::{GenerationRepository, StoreError, StoreResult, TaskRepository};

/// Connection pool type used by the store.
pub type PgPool = Pool<ConnectionManager<PgConnection>>;

const SCHEMA_SQL: &str = include_str!("../../../migrations/schema.sql");

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        StoreError::persistence(err)
    }
}

/// `PostgreSQL`-backed store for tasks and generation records.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a pool for `database_url`.
    pub fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_connections)
            .build(manager)
            .map_err(StoreError::persistence)?;
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.run_blocking(|connection| {
            connection.batch_execute(SCHEMA_SQL)?;
            Ok(())
        })
        .await
    }

    async fn run_blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(StoreError::persistence)?
    }
}

fn find_owned(connection: &mut PgConnection, user_id: Uuid, task_id: Uuid) -> StoreResult<Option<Task>> {
    tasks::table
        .filter(tasks::id.eq(task_id))
        .filter(tasks::user_id.eq(user_id))
        .select(TaskRow::as_select())
        .first::<TaskRow>(connection)
        .optional()?
        .map(TaskRow::into_task)
        .transpose()
}

fn into_tasks(rows: Vec<TaskRow>) -> StoreResult<Vec<Task>> {
    rows.into_iter().map(TaskRow::into_task).collect()
}

#[async_trait]
impl TaskRepository for PostgresStore {
    async fn insert_task(&self, task: NewTask) -> StoreResult<Task> {
        let row = NewTaskRow {
            id: Uuid::new_v4(),
            user_id: task.user_id,
            title: task.title,
            description: task.description,
            source: task.source.as_str().to_owned(),
            completed: false,
            created_at: Utc::now(),
            parent_task_id: task.parent_task_id,
            generation_id: task.generation_id,
            position: task.position,
        };

        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .returning(TaskRow::as_returning())
                .get_result::<TaskRow>(connection)?
                .into_task()
        })
        .await
    }

    async fn find_task(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<Option<Task>> {
        self.run_blocking(move |connection| find_owned(connection, user_id, task_id))
            .await
    }

    async fn count_top_level(&self, user_id: Uuid) -> StoreResult<u64> {
        self.run_blocking(move |connection| {
            let count: i64 = tasks::table
                .filter(tasks::user_id.eq(user_id))
                .filter(tasks::parent_task_id.is_null())
                .count()
                .get_result(connection)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn list_top_level(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::user_id.eq(user_id))
                .filter(tasks::parent_task_id.is_null())
                .order((tasks::created_at.desc(), tasks::id.desc()))
                .offset(offset as i64)
                .limit(limit as i64)
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            into_tasks(rows)
        })
        .await
    }

    async fn list_subtasks(&self, user_id: Uuid, parent_ids: &[Uuid]) -> StoreResult<Vec<Task>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let parent_ids = parent_ids.to_vec();
        self.run_blocking(move |connection| {
            let rows = tasks::table
                .filter(tasks::user_id.eq(user_id))
                .filter(tasks::parent_task_id.eq_any(parent_ids))
                .order((tasks::created_at.desc(), tasks::id.desc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;
            into_tasks(rows)
        })
        .await
    }

    async fn update_task_content(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> StoreResult<Task> {
        self.run_blocking(move |connection| {
            diesel::update(
                tasks::table
                    .filter(tasks::id.eq(task_id))
                    .filter(tasks::user_id.eq(user_id)),
            )
            .set((tasks::title.eq(title), tasks::description.eq(description)))
            .returning(TaskRow::as_returning())
            .get_result::<TaskRow>(connection)
            .optional()?
            .ok_or(StoreError::NotFound(task_id))?
            .into_task()
        })
        .await
    }

    async fn delete_task_cascade(&self, user_id: Uuid, task_id: Uuid) -> StoreResult<u64> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, StoreError, _>(|tx| {
                let task = find_owned(tx, user_id, task_id)?.ok_or(StoreError::NotFound(task_id))?;

                let mut removed = 0;
                if task.is_top_level() {
                    removed += diesel::delete(
                        tasks::table
                            .filter(tasks::parent_task_id.eq(task_id))
                            .filter(tasks::user_id.eq(user_id)),
                    )
                    .execute(tx)?;
                }
                removed += diesel::delete(
                    tasks::table
                        .filter(tasks::id.eq(task_id))
                        .filter(tasks::user_id.eq(user_id)),
                )
                .execute(tx)?;
                Ok(removed as u64)
            })
        })
        .await
    }

    async fn set_completed(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        completed: bool,
        cascade: bool,
    ) -> StoreResult<()> {
        self.run_blocking(move |connection| {
            connection.transaction::<_, StoreError, _>(|tx| {
                let updated = diesel::update(
                    tasks::table
                        .filter(tasks::id.eq(task_id))
                        .filter(tasks::user_id.eq(user_id)),
                )
                .set(tasks::completed.eq(completed))
                .execute(tx)?;
                if updated == 0 {
                    return Err(StoreError::NotFound(task_id));
                }

                if cascade {
                    diesel::update(
                        tasks::table
                            .filter(tasks::parent_task_id.eq(task_id))
                            .filter(tasks::user_id.eq(user_id)),
                    )
                    .set(tasks::completed.eq(completed))
                    .execute(tx)?;
                }
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl GenerationRepository for PostgresStore {
    async fn insert_generation(
        &self,
        record: NewGenerationProcess,
    ) -> StoreResult<GenerationProcess> {
        let row = GenerationRow {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            model: record.model,
            source_text_hash: record.source_text_hash,
            duration_ms: record.duration_ms,
            generated_count: record.generated_count,
            created_at: Utc::now(),
        };

        self.run_blocking(move |connection| {
            let stored = diesel::insert_into(generation_process::table)
                .values(&row)
                .returning(GenerationRow::as_returning())
                .get_result::<GenerationRow>(connection)?;
            Ok(stored.into())
        })
        .await
    }

    async fn find_generation(
        &self,
        user_id: Uuid,
        generation_id: Uuid,
    ) -> StoreResult<Option<GenerationProcess>> {
        self.run_blocking(move |connection| {
            let row = generation_process::table
                .filter(generation_process::id.eq(generation_id))
                .filter(generation_process::user_id.eq(user_id))
                .select(GenerationRow::as_select())
                .first::<GenerationRow>(connection)
                .optional()?;
            Ok(row.map(GenerationProcess::from))
        })
        .await
    }

    async fn insert_error_log(
        &self,
        record: NewGenerationErrorLog,
    ) -> StoreResult<GenerationErrorLog> {
        let row = ErrorLogRow {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            source_text_hash: record.source_text_hash,
            model: record.model,
            error_code: record.error_code,
            error_message: record.error_message,
            created_at: Utc::now(),
        };

        self.run_blocking(move |connection| {
            let stored = diesel::insert_into(generation_process_error_logs::table)
                .values(&row)
                .returning(ErrorLogRow::as_returning())
                .get_result::<ErrorLogRow>(connection)?;
            Ok(stored.into())
        })
        .await
    }
}
