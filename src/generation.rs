//! Generation service
//!
//! Turns a free-text goal into 3-5 task proposals via the LLM gateway and
//! records every attempt: a `generation_process` row on success, an error
//! log row on failure.

use std::sync::Arc;
use std::time::Instant;

use schemars::JsonSchema;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::llm::{LlmGateway, RequestOptions};
use crate::models::{
    CreateGenerationResponse, GenerationProposal, NewGenerationErrorLog, NewGenerationProcess,
    TaskSource,
};
use crate::store::GenerationRepository;

const SYSTEM_PROMPT: &str = "You are an expert project manager and task organizer. \
Based on the user's goal or problem description, generate a list of 3-5 actionable tasks. \
Each task should have a clear title and brief description. \
Focus on creating specific, actionable tasks that directly contribute to achieving the goal.

Respond with JSON in this format:
{
  \"tasks\": [
    {
      \"title\": \"Short task title\",
      \"description\": \"One or two sentences describing the task\"
    }
  ]
}";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1000;

/// Shape the model must answer with
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct GeneratedTasks {
    /// The generated tasks
    tasks: Vec<GeneratedTask>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct GeneratedTask {
    /// Short, actionable task title
    title: String,
    /// One or two sentences describing the task
    description: String,
}

/// Lower-case hex SHA-256 of the text
pub fn source_text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[derive(Clone)]
pub struct GenerationService {
    gateway: LlmGateway,
    generations: Arc<dyn GenerationRepository>,
}

impl GenerationService {
    pub fn new(gateway: LlmGateway, generations: Arc<dyn GenerationRepository>) -> Self {
        Self {
            gateway,
            generations,
        }
    }

    /// The model recorded against every generation
    pub fn model(&self) -> &str {
        self.gateway.default_model()
    }

    /// Generates proposals for an already validated description.
    pub async fn generate_tasks(
        &self,
        user_id: Uuid,
        description: &str,
    ) -> AppResult<CreateGenerationResponse> {
        let hash = source_text_hash(description);

        match self.run(user_id, description, &hash).await {
            Ok(response) => Ok(response),
            Err(err) => {
                error!(user_id = %user_id, code = err.code(), "Task generation failed: {}", err);
                self.log_failure(user_id, &hash, &err).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        user_id: Uuid,
        description: &str,
        hash: &str,
    ) -> AppResult<CreateGenerationResponse> {
        let started = Instant::now();
        let generated: GeneratedTasks = self
            .gateway
            .json_response(
                SYSTEM_PROMPT,
                description,
                RequestOptions {
                    model: None,
                    temperature: Some(TEMPERATURE),
                    max_tokens: Some(MAX_TOKENS),
                },
            )
            .await?;
        let duration_ms = started.elapsed().as_millis() as i64;

        let proposals: Vec<GenerationProposal> = generated
            .tasks
            .into_iter()
            .map(|task| GenerationProposal {
                title: task.title,
                description: Some(task.description),
                source: TaskSource::AiFull,
            })
            .collect();
        let generated_count = proposals.len() as i32;

        let process = self
            .generations
            .insert_generation(NewGenerationProcess {
                user_id,
                model: self.model().to_string(),
                source_text_hash: hash.to_string(),
                duration_ms,
                generated_count,
            })
            .await
            .map_err(|err| {
                AppError::Internal(format!("Failed to save generation process: {}", err))
            })?;

        info!(
            generation_id = %process.id,
            generated_count,
            duration_ms,
            "Generated task proposals"
        );

        Ok(CreateGenerationResponse {
            generation_id: process.id,
            tasks: proposals,
            generated_count,
            created_at: process.created_at,
        })
    }

    /// Best effort; a failure here never replaces the original error.
    async fn log_failure(&self, user_id: Uuid, hash: &str, err: &AppError) {
        let record = NewGenerationErrorLog {
            user_id,
            source_text_hash: hash.to_string(),
            model: self.model().to_string(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        };
        if let Err(log_err) = self.generations.insert_error_log(record).await {
            warn!("Failed to write generation error log: {}", log_err);
        }
    }
}
