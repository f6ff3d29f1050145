//! Client-side proposal session
//!
//! Drives one round of AI task generation: request proposals, let the user
//! edit or drop them, then accept them into the task tree.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::api::client::{ClientError, TodoClient};
use crate::models::{CreateTaskCommand, GenerationProposal, TaskSource};
use crate::tree::TaskTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Loading,
    Proposals,
    Error,
    Submitting,
}

/// A proposal as held by the client
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalDraft {
    /// Client-only identity
    pub temp_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Changed by the user since generation
    pub is_edited: bool,
    /// Open in an editor
    pub is_editing: bool,
}

impl From<GenerationProposal> for ProposalDraft {
    fn from(proposal: GenerationProposal) -> Self {
        Self {
            temp_id: Uuid::new_v4(),
            title: proposal.title,
            description: proposal.description,
            is_edited: false,
            is_editing: false,
        }
    }
}

impl ProposalDraft {
    fn source(&self) -> TaskSource {
        if self.is_edited {
            TaskSource::AiEdited
        } else {
            TaskSource::AiFull
        }
    }
}

pub struct ProposalSession<C: TodoClient> {
    client: Arc<C>,
    status: SessionStatus,
    generation_id: Option<Uuid>,
    description: String,
    proposals: Vec<ProposalDraft>,
    error: Option<String>,
    is_open: bool,
}

impl<C: TodoClient> ProposalSession<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            status: SessionStatus::Idle,
            generation_id: None,
            description: String::new(),
            proposals: Vec::new(),
            error: None,
            is_open: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn generation_id(&self) -> Option<Uuid> {
        self.generation_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn proposals(&self) -> &[ProposalDraft] {
        &self.proposals
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open(&mut self) {
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.is_open = false;
    }

    /// Back to `Idle` with no proposals
    pub fn reset(&mut self) {
        self.status = SessionStatus::Idle;
        self.generation_id = None;
        self.description.clear();
        self.proposals.clear();
        self.error = None;
    }

    /// Requests proposals for `description`.
    ///
    /// Ends in `Proposals` on success or `Error` with a message on failure.
    pub async fn generate(&mut self, description: &str) -> Result<(), ClientError> {
        self.status = SessionStatus::Loading;
        self.description = description.to_string();

        match self.client.generate(description).await {
            Ok(response) => {
                self.generation_id = Some(response.generation_id);
                self.proposals = response.tasks.into_iter().map(ProposalDraft::from).collect();
                self.error = None;
                self.status = SessionStatus::Proposals;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                self.status = SessionStatus::Error;
                Err(err)
            }
        }
    }

    /// Replaces a proposal's text and marks it edited
    pub fn update_proposal(
        &mut self,
        temp_id: Uuid,
        title: impl Into<String>,
        description: Option<String>,
    ) -> bool {
        match self.proposals.iter_mut().find(|p| p.temp_id == temp_id) {
            Some(proposal) => {
                proposal.title = title.into();
                proposal.description = description;
                proposal.is_edited = true;
                true
            }
            None => false,
        }
    }

    pub fn set_editing(&mut self, temp_id: Uuid, is_editing: bool) {
        if let Some(proposal) = self.proposals.iter_mut().find(|p| p.temp_id == temp_id) {
            proposal.is_editing = is_editing;
        }
    }

    pub fn delete_proposal(&mut self, temp_id: Uuid) {
        self.proposals.retain(|p| p.temp_id != temp_id);
    }

    /// Creates one task per remaining proposal, in order, then refreshes the
    /// tree and resets the session.
    ///
    /// A failure stops the loop and returns to `Proposals` with the error; the
    /// tasks created before it stay.
    pub async fn accept(&mut self, tree: &mut TaskTree<C>) -> Result<usize, ClientError> {
        if self.proposals.is_empty() {
            return Ok(0);
        }
        self.status = SessionStatus::Submitting;

        let commands: Vec<CreateTaskCommand> = self
            .proposals
            .iter()
            .map(|proposal| CreateTaskCommand {
                title: proposal.title.clone(),
                description: proposal.description.clone(),
                parent_task_id: None,
                source: proposal.source(),
                generation_id: self.generation_id,
            })
            .collect();

        let mut created = 0;
        for command in commands {
            if let Err(err) = tree.create(command).await {
                self.status = SessionStatus::Proposals;
                self.error = Some(err.to_string());
                return Err(err);
            }
            created += 1;
        }

        if let Err(err) = tree.fetch().await {
            warn!("Task list refresh after accepting proposals failed: {}", err);
        }

        self.reset();
        self.close();
        Ok(created)
    }

    /// Drops the proposals and closes the session
    pub fn reject(&mut self) {
        self.reset();
        self.close();
    }
}
