//! Client-side task tree
//!
//! Holds the last fetched page of tasks and applies edits optimistically:
//! the local tree changes first, the API call follows, and the change is
//! undone if the call fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::api::client::{ClientError, TodoClient};
use crate::models::{
    CreateTaskCommand, Pagination, SubtaskItem, TaskListItem, TaskSource, UpdateTaskCommand,
};
use crate::tasks::DEFAULT_PAGE_LIMIT;

/// Subtasks a parent may hold before the tree refuses more
pub const MAX_SUBTASKS_PER_TASK: usize = 10;

/// Identity of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Known to the server
    Saved(Uuid),
    /// Inserted locally, waiting for the server to assign an id
    Pending(Uuid),
}

impl NodeId {
    pub fn saved(&self) -> Option<Uuid> {
        match self {
            NodeId::Saved(id) => Some(*id),
            NodeId::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, NodeId::Pending(_))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Saved(id) => write!(f, "{}", id),
            NodeId::Pending(id) => write!(f, "temp-{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: NodeId,
    pub title: String,
    pub description: Option<String>,
    pub source: TaskSource,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// The node is open in an editor
    pub is_editing: bool,
    pub subtasks: Vec<TaskNode>,
}

impl From<SubtaskItem> for TaskNode {
    fn from(item: SubtaskItem) -> Self {
        Self {
            id: NodeId::Saved(item.id),
            title: item.title,
            description: item.description,
            source: item.source,
            completed: item.completed,
            created_at: item.created_at,
            is_editing: false,
            subtasks: Vec::new(),
        }
    }
}

impl From<TaskListItem> for TaskNode {
    fn from(item: TaskListItem) -> Self {
        Self {
            id: NodeId::Saved(item.id),
            title: item.title,
            description: item.description,
            source: item.source,
            completed: item.completed,
            created_at: item.created_at,
            is_editing: false,
            subtasks: item.subtasks.into_iter().map(TaskNode::from).collect(),
        }
    }
}

fn find_in(nodes: &[TaskNode], id: NodeId) -> Option<&TaskNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in(&node.subtasks, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut(nodes: &mut [TaskNode], id: NodeId) -> Option<&mut TaskNode> {
    for node in nodes.iter_mut() {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_in_mut(&mut node.subtasks, id) {
            return Some(found);
        }
    }
    None
}

/// Where a node sits, for putting it back
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root(usize),
    Child { parent: NodeId, index: usize },
}

pub struct TaskTree<C: TodoClient> {
    client: Arc<C>,
    roots: Vec<TaskNode>,
    pagination: Option<Pagination>,
    page: u32,
    limit: u32,
    is_loading: bool,
    error: Option<String>,
}

impl<C: TodoClient> TaskTree<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            roots: Vec::new(),
            pagination: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            is_loading: false,
            error: None,
        }
    }

    pub fn roots(&self) -> &[TaskNode] {
        &self.roots
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Message from the last failed operation
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Selects the page the next `fetch` loads
    pub fn set_page(&mut self, page: u32, limit: u32) {
        self.page = page.max(1);
        self.limit = limit;
    }

    /// Replaces the tree with the current page from the server.
    pub async fn fetch(&mut self) -> Result<(), ClientError> {
        self.is_loading = true;
        self.error = None;

        let result = self.client.fetch_tasks(self.page, self.limit).await;
        self.is_loading = false;

        match result {
            Ok(response) => {
                self.roots = response.tasks.into_iter().map(TaskNode::from).collect();
                self.pagination = Some(response.pagination);
                Ok(())
            }
            Err(err) => {
                warn!("Error fetching tasks: {}", err);
                self.error = Some("Failed to load tasks. Please try again.".to_string());
                Err(err)
            }
        }
    }

    /// Depth-first lookup of a saved task
    pub fn find(&self, id: Uuid) -> Option<&TaskNode> {
        find_in(&self.roots, NodeId::Saved(id))
    }

    fn find_mut(&mut self, id: NodeId) -> Option<&mut TaskNode> {
        find_in_mut(&mut self.roots, id)
    }

    /// Top-level tasks are unlimited; a known parent takes up to ten subtasks.
    pub fn can_add_subtask(&self, parent_id: Option<Uuid>) -> bool {
        match parent_id {
            None => true,
            Some(id) => self
                .find(id)
                .map(|parent| parent.subtasks.len() < MAX_SUBTASKS_PER_TASK)
                .unwrap_or(false),
        }
    }

    pub fn set_editing(&mut self, id: Uuid, is_editing: bool) {
        if let Some(node) = self.find_mut(NodeId::Saved(id)) {
            node.is_editing = is_editing;
        }
    }

    /// Creates a task, showing it immediately under a pending id.
    ///
    /// Returns the id the server assigned.
    pub async fn create(&mut self, command: CreateTaskCommand) -> Result<Uuid, ClientError> {
        if let Some(parent_id) = command.parent_task_id {
            if self.find(parent_id).is_some() && !self.can_add_subtask(Some(parent_id)) {
                return Err(ClientError::SubtaskLimit(MAX_SUBTASKS_PER_TASK));
            }
        }

        let pending = NodeId::Pending(Uuid::new_v4());
        let node = TaskNode {
            id: pending,
            title: command.title.clone(),
            description: command.description.clone().filter(|d| !d.is_empty()),
            source: command.source,
            completed: false,
            created_at: Utc::now(),
            is_editing: false,
            subtasks: Vec::new(),
        };
        match command.parent_task_id {
            Some(parent_id) => {
                if let Some(parent) = self.find_mut(NodeId::Saved(parent_id)) {
                    parent.subtasks.push(node);
                }
            }
            None => self.roots.push(node),
        }

        match self.client.create_task(&command).await {
            Ok(created) => {
                if let Some(node) = self.find_mut(pending) {
                    node.id = NodeId::Saved(created.id);
                }
                Ok(created.id)
            }
            Err(err) => {
                self.remove_node(pending);
                warn!("Error creating task: {}", err);
                self.error = Some("Failed to create task. Please try again.".to_string());
                Err(err)
            }
        }
    }

    /// Applies the new title and description, restoring both on failure.
    pub async fn update(&mut self, id: Uuid, command: UpdateTaskCommand) -> Result<(), ClientError> {
        let node = self
            .find_mut(NodeId::Saved(id))
            .ok_or(ClientError::UnknownTask(id))?;
        let original_title = std::mem::replace(&mut node.title, command.title.clone());
        let original_description =
            std::mem::replace(&mut node.description, command.description.clone());

        match self.client.update_task(id, &command).await {
            Ok(_) => {
                self.set_editing(id, false);
                Ok(())
            }
            Err(err) => {
                if let Some(node) = self.find_mut(NodeId::Saved(id)) {
                    node.title = original_title;
                    node.description = original_description;
                }
                warn!("Error updating task: {}", err);
                self.error = Some("Failed to update task. Please try again.".to_string());
                Err(err)
            }
        }
    }

    fn locate(&self, id: NodeId) -> Option<Slot> {
        if let Some(index) = self.roots.iter().position(|n| n.id == id) {
            return Some(Slot::Root(index));
        }
        self.roots.iter().find_map(|parent| {
            parent
                .subtasks
                .iter()
                .position(|n| n.id == id)
                .map(|index| Slot::Child {
                    parent: parent.id,
                    index,
                })
        })
    }

    fn remove_node(&mut self, id: NodeId) -> Option<(Slot, TaskNode)> {
        let slot = self.locate(id)?;
        let node = match slot {
            Slot::Root(index) => self.roots.remove(index),
            Slot::Child { parent, index } => self.find_mut(parent)?.subtasks.remove(index),
        };
        Some((slot, node))
    }

    fn restore_node(&mut self, slot: Slot, node: TaskNode) {
        match slot {
            Slot::Root(index) => {
                let index = index.min(self.roots.len());
                self.roots.insert(index, node);
            }
            Slot::Child { parent, index } => {
                if let Some(parent) = self.find_mut(parent) {
                    let index = index.min(parent.subtasks.len());
                    parent.subtasks.insert(index, node);
                }
            }
        }
    }

    /// Removes a task locally, putting it back at its old index on failure.
    pub async fn delete(&mut self, id: Uuid) -> Result<(), ClientError> {
        let removed = self.remove_node(NodeId::Saved(id));

        match self.client.delete_task(id).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some((slot, node)) = removed {
                    self.restore_node(slot, node);
                }
                warn!("Error deleting task: {}", err);
                self.error = Some("Failed to delete task. Please try again.".to_string());
                Err(err)
            }
        }
    }

    /// Toggles completion; completing a task also completes its subtasks.
    pub async fn complete(&mut self, id: Uuid) -> Result<(), ClientError> {
        let node = self
            .find_mut(NodeId::Saved(id))
            .ok_or(ClientError::UnknownTask(id))?;
        let original = node.completed;
        let original_children: Vec<bool> = node.subtasks.iter().map(|s| s.completed).collect();

        node.completed = !original;
        if node.completed {
            for subtask in node.subtasks.iter_mut() {
                subtask.completed = true;
            }
        }

        match self.client.complete_task(id).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(node) = self.find_mut(NodeId::Saved(id)) {
                    node.completed = original;
                    for (subtask, completed) in node.subtasks.iter_mut().zip(original_children) {
                        subtask.completed = completed;
                    }
                }
                warn!("Error completing task: {}", err);
                self.error = Some("Failed to update task status. Please try again.".to_string());
                Err(err)
            }
        }
    }
}
