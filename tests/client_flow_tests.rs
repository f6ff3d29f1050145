//! Client-side flows: proposal sessions and the task tree over a local client

mod common;

use std::sync::Arc;

use common::{Harness, BIRTHDAY_PARTY};
use pretty_assertions::assert_eq;
use taskforge::api::{ClientError, LocalClient, TodoClient};
use taskforge::auth::AuthProvider;
use taskforge::models::{CreateTaskCommand, TaskSource};
use taskforge::session::{ProposalSession, SessionStatus};
use taskforge::tree::{TaskTree, MAX_SUBTASKS_PER_TASK};

async fn local_client(harness: &Harness, email: &str) -> Arc<LocalClient> {
    let user = harness.auth.sign_up(email, "secret1").await.unwrap();
    Arc::new(LocalClient::new(harness.state.clone(), user.id))
}

#[tokio::test]
async fn test_accepting_birthday_party_proposals() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;
    harness.transport.reply_with(BIRTHDAY_PARTY);

    let mut tree = TaskTree::new(client.clone());
    tree.fetch().await.unwrap();
    assert!(tree.roots().is_empty());

    let mut session = ProposalSession::new(client);
    session.open();
    session.generate("Plan a birthday party").await.unwrap();
    assert_eq!(session.status(), SessionStatus::Proposals);
    assert_eq!(session.proposals().len(), 3);
    let generation_id = session.generation_id().unwrap();
    let generations = harness.store.generations().unwrap();
    assert_eq!(generations.len(), 1);
    assert_eq!(generations[0].id, generation_id);
    assert_eq!(generations[0].generated_count, 3);

    let created = session.accept(&mut tree).await.unwrap();
    assert_eq!(created, 3);
    assert!(!session.is_open());
    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.proposals().is_empty());

    let stored = harness.store.tasks().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|t| t.source == TaskSource::AiFull));
    assert!(stored.iter().all(|t| t.generation_id == Some(generation_id)));
    assert!(stored.iter().all(|t| t.parent_task_id.is_none()));

    assert_eq!(tree.roots().len(), 3);
    assert!(tree.roots().iter().all(|node| !node.id.is_pending()));
}

#[tokio::test]
async fn test_edited_and_dropped_proposals() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;
    harness.transport.reply_with(BIRTHDAY_PARTY);

    let mut tree = TaskTree::new(client.clone());
    let mut session = ProposalSession::new(client);
    session.open();
    session.generate("Plan a birthday party").await.unwrap();

    let first = session.proposals()[0].temp_id;
    let last = session.proposals()[2].temp_id;
    assert!(session.update_proposal(first, "Book the community hall", None));
    session.delete_proposal(last);

    assert_eq!(session.accept(&mut tree).await.unwrap(), 2);

    let stored = harness.store.tasks().unwrap();
    assert_eq!(stored.len(), 2);
    let edited = stored
        .iter()
        .find(|t| t.title == "Book the community hall")
        .unwrap();
    assert_eq!(edited.source, TaskSource::AiEdited);
    assert_eq!(edited.description, None);
    let untouched = stored.iter().find(|t| t.title == "Send invitations").unwrap();
    assert_eq!(untouched.source, TaskSource::AiFull);
    assert!(!stored.iter().any(|t| t.title == "Order the cake"));
}

#[tokio::test]
async fn test_failed_generation_leaves_session_in_error() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;
    harness.transport.reply_with(r#"{"tasks": [{"name": "wrong shape"}]}"#);

    let mut session = ProposalSession::new(client);
    session.open();
    let err = session.generate("Plan a birthday party").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.error().unwrap().contains("Failed to generate tasks"));
    assert!(session.proposals().is_empty());

    let logs = harness.store.error_logs().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_code, "LLM_SCHEMA_VIOLATION");
}

#[tokio::test]
async fn test_tree_respects_the_subtask_limit() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;

    let mut tree = TaskTree::new(client);
    let parent = tree
        .create(CreateTaskCommand::manual("Move house", None))
        .await
        .unwrap();

    for i in 0..MAX_SUBTASKS_PER_TASK {
        tree.create(CreateTaskCommand::manual(format!("Box {}", i), None).with_parent(parent))
            .await
            .unwrap();
    }
    assert!(!tree.can_add_subtask(Some(parent)));

    let err = tree
        .create(CreateTaskCommand::manual("One box too many", None).with_parent(parent))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::SubtaskLimit(10)));
    assert_eq!(harness.store.tasks().unwrap().len(), MAX_SUBTASKS_PER_TASK + 1);

    tree.fetch().await.unwrap();
    assert_eq!(tree.find(parent).unwrap().subtasks.len(), MAX_SUBTASKS_PER_TASK);
}

#[tokio::test]
async fn test_tree_completion_and_deletion_match_the_server() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;

    let mut tree = TaskTree::new(client);
    let parent = tree
        .create(CreateTaskCommand::manual("Launch", None))
        .await
        .unwrap();
    let child = tree
        .create(CreateTaskCommand::manual("Write notes", None).with_parent(parent))
        .await
        .unwrap();

    tree.complete(parent).await.unwrap();
    assert!(tree.find(parent).unwrap().completed);
    assert!(tree.find(child).unwrap().completed);
    assert!(harness.store.tasks().unwrap().iter().all(|t| t.completed));

    tree.delete(parent).await.unwrap();
    assert!(tree.find(parent).is_none());
    assert!(tree.find(child).is_none());
    assert!(harness.store.tasks().unwrap().is_empty());
}

#[tokio::test]
async fn test_third_level_error_names_the_nesting_limit() {
    let harness = Harness::new();
    let client = local_client(&harness, "ada@example.com").await;

    let root = client
        .create_task(&CreateTaskCommand::manual("Root", None))
        .await
        .unwrap();
    let child = client
        .create_task(&CreateTaskCommand::manual("Child", None).with_parent(root.id))
        .await
        .unwrap();

    let err = client
        .create_task(&CreateTaskCommand::manual("Grandchild", None).with_parent(child.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err
        .to_string()
        .contains("Maximum nesting level exceeded (max 2 levels)"));
    assert_eq!(harness.store.tasks().unwrap().len(), 2);
}

#[tokio::test]
async fn test_users_do_not_see_each_other() {
    let harness = Harness::new();
    let ada = local_client(&harness, "ada@example.com").await;
    let bob = local_client(&harness, "bob@example.com").await;

    let mut ada_tree = TaskTree::new(ada);
    let task = ada_tree
        .create(CreateTaskCommand::manual("Private", None))
        .await
        .unwrap();

    let mut bob_tree = TaskTree::new(bob.clone());
    bob_tree.fetch().await.unwrap();
    assert!(bob_tree.roots().is_empty());
    assert_eq!(bob_tree.pagination().unwrap().total, 0);

    let err = bob.delete_task(task).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(harness.store.tasks().unwrap().len(), 1);
}
