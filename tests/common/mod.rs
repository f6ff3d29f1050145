//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskforge::api::AppState;
use taskforge::auth::{AuthProvider, InMemoryAuth};
use taskforge::llm::{
    ChatCompletionRequest, ChatCompletionResponse, ChatTransport, LlmError, LlmGateway,
};
use taskforge::store::InMemoryStore;

pub const TEST_MODEL: &str = "test/model";

pub const BIRTHDAY_PARTY: &str = r#"{
  "tasks": [
    {"title": "Choose a date and venue", "description": "Pick the party date and book a place."},
    {"title": "Send invitations", "description": "Invite friends and family two weeks ahead."},
    {"title": "Order the cake", "description": "Order a birthday cake from the bakery."}
  ]
}"#;

/// Plays back queued replies in order; an empty queue answers 503
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ChatCompletionResponse, LlmError>>>,
    pub requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedTransport {
    pub fn reply_with(&self, content: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ChatCompletionResponse::with_content(content)));
    }

    pub fn fail_with(&self, err: LlmError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::ServiceUnavailable { status: 503 }))
    }
}

/// Services over in-memory collaborators, with handles to inspect them
pub struct Harness {
    pub state: AppState,
    pub store: InMemoryStore,
    pub auth: InMemoryAuth,
    pub transport: Arc<ScriptedTransport>,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let auth = InMemoryAuth::new();
        let transport = Arc::new(ScriptedTransport::default());
        let gateway = LlmGateway::new(transport.clone(), TEST_MODEL);
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(auth.clone()),
            gateway,
        );
        Self {
            state,
            store,
            auth,
            transport,
        }
    }

    /// Registers a user and returns their access token
    pub async fn sign_in(&self, email: &str) -> String {
        self.auth.sign_up(email, "secret1").await.unwrap();
        self.auth
            .sign_in(email, "secret1")
            .await
            .unwrap()
            .session
            .access_token
    }
}
