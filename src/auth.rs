//! Authentication provider
//!
//! Users, passwords and sessions belong to an external auth service. The
//! server only resolves bearer tokens to users and forwards the login,
//! registration and password-reset flows.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuthSession, AuthUser};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password or a bad reset token
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("invalid or expired session")]
    InvalidSession,

    /// The provider refused the request (e.g. the email is already registered)
    #[error("{0}")]
    Rejected(String),

    #[error("auth provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A signed-in user and their session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    pub user: AuthUser,
    pub session: AuthSession,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    /// Sends a reset link; unknown addresses succeed silently.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Resolves an access token to its user.
    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;
}

// --- Supabase --- //

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    /// Where the reset email sends the user
    pub redirect_to: Option<String>,
}

/// GoTrue REST client
pub struct SupabaseAuth {
    http: reqwest::Client,
    config: SupabaseConfig,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(user: GoTrueUser) -> Self {
        AuthUser {
            id: user.id,
            email: user.email,
        }
    }
}

/// Sign-up answers with the bare user, or `{user, session}` when
/// email confirmation is off.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Wrapped { user: GoTrueUser },
    Bare(GoTrueUser),
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: GoTrueUser,
}

#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn message(self, fallback: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.config.anon_key)
    }

    /// Passes success through and sorts failures by status
    async fn check(
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: GoTrueErrorBody = response.json().await.unwrap_or_default();
        let message = body.message(fallback);
        Err(match status.as_u16() {
            400 | 422 => AuthError::Rejected(message),
            401 | 403 => AuthError::InvalidCredentials(message),
            _ => AuthError::Provider(format!("status {}: {}", status, message)),
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = Self::check(response, "Registration failed").await?;
        let user = match response.json::<SignUpBody>().await? {
            SignUpBody::Wrapped { user } | SignUpBody::Bare(user) => user,
        };
        Ok(user.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "token?grant_type=password")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        // GoTrue reports bad credentials as 400 invalid_grant
        let response = match Self::check(response, "Invalid login credentials").await {
            Err(AuthError::Rejected(message)) => return Err(AuthError::InvalidCredentials(message)),
            other => other?,
        };
        let body = response.json::<TokenBody>().await?;
        Ok(SignIn {
            user: body.user.into(),
            session: AuthSession {
                access_token: body.access_token,
                token_type: body.token_type,
                expires_in: body.expires_in,
                refresh_token: body.refresh_token,
            },
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .request(reqwest::Method::POST, "logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        match Self::check(response, "Logout failed").await {
            // An already expired session is as good as logged out
            Err(AuthError::InvalidCredentials(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let mut body = json!({ "email": email });
        if let Some(redirect) = &self.config.redirect_to {
            body["redirect_to"] = json!(redirect);
        }
        let response = self
            .request(reqwest::Method::POST, "recover")
            .json(&body)
            .send()
            .await?;
        Self::check(response, "Password reset request failed").await?;
        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        // The recovery link carries an access token scoped to the user
        let response = self
            .request(reqwest::Method::PUT, "user")
            .bearer_auth(token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        Self::check(response, "Invalid or expired reset token").await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .request(reqwest::Method::GET, "user")
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = match Self::check(response, "Unauthorized").await {
            Err(AuthError::InvalidCredentials(_)) | Err(AuthError::Rejected(_)) => {
                return Err(AuthError::InvalidSession)
            }
            other => other?,
        };
        Ok(response.json::<GoTrueUser>().await?.into())
    }
}

// --- In-memory --- //

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Debug, Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Uuid>,
    reset_tokens: HashMap<String, String>,
}

/// Process-local auth for tests and `--in-memory` runs.
///
/// Passwords are kept in plain text; nothing here is persisted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuth {
    state: Arc<RwLock<AuthState>>,
}

impl InMemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<E: std::fmt::Display>(err: E) -> AuthError {
        AuthError::Provider(err.to_string())
    }

    /// Reset token issued for `email`, if a reset was requested
    pub fn pending_reset_token(&self, email: &str) -> Option<String> {
        let state = self.state.read().ok()?;
        state
            .reset_tokens
            .iter()
            .find(|(_, owner)| owner.as_str() == email)
            .map(|(token, _)| token.clone())
    }

    fn account_by_id<'a>(state: &'a AuthState, id: Uuid) -> Option<&'a Account> {
        state.accounts.values().find(|a| a.user.id == id)
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        if state.accounts.contains_key(email) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn, AuthError> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        let account = state
            .accounts
            .get(email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredentials("Invalid login credentials".to_string()))?;

        let token = Uuid::new_v4().simple().to_string();
        state.sessions.insert(token.clone(), account.user.id);
        Ok(SignIn {
            user: account.user,
            session: AuthSession {
                access_token: token,
                token_type: "bearer".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
            },
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        state.sessions.remove(access_token);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        if state.accounts.contains_key(email) {
            let token = Uuid::new_v4().simple().to_string();
            state.reset_tokens.insert(token, email.to_string());
        }
        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let mut state = self.state.write().map_err(Self::poisoned)?;
        let email = state.reset_tokens.remove(token).ok_or_else(|| {
            AuthError::InvalidCredentials("Invalid or expired reset token".to_string())
        })?;
        let account = state
            .accounts
            .get_mut(&email)
            .ok_or_else(|| AuthError::Provider(format!("no account for {}", email)))?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let state = self.state.read().map_err(Self::poisoned)?;
        let user_id = state
            .sessions
            .get(access_token)
            .ok_or(AuthError::InvalidSession)?;
        Self::account_by_id(&state, *user_id)
            .map(|a| a.user.clone())
            .ok_or(AuthError::InvalidSession)
    }
}
