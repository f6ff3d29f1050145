//! Validation module
//!
//! Schema checks for every inbound payload. Each validator takes the raw JSON
//! body and returns either the typed command or a map of field errors, so a
//! missing or mistyped field is reported against that field instead of
//! failing the whole request.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{CreateTaskCommand, GenerateTasksCommand, TaskSource, UpdateTaskCommand};

pub const TITLE_MAX_CHARS: usize = 255;
pub const GENERATION_DESCRIPTION_MAX_CHARS: usize = 1000;
pub const PASSWORD_MIN_CHARS: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
            .expect("email pattern compiles");
}

/// Per-field validation messages, keyed by the wire name of the field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an error map with a single entry
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Records a message for a field; the first message for a field wins
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

// --- Field readers --- //

enum Field<'a> {
    Missing,
    Null,
    Str(&'a str),
    WrongType,
}

fn read<'a>(body: &'a Map<String, Value>, name: &str) -> Field<'a> {
    match body.get(name) {
        None => Field::Missing,
        Some(Value::Null) => Field::Null,
        Some(Value::String(s)) => Field::Str(s),
        Some(_) => Field::WrongType,
    }
}

fn as_object<'a>(body: &'a Value, errors: &mut FieldErrors) -> Option<&'a Map<String, Value>> {
    match body {
        Value::Object(map) => Some(map),
        _ => {
            errors.add("body", "Expected a JSON object");
            None
        }
    }
}

fn required_string(
    body: &Map<String, Value>,
    name: &str,
    required_message: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    match read(body, name) {
        Field::Str(s) => Some(s.to_string()),
        Field::Missing | Field::Null => {
            errors.add(name, required_message);
            None
        }
        Field::WrongType => {
            errors.add(name, "Expected string");
            None
        }
    }
}

fn nullable_string(body: &Map<String, Value>, name: &str, errors: &mut FieldErrors) -> Option<String> {
    match read(body, name) {
        Field::Str(s) => Some(s.to_string()),
        Field::Missing | Field::Null => None,
        Field::WrongType => {
            errors.add(name, "Expected string or null");
            None
        }
    }
}

/// A key that must be present but may be null (zod `.nullable()` without `.optional()`)
fn present_nullable_uuid(
    body: &Map<String, Value>,
    name: &str,
    errors: &mut FieldErrors,
) -> Option<Uuid> {
    match read(body, name) {
        Field::Str(s) => match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add(name, "Invalid uuid");
                None
            }
        },
        Field::Null => None,
        Field::Missing => {
            errors.add(name, "Required");
            None
        }
        Field::WrongType => {
            errors.add(name, "Expected string or null");
            None
        }
    }
}

fn check_title(title: &str, errors: &mut FieldErrors) {
    let len = title.chars().count();
    if len == 0 {
        errors.add("title", "Title is required");
    } else if len > TITLE_MAX_CHARS {
        errors.add(
            "title",
            format!("Title cannot exceed {} characters", TITLE_MAX_CHARS),
        );
    }
}

fn check_email(email: Option<String>, errors: &mut FieldErrors) -> Option<String> {
    let email = email?;
    if EMAIL_RE.is_match(&email) {
        Some(email)
    } else {
        errors.add("email", "Enter a valid email address");
        None
    }
}

fn check_password(field: &str, password: Option<String>, errors: &mut FieldErrors) -> Option<String> {
    let password = password?;
    if password.chars().count() < PASSWORD_MIN_CHARS {
        errors.add(
            field,
            format!("Password must be at least {} characters", PASSWORD_MIN_CHARS),
        );
        return None;
    }
    Some(password)
}

// --- Tasks --- //

/// Validates a `POST /api/tasks` body
pub fn validate_create_task(body: &Value) -> Result<CreateTaskCommand, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };

    let title = required_string(map, "title", "Title is required", &mut errors);
    if let Some(title) = &title {
        check_title(title, &mut errors);
    }
    let description = nullable_string(map, "description", &mut errors);
    let parent_task_id = present_nullable_uuid(map, "parentTaskId", &mut errors);
    let generation_id = present_nullable_uuid(map, "generationId", &mut errors);

    let source = match read(map, "source") {
        Field::Str(s) => match s.parse::<TaskSource>() {
            Ok(source) => Some(source),
            Err(_) => {
                errors.add("source", invalid_source_message());
                None
            }
        },
        Field::Missing | Field::Null => {
            errors.add("source", "Source is required");
            None
        }
        Field::WrongType => {
            errors.add("source", invalid_source_message());
            None
        }
    };

    if let Some(source) = source {
        if source.is_ai_derived() && generation_id.is_none() && !errors.contains("generationId") {
            errors.add(
                "generationId",
                "generationId is required when source is ai_full or ai_edited",
            );
        }
    }

    match (title, source) {
        (Some(title), Some(source)) => errors.finish(CreateTaskCommand {
            title,
            description,
            parent_task_id,
            source,
            generation_id,
        }),
        _ => Err(errors),
    }
}

fn invalid_source_message() -> String {
    let options = TaskSource::ALL
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("Invalid enum value. Expected {}", options)
}

/// Validates a `PUT /api/tasks/{id}` body
pub fn validate_update_task(body: &Value) -> Result<UpdateTaskCommand, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };

    let title = required_string(map, "title", "Title is required", &mut errors);
    if let Some(title) = &title {
        check_title(title, &mut errors);
    }
    let description = match read(map, "description") {
        Field::Str(s) => Some(s.to_string()),
        Field::Null => None,
        Field::Missing => {
            errors.add("description", "Required");
            None
        }
        Field::WrongType => {
            errors.add("description", "Expected string or null");
            None
        }
    };

    match title {
        Some(title) => errors.finish(UpdateTaskCommand { title, description }),
        None => Err(errors),
    }
}

// --- Generations --- //

/// Validates a `POST /api/generations` body; the description is trimmed first
pub fn validate_generation(body: &Value) -> Result<GenerateTasksCommand, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };

    let Some(raw) = required_string(map, "description", "Description is required", &mut errors)
    else {
        return Err(errors);
    };

    let description = raw.trim().to_string();
    let len = description.chars().count();
    if len == 0 {
        errors.add("description", "Description is required");
    } else if len > GENERATION_DESCRIPTION_MAX_CHARS {
        errors.add(
            "description",
            format!(
                "Description cannot exceed {} characters",
                GENERATION_DESCRIPTION_MAX_CHARS
            ),
        );
    }

    errors.finish(GenerateTasksCommand { description })
}

// --- Auth forms --- //

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgotPasswordForm {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPasswordForm {
    pub token: String,
    pub new_password: String,
}

fn email_and_password(
    map: &Map<String, Value>,
    password_field: &str,
    errors: &mut FieldErrors,
) -> (Option<String>, Option<String>) {
    let email = required_string(map, "email", "Email is required", errors);
    let email = check_email(email, errors);
    let password = required_string(map, password_field, "Password is required", errors);
    let password = check_password(password_field, password, errors);
    (email, password)
}

fn check_confirmation(
    map: &Map<String, Value>,
    password_field: &str,
    errors: &mut FieldErrors,
) {
    let confirmation = required_string(
        map,
        "confirmPassword",
        "Password confirmation is required",
        errors,
    );
    let password = match read(map, password_field) {
        Field::Str(s) => Some(s),
        _ => None,
    };
    if let (Some(password), Some(confirmation)) = (password, confirmation) {
        if password != confirmation {
            errors.add("confirmPassword", "Passwords do not match");
        }
    }
}

pub fn validate_login(body: &Value) -> Result<LoginForm, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };
    match email_and_password(map, "password", &mut errors) {
        (Some(email), Some(password)) => errors.finish(LoginForm { email, password }),
        _ => Err(errors),
    }
}

pub fn validate_register(body: &Value) -> Result<RegisterForm, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };
    let fields = email_and_password(map, "password", &mut errors);
    check_confirmation(map, "password", &mut errors);
    match fields {
        (Some(email), Some(password)) => errors.finish(RegisterForm { email, password }),
        _ => Err(errors),
    }
}

pub fn validate_forgot_password(body: &Value) -> Result<ForgotPasswordForm, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };
    let email = required_string(map, "email", "Email is required", &mut errors);
    match check_email(email, &mut errors) {
        Some(email) => errors.finish(ForgotPasswordForm { email }),
        None => Err(errors),
    }
}

pub fn validate_reset_password(body: &Value) -> Result<ResetPasswordForm, FieldErrors> {
    let mut errors = FieldErrors::new();
    let Some(map) = as_object(body, &mut errors) else {
        return Err(errors);
    };
    let token = required_string(map, "token", "Reset token is required", &mut errors);
    let password = required_string(map, "newPassword", "Password is required", &mut errors);
    let new_password = check_password("newPassword", password, &mut errors);
    check_confirmation(map, "newPassword", &mut errors);
    match (token, new_password) {
        (Some(token), Some(new_password)) => {
            errors.finish(ResetPasswordForm { token, new_password })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn create_body(source: &str, generation_id: Value) -> Value {
        json!({
            "title": "Write report",
            "description": null,
            "parentTaskId": null,
            "source": source,
            "generationId": generation_id,
        })
    }

    #[test]
    fn test_create_task_accepts_manual_without_generation() {
        let command = validate_create_task(&create_body("manual", Value::Null)).unwrap();
        assert_eq!(command.title, "Write report");
        assert_eq!(command.source, TaskSource::Manual);
        assert_eq!(command.generation_id, None);
        assert_eq!(command.parent_task_id, None);
    }

    #[rstest]
    #[case("ai_full")]
    #[case("ai_edited")]
    fn test_ai_source_requires_generation_id(#[case] source: &str) {
        let errors = validate_create_task(&create_body(source, Value::Null)).unwrap_err();
        assert_eq!(
            errors.get("generationId"),
            Some("generationId is required when source is ai_full or ai_edited")
        );
    }

    #[test]
    fn test_ai_source_with_generation_id_passes() {
        let generation = Uuid::new_v4();
        let command =
            validate_create_task(&create_body("ai_edited", json!(generation.to_string()))).unwrap();
        assert_eq!(command.generation_id, Some(generation));
    }

    #[test]
    fn test_create_task_reports_each_bad_field() {
        let body = json!({
            "title": "",
            "description": 5,
            "parentTaskId": "not-a-uuid",
            "source": "robot",
            "generationId": null,
        });
        let errors = validate_create_task(&body).unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("description"));
        assert_eq!(errors.get("parentTaskId"), Some("Invalid uuid"));
        assert!(errors.get("source").unwrap().starts_with("Invalid enum value"));
    }

    #[test]
    fn test_title_length_is_counted_in_chars() {
        let at_limit = "ż".repeat(TITLE_MAX_CHARS);
        let mut body = create_body("manual", Value::Null);
        body["title"] = json!(at_limit);
        assert!(validate_create_task(&body).is_ok());

        body["title"] = json!("x".repeat(TITLE_MAX_CHARS + 1));
        let errors = validate_create_task(&body).unwrap_err();
        assert_eq!(errors.get("title"), Some("Title cannot exceed 255 characters"));
    }

    #[test]
    fn test_parent_and_generation_keys_must_be_present() {
        let errors = validate_create_task(&json!({ "title": "a", "source": "manual" })).unwrap_err();
        assert_eq!(errors.get("parentTaskId"), Some("Required"));
        assert_eq!(errors.get("generationId"), Some("Required"));
    }

    #[test]
    fn test_update_task_allows_null_description_without_cap() {
        let long = "d".repeat(5000);
        let command =
            validate_update_task(&json!({ "title": "New", "description": long.clone() })).unwrap();
        assert_eq!(command.description, Some(long));

        let command = validate_update_task(&json!({ "title": "New", "description": null })).unwrap();
        assert_eq!(command.description, None);

        assert!(validate_update_task(&json!({ "title": "", "description": null })).is_err());
    }

    #[test]
    fn test_generation_description_is_trimmed_then_checked() {
        let command = validate_generation(&json!({ "description": "  Plan a trip \n" })).unwrap();
        assert_eq!(command.description, "Plan a trip");

        let errors = validate_generation(&json!({ "description": "    " })).unwrap_err();
        assert_eq!(errors.get("description"), Some("Description is required"));

        let at_limit = format!("  {}  ", "a".repeat(1000));
        assert!(validate_generation(&json!({ "description": at_limit })).is_ok());

        let errors = validate_generation(&json!({ "description": "a".repeat(1001) })).unwrap_err();
        assert_eq!(
            errors.get("description"),
            Some("Description cannot exceed 1000 characters")
        );
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last+tag@sub.example.org", true)]
    #[case("no-at-sign.example.com", false)]
    #[case("user@localhost", false)]
    #[case("user@@example.com", false)]
    fn test_login_email_syntax(#[case] email: &str, #[case] valid: bool) {
        let result = validate_login(&json!({ "email": email, "password": "secret1" }));
        assert_eq!(result.is_ok(), valid);
    }

    #[test]
    fn test_login_password_minimum() {
        let errors =
            validate_login(&json!({ "email": "a@example.com", "password": "12345" })).unwrap_err();
        assert_eq!(
            errors.get("password"),
            Some("Password must be at least 6 characters")
        );
    }

    #[test]
    fn test_register_mismatch_is_reported_on_confirmation() {
        let errors = validate_register(&json!({
            "email": "a@example.com",
            "password": "secret1",
            "confirmPassword": "secret2",
        }))
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("confirmPassword"), Some("Passwords do not match"));
    }

    #[test]
    fn test_reset_password_checks_new_password_pair() {
        let form = validate_reset_password(&json!({
            "token": "abc",
            "newPassword": "secret1",
            "confirmPassword": "secret1",
        }))
        .unwrap();
        assert_eq!(form.new_password, "secret1");

        let errors = validate_reset_password(&json!({
            "token": "abc",
            "newPassword": "secret1",
            "confirmPassword": "other",
        }))
        .unwrap_err();
        assert_eq!(errors.get("confirmPassword"), Some("Passwords do not match"));
    }

    #[test]
    fn test_non_object_body_is_a_field_error() {
        let errors = validate_generation(&json!("hello")).unwrap_err();
        assert_eq!(errors.get("body"), Some("Expected a JSON object"));
    }
}
