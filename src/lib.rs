//! Taskforge library crate
//!
//! A todo-list service with two-level task hierarchies and LLM-generated task
//! proposals. The server side lives in [`api::server`], [`tasks`] and
//! [`generation`]; [`tree`] and [`session`] are the client-side containers
//! that sit on top of [`api::client`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod generation;
pub mod llm;
pub mod models;
pub mod session;
pub mod store;
pub mod tasks;
pub mod tree;
pub mod validation;

pub use error::{AppError, AppResult};
pub use generation::GenerationService;
pub use tasks::TaskService;
