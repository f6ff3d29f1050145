//! API module
//!
//! This module provides the HTTP server and the typed clients for the
//! taskforge API.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{ClientConfig, ClientError, HttpClient, LocalClient, TodoClient};
pub use server::{router, serve, AppState, ServerConfig};
