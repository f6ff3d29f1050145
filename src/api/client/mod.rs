//! Client module
//!
//! Typed access to the taskforge API, over HTTP or in-process.

mod http;
mod local;
mod trait_def;

// Re-export the trait and types
pub use http::{ClientConfig, ClientError, HttpClient};
pub use local::LocalClient;
pub use trait_def::TodoClient;
