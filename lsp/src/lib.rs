//! Language-server client for semantic lookups.
//!
//! One [`LspClient`] per (project, language) pair, speaking length-prefixed
//! JSON-RPC over the server's stdio. The [`ClientRegistry`] caches clients
//! and tears them all down at exit.

pub mod codec;
pub mod types;

pub(crate) mod protocol;

mod client;
mod registry;

pub use client::LspClient;
pub use registry::ClientRegistry;
pub use types::{ClientError, DefLocation, Language, ServerSpec, detect_language};
