//! Client for OpenAI-compatible completion providers.

mod client;
mod error;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use types::*;
