//! Application error types.

use std::time::Duration;
use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("WhatsApp error: {0}")]
    WhatsApp(#[from] whatsapp_client::WhatsAppError),

    #[error("Completion provider error: {0}")]
    Llm(#[from] llm_client::LlmError),

    #[error("Command catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid media: {0}")]
    Media(#[from] base64::DecodeError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;

/// Problems found while building the command table.
#[derive(Error, Debug, PartialEq)]
pub enum CatalogError {
    #[error("command {0} registered twice")]
    DuplicateName(String),

    #[error("prefix {prefix} is used by both {first} and {second}")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },
}

/// Failures of the natural-language fallback.
#[derive(Error, Debug)]
pub enum NlpError {
    #[error("completion failed: {0}")]
    Completion(#[from] llm_client::LlmError),

    #[error("no interpretation within {0:?}")]
    Timeout(Duration),
}
