//! WhatsApp client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid media payload: {0}")]
    Media(#[from] base64::DecodeError),
}
