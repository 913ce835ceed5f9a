//! WhatsApp REST bridge client.

mod client;
mod error;
mod messenger;
mod receiver;
mod types;

pub use client::WhatsAppClient;
pub use error::WhatsAppError;
pub use messenger::Messenger;
pub use receiver::MessageReceiver;
pub use types::*;
