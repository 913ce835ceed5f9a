//! WhatsApp command bot: literal and natural-language command routing over a
//! WhatsApp REST bridge.

pub mod app;
pub mod autodelete;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod intent;
pub mod nlp;
pub mod permissions;
pub mod router;
pub mod tags;
pub mod wizard;

#[cfg(test)]
mod testing;

pub use crate::app::App;
pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};
pub use crate::router::{Outcome, Router};
