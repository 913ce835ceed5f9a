//! Configurar command - hands the conversation to the configuration wizard.

use crate::catalog::CommandName;
use crate::commands::{CommandContext, CommandHandler};
use crate::error::AppResult;
use crate::wizard::ConfigWizard;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ConfigureHandler {
    wizard: Arc<ConfigWizard>,
}

impl ConfigureHandler {
    pub fn new(wizard: Arc<ConfigWizard>) -> Self {
        Self { wizard }
    }
}

#[async_trait]
impl CommandHandler for ConfigureHandler {
    fn command(&self) -> CommandName {
        CommandName::Configurar
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> AppResult<()> {
        self.wizard.begin(ctx.message).await
    }
}
