//! WhatsApp command bot - main entry point.

use anyhow::Context;
use llm_client::LlmClient;
use std::sync::Arc;
use tokio::signal;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whatsapp_bot::{App, AppResult, Config};
use whatsapp_client::{MessageReceiver, WhatsAppClient};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.bot.log_level);

    info!("Starting WhatsApp command bot...");

    // Initialize clients
    let llm = Arc::new(
        LlmClient::new(
            &config.llm.api_key,
            &config.llm.base_url,
            &config.llm.model,
            config.llm.timeout,
        )
        .context("Failed to create completion client")?,
    );

    let whatsapp = WhatsAppClient::new(&config.whatsapp.service_url)
        .context("Failed to create WhatsApp client")?;

    // Health checks
    if llm.health_check().await {
        info!("Completion provider healthy - Model: {}", config.llm.model);
    } else {
        warn!("Completion provider health check failed - will retry on requests");
    }

    if !whatsapp.health_check().await {
        error!("WhatsApp bridge not reachable at {}", config.whatsapp.service_url);
        return Err(anyhow::anyhow!("WhatsApp bridge not reachable").into());
    }
    info!("WhatsApp bridge healthy");

    let bot_id = match &config.whatsapp.bot_id {
        Some(id) => id.clone(),
        None => {
            whatsapp
                .get_account()
                .await
                .context("Failed to read the bot account from the bridge")?
                .id
        }
    };
    info!("Bot account: {}", bot_id);

    let app = App::build(&config, Arc::new(whatsapp.clone()), llm, bot_id)?;

    let _sweeper = app.queue.spawn_sweeper(config.bot.sweep_interval);
    let _cleanup = app.wizards.spawn_cleanup(config.bot.wizard_ttl);

    info!("Listening for messages...");

    // Start message receiver
    let receiver = MessageReceiver::new(whatsapp, config.whatsapp.poll_interval);
    let mut stream = Box::pin(receiver.stream());

    // Main message loop
    loop {
        tokio::select! {
            Some(message) = stream.next() => {
                let router = app.router.clone();
                tokio::spawn(async move {
                    router.handle(&message).await;
                });
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
