//! Message receiver with polling.

use crate::client::WhatsAppClient;
use crate::types::*;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Message receiver that polls the bridge for new events.
pub struct MessageReceiver {
    client: WhatsAppClient,
    poll_interval: Duration,
}

impl MessageReceiver {
    pub fn new(client: WhatsAppClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Start receiving messages as an async stream.
    pub fn stream(self) -> impl Stream<Item = BotMessage> {
        async_stream::stream! {
            loop {
                match self.client.receive().await {
                    Ok(events) => {
                        for event in events {
                            if let Some(bot_msg) = BotMessage::from_incoming(&event) {
                                debug!("Received: {} from {} in {}",
                                    bot_msg.text.chars().take(50).collect::<String>(),
                                    bot_msg.author,
                                    bot_msg.chat_id
                                );
                                yield bot_msg;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Receive error: {}", e);
                        // Back off on error
                        sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
