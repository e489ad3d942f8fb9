//! Telegram transport.
//!
//! Long-polling bot: text messages go through the gateway, replies come back
//! to the originating chat, and a bus listener delivers proactive notices
//! over the same channel. Delivery failures are logged and never unwound
//! into session state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskwren_bus::{EventBus, Topic};
use taskwren_gateway::Gateway;
use taskwren_schema::{BusMessage, InboundMessage, UserId};
use teloxide::prelude::*;
use teloxide::types::ChatAction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
}

const GREETING: &str = "Hi! I'm your personal assistant. I can help you manage your \
                        calendar and tasks.\nJust talk to me naturally and I'll do my best to help!";

pub fn to_inbound(chat_id: i64, text: &str) -> InboundMessage {
    InboundMessage::new(UserId(chat_id), text)
}

pub fn is_start_command(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed == "/start" || trimmed.starts_with("/start ")
}

pub struct TelegramBot {
    config: TelegramConfig,
    gateway: Arc<Gateway>,
    bus: Arc<EventBus>,
}

impl TelegramBot {
    pub fn new(config: TelegramConfig, gateway: Arc<Gateway>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            gateway,
            bus,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let bot = Bot::new(&self.config.token);
        let gateway = self.gateway;

        tokio::spawn(notice_listener(self.bus.clone(), bot.clone()));

        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let gateway = gateway.clone();
            async move {
                let text = match msg.text() {
                    Some(text) => text.to_string(),
                    None => return Ok::<(), teloxide::RequestError>(()),
                };
                let chat_id = msg.chat.id;
                let user = UserId(chat_id.0);

                if is_start_command(&text) {
                    gateway.reset(user).await;
                    if let Err(err) = bot.send_message(chat_id, GREETING).await {
                        tracing::error!(%user, error = %err, "failed to send greeting");
                    }
                    return Ok(());
                }

                let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

                tokio::spawn(async move {
                    // Telegram drops the typing indicator after ~5s; keep it
                    // alive while the turn runs.
                    let typing_handle = tokio::spawn({
                        let bot = bot.clone();
                        async move {
                            loop {
                                tokio::time::sleep(std::time::Duration::from_secs(4)).await;
                                if bot
                                    .send_chat_action(chat_id, ChatAction::Typing)
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                        }
                    });

                    let outbound = gateway.handle_inbound(to_inbound(chat_id.0, &text)).await;
                    typing_handle.abort();

                    if let Err(err) = bot.send_message(chat_id, outbound.text).await {
                        tracing::error!(%user, error = %err, "failed to send reply");
                    }
                });

                Ok(())
            }
        });

        tracing::info!("telegram bot starting");
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}

/// Deliver proactive notices produced by the scheduler.
async fn notice_listener(bus: Arc<EventBus>, bot: Bot) {
    let mut rx = bus.subscribe(Topic::NoticeReady).await;
    while let Some(msg) = rx.recv().await {
        let BusMessage::NoticeReady { user, text } = msg else {
            continue;
        };
        match bot.send_message(ChatId(user.0), &text).await {
            Ok(_) => tracing::info!(%user, "proactive notice delivered"),
            Err(err) => tracing::error!(%user, error = %err, "failed to deliver notice"),
        }
    }
}
