//! services/api/src/adapters/telegram.rs
//!
//! `MessageSender` implementations: delivery through the Telegram Bot API, and
//! a log-only fallback for deployments without a bot token.

use async_trait::async_trait;
use coursemate_core::domain::Recipient;
use coursemate_core::ports::{MessageSender, PortError, PortResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

const TELEGRAM_API: &str = "https://api.telegram.org";

//=========================================================================================
// Telegram Bot API
//=========================================================================================

#[derive(Clone)]
pub struct TelegramSender {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, TELEGRAM_API.to_string())
    }

    /// Points the sender at a Bot API compatible server other than Telegram's.
    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
        }
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    #[instrument(skip(self, text), fields(actor_id = recipient.actor_id))]
    async fn send(&self, recipient: &Recipient, text: &str) -> PortResult<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &recipient.address,
                text,
            })
            .send()
            .await
            // The URL embeds the bot token; keep it out of error messages.
            .map_err(|e| PortError::Unexpected(e.without_url().to_string()))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.without_url().to_string()))?;

        if !status.is_success() || !body.ok {
            return Err(PortError::Unexpected(format!(
                "Telegram rejected the message ({}): {}",
                status,
                body.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

//=========================================================================================
// Log-only fallback
//=========================================================================================

/// Records notifications in the log instead of delivering them.
#[derive(Clone, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, recipient: &Recipient, text: &str) -> PortResult<()> {
        info!(
            actor_id = recipient.actor_id,
            address = %recipient.address,
            message = %text,
            "Notification (delivery disabled)"
        );
        Ok(())
    }
}
