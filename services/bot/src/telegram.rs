//! services/bot/src/telegram.rs
//!
//! The chat transport: long-polls the Telegram Bot API, hands each text
//! message to the `FlashcardService` and sends the reply back.

use anki_bot_core::FlashcardService;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telegram API error: {0}")]
    Api(String),
}

//=========================================================================================
// Bot API Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    reply_parameters: ReplyParameters,
}

#[derive(Serialize)]
struct ReplyParameters {
    message_id: i64,
}

/// A text message from an identified sender, ready for the service.
#[derive(Debug, PartialEq, Eq)]
pub struct IncomingText<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub text: &'a str,
}

impl Update {
    /// Returns the text message carried by this update, if there is one with a known sender.
    pub fn incoming_text(&self) -> Option<IncomingText<'_>> {
        let message = self.message.as_ref()?;
        Some(IncomingText {
            chat_id: message.chat.id,
            message_id: message.message_id,
            user_id: message.from.as_ref()?.id,
            text: message.text.as_deref()?,
        })
    }
}

//=========================================================================================
// The Polling Bot
//=========================================================================================

pub struct TelegramBot {
    client: reqwest::Client,
    /// `https://api.telegram.org/bot<token>`; contains the credential, never log it.
    api_url: String,
    service: FlashcardService,
}

impl TelegramBot {
    pub fn new(token: &str, service: FlashcardService) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            api_url: format!("{API_BASE}/bot{token}"),
            service,
        })
    }

    /// Polls for updates until `shutdown` is cancelled.
    ///
    /// Updates are handled one at a time, in order.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Telegram polling started");
        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                updates = self.get_updates(offset) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(&update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Telegram getUpdates failed, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_PAUSE) => {}
                    }
                }
            }
        }
        info!("Telegram polling stopped");
    }

    async fn handle_update(&self, update: &Update) {
        let Some(incoming) = update.incoming_text() else {
            debug!(update_id = update.update_id, "Skipping update without text");
            return;
        };

        let response = self
            .service
            .handle_text(incoming.text, Some(incoming.user_id))
            .await;
        if !response.should_reply() {
            return;
        }

        if let Err(e) = self
            .send_message(incoming.chat_id, incoming.message_id, &response.message)
            .await
        {
            error!(error = %e, chat_id = incoming.chat_id, "Failed to send Telegram reply");
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: POLL_TIMEOUT_SECS,
                allowed_updates: &["message"],
            },
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        reply_to: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    reply_parameters: ReplyParameters {
                        message_id: reply_to,
                    },
                },
            )
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> Result<T, TelegramError> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{method}", self.api_url))
            .json(body)
            .send()
            .await
            // reqwest errors embed the URL, which carries the token.
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        parse_api_response(method, response)
    }
}

fn parse_api_response<T>(method: &str, response: ApiResponse<T>) -> Result<T, TelegramError> {
    match response {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse { description, .. } => Err(TelegramError::Api(format!(
            "{method}: {}",
            description.unwrap_or_else(|| "no result".to_string())
        ))),
    }
}
