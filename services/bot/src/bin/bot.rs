//! services/bot/src/bin/bot.rs

use anki_bot_core::{FlashcardService, LastActionState};
use async_openai::{config::OpenAIConfig, Client};
use bot_lib::{
    adapters::{AnkiMcpClient, OpenAiCardGenerator},
    config::Config,
    error::BotError,
    telegram::TelegramBot,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), BotError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting bot...");

    // --- 2. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| BotError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let generator = Arc::new(OpenAiCardGenerator::new(
        Client::with_config(openai_config),
        config.card_model.clone(),
    ));
    let store = Arc::new(AnkiMcpClient::new(
        &config.anki_mcp_url,
        config.anki_deck.clone(),
    )?);
    info!(url = %config.anki_mcp_url, deck = %config.anki_deck, "Anki MCP client ready");

    // --- 3. Build the Flashcard Service ---
    let service = FlashcardService::new(
        config.allowed_user_id,
        generator,
        store,
        Arc::new(LastActionState::new()),
    );

    // --- 4. Run the Telegram Transport Until Ctrl-C ---
    let bot = TelegramBot::new(&config.telegram_token, service)?;
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    bot.run(shutdown).await;
    Ok(())
}
