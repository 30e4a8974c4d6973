//! crates/anki_bot_core/src/service.rs
//!
//! The flashcard service: access control, command dispatch and the add/undo
//! workflows that sit between the chat transport and the two ports.

use crate::{
    domain::{AddResult, BotResponse, Flashcard},
    ports::{CardStore, FlashcardGenerator},
    state::LastActionState,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Message that undoes the most recent add.
pub const DELETE_COMMAND: &str = "/d";

const EMPTY_INPUT_MESSAGE: &str = "Please send a non-empty message.";
const GENERATION_FAILED_MESSAGE: &str = "Sorry, I could not generate a flashcard.";
const ADD_FAILED_MESSAGE: &str = "Failed to add flashcard to Anki.";
const NOTHING_TO_DELETE_MESSAGE: &str = "Nothing to delete.";
const DELETE_FAILED_MESSAGE: &str = "Failed to delete flashcard from Anki.";
const SYNC_WARNING: &str = "Warning: Anki sync failed.";

/// Converts chat messages into Anki notes for a single allowed user.
#[derive(Clone)]
pub struct FlashcardService {
    allowed_user_id: i64,
    generator: Arc<dyn FlashcardGenerator>,
    store: Arc<dyn CardStore>,
    state: Arc<LastActionState>,
}

impl FlashcardService {
    pub fn new(
        allowed_user_id: i64,
        generator: Arc<dyn FlashcardGenerator>,
        store: Arc<dyn CardStore>,
        state: Arc<LastActionState>,
    ) -> Self {
        Self {
            allowed_user_id,
            generator,
            store,
            state,
        }
    }

    /// Handles one inbound message and returns the reply for the transport.
    ///
    /// A `sender_id` that is present but not the allowed user yields an
    /// ignored response without touching the generator, the store or the
    /// undo slot.
    pub async fn handle_text(&self, text: &str, sender_id: Option<i64>) -> BotResponse {
        if sender_id.is_some_and(|id| id != self.allowed_user_id) {
            return BotResponse::ignored();
        }

        let normalized = text.trim();
        if normalized.is_empty() {
            return BotResponse::reply(EMPTY_INPUT_MESSAGE);
        }
        if normalized == DELETE_COMMAND {
            return self.handle_delete().await;
        }
        self.handle_add(normalized).await
    }

    async fn handle_add(&self, text: &str) -> BotResponse {
        let flashcard = match self.generator.generate(text).await {
            Ok(flashcard) => flashcard,
            Err(e) => {
                error!(error = %e, phase = "generate", "Generator error");
                return BotResponse::reply(GENERATION_FAILED_MESSAGE);
            }
        };

        // The outcome of the pre-add sync is never shown to the user.
        let _ = self.try_sync().await;

        let note_id = match self.store.add_note(&flashcard).await {
            Ok(note_id) => note_id,
            Err(e) => {
                error!(error = %e, phase = "add_note", "Anki add failed");
                return BotResponse::reply(ADD_FAILED_MESSAGE);
            }
        };
        info!(note_id, "Flashcard added");

        self.state
            .set_last_added(AddResult {
                note_id,
                flashcard: flashcard.clone(),
            })
            .await;

        let sync_warning = self.try_sync().await;
        BotResponse::reply(format_card_message("Flashcard added:", &flashcard, sync_warning))
    }

    async fn handle_delete(&self) -> BotResponse {
        let Some(last) = self.state.last_added().await else {
            return BotResponse::reply(NOTHING_TO_DELETE_MESSAGE);
        };

        let _ = self.try_sync().await;

        if let Err(e) = self.store.delete_note(last.note_id).await {
            error!(error = %e, note_id = last.note_id, phase = "delete_note", "Anki delete failed");
            return BotResponse::reply(DELETE_FAILED_MESSAGE);
        }
        info!(note_id = last.note_id, "Flashcard deleted");

        let sync_warning = self.try_sync().await;
        if !self.state.clear_if_current(last.note_id).await {
            warn!(
                note_id = last.note_id,
                "Undo slot was replaced while deleting; keeping the newer card"
            );
        }

        BotResponse::reply(format_card_message(
            "Flashcard deleted:",
            &last.flashcard,
            sync_warning,
        ))
    }

    /// Runs a sync and turns any failure into a warning line.
    async fn try_sync(&self) -> Option<&'static str> {
        match self.store.sync().await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, phase = "sync", "Anki sync failed");
                Some(SYNC_WARNING)
            }
        }
    }
}

fn format_card_message(header: &str, flashcard: &Flashcard, sync_warning: Option<&str>) -> String {
    let reverse = if flashcard.create_reverse { "yes" } else { "no" };
    let mut lines = vec![
        header.to_string(),
        format!("Front: {}", flashcard.front),
        format!("Back: {}", flashcard.back),
        format!("Reverse card: {reverse}"),
    ];
    if let Some(warning) = sync_warning {
        lines.push(warning.to_string());
    }
    lines.join("\n")
}
