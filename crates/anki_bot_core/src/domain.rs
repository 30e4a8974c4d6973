//! crates/anki_bot_core/src/domain.rs
//!
//! Defines the pure, core data structures passed between the bot's components.
//! These structs are independent of any transport or serialization format.

use crate::ports::{PortError, PortResult};

/// A single flashcard: the front/back pair plus whether a reversed card is wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    pub create_reverse: bool,
}

impl Flashcard {
    /// Builds a card, trimming both sides. Either side being blank is a generation error.
    pub fn new(
        front: impl AsRef<str>,
        back: impl AsRef<str>,
        create_reverse: bool,
    ) -> PortResult<Self> {
        let front = front.as_ref().trim();
        let back = back.as_ref().trim();
        if front.is_empty() || back.is_empty() {
            return Err(PortError::Generation(
                "Flashcard front and back must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            front: front.to_string(),
            back: back.to_string(),
            create_reverse,
        })
    }
}

/// A card that the backend has persisted, together with the id it assigned.
/// This is the unit of undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    pub note_id: i64,
    pub flashcard: Flashcard,
}

/// The reply the bot hands back to the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BotResponse {
    pub message: String,
    /// Set for unauthorized senders. The transport must not answer at all.
    pub ignored: bool,
}

impl BotResponse {
    pub fn reply(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ignored: false,
        }
    }

    pub fn ignored() -> Self {
        Self {
            message: String::new(),
            ignored: true,
        }
    }

    /// Whether the transport should send `message` back to the conversation.
    pub fn should_reply(&self) -> bool {
        !self.ignored && !self.message.is_empty()
    }
}
