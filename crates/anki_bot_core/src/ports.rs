//! crates/anki_bot_core/src/ports.rs
//!
//! Defines the service contracts (traits) the flashcard service depends on.
//! These traits form the boundary of the hexagonal architecture, so the core
//! never knows which model generates cards or how the Anki backend is reached.

use crate::domain::Flashcard;
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The backend could not be reached: connection refused, timeout, non-success status.
    #[error("Network error: {0}")]
    Network(String),
    /// The backend answered, but not in the shape the protocol requires,
    /// or it reported an error of its own.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The generation capability failed or produced an invalid card.
    #[error("Generation error: {0}")]
    Generation(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait FlashcardGenerator: Send + Sync {
    /// Turns a free-text message into a single structured flashcard.
    async fn generate(&self, text: &str) -> PortResult<Flashcard>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    /// Persists a card and returns the note id the backend assigned to it.
    async fn add_note(&self, flashcard: &Flashcard) -> PortResult<i64>;

    async fn delete_note(&self, note_id: i64) -> PortResult<()>;

    /// Pushes local backend changes to the remote collection.
    async fn sync(&self) -> PortResult<()>;
}
