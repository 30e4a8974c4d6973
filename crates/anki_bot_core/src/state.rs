//! crates/anki_bot_core/src/state.rs
//!
//! Holds the single undo slot: the most recently added card.

use crate::domain::AddResult;
use tokio::sync::Mutex;

/// Single-slot record of the last successful add.
///
/// A second add overwrites the slot, so undo always targets the latest card.
/// Every operation takes the lock once, which keeps a concurrent add and
/// delete from losing each other's update.
#[derive(Debug, Default)]
pub struct LastActionState {
    slot: Mutex<Option<AddResult>>,
}

impl LastActionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_last_added(&self, result: AddResult) {
        *self.slot.lock().await = Some(result);
    }

    pub async fn last_added(&self) -> Option<AddResult> {
        self.slot.lock().await.clone()
    }

    /// Empties the slot only if it still holds `note_id`.
    ///
    /// Returns `false` when a newer add replaced the entry in the meantime;
    /// that entry stays in place.
    pub async fn clear_if_current(&self, note_id: i64) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(current) if current.note_id == note_id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}
