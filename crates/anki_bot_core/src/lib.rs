pub mod domain;
pub mod ports;
pub mod service;
pub mod state;

pub use domain::{AddResult, BotResponse, Flashcard};
pub use ports::{CardStore, FlashcardGenerator, PortError, PortResult};
pub use service::FlashcardService;
pub use state::LastActionState;
