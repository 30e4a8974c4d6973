pub mod anki_mcp;
pub mod card_llm;

pub use anki_mcp::AnkiMcpClient;
pub use card_llm::OpenAiCardGenerator;
