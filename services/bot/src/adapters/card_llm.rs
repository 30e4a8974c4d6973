//! services/bot/src/adapters/card_llm.rs
//!
//! This module contains the adapter for the card-generating LLM.
//! It implements the `FlashcardGenerator` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You turn one short user message into exactly ONE flashcard.

Reply with a single JSON object and nothing else (no markdown, no commentary), using exactly these keys:
{"front": "...", "back": "...", "create_reverse": true}

Strings use double quotes, booleans are lowercase true/false.

Preprocessing:
- Trim the message.
- If it contains a reverse-disable directive ("no reverse", "noreverse", "no_reverse", "no rev", "nr", "без реверса", "без обратной"), remember it and remove it from the content.

Language tag: when the source text is not Russian, append a tag such as [EN] or [PL] to the back. Never tag Russian sources.

Pick the first matching case:
A) The message already holds both sides (a bilingual pair, a term and its definition): keep both, fixing only obvious typos and spacing.
B) A full non-Russian sentence: front is the sentence with minimal corrections, back is a natural Russian translation.
C) A single non-Russian word or short phrase: front is a simple 3-5 word sentence in the source language using the term unchanged, back is the Russian translation of that sentence.
D) A term, abbreviation or concept: front is the term as given, back is a concise Russian explanation, one sentence where possible.

create_reverse is true unless the user asked for no reverse, or reversing makes no sense: the front contains "?", the back has two or more sentences, the back contains a newline or list markers, or the back is longer than 240 characters.

Examples:
USER_MESSAGE: warehouse
{"front":"I work in the warehouse.","back":"Я работаю на складе [EN]","create_reverse":true}
USER_MESSAGE: Zuchwalstwo
{"front":"Nie toleruję zuchwalstwa.","back":"Я не терплю дерзости [PL]","create_reverse":true}
USER_MESSAGE: ВВП no reverse
{"front":"ВВП","back":"совокупная стоимость всех конечных товаров и услуг, произведённых в стране за период.","create_reverse":false}"#;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(15);

use anki_bot_core::{
    domain::Flashcard,
    ports::{FlashcardGenerator, PortError, PortResult},
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FlashcardGenerator` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCardGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCardGenerator {
    /// Creates a new `OpenAiCardGenerator`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `FlashcardGenerator` Trait Implementation
//=========================================================================================

#[async_trait]
impl FlashcardGenerator for OpenAiCardGenerator {
    async fn generate(&self, text: &str) -> PortResult<Flashcard> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_INSTRUCTIONS)
                    .build()
                    .map_err(|e| PortError::Generation(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(format!("USER_MESSAGE: {}", text.trim()))
                    .build()
                    .map_err(|e| PortError::Generation(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Generation(e.to_string()))?;

        info!(model = %self.model, "Card generation request sent");
        let response = tokio::time::timeout(GENERATION_TIMEOUT, self.client.chat().create(request))
            .await
            .map_err(|_| PortError::Generation("Card generation timed out".to_string()))?
            .map_err(|e: OpenAIError| PortError::Generation(e.to_string()))?;
        info!("Card generation response received");

        let raw = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Generation("Card generation LLM returned no message".to_string())
            })?;

        parse_flashcard_json(raw.trim())
    }
}

//=========================================================================================
// Output Parsing
//=========================================================================================

/// Parses the model's raw reply into a card.
///
/// The reply must be a JSON object with non-blank `front` and `back` and a
/// boolean `create_reverse`. Anything else is logged with the raw output.
pub fn parse_flashcard_json(raw: &str) -> PortResult<Flashcard> {
    let invalid = |reason: &str| {
        error!(raw, reason, "Card JSON parse error");
        PortError::Generation(reason.to_string())
    };

    let payload: Value =
        serde_json::from_str(raw).map_err(|_| invalid("Failed to parse flashcard JSON"))?;
    let Value::Object(fields) = payload else {
        return Err(invalid("Flashcard JSON must be an object"));
    };

    let front = field_text(fields.get("front"));
    let back = field_text(fields.get("back"));
    let Some(Value::Bool(create_reverse)) = fields.get("create_reverse") else {
        return Err(invalid("Flashcard JSON missing required fields"));
    };

    Flashcard::new(front, back, *create_reverse)
        .map_err(|_| invalid("Flashcard JSON missing required fields"))
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Collects formatted `tracing` output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn parse_capturing_logs(raw: &str) -> (PortResult<Flashcard>, String) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || parse_flashcard_json(raw));
        let output = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        (result, output)
    }

    #[test]
    fn parses_valid_card() {
        let card =
            parse_flashcard_json(r#"{"front":"A","back":"B","create_reverse":true}"#).unwrap();
        assert_eq!(card, Flashcard::new("A", "B", true).unwrap());
    }

    #[test]
    fn trims_front_and_back() {
        let card = parse_flashcard_json(
            r#"{"front":"  I work in the warehouse. ","back":"Я работаю на складе [EN]\n","create_reverse":false}"#,
        )
        .unwrap();
        assert_eq!(card.front, "I work in the warehouse.");
        assert_eq!(card.back, "Я работаю на складе [EN]");
        assert!(!card.create_reverse);
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_flashcard_json("not json"),
            Err(PortError::Generation(_))
        ));
        assert!(matches!(
            parse_flashcard_json("{bad}"),
            Err(PortError::Generation(_))
        ));
    }

    #[test]
    fn invalid_output_is_logged_with_raw_text() {
        let (result, output) = parse_capturing_logs("{bad}");

        assert!(matches!(result, Err(PortError::Generation(_))));
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("Card JSON parse error"), "{output}");
        assert!(output.contains("{bad}"), "{output}");
        assert!(output.contains("Failed to parse flashcard JSON"), "{output}");
    }

    #[test]
    fn missing_fields_are_logged_with_reason() {
        let raw = r#"{"front":"A","back":"B","create_reverse":"yes"}"#;
        let (result, output) = parse_capturing_logs(raw);

        assert!(result.is_err());
        assert!(output.contains("Flashcard JSON missing required fields"), "{output}");
        assert!(output.contains("create_reverse"), "{output}");
    }

    #[test]
    fn valid_output_logs_nothing() {
        let (result, output) =
            parse_capturing_logs(r#"{"front":"A","back":"B","create_reverse":false}"#);

        assert!(result.is_ok());
        assert!(output.is_empty(), "{output}");
    }

    #[test]
    fn rejects_non_object() {
        assert!(parse_flashcard_json(r#"["front","back",true]"#).is_err());
    }

    #[test]
    fn rejects_markdown_fenced_output() {
        let raw = "```json\n{\"front\":\"A\",\"back\":\"B\",\"create_reverse\":true}\n```";
        assert!(parse_flashcard_json(raw).is_err());
    }

    #[test]
    fn rejects_missing_or_blank_sides() {
        assert!(parse_flashcard_json(r#"{"back":"B","create_reverse":true}"#).is_err());
        assert!(parse_flashcard_json(r#"{"front":"  ","back":"B","create_reverse":true}"#).is_err());
        assert!(parse_flashcard_json(r#"{"front":"A","back":null,"create_reverse":true}"#).is_err());
    }

    #[test]
    fn create_reverse_must_be_boolean() {
        assert!(parse_flashcard_json(r#"{"front":"A","back":"B","create_reverse":"true"}"#).is_err());
        assert!(parse_flashcard_json(r#"{"front":"A","back":"B","create_reverse":1}"#).is_err());
        assert!(parse_flashcard_json(r#"{"front":"A","back":"B"}"#).is_err());
    }

    #[test]
    fn non_string_sides_are_stringified() {
        let card = parse_flashcard_json(r#"{"front":1984,"back":"Orwell","create_reverse":false}"#)
            .unwrap();
        assert_eq!(card.front, "1984");
    }
}
