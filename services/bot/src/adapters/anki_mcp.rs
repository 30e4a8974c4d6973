//! services/bot/src/adapters/anki_mcp.rs
//!
//! This module contains the adapter for an Anki MCP server.
//! It implements the `CardStore` port from the `core` crate.
//!
//! Every tool call is two HTTP round trips: an `initialize` request that
//! yields a session id in the `mcp-session-id` response header, then the
//! `tools/call` request carrying that header. Sessions are never reused.
//! Responses arrive as server-sent-event text with `data: <json>` lines.

use anki_bot_core::{
    domain::Flashcard,
    ports::{CardStore, PortError, PortResult},
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_VALUE: &str = "application/json, text/event-stream";
const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "anki-telegram";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const REVERSED_MODEL: &str = "Basic (and reversed card)";
const BASIC_MODEL: &str = "Basic";

//=========================================================================================
// Adapter Error Type
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnkiMcpError {
    #[error("Failed to reach Anki MCP server: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Anki MCP server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Missing MCP session id")]
    MissingSessionId,
    /// The server answered with a JSON-RPC `error` payload.
    #[error("{0}")]
    Backend(String),
    #[error("Unexpected MCP response")]
    UnexpectedResponse,
    #[error("Anki returned empty note id")]
    MissingNoteId,
    #[error("Anki returned invalid note id: {0}")]
    InvalidNoteId(String),
}

impl From<AnkiMcpError> for PortError {
    fn from(err: AnkiMcpError) -> Self {
        match err {
            AnkiMcpError::Http(_) | AnkiMcpError::Status { .. } => {
                PortError::Network(err.to_string())
            }
            _ => PortError::Protocol(err.to_string()),
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CardStore` on top of an Anki MCP server.
#[derive(Clone)]
pub struct AnkiMcpClient {
    client: reqwest::Client,
    endpoint: String,
    deck_name: String,
}

impl AnkiMcpClient {
    /// Creates a new `AnkiMcpClient` posting to `base_url`.
    pub fn new(base_url: &str, deck_name: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/", base_url.trim_end_matches('/')),
            deck_name: deck_name.into(),
        })
    }

    /// Runs one tool on a fresh session and returns its result object.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<Map<String, Value>, AnkiMcpError> {
        info!(tool = name, "Anki MCP call started");
        let session_id = self.initialize_session().await?;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        });
        let (body, _) = self.post(&payload, Some(&session_id)).await?;
        let result = extract_result(&body)?;
        info!(tool = name, "Anki MCP call completed");
        Ok(result)
    }

    async fn initialize_session(&self) -> Result<String, AnkiMcpError> {
        debug!("Anki MCP initialize started");
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION") },
            },
        });
        let (body, session_id) = self.post(&payload, None).await?;
        extract_result(&body)?;
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .ok_or(AnkiMcpError::MissingSessionId)?;
        debug!("Anki MCP initialize completed");
        Ok(session_id)
    }

    /// Sends one JSON-RPC message and returns the body text plus the
    /// session id header, if the server set one.
    async fn post(
        &self,
        payload: &Value,
        session_id: Option<&str>,
    ) -> Result<(String, Option<String>), AnkiMcpError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, ACCEPT_VALUE)
            .json(payload);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Anki MCP request failed");
            AnkiMcpError::Http(e)
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Anki MCP request rejected");
            return Err(AnkiMcpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok((body, session_id))
    }
}

//=========================================================================================
// `CardStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CardStore for AnkiMcpClient {
    async fn add_note(&self, flashcard: &Flashcard) -> PortResult<i64> {
        let model_name = if flashcard.create_reverse {
            REVERSED_MODEL
        } else {
            BASIC_MODEL
        };
        let arguments = json!({
            "deck_name": self.deck_name,
            "model_name": model_name,
            "fields": { "Front": flashcard.front, "Back": flashcard.back },
            "allow_duplicate": true,
        });
        let result = self.call_tool("addNote", arguments).await?;
        Ok(note_id_from(&result)?)
    }

    async fn delete_note(&self, note_id: i64) -> PortResult<()> {
        let arguments = json!({ "notes": [note_id], "confirmDeletion": true });
        self.call_tool("deleteNotes", arguments).await?;
        Ok(())
    }

    async fn sync(&self) -> PortResult<()> {
        self.call_tool("sync", json!({})).await?;
        Ok(())
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

/// Finds the first `data:` line holding JSON and returns its result object,
/// preferring the nested `structuredContent` when the server provides one.
pub fn extract_result(body: &str) -> Result<Map<String, Value>, AnkiMcpError> {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let Ok(payload) = serde_json::from_str::<Value>(data.trim()) else {
            continue;
        };
        if let Some(err) = payload.get("error").filter(|err| is_present(err)) {
            let message = match err {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            };
            return Err(AnkiMcpError::Backend(message));
        }
        if let Some(Value::Object(result)) = payload.get("result") {
            return Ok(match result.get("structuredContent") {
                Some(Value::Object(structured)) => structured.clone(),
                _ => result.clone(),
            });
        }
    }
    Err(AnkiMcpError::UnexpectedResponse)
}

/// Whether a JSON-RPC `error` value actually carries an error.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn note_id_from(result: &Map<String, Value>) -> Result<i64, AnkiMcpError> {
    match result.get("note_id") {
        None | Some(Value::Null) => Err(AnkiMcpError::MissingNoteId),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| AnkiMcpError::InvalidNoteId(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| AnkiMcpError::InvalidNoteId(s.clone())),
        Some(other) => Err(AnkiMcpError::InvalidNoteId(other.to_string())),
    }
}
