//! Defines the JSON message protocol between the terminal client and the chat server.
//!
//! Every WebSocket frame carries one JSON document, discriminated by its
//! `type` field. Commands flow client-to-server, events server-to-client.

use serde::{Deserialize, Serialize};

/// Commands sent from the client to the server.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Applies provider, model, speech and knowledge-base settings for this connection.
    Config {
        provider: String,
        /// Omitted when blank so the server falls back to the provider default.
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        asr: String,
        tts: String,
        kb: bool,
        kb_topk: u32,
    },
    /// A typed chat message from the user.
    UserText { text: String },
    /// One complete recorded utterance, base64-encoded WAV.
    UserAudio { data: String },
    /// Asks the server to clear the conversation history.
    Reset,
}

/// Events sent from the server to the client.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// An informational notice for the user.
    Info { msg: String },
    /// A progress notice (e.g. "Transcribing...").
    Status { msg: String },
    /// A server-side failure. Rendered like a notice, with an error label.
    Error { msg: String },
    /// The recognized text of an utterance the user sent as audio.
    Transcript { text: String },
    /// An incremental fragment of the assistant's reply.
    Partial { text: String },
    /// The authoritative, complete reply text, superseding all partials.
    Final { text: String },
    /// A clip of synthesized speech, base64-encoded.
    AudioChunk {
        data: String,
        /// Defaults to `audio/wav` when absent.
        #[serde(default)]
        mime: Option<String>,
    },
    /// Marks the end of the synthesized speech for one reply.
    AudioDone,
}
