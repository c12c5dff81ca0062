//! Chatvox Client Library Crate
//!
//! This library contains all the logic for the terminal voice-chat client:
//! configuration, the WebSocket connection manager, the session controller,
//! transcript rendering, microphone capture, speaker playback, and the
//! knowledge-base uploader. The `chatvox` binary is a thin wrapper around it.

pub mod audio;
pub mod config;
pub mod connection;
pub mod ingest;
pub mod options;
pub mod session;
pub mod transcript;
