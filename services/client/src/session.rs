//! The session controller: one object per process owning the connection,
//! the capture session, the transcript, and the chat options snapshot.
//!
//! Control flow is reactive: a `tokio::select!` loop multiplexes REPL
//! lines and inbound server events. No error here is fatal to the
//! session; failures become transcript notices and the next user action
//! may succeed independently.

use crate::{
    audio::{self, capture::CaptureSession, playback::Player},
    config::Config,
    connection::Connection,
    ingest::{IngestOutcome, KbClient},
    options::{ChatOptions, text_command},
    transcript::Transcript,
};
use anyhow::{Context, Result};
use chatvox_protocol::{ClientCommand, ServerEvent};
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const HELP: &[&str] = &[
    "/config [key=value ...]  apply settings (provider, model, asr, tts, kb, topk)",
    "/record                  start or stop a voice message",
    "/ingest <files...>       upload documents to the knowledge base",
    "/reset                   clear the server-side conversation",
    "/devices                 list audio devices",
    "/quit                    exit",
];

enum Flow {
    Continue,
    Quit,
}

/// Owns all per-tab state the browser client kept in module globals.
pub struct SessionController {
    config: Config,
    options: ChatOptions,
    transcript: Transcript<io::Stdout>,
    player: Player,
    kb: KbClient,
    connection: Option<Connection>,
    capture: Option<CaptureSession>,
    events_tx: mpsc::Sender<ServerEvent>,
    events_rx: Option<mpsc::Receiver<ServerEvent>>,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let options = ChatOptions::from_config(&config);
        let player = Player::new(config.output_device.clone());
        let kb = KbClient::new(config.ingest_url());
        Self {
            config,
            options,
            transcript: Transcript::stdout(),
            player,
            kb,
            connection: None,
            capture: None,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// The main event loop: REPL lines in, server events out, until EOF,
    /// `/quit`, or Ctrl+C.
    pub async fn run(&mut self) -> Result<()> {
        let mut events_rx = self
            .events_rx
            .take()
            .context("session controller already running")?;

        // Connect eagerly so startup problems surface before the first send.
        if let Err(e) = self.ensure_open().await {
            self.transcript
                .notice("error", &format!("cannot reach server: {e:#}"))?;
        }
        self.transcript
            .notice("system", "type a message and press Enter; /help for commands")?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => match self.handle_line(&line).await {
                            Ok(Flow::Quit) => break,
                            Ok(Flow::Continue) => {}
                            Err(e) => self.transcript.notice("error", &format!("{e:#}"))?,
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!("stdin closed: {e}");
                            break;
                        }
                    }
                }
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event)?,
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Guarantees an open channel, connecting (or reconnecting) if the
    /// current one is not open.
    async fn ensure_open(&mut self) -> Result<()> {
        let reconnect = self.connection.as_ref().is_none_or(|c| !c.is_open());
        if reconnect {
            let url = self.config.ws_url();
            let connection = Connection::open(&url, self.events_tx.clone()).await?;
            self.connection = Some(connection);
        }
        Ok(())
    }

    async fn send(&mut self, cmd: ClientCommand) -> Result<()> {
        self.ensure_open().await?;
        self.connection
            .as_mut()
            .context("connection unavailable")?
            .send(&cmd)
            .await
    }

    async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let command = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();
            return self.handle_command(command, &args).await;
        }

        // A plain line is a chat message; whitespace-only lines send nothing.
        if let Some(cmd) = text_command(trimmed) {
            self.send(cmd).await?;
        }
        Ok(Flow::Continue)
    }

    async fn handle_command(&mut self, command: &str, args: &[&str]) -> Result<Flow> {
        match command {
            "help" => {
                for line in HELP {
                    self.transcript.notice("help", line)?;
                }
            }
            "config" => self.apply_config(args).await?,
            "record" => self.toggle_record().await?,
            "reset" => self.send(ClientCommand::Reset).await?,
            "ingest" => self.run_ingest(args).await?,
            "devices" => self.list_devices()?,
            "quit" | "exit" => return Ok(Flow::Quit),
            other => {
                self.transcript
                    .notice("error", &format!("unknown command '/{other}'; try /help"))?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Updates the options snapshot from `key=value` arguments, then sends
    /// the resulting `config` command. Bad arguments send nothing.
    async fn apply_config(&mut self, args: &[&str]) -> Result<()> {
        let pairs = match parse_config_args(args) {
            Ok(pairs) => pairs,
            Err(e) => {
                self.transcript.notice("error", &e)?;
                return Ok(());
            }
        };

        let mut updated = self.options.clone();
        for (key, value) in &pairs {
            if let Err(e) = updated.apply(key, value) {
                self.transcript.notice("error", &e)?;
                return Ok(());
            }
        }
        self.options = updated;

        self.send(self.options.to_command()).await?;
        let summary = self.options.summary();
        self.transcript.notice("system", &summary)?;
        Ok(())
    }

    /// Idle -> Recording -> Idle toggle; at most one capture session exists.
    async fn toggle_record(&mut self) -> Result<()> {
        if let Some(session) = self.capture.take() {
            self.transcript
                .notice("system", "recording stopped, sending...")?;
            // Joining the capture thread blocks, so finalize off-runtime.
            let clip = tokio::task::spawn_blocking(move || session.finish())
                .await
                .context("capture finalize task failed")?;
            match clip {
                Ok(samples) => {
                    let data = audio::encode_clip_base64(&samples)?;
                    self.send(ClientCommand::UserAudio { data }).await?;
                }
                Err(e) => {
                    self.transcript
                        .notice("error", &format!("recording failed: {e}"))?;
                }
            }
        } else {
            let device = self.config.input_device.clone();
            let started = tokio::task::spawn_blocking(move || CaptureSession::start(device.as_deref()))
                .await
                .context("capture start task failed")?;
            match started {
                Ok(session) => {
                    self.capture = Some(session);
                    self.transcript
                        .notice("system", "recording... /record again to stop")?;
                }
                // Denied permission or a missing device lands here, as a
                // notice rather than a fault.
                Err(e) => {
                    self.transcript
                        .notice("error", &format!("microphone unavailable: {e}"))?;
                }
            }
        }
        Ok(())
    }

    async fn run_ingest(&mut self, args: &[&str]) -> Result<()> {
        let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
        if paths.is_empty() {
            self.transcript
                .notice("system", "select at least one file: /ingest <files...>")?;
            return Ok(());
        }

        self.transcript
            .notice("system", &format!("uploading {} file(s)...", paths.len()))?;
        match self.kb.ingest(&paths).await {
            Ok(IngestOutcome::Added(n)) => {
                self.transcript
                    .notice("system", &format!("ingested {n} chunks"))?;
            }
            Ok(IngestOutcome::Rejected) => {
                self.transcript.notice("error", "ingestion failed")?;
            }
            Ok(IngestOutcome::NothingSelected) => {
                self.transcript
                    .notice("system", "select at least one file: /ingest <files...>")?;
            }
            // Transport and file errors carry their own prefixes and stay
            // distinct from the ok-false case.
            Err(e) => {
                self.transcript.notice("error", &format!("{e}"))?;
            }
        }
        Ok(())
    }

    fn list_devices(&mut self) -> Result<()> {
        match audio::capture::list_input_devices() {
            Ok(names) => {
                self.transcript
                    .notice("system", &format!("microphones: {}", names.join(", ")))?;
            }
            Err(e) => self.transcript.notice("error", &format!("{e}"))?,
        }
        match audio::playback::list_output_devices() {
            Ok(names) => {
                self.transcript
                    .notice("system", &format!("speakers: {}", names.join(", ")))?;
            }
            Err(e) => self.transcript.notice("error", &format!("{e}"))?,
        }
        Ok(())
    }

    /// Dispatches one inbound server event.
    fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Info { msg } | ServerEvent::Status { msg } => {
                self.transcript.notice("system", &msg)?;
            }
            ServerEvent::Error { msg } => {
                self.transcript.notice("error", &msg)?;
            }
            ServerEvent::Transcript { text } => {
                self.transcript.user(&text)?;
            }
            ServerEvent::Partial { text } => {
                self.transcript.partial(&text)?;
            }
            ServerEvent::Final { text } => {
                self.transcript.finalize(&text)?;
            }
            ServerEvent::AudioChunk { data, mime } => {
                let mime = mime.unwrap_or_else(|| "audio/wav".to_string());
                match audio::decode_clip_base64(&data) {
                    Ok((samples, rate)) => {
                        if let Err(e) = self.player.play(&samples, rate) {
                            self.transcript
                                .notice("error", &format!("playback failed: {e}"))?;
                        }
                    }
                    Err(e) => {
                        self.transcript
                            .notice("error", &format!("cannot play {mime} clip: {e}"))?;
                    }
                }
            }
            ServerEvent::AudioDone => {
                debug!("assistant finished speaking");
            }
        }
        Ok(())
    }
}

/// Splits `/config` arguments into `(key, value)` pairs.
fn parse_config_args(args: &[&str]) -> std::result::Result<Vec<(String, String)>, String> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected key=value, got '{arg}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_args_split_into_pairs() {
        let pairs = parse_config_args(&["provider=openai", "model=gpt-4o", "kb=on"]).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("provider".to_string(), "openai".to_string()),
                ("model".to_string(), "gpt-4o".to_string()),
                ("kb".to_string(), "on".to_string()),
            ]
        );
    }

    #[test]
    fn config_arg_without_equals_is_rejected() {
        let err = parse_config_args(&["provider"]).unwrap_err();
        assert!(err.contains("provider"));
    }

    #[test]
    fn empty_value_is_allowed_to_clear_an_option() {
        let pairs = parse_config_args(&["model="]).unwrap();
        assert_eq!(pairs, vec![("model".to_string(), String::new())]);
    }
}
