//! Manages the WebSocket connection to the server's realtime endpoint.
//!
//! The connection is created on first need and recreated whenever it is
//! found not open; it is never explicitly closed. A reader task parses
//! inbound frames into `ServerEvent`s and forwards them to the session
//! loop; the write half stays with the session for outbound commands.

use anyhow::{Context, Result};
use chatvox_protocol::{ClientCommand, ServerEvent};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{error, info, warn};
use url::Url;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// One live WebSocket connection plus its reader task.
pub struct Connection {
    sink: WsSink,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connects and spawns the reader task. Parsed events are forwarded to
    /// `events`; frames with an unrecognized `type` are logged and dropped.
    pub async fn open(url: &Url, events: mpsc::Sender<ServerEvent>) -> Result<Self> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        info!(%url, "connected to realtime endpoint");

        let (sink, mut stream) = ws_stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let open_flag = open.clone();

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                // Session loop gone means shutdown.
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, raw = %text, "ignoring unrecognized server frame");
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        info!("server closed the connection");
                        break;
                    }
                    Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
                    Ok(other) => {
                        warn!(?other, "ignoring non-text frame");
                    }
                    Err(e) => {
                        error!("error receiving from server: {e}");
                        break;
                    }
                }
            }
            open_flag.store(false, Ordering::Relaxed);
        });

        Ok(Self { sink, open, reader })
    }

    /// False once the reader observed a close or transport error; the next
    /// outbound need reconnects.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Serializes and sends one command.
    pub async fn send(&mut self, cmd: &ClientCommand) -> Result<()> {
        let serialized = serde_json::to_string(cmd)?;
        if let Err(e) = self.sink.send(WsMessage::Text(serialized.into())).await {
            self.open.store(false, Ordering::Relaxed);
            return Err(e).context("failed to send command");
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
