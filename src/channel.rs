//! WebSocket client for the agent's persistent event channel.
//!
//! Frames are JSON [`EventEnvelope`]s. Transport pings are answered inline and
//! frames that do not parse as envelopes are skipped, so callers only ever see
//! tagged events or the end of the channel.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::types::EventEnvelope;

type ChannelSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the remote side handed us while waiting on the channel.
#[derive(Debug)]
pub enum ChannelEvent {
    Envelope(EventEnvelope),
    /// The remote closed the channel (close frame or stream end).
    Closed,
}

/// One connected client session. Created on connect, torn down on
/// [`close`](ChannelSession::close) or drop.
pub struct ChannelSession {
    socket: ChannelSocket,
    session_id: Option<String>,
}

impl ChannelSession {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        Ok(Self {
            socket,
            session_id: None,
        })
    }

    /// Identity assigned by the remote side, when its connect ack carried one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, id: String) {
        self.session_id = Some(id);
    }

    /// Emit one tagged event. Fire-and-forget: no acknowledgment is awaited.
    pub async fn emit(&mut self, event: &str, payload: Value) -> Result<()> {
        let envelope = EventEnvelope {
            event: event.to_string(),
            payload,
        };
        let text = serde_json::to_string(&envelope).context("failed to encode event envelope")?;
        self.socket
            .send(Message::Text(text))
            .await
            .with_context(|| format!("failed to send {event} event"))?;
        Ok(())
    }

    /// Wait for the next envelope or the end of the channel.
    pub async fn next_event(&mut self) -> Result<ChannelEvent> {
        loop {
            let frame = match self.socket.next().await {
                Some(frame) => frame.context("event channel errored")?,
                None => return Ok(ChannelEvent::Closed),
            };
            match frame {
                Message::Text(text) => match serde_json::from_str::<EventEnvelope>(&text) {
                    Ok(envelope) => return Ok(ChannelEvent::Envelope(envelope)),
                    // Not an envelope; keep waiting.
                    Err(_) => continue,
                },
                Message::Ping(payload) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .context("failed to answer channel ping")?;
                }
                Message::Close(_) => return Ok(ChannelEvent::Closed),
                Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Close the session, tolerating an already-gone peer.
    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}
