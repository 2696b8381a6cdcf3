//! Round-trip chat test harness: one stimulus in, first matching event out.
//!
//! A single owning task drives the session through connect, optional room
//! join, a settle delay, and the stimulus, then races the first matching
//! response event against one overall deadline. Exactly one
//! [`RoundTripOutcome`] is produced per run; when the deadline fires, the
//! in-flight session future is dropped, which tears the socket down.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{self, Instant};

use crate::channel::{ChannelEvent, ChannelSession};
use crate::types::ProbeTarget;

/// Event-tag set spoken on the channel.
///
/// The service's wire vocabulary has changed between versions, so the tags are
/// configuration rather than a fixed contract. Two presets cover the known
/// variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatVocabulary {
    /// Tag of the server's connect ack, which may carry the session id.
    pub connect_ack: Option<String>,
    /// Room/context join tag; `None` for vocabularies without rooms.
    pub join: Option<String>,
    pub stimulus: String,
    /// Tags accepted as the answer; the first match wins.
    pub responses: Vec<String>,
    pub default_deadline: Duration,
}

impl ChatVocabulary {
    /// Flat `message`/`message` vocabulary, no rooms.
    pub fn plain() -> Self {
        Self {
            connect_ack: Some("connect".into()),
            join: None,
            stimulus: "message".into(),
            responses: vec!["message".into()],
            default_deadline: Duration::from_secs(10),
        }
    }

    /// Room-based vocabulary: `ROOM_JOINING` before `SEND_MESSAGE`, answer
    /// arrives as `MESSAGE`.
    pub fn rooms() -> Self {
        Self {
            connect_ack: Some("CONNECTED".into()),
            join: Some("ROOM_JOINING".into()),
            stimulus: "SEND_MESSAGE".into(),
            responses: vec!["MESSAGE".into()],
            default_deadline: Duration::from_secs(15),
        }
    }

    /// Look up a preset by its CLI name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(Self::plain()),
            "rooms" => Some(Self::rooms()),
            _ => None,
        }
    }

    fn is_response(&self, tag: &str) -> bool {
        self.responses.iter().any(|r| r == tag)
    }
}

/// Everything one harness run needs besides the target.
#[derive(Debug, Clone)]
pub struct ChatPlan {
    pub vocabulary: ChatVocabulary,
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    /// Pause between join and stimulus, letting context setup propagate.
    pub settle: Duration,
    /// Overall wall-clock budget for the run, connect included.
    pub deadline: Duration,
}

/// The single terminal verdict of a harness run.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundTripOutcome {
    /// A matching response arrived; carries its raw payload.
    Answered(Value),
    TimedOut,
    ChannelError(String),
    /// Remote closed the channel before any verdict.
    Disconnected,
}

impl RoundTripOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RoundTripOutcome::Answered(_))
    }
}

/// Run one stimulus/response round trip against `target` under the plan's
/// deadline. All transitions and raw payloads go to the operator stream.
pub async fn run_round_trip(target: &ProbeTarget, plan: &ChatPlan) -> RoundTripOutcome {
    let deadline = time::sleep(plan.deadline);
    tokio::pin!(deadline);

    tokio::select! {
        outcome = drive(target, plan) => outcome,
        _ = &mut deadline => {
            // Dropping the drive future closes any open socket.
            println!("Test timed out - no response received");
            RoundTripOutcome::TimedOut
        }
    }
}

async fn drive(target: &ProbeTarget, plan: &ChatPlan) -> RoundTripOutcome {
    let url = target.ws_url();
    println!("Connecting to {url}...");
    let mut session = match ChannelSession::connect(&url).await {
        Ok(s) => s,
        Err(e) => return channel_error(e),
    };
    println!("Connected to {}", target.authority());

    if let Some(join) = plan.vocabulary.join.as_deref() {
        let payload = json!({ "roomId": plan.room_id, "userId": plan.user_id });
        if let Err(e) = session.emit(join, payload).await {
            return channel_error(e);
        }
        println!("Room join attempted ({join})");
    }

    if let Some(outcome) = settle(&mut session, plan).await {
        return outcome;
    }

    let mut payload = json!({
        "text": plan.text,
        "userId": plan.user_id,
        "userName": plan.user_name,
    });
    if plan.vocabulary.join.is_some() {
        payload["roomId"] = Value::String(plan.room_id.clone());
    }
    if let Err(e) = session.emit(&plan.vocabulary.stimulus, payload).await {
        return channel_error(e);
    }
    println!("Test message sent via {}", plan.vocabulary.stimulus);

    loop {
        match session.next_event().await {
            Ok(ChannelEvent::Envelope(envelope)) => {
                if plan.vocabulary.is_response(&envelope.event) {
                    println!("Received {}: {}", envelope.event, envelope.payload);
                    session.close().await;
                    return RoundTripOutcome::Answered(envelope.payload);
                }
                println!("Ignoring {} event: {}", envelope.event, envelope.payload);
            }
            Ok(ChannelEvent::Closed) => {
                println!("Disconnected before any response");
                return RoundTripOutcome::Disconnected;
            }
            Err(e) => return channel_error(e),
        }
    }
}

/// Drain the channel for the settle window. Envelopes seen here are logged but
/// never terminal; a connect ack carrying an id sets the session identity.
async fn settle(session: &mut ChannelSession, plan: &ChatPlan) -> Option<RoundTripOutcome> {
    let end = Instant::now() + plan.settle;
    loop {
        let remaining = end.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match time::timeout(remaining, session.next_event()).await {
            // Settle window elapsed without incident.
            Err(_) => return None,
            Ok(Ok(ChannelEvent::Envelope(envelope))) => {
                if plan.vocabulary.connect_ack.as_deref() == Some(envelope.event.as_str()) {
                    if let Some(id) = envelope.payload.get("id").and_then(Value::as_str) {
                        println!("Session id assigned: {id}");
                        session.set_session_id(id.to_string());
                        continue;
                    }
                }
                println!("Received {} during setup: {}", envelope.event, envelope.payload);
            }
            Ok(Ok(ChannelEvent::Closed)) => {
                println!("Disconnected during setup");
                return Some(RoundTripOutcome::Disconnected);
            }
            Ok(Err(e)) => return Some(channel_error(e)),
        }
    }
}

fn channel_error(e: anyhow::Error) -> RoundTripOutcome {
    eprintln!("Channel error: {e:#}");
    RoundTripOutcome::ChannelError(format!("{e:#}"))
}
