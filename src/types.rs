use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Address of the agent service, shared by the prober and the chat harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used for raw TCP connects.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Root URL probed by the application stage.
    pub fn http_root(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    /// WebSocket endpoint of the event channel.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }
}

/// One discrete check within the liveness probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    Port,
    Application,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStage::Port => write!(f, "port"),
            ProbeStage::Application => write!(f, "application"),
        }
    }
}

/// Outcome of a single probe stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub stage: ProbeStage,
    pub passed: bool,
    pub detail: String,
}

/// Aggregate probe verdict. The application result is absent when the port
/// stage already failed.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProbeReport {
    pub results: Vec<ProbeResult>,
    pub healthy: bool,
}

/// One tagged frame on the event channel: `{"event": <tag>, "payload": {...}}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}
