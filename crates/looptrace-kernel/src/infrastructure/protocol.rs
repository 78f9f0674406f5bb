//! Infrastructure Layer: Host ⇄ Sandbox Protocol
//!
//! The only boundary between the host and a sandbox run. Exactly one
//! [`RunRequest`] goes in; exactly one terminal [`SandboxReply`] comes out.
//! Nothing is streamed.
//!
//! ```text
//! host ──{ "code": "..." }──────────────────────────▶ sandbox
//! host ◀─{ "type": "done", "events": [...] }──────── sandbox
//!      ◀─{ "type": "error", "message": "..." }─────
//! ```

use anyhow::{Context as AnyhowContext, Result};
use looptrace_core::{FailureKind, TraceEvent};
use serde::{Deserialize, Serialize};

/// Outbound message: the script to trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub code: String,
}

impl RunRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Inbound terminal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SandboxReply {
    /// The run finished; events are in execution order.
    Done { events: Vec<TraceEvent> },
    /// The run was aborted.
    Error { message: String },
}

impl SandboxReply {
    pub fn error(message: impl Into<String>) -> Self {
        SandboxReply::Error { message: message.into() }
    }

    /// Failure kind, recovered from the message on the receiving side.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SandboxReply::Done { .. } => None,
            SandboxReply::Error { message } => Some(FailureKind::classify(message)),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SandboxReply::Done { .. })
    }
}

/// Encode a reply as wire JSON.
pub fn encode_reply(reply: &SandboxReply) -> Result<String> {
    serde_json::to_string(reply).context("Failed to encode sandbox reply")
}

/// Decode a reply from wire JSON.
pub fn decode_reply(raw: &str) -> Result<SandboxReply> {
    serde_json::from_str(raw).context("Failed to decode sandbox reply")
}
