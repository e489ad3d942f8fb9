use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one chat user. Sessions, busy gates, notification preferences
/// and dedupe records are all keyed by this. For the Telegram transport this
/// is the chat id of the private conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub trace_id: Uuid,
    pub user: UserId,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(user: UserId, text: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            user,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub trace_id: Uuid,
    pub user: UserId,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn reply_to(inbound: &InboundMessage, text: impl Into<String>) -> Self {
        Self {
            trace_id: inbound.trace_id,
            user: inbound.user,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Messages carried by the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    /// A user message entered the gateway (before any processing).
    InboundReceived { inbound: InboundMessage },
    /// The gateway admitted the message for dispatch.
    MessageAccepted { trace_id: Uuid },
    /// A live reply finished and is on its way out.
    ReplyReady { outbound: OutboundMessage },
    /// The proactive scheduler produced a notice for delivery.
    NoticeReady { user: UserId, text: String },
    /// A dispatch turn ended in a failure reply.
    TurnFailed { trace_id: Uuid, error: String },
}
