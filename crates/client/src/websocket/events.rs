//! Realtime frame types and serialization
//!
//! Outbound frames are always tagged with `type`. Inbound control frames
//! (`typing`, `read`) are tagged, but inbound chat messages arrive as the bare
//! message entity with no `type` field. The server depends on that shape, so
//! it is accepted as-is; a chat message that does carry `type: "message"` is
//! accepted too.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use support_chat_shared::{Message, UserId};

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Post a chat message to the session
    Message { message: String },

    /// Local typing state changed
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },

    /// Read marker: everything the other side sent up to now has been seen
    Read,
}

impl OutboundFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Frames received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A participant started or stopped typing
    Typing { sender_id: UserId, is_typing: bool },

    /// A participant read the conversation
    Read { read_by: UserId },

    /// A chat message, including echoes of our own
    Chat(Message),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum TaggedFrame {
    Typing { sender_id: UserId, is_typing: bool },
    Read { read_by: UserId },
    Message(Message),
}

impl InboundFrame {
    /// Decode one text frame
    ///
    /// Returns `None` for anything that is not valid JSON or not a known shape.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        if value.get("type").is_some() {
            let tagged: TaggedFrame = serde_json::from_value(value).ok()?;
            return Some(match tagged {
                TaggedFrame::Typing {
                    sender_id,
                    is_typing,
                } => InboundFrame::Typing {
                    sender_id,
                    is_typing,
                },
                TaggedFrame::Read { read_by } => InboundFrame::Read { read_by },
                TaggedFrame::Message(message) => InboundFrame::Chat(message),
            });
        }
        serde_json::from_value::<Message>(value)
            .ok()
            .map(InboundFrame::Chat)
    }

    /// Participant that produced this frame
    pub fn origin(&self) -> &UserId {
        match self {
            InboundFrame::Typing { sender_id, .. } => sender_id,
            InboundFrame::Read { read_by } => read_by,
            InboundFrame::Chat(message) => &message.sender_id,
        }
    }
}
