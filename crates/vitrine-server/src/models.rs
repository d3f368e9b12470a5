//! Data model for sessions, messages and archive records
//!
//! TigerStyle: Explicit types, validated construction.

use serde::{Deserialize, Serialize};
use vitrine_core::constants::{
    IMAGE_PAYLOAD_SIZE_BYTES_MAX, MESSAGE_CONTENT_SIZE_BYTES_MAX, SESSION_ID_LENGTH_BYTES_MAX,
};
use vitrine_core::{Error, Result};

/// Role of a chat message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(Error::internal(format!("unknown message role: {other}"))),
        }
    }
}

/// One chat message in a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (UUID v4)
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Author role
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Optional inline image, base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    /// Milliseconds since epoch; transcript order is by this field ascending
    pub timestamp_ms: u64,
    /// Whether this message has been carried into the archive
    #[serde(default)]
    pub synced: bool,
}

/// Validate a session ID before touching storage or spawning an actor
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(Error::InvalidSessionId {
            session_id: session_id.to_string(),
            reason: "must not be empty".into(),
        });
    }
    if session_id.len() > SESSION_ID_LENGTH_BYTES_MAX {
        return Err(Error::InvalidSessionId {
            session_id: session_id.to_string(),
            reason: format!("exceeds {} bytes", SESSION_ID_LENGTH_BYTES_MAX),
        });
    }
    if session_id.chars().any(char::is_whitespace) {
        return Err(Error::InvalidSessionId {
            session_id: session_id.to_string(),
            reason: "must not contain whitespace".into(),
        });
    }
    Ok(())
}

/// Validate message content and image payload limits
pub fn validate_message_payload(content: &str, image_base64: Option<&str>) -> Result<()> {
    if content.len() > MESSAGE_CONTENT_SIZE_BYTES_MAX {
        return Err(Error::MessageContentTooLarge {
            size: content.len(),
            limit: MESSAGE_CONTENT_SIZE_BYTES_MAX,
        });
    }

    if let Some(image) = image_base64 {
        if image.len() > IMAGE_PAYLOAD_SIZE_BYTES_MAX {
            return Err(Error::ImagePayloadTooLarge {
                size: image.len(),
                limit: IMAGE_PAYLOAD_SIZE_BYTES_MAX,
            });
        }
        use base64::Engine as _;
        if base64::engine::general_purpose::STANDARD
            .decode(image)
            .is_err()
        {
            return Err(Error::ImagePayloadInvalid {
                reason: "not valid base64".into(),
            });
        }
    }

    Ok(())
}

/// Durable archive row: one row per session, upserted with the full transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// Full transcript at flush time; later flushes replace this wholesale
    pub messages: Vec<Message>,
    /// Timestamp of the first message
    pub started_at_ms: u64,
    /// Time of the flush that wrote this row
    pub last_write_ms: u64,
}
