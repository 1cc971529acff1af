//! Tagged wire messages and their JSON codec.
//!
//! The `type` tag is checked before the body is decoded so that an unknown
//! kind is reported as [`ProtocolError::UnknownType`] rather than as a generic
//! schema mismatch. Receivers rely on the distinction to stay forward
//! compatible.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Participant, PeerId,
    errors::{ProtocolError, Result},
};

/// Name of the discriminator field present on every frame.
const TYPE_FIELD: &str = "type";

/// One chat line in the append-only message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender's connection identifier.
    pub from: PeerId,
    /// Message body as typed.
    pub text: String,
}

impl ChatMessage {
    /// New chat line.
    pub fn new(from: PeerId, text: impl Into<String>) -> Self {
        Self { from, text: text.into() }
    }
}

/// Discriminator of a [`WireMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `user`: a participant announces itself.
    User,
    /// `message`: a chat line.
    Message,
    /// `user-list`: full roster snapshot from the host.
    UserList,
    /// `ready`: a participant marks itself ready.
    Ready,
    /// `start`: the host starts the room.
    Start,
}

impl MessageKind {
    /// Every kind this version understands.
    pub const ALL: [Self; 5] = [Self::User, Self::Message, Self::UserList, Self::Ready, Self::Start];

    /// Tag value as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Message => "message",
            Self::UserList => "user-list",
            Self::Ready => "ready",
            Self::Start => "start",
        }
    }

    /// Kind for a wire tag. `None` if the tag is not recognized.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

/// All frames exchanged between participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireMessage {
    /// A participant announces its own record.
    User {
        /// The announced record.
        user: Participant,
    },
    /// A chat line, relayed by the host to everyone but the sender.
    Message {
        /// Sender's connection identifier.
        from: PeerId,
        /// Message body.
        text: String,
    },
    /// Authoritative roster snapshot broadcast by the host.
    UserList {
        /// Roster in arrival order.
        users: Vec<Participant>,
    },
    /// A non-host tells the host it is ready.
    Ready {
        /// Identifier of the participant that became ready.
        id: PeerId,
    },
    /// The host moves the room from lobby to started.
    Start,
}

impl WireMessage {
    /// Discriminator of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::User { .. } => MessageKind::User,
            Self::Message { .. } => MessageKind::Message,
            Self::UserList { .. } => MessageKind::UserList,
            Self::Ready { .. } => MessageKind::Ready,
            Self::Start => MessageKind::Start,
        }
    }

    /// Chat frame carrying `message`.
    pub fn chat(message: &ChatMessage) -> Self {
        Self::Message { from: message.from.clone(), text: message.text.clone() }
    }

    /// Serialize to a JSON frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse a JSON frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Malformed` if the frame is not JSON or its body does
    ///   not match the schema for its type
    /// - `ProtocolError::MissingType` if there is no string `type` field
    /// - `ProtocolError::UnknownType` if the `type` is not recognized
    pub fn decode(frame: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let tag = value.get(TYPE_FIELD).and_then(Value::as_str).ok_or(ProtocolError::MissingType)?;
        if MessageKind::from_tag(tag).is_none() {
            return Err(ProtocolError::UnknownType(tag.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_encodes_as_bare_tag() {
        assert_eq!(WireMessage::Start.encode().unwrap(), r#"{"type":"start"}"#);
    }

    #[test]
    fn user_list_uses_kebab_case_tag() {
        let msg = WireMessage::UserList {
            users: vec![Participant::new(PeerId::new("user-ABCDE"), "Alice")],
        };
        let json = msg.encode().unwrap();
        assert!(json.starts_with(r#"{"type":"user-list""#), "{json}");
    }

    #[test]
    fn decodes_frame_written_by_hand() {
        let frame = r#"{"type":"message","from":"user-B0B00","text":"hi"}"#;
        let msg = WireMessage::decode(frame).unwrap();
        assert_eq!(msg, WireMessage::Message { from: PeerId::new("user-B0B00"), text: "hi".into() });
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let err = WireMessage::decode(r#"{"type":"emote","what":"wave"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("emote".into()));
        assert!(err.is_unknown_type());
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = WireMessage::decode(r#"{"id":"user-ABCDE"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingType);
    }

    #[test]
    fn non_string_type_counts_as_missing() {
        let err = WireMessage::decode(r#"{"type":7}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingType);
    }

    #[test]
    fn known_type_with_wrong_body_is_malformed() {
        let err = WireMessage::decode(r#"{"type":"ready"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = WireMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn kind_tags_are_unique() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_tag(kind.as_str()), Some(kind));
        }
    }
}
