//! # tandem-wire — Message envelope for tandem sessions
//!
//! Every frame on the wire is one JSON object: a tagged union keyed by
//! `type`. The relay routes on the tag and never parses payloads beyond
//! that.
//!
//! | tag         | direction                  | meaning                          |
//! |-------------|----------------------------|----------------------------------|
//! | `join`      | client → server            | announce arrival                 |
//! | `SiteID`    | server → client            | assign the id-minting site       |
//! | `docReq`    | server → one client        | ask for a snapshot for a joiner  |
//! | `docSync`   | any → server → one client  | full document snapshot           |
//! | `operation` | any → server → all others  | broadcast edit                   |
//! | `users`     | server → all               | active usernames for the UI      |
//!
//! An `operation` carries the full character, id and neighbor intent
//! included. The observed wire carried only a position hint, which cannot
//! survive concurrent edits; the position is kept as a diagnostic only.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tandem_crdt::{Character, Document};

/// Errors from encoding or decoding frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode: {0}")]
    Encode(serde_json::Error),
    #[error("decode: {0}")]
    Decode(serde_json::Error),
}

/// What an [`Operation`] does to the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Delete,
}

/// A broadcast edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OpKind,
    /// 1-based visible index at the originating moment. A hint for logs,
    /// never an input to integration.
    pub position: u64,
    /// The full character; placement authority is its neighbor intent.
    pub character: Character,
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "join")]
    Join { username: String, text: String },
    #[serde(rename = "SiteID")]
    SiteId { text: String, id: Uuid },
    #[serde(rename = "docReq")]
    DocReq { id: Uuid },
    #[serde(rename = "docSync")]
    DocSync {
        document: Document,
        /// Destination client. Absent when a client volunteers its
        /// document without being asked; the relay drops those.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Uuid>,
    },
    #[serde(rename = "operation")]
    Operation { operation: Operation },
    #[serde(rename = "users")]
    Users { text: String },
}

impl Message {
    /// The wire tag, for routing logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Join { .. } => "join",
            Message::SiteId { .. } => "SiteID",
            Message::DocReq { .. } => "docReq",
            Message::DocSync { .. } => "docSync",
            Message::Operation { .. } => "operation",
            Message::Users { .. } => "users",
        }
    }

    /// Serialize to one JSON text frame.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Deserialize one JSON text frame.
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        serde_json::from_str(raw).map_err(WireError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tandem_crdt::CharId;

    fn sample_character() -> Character {
        Character {
            id: CharId::site(1, 1),
            value: 'a',
            visible: true,
            prev_id: CharId::Start,
            next_id: CharId::End,
        }
    }

    fn roundtrip(msg: Message) -> Message {
        Message::from_json(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn join_roundtrips() {
        let msg = Message::Join {
            username: "alice".into(),
            text: "has joined the session.".into(),
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn site_id_uses_its_historical_tag() {
        let msg = Message::SiteId {
            text: "3".into(),
            id: Uuid::new_v4(),
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "SiteID");
        assert_eq!(value["text"], "3");
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn doc_req_roundtrips() {
        let msg = Message::DocReq { id: Uuid::new_v4() };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn doc_sync_carries_the_full_sequence() {
        let mut doc = Document::new();
        doc.set_site_id(1);
        doc.insert(1, 'h').unwrap();
        doc.insert(2, 'i').unwrap();
        doc.delete(2);

        let msg = Message::DocSync {
            document: doc.clone(),
            id: Some(Uuid::new_v4()),
        };
        match roundtrip(msg) {
            Message::DocSync { document, id } => {
                assert!(id.is_some());
                assert_eq!(document.characters(), doc.characters());
                assert_eq!(document.content(), "h");
                // Minting state never travels.
                assert_eq!(document.site_id(), 0);
            }
            other => panic!("expected docSync, got {}", other.tag()),
        }
    }

    #[test]
    fn doc_sync_destination_is_optional() {
        let msg = Message::DocSync {
            document: Document::new(),
            id: None,
        };
        let json = msg.to_json().unwrap();
        assert!(!json.contains("\"id\""));
        match Message::from_json(&json).unwrap() {
            Message::DocSync { id, .. } => assert!(id.is_none()),
            other => panic!("expected docSync, got {}", other.tag()),
        }
    }

    #[test]
    fn operation_carries_the_full_character() {
        let msg = Message::Operation {
            operation: Operation {
                kind: OpKind::Insert,
                position: 1,
                character: sample_character(),
            },
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "operation");
        assert_eq!(value["operation"]["type"], "insert");
        assert_eq!(value["operation"]["character"]["id"], "1.1");
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn delete_operation_roundtrips() {
        let mut character = sample_character();
        character.visible = false;
        let msg = Message::Operation {
            operation: Operation {
                kind: OpKind::Delete,
                position: 1,
                character,
            },
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn users_roundtrips() {
        let msg = Message::Users {
            text: "alice,bob".into(),
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn unknown_tags_fail_to_decode() {
        assert!(Message::from_json(r#"{"type":"shrug"}"#).is_err());
        assert!(Message::from_json("not json").is_err());
    }
}
