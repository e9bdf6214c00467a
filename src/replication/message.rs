//! Replication message codec
//!
//! Wire form is one JSON object per line:
//! `{"message":"session:sync","session":{...}}` or
//! `{"message":"session:expires","uid":"..."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum ReplicationMessage {
    /// Full session map of the sender, merged on receipt
    #[serde(rename = "session:sync", alias = "session:update")]
    Sync { session: SessionMap },

    /// Remove one session everywhere
    #[serde(rename = "session:expires", alias = "session:delexpires")]
    Expire { uid: String },
}

impl ReplicationMessage {
    /// Encode as a single line, newline not included
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode one line
    ///
    /// Lines that are not JSON objects, lack a `message` key, or name an
    /// unknown message yield `None`.
    pub fn decode(line: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("ignoring undecodable replication line: {e}");
                return None;
            }
        };
        value.get("message")?;

        match serde_json::from_value(value) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!("ignoring replication message: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRecord;
    use serde_json::json;

    #[test]
    fn test_expire_wire_shape() {
        let line = ReplicationMessage::Expire { uid: "abc".into() }
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"message": "session:expires", "uid": "abc"}));
    }

    #[test]
    fn test_sync_wire_shape() {
        let mut record = SessionRecord::new(42);
        record.data.insert("user".into(), json!("alice"));
        let mut session = SessionMap::new();
        session.insert("abc".into(), record);

        let line = ReplicationMessage::Sync { session }.encode().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["message"], "session:sync");
        assert_eq!(value["session"]["abc"]["ttl"], 42);
        assert_eq!(value["session"]["abc"]["session"]["user"], "alice");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_decode_round_trip() {
        let message = ReplicationMessage::Expire { uid: "u1".into() };
        let line = message.encode().unwrap();
        assert_eq!(ReplicationMessage::decode(&line), Some(message));
    }

    #[test]
    fn test_missing_message_key_is_ignored() {
        assert_eq!(ReplicationMessage::decode(r#"{"uid":"abc"}"#), None);
        assert_eq!(ReplicationMessage::decode(r#"{"session":{}}"#), None);
    }

    #[test]
    fn test_garbage_and_unknown_are_ignored() {
        assert_eq!(ReplicationMessage::decode("not json"), None);
        assert_eq!(ReplicationMessage::decode("[1,2]"), None);
        assert_eq!(
            ReplicationMessage::decode(r#"{"message":"cache:flush"}"#),
            None
        );
        assert_eq!(
            ReplicationMessage::decode(r#"{"message":"session:expires"}"#),
            None
        );
    }

    #[test]
    fn test_legacy_names_accepted() {
        assert_eq!(
            ReplicationMessage::decode(r#"{"message":"session:delexpires","uid":"x"}"#),
            Some(ReplicationMessage::Expire { uid: "x".into() })
        );
        let decoded = ReplicationMessage::decode(
            r#"{"message":"session:update","session":{"x":{"ttl":1,"session":{"a":1}}}}"#,
        );
        match decoded {
            Some(ReplicationMessage::Sync { session }) => {
                assert_eq!(session["x"].data["a"], json!(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
