//! The envelope: the unit of communication between cluster nodes.
//!
//! An envelope carries a destination, the sender's pid, an opaque 64-bit
//! correlation id for duplicate detection at higher layers, and an opaque
//! JSON payload. This layer never inspects the payload or the correlation
//! id.
//!
//! On the wire the envelope is a JSON object with the fields `SendTo`,
//! `SendBy`, `MsgId` and `Msg`; a `SendTo` of `-1` addresses every peer at
//! once. Internally the destination is a tagged variant so that broadcast
//! handling is exhaustively checked instead of riding on an integer
//! sentinel.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identity::Pid;

/// Wire value of `SendTo` meaning "every peer except the sender".
const BROADCAST_WIRE: i64 = -1;

/// Where an envelope is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A single peer, by pid.
    Unicast(Pid),
    /// Every peer except the sender.
    Broadcast,
}

impl Destination {
    /// Whether this is the broadcast destination.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Destination::Broadcast)
    }

    /// The target pid for a unicast destination.
    pub fn unicast_pid(&self) -> Option<Pid> {
        match self {
            Destination::Unicast(pid) => Some(*pid),
            Destination::Broadcast => None,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Unicast(pid) => write!(f, "peer {}", pid),
            Destination::Broadcast => write!(f, "broadcast"),
        }
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Destination::Unicast(pid) => serializer.serialize_i64(i64::from(*pid)),
            Destination::Broadcast => serializer.serialize_i64(BROADCAST_WIRE),
        }
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        match raw {
            BROADCAST_WIRE => Ok(Destination::Broadcast),
            pid if pid >= 1 && pid <= i64::from(u32::MAX) => Ok(Destination::Unicast(pid as Pid)),
            other => Err(serde::de::Error::custom(format!(
                "invalid SendTo value {}: expected a positive pid or -1",
                other
            ))),
        }
    }
}

/// One message travelling through the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination peer, or broadcast.
    #[serde(rename = "SendTo")]
    pub destination: Destination,

    /// Pid of the originating node.
    #[serde(rename = "SendBy")]
    pub sender: Pid,

    /// Opaque correlation id, meant for duplicate detection above this
    /// layer. Neither generated nor interpreted here; 0 when absent.
    #[serde(rename = "MsgId", default)]
    pub correlation_id: i64,

    /// Opaque payload.
    #[serde(rename = "Msg", default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// An envelope addressed to a single peer.
    pub fn unicast(to: Pid, from: Pid, payload: impl Into<serde_json::Value>) -> Self {
        Self {
            destination: Destination::Unicast(to),
            sender: from,
            correlation_id: 0,
            payload: payload.into(),
        }
    }

    /// An envelope addressed to every peer except the sender.
    pub fn broadcast(from: Pid, payload: impl Into<serde_json::Value>) -> Self {
        Self {
            destination: Destination::Broadcast,
            sender: from,
            correlation_id: 0,
            payload: payload.into(),
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, id: i64) -> Self {
        self.correlation_id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope::unicast(3, 1, "hello").with_correlation_id(42);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["SendTo"], json!(3));
        assert_eq!(value["SendBy"], json!(1));
        assert_eq!(value["MsgId"], json!(42));
        assert_eq!(value["Msg"], json!("hello"));
    }

    #[test]
    fn test_broadcast_serializes_as_minus_one() {
        let envelope = Envelope::broadcast(2, "hi");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["SendTo"], json!(-1));

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back.destination, Destination::Broadcast);
    }

    #[test]
    fn test_unicast_destination_roundtrip() {
        let envelope = Envelope::unicast(5, 1, json!({"kind": "ping"}));
        let text = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.destination.unicast_pid(), Some(5));
    }

    #[test]
    fn test_rejects_invalid_send_to() {
        // 0 is a reserved pid, and only -1 carries broadcast meaning.
        let zero = r#"{"SendTo": 0, "SendBy": 1, "MsgId": 0, "Msg": null}"#;
        assert!(serde_json::from_str::<Envelope>(zero).is_err());

        let minus_two = r#"{"SendTo": -2, "SendBy": 1, "MsgId": 0, "Msg": null}"#;
        assert!(serde_json::from_str::<Envelope>(minus_two).is_err());
    }

    #[test]
    fn test_optional_fields_default() {
        let bare = r#"{"SendTo": -1, "SendBy": 4}"#;
        let envelope: Envelope = serde_json::from_str(bare).unwrap();
        assert_eq!(envelope.correlation_id, 0);
        assert_eq!(envelope.payload, serde_json::Value::Null);
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(format!("{}", Destination::Unicast(7)), "peer 7");
        assert_eq!(format!("{}", Destination::Broadcast), "broadcast");
    }
}
