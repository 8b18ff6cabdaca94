use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Every frame on the realtime socket is `{ "event": ..., "data": ... }`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse a raw text frame. Anything that is not a JSON object with a
    /// string `event` field yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Deserialize `data` into `T`, treating a missing payload as `{}`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Value::Null => serde_json::from_value(Value::Object(Map::new())),
            data => T::deserialize(data),
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed frame")]
    Malformed,
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{event}': {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Body of `subscribe` / `unsubscribe` requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ChannelRequest {
    #[serde(
        rename = "channelId",
        alias = "channel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub channel_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HeartbeatMessage {
    /// Client clock, normally milliseconds since the epoch. Kept opaque:
    /// the server acknowledges any heartbeat whatever its payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

/// Messages a client sends to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe(ChannelRequest),
    #[serde(rename = "unsubscribe")]
    Unsubscribe(ChannelRequest),
    #[serde(rename = "heartbeat")]
    Heartbeat(HeartbeatMessage),
}

impl ClientMessage {
    pub fn subscribe(channel_id: impl Into<String>) -> Self {
        ClientMessage::Subscribe(ChannelRequest {
            channel_id: Some(channel_id.into()),
        })
    }

    pub fn unsubscribe(channel_id: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe(ChannelRequest {
            channel_id: Some(channel_id.into()),
        })
    }

    pub fn heartbeat(timestamp: i64) -> Self {
        ClientMessage::Heartbeat(HeartbeatMessage {
            timestamp: Some(Value::from(timestamp)),
        })
    }

    /// Decode a raw frame, separating unknown events from malformed ones so
    /// the caller can log them differently.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let envelope = Envelope::parse(raw).ok_or(DecodeError::Malformed)?;
        let invalid = |source| DecodeError::InvalidPayload {
            event: envelope.event.clone(),
            source,
        };
        match envelope.event.as_str() {
            "subscribe" => Ok(ClientMessage::Subscribe(
                envelope.decode_data().map_err(invalid)?,
            )),
            "unsubscribe" => Ok(ClientMessage::Unsubscribe(
                envelope.decode_data().map_err(invalid)?,
            )),
            "heartbeat" => Ok(ClientMessage::Heartbeat(
                envelope.decode_data().unwrap_or_default(),
            )),
            other => Err(DecodeError::UnknownEvent(other.to_string())),
        }
    }

    pub fn to_text(&self) -> String {
        // A derived Serialize over strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_uses_channel_id_on_the_wire() {
        let text = ClientMessage::subscribe("general").to_text();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "event": "subscribe", "data": { "channelId": "general" } }));
    }

    #[test]
    fn decode_accepts_legacy_channel_field() {
        let msg = ClientMessage::decode(r#"{"event":"subscribe","data":{"channel":"general"}}"#).unwrap();
        assert_eq!(msg, ClientMessage::subscribe("general"));
    }

    #[test]
    fn decode_tolerates_missing_payload() {
        let msg = ClientMessage::decode(r#"{"event":"heartbeat"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat(HeartbeatMessage::default()));

        let msg = ClientMessage::decode(r#"{"event":"subscribe","data":{}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe(ChannelRequest { channel_id: None }));
    }

    #[test]
    fn heartbeat_payload_is_never_rejected() {
        for raw in [
            r#"{"event":"heartbeat","data":{"timestamp":"now"}}"#,
            r#"{"event":"heartbeat","data":{"timestamp":1.7e12}}"#,
            r#"{"event":"heartbeat","data":"ping"}"#,
        ] {
            assert!(matches!(ClientMessage::decode(raw), Ok(ClientMessage::Heartbeat(_))), "{raw}");
        }
        assert_eq!(
            ClientMessage::heartbeat(1_700_000_000_000),
            ClientMessage::Heartbeat(HeartbeatMessage { timestamp: Some(json!(1_700_000_000_000i64)) })
        );
    }

    #[test]
    fn decode_classifies_failures() {
        assert!(matches!(ClientMessage::decode("not json"), Err(DecodeError::Malformed)));
        assert!(matches!(ClientMessage::decode(r#"{"data":{}}"#), Err(DecodeError::Malformed)));
        assert!(matches!(
            ClientMessage::decode(r#"{"event":"shout","data":{}}"#),
            Err(DecodeError::UnknownEvent(e)) if e == "shout"
        ));
        assert!(matches!(
            ClientMessage::decode(r#"{"event":"subscribe","data":{"channelId":7}}"#),
            Err(DecodeError::InvalidPayload { .. })
        ));
    }
}
