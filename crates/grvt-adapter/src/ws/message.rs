/*
[INPUT]:  Raw stream text frames; channel names and subscribe params
[OUTPUT]: Parsed inbound envelopes and outbound control frames
[POS]:    WebSocket layer - envelope parsing and frame building
[UPDATE]: When the stream framing changes
*/

use serde_json::{Map, Value};

/// Inbound `{"channel": ..., "sequence_number": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Empty for frames that carry no channel (acks, errors)
    pub channel: String,
    pub sequence_number: Option<u64>,
    /// `data` when present, otherwise the whole frame
    pub payload: Value,
}

impl Envelope {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self {
                channel: String::new(),
                sequence_number: None,
                payload: value,
            };
        };

        let channel = map
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let sequence_number = map.get("sequence_number").and_then(sequence_from_value);
        let payload = match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        };

        Self {
            channel,
            sequence_number,
            payload,
        }
    }
}

fn sequence_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// `{"op": "subscribe", "channel": ..., ...params}`
pub fn subscribe_frame(channel: &str, params: &Map<String, Value>) -> String {
    let mut frame = params.clone();
    frame.insert("op".to_string(), Value::from("subscribe"));
    frame.insert("channel".to_string(), Value::from(channel));
    Value::Object(frame).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    serde_json::json!({ "op": "unsubscribe", "channel": channel }).to_string()
}
