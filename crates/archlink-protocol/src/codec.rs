//! Codec trait and the batched JSON implementation.
//!
//! Every frame on the wire is a JSON **array** of messages, in both
//! directions. A frame carries one or more messages, and their order
//! inside the array is the order in which they are processed.
//!
//! Decoding is tolerant per element: an element with an unknown `cmd`, or
//! a known `cmd` whose fields don't match, is logged and dropped while
//! the rest of the frame is still delivered. Only a frame that is not a
//! JSON array at all is an error.

use serde_json::Value;

use crate::{ClientMessage, ProtocolError, ServerMessage};

/// Turns outbound batches into frames and frames into inbound messages.
///
/// `Send + Sync + 'static` so one codec can be shared by the reader and
/// writer tasks of a connection.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an ordered batch into one text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if a message can't be represented
    /// as JSON.
    fn encode_batch(
        &self,
        batch: &[ClientMessage],
    ) -> Result<String, ProtocolError>;

    /// Parses one frame into the messages it carries, in array order.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is not JSON and
    /// `ProtocolError::InvalidFrame` if it is JSON but not an array.
    fn decode_frame(
        &self,
        frame: &[u8],
    ) -> Result<Vec<ServerMessage>, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use archlink_protocol::{ClientMessage, Codec, JsonCodec, MessageKind};
///
/// let codec = JsonCodec;
///
/// let frame = codec.encode_batch(&[ClientMessage::Sync]).unwrap();
/// assert_eq!(frame, r#"[{"cmd":"Sync"}]"#);
///
/// let messages = codec
///     .decode_frame(br#"[{"cmd":"Nope"},{"cmd":"InvalidPacket","type":"cmd","text":"bad"}]"#)
///     .unwrap();
/// assert_eq!(messages.len(), 1);
/// assert_eq!(messages[0].kind(), MessageKind::InvalidPacket);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_batch(
        &self,
        batch: &[ClientMessage],
    ) -> Result<String, ProtocolError> {
        serde_json::to_string(batch).map_err(ProtocolError::Encode)
    }

    fn decode_frame(
        &self,
        frame: &[u8],
    ) -> Result<Vec<ServerMessage>, ProtocolError> {
        let value: Value =
            serde_json::from_slice(frame).map_err(ProtocolError::Decode)?;

        let Value::Array(elements) = value else {
            return Err(ProtocolError::InvalidFrame(format!(
                "expected a JSON array of messages, got {}",
                json_type_name(&value)
            )));
        };

        let mut messages = Vec::with_capacity(elements.len());
        for element in elements {
            let cmd = element
                .get("cmd")
                .and_then(Value::as_str)
                .map(str::to_owned);

            match serde_json::from_value::<ServerMessage>(element) {
                Ok(message) => messages.push(message),
                Err(e) => match cmd {
                    Some(cmd)
                        if crate::MessageKind::from_cmd(&cmd).is_none() =>
                    {
                        tracing::debug!(%cmd, "dropping unknown command");
                    }
                    Some(cmd) => {
                        tracing::debug!(%cmd, error = %e, "dropping malformed message");
                    }
                    None => {
                        tracing::debug!(error = %e, "dropping element without cmd");
                    }
                },
            }
        }
        Ok(messages)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageKind;

    #[test]
    fn test_encode_batch_is_json_array_in_order() {
        let frame = JsonCodec
            .encode_batch(&[
                ClientMessage::Sync,
                ClientMessage::LocationChecks {
                    locations: vec![1, 2],
                },
            ])
            .unwrap();
        assert_eq!(
            frame,
            r#"[{"cmd":"Sync"},{"cmd":"LocationChecks","locations":[1,2]}]"#
        );
    }

    #[test]
    fn test_encode_empty_batch() {
        assert_eq!(JsonCodec.encode_batch(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_decode_frame_preserves_order() {
        let frame = br#"[
            {"cmd":"LocationInfo","locations":[]},
            {"cmd":"Retrieved","keys":{"a":1},"correlation_token":"x"},
            {"cmd":"Bounced","data":{}}
        ]"#;
        let kinds: Vec<_> = JsonCodec
            .decode_frame(frame)
            .unwrap()
            .iter()
            .map(ServerMessage::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::LocationInfo,
                MessageKind::Retrieved,
                MessageKind::Bounced
            ]
        );
    }

    #[test]
    fn test_decode_frame_drops_unknown_and_malformed_elements() {
        let frame = br#"[
            {"cmd":"Teleport","x":1},
            {"cmd":"ReceivedItems","index":"not a number","items":[]},
            {"no_cmd":true},
            {"cmd":"ReceivedItems","index":0,"items":[]}
        ]"#;
        let messages = JsonCodec.decode_frame(frame).unwrap();
        assert_eq!(
            messages,
            vec![ServerMessage::ReceivedItems {
                index: 0,
                items: vec![]
            }]
        );
    }

    #[test]
    fn test_decode_frame_empty_array_is_empty() {
        assert!(JsonCodec.decode_frame(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_frame_rejects_non_array() {
        let result = JsonCodec.decode_frame(br#"{"cmd":"RoomInfo"}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidFrame(_))));
    }

    #[test]
    fn test_decode_frame_rejects_invalid_json() {
        let result = JsonCodec.decode_frame(b"[{");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
