use crate::error::HubError;
use crate::protocol::events::ProtocolEvent;

/// Bincode encodes an enum as a leading little-endian `u32` variant index
/// followed by the variant's fields. We rely on that wire detail, rather
/// than `serde(other)` (which only works for self-describing formats like
/// JSON), to tell a genuinely malformed frame apart from one carrying a
/// variant newer than this build knows about: any index past our count
/// decodes to [`ProtocolEvent::Unknown`] instead of a `ProtocolError`. Keep
/// this in lock-step with the variant count in `protocol::events`.
const NUM_VARIANTS: u32 = 28;

/// Encodes one [`ProtocolEvent`] as a length-prefixed, bincode-encoded
/// frame: a 4-byte big-endian length followed by the payload. One frame
/// maps to exactly one WebSocket binary message.
pub fn encode_frame(event: &ProtocolEvent) -> Result<Vec<u8>, HubError> {
    let body = bincode::serialize(event)
        .map_err(|err| HubError::ProtocolError(format!("encode failed: {err}")))?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes one frame. Malformed bytes (bad length prefix, truncated body,
/// or a corrupt known variant) return `ProtocolError`; a well-formed body
/// whose variant index is out of range for this build decodes to
/// [`ProtocolEvent::Unknown`] for forward compatibility.
pub fn decode_frame(bytes: &[u8]) -> Result<ProtocolEvent, HubError> {
    if bytes.len() < 4 {
        return Err(HubError::ProtocolError("frame shorter than length prefix".to_string()));
    }
    let declared_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let body = &bytes[4..];
    if body.len() != declared_len {
        return Err(HubError::ProtocolError(format!(
            "length prefix {declared_len} does not match body length {}",
            body.len()
        )));
    }

    if body.len() < 4 {
        return Err(HubError::ProtocolError("body shorter than variant index".to_string()));
    }
    let variant_index = u32::from_le_bytes(body[0..4].try_into().unwrap());
    if variant_index >= NUM_VARIANTS {
        return Ok(ProtocolEvent::Unknown);
    }

    bincode::deserialize(body).map_err(|err| HubError::ProtocolError(format!("decode failed: {err}")))
}
