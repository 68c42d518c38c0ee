use crate::{
    constants::{FRAME_DELIMITER, MAX_FRAME_LEN},
    error::ProtoError,
    messages::Message,
};

/// Encode a message into one delimited frame.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtoError> {
    let mut out = serde_json::to_vec(msg)?;
    if out.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge(out.len()));
    }
    out.push(FRAME_DELIMITER);
    Ok(out)
}

/// Decode one frame. The trailing delimiter (and a `\r` before it) is optional.
pub fn decode_frame(frame: &[u8]) -> Result<Message, ProtoError> {
    let frame = frame.strip_suffix(&[FRAME_DELIMITER]).unwrap_or(frame);
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);

    if frame.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge(frame.len()));
    }

    let text = std::str::from_utf8(frame)?;
    if text.trim().is_empty() {
        return Err(ProtoError::EmptyFrame);
    }

    Ok(serde_json::from_str(text)?)
}
