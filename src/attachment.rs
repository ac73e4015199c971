use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

/// Hard cap on the raw byte length of a file attachment, enforced both when
/// encoding and when validating an inbound payload.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("attachment exceeds the 10 MiB limit")]
    PayloadTooLarge,
    #[error("attachment is not a valid base64 data URI")]
    MalformedPayload,
}

impl AttachmentError {
    pub fn code(self) -> &'static str {
        match self {
            AttachmentError::PayloadTooLarge => "payload-too-large",
            AttachmentError::MalformedPayload => "malformed-payload",
        }
    }
}

/// Encode raw file bytes as a `data:<mediaType>;base64,<payload>` URI.
pub fn encode(raw: &[u8], media_type: &str) -> Result<String, AttachmentError> {
    if raw.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::PayloadTooLarge);
    }
    Ok(format!("data:{media_type};base64,{}", BASE64.encode(raw)))
}

/// Decode a data URI back into its media type and raw bytes. The size gate
/// also applies here so an oversized payload cannot slip past it by arriving
/// pre-encoded.
pub fn decode(payload: &str) -> Result<(String, Vec<u8>), AttachmentError> {
    let rest = payload
        .strip_prefix("data:")
        .ok_or(AttachmentError::MalformedPayload)?;
    let (media_type, data) = rest
        .split_once(";base64,")
        .ok_or(AttachmentError::MalformedPayload)?;
    let raw = BASE64
        .decode(data)
        .map_err(|_| AttachmentError::MalformedPayload)?;
    if raw.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::PayloadTooLarge);
    }
    Ok((media_type.to_string(), raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Other,
}

/// Classify a sender-supplied MIME type by prefix. The content is never
/// sniffed; the type string is trusted as-is.
pub fn classify(media_type: &str) -> MediaClass {
    if media_type.starts_with("image/") {
        MediaClass::Image
    } else if media_type.starts_with("video/") {
        MediaClass::Video
    } else if media_type.starts_with("audio/") {
        MediaClass::Audio
    } else {
        MediaClass::Other
    }
}
