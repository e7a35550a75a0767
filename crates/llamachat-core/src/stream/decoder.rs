use serde::Deserialize;

use crate::error::{ChatError, Result};

/// One streamed record from `/api/chat`. Fields not listed here are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatChunk {
    /// The text fragment carried by this record, if it has a non-empty one.
    pub fn into_delta(self) -> Option<String> {
        self.message
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
    }
}

/// Parse one framed record.
pub fn decode_record(record: &str) -> Result<ChatChunk> {
    serde_json::from_str(record).map_err(|e| ChatError::MalformedRecord(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delta() {
        let chunk = decode_record(
            r#"{"model":"llama3.2","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#,
        )
        .unwrap();
        assert!(!chunk.done);
        assert_eq!(chunk.into_delta().as_deref(), Some("Hel"));
    }

    #[test]
    fn test_final_record_without_content() {
        let chunk = decode_record(r#"{"done":true,"done_reason":"stop","eval_count":42}"#).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.done_reason.as_deref(), Some("stop"));
        assert!(chunk.into_delta().is_none());
    }

    #[test]
    fn test_empty_content_is_not_a_delta() {
        let chunk = decode_record(r#"{"message":{"role":"assistant","content":""}}"#).unwrap();
        assert!(chunk.into_delta().is_none());
    }

    #[test]
    fn test_error_record() {
        let chunk = decode_record(r#"{"error":"model 'nope' not found"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model 'nope' not found"));
        assert!(chunk.into_delta().is_none());
    }

    #[test]
    fn test_malformed_record() {
        let err = decode_record(r#"{"message":{"content":"trunc"#).unwrap_err();
        assert!(matches!(err, ChatError::MalformedRecord(_)));
        assert!(decode_record("not json").is_err());
    }
}
