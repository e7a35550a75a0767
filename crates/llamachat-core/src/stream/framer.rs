//! Newline framing over raw byte chunks.
//!
//! Bytes are carried over until their terminating `\n` arrives, so a UTF-8
//! sequence split across two chunks is only decoded once it is complete.

use bytes::BytesMut;
use tracing::debug;

/// Splits a chunked byte stream into newline-delimited text records.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: BytesMut,
    /// Bytes of `carry` already known to contain no newline.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(offset) = self.carry[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = self.carry.split_to(end + 1);
            self.scanned = 0;

            let text = String::from_utf8_lossy(&line[..end]);
            let text = text.trim_end_matches('\r');
            if text.trim().is_empty() {
                continue;
            }
            records.push(text.to_string());
        }
        self.scanned = self.carry.len();

        records
    }

    /// Number of bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// End of stream. An unterminated trailing fragment is dropped; returns its length.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding unterminated record at end of stream");
        }
        self.carry.clear();
        self.scanned = 0;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_multiple_records() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(records, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_record_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"mess").is_empty());
        assert!(framer.push(b"age\":").is_empty());
        assert_eq!(framer.push(b"1}\nnext"), vec!["{\"message\":1}"]);
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "héllo 世界\n";
        let bytes = text.as_bytes();
        // split inside the three-byte '世'
        let split = text.find('世').unwrap() + 1;

        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..split]).is_empty());
        assert_eq!(framer.push(&bytes[split..]), vec!["héllo 世界"]);
    }

    #[test]
    fn test_empty_lines_filtered() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"\n\n  \none\r\n\r\ntwo\n");
        assert_eq!(records, vec!["one", "two"]);
    }

    #[test]
    fn test_trailing_fragment_discarded() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"done\npartial"), vec!["done"]);
        assert_eq!(framer.finish(), 7);
        assert_eq!(framer.pending(), 0);
        assert!(framer.push(b"").is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"ok\xff\n");
        assert_eq!(records, vec!["ok\u{fffd}"]);
    }
}
