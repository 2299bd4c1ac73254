//! Record framing for the scale's serial link.
//!
//! The scale mixes two framing disciplines on the same stream: short control
//! tokens (`CONN?`, `READY`, `SUCCESS`, `EXIT`) that are complete as soon as they
//! appear, and data blocks such as the titles listing that end with `#`. The
//! serial bridge delivers arbitrary fragments of that stream, so the framer
//! buffers input and cuts records at whichever boundary completes first.
//!
//! Host commands travel the other way as lines terminated with `\n`.

use bytes::{Buf, BytesMut};

/// Maximum length of a single record before the buffer is discarded.
pub const MAX_RECORD_LENGTH: usize = 1024;

/// Terminator ending a data block from the scale.
pub const TERMINATOR: u8 = b'#';

/// Header that opens a titles listing.
pub const TITLES_HEADER: &str = "TITLES";

/// Probe query sent by the scale.
pub const TOKEN_CONN_QUERY: &str = "CONN?";
/// Scale is ready to receive recipe records.
pub const TOKEN_READY: &str = "READY";
/// Scale stored or deleted a recipe.
pub const TOKEN_SUCCESS: &str = "SUCCESS";
/// Scale left its edit mode.
pub const TOKEN_EXIT: &str = "EXIT";

/// Control tokens that form a complete record on their own.
pub const CONTROL_TOKENS: [&str; 4] = [TOKEN_CONN_QUERY, TOKEN_READY, TOKEN_SUCCESS, TOKEN_EXIT];

/// Reassembles fragmented input from the scale into complete records.
///
/// Rules, applied to the buffered bytes only:
/// - Leading CR/LF is skipped.
/// - A buffer starting with `TITLES` is complete only at `#`.
/// - Otherwise the first boundary to end wins: a `#` (the record is everything
///   up to and including it) or a control token (the record is the token, any
///   text before it is dropped).
#[derive(Debug, Default)]
pub struct RecordFramer {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl RecordFramer {
    /// Create a new record framer.
    pub fn new() -> Self {
        RecordFramer {
            buffer: BytesMut::with_capacity(MAX_RECORD_LENGTH),
        }
    }

    /// Feed a received chunk and collect every record it completes, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut records = Vec::new();
        while let Some(record) = self.decode_record() {
            records.push(record);
        }

        if self.buffer.len() > MAX_RECORD_LENGTH {
            log::warn!(
                "record framer overflow: max {} bytes, got {}; discarding",
                MAX_RECORD_LENGTH,
                self.buffer.len()
            );
            self.buffer.clear();
        }

        records
    }

    /// Try to cut one complete record from the front of the buffer.
    fn decode_record(&mut self) -> Option<String> {
        while !self.buffer.is_empty() && (self.buffer[0] == b'\r' || self.buffer[0] == b'\n') {
            self.buffer.advance(1);
        }
        if self.buffer.is_empty() {
            return None;
        }

        if self.buffer.starts_with(TITLES_HEADER.as_bytes()) {
            let end = self.buffer.iter().position(|&b| b == TERMINATOR)?;
            let data = self.buffer.split_to(end + 1);
            return Some(String::from_utf8_lossy(&data).into_owned());
        }

        // (start, end) of the boundary that completes first
        let mut boundary: Option<(usize, usize)> = self
            .buffer
            .iter()
            .position(|&b| b == TERMINATOR)
            .map(|pos| (0, pos + 1));
        let mut token_boundary = false;

        for token in CONTROL_TOKENS {
            if let Some(start) = find_subslice(&self.buffer, token.as_bytes()) {
                let end = start + token.len();
                if boundary.map_or(true, |(_, best_end)| end < best_end) {
                    boundary = Some((start, end));
                    token_boundary = true;
                }
            }
        }

        let (start, end) = boundary?;
        if token_boundary && start > 0 {
            let noise = self.buffer.split_to(start);
            log::debug!(
                "record framer dropping {} bytes before token: {:?}",
                noise.len(),
                String::from_utf8_lossy(&noise)
            );
        }
        let data = self.buffer.split_to(end - start);
        Some(String::from_utf8_lossy(&data).into_owned())
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }
}

/// Accumulates bytes and yields newline-terminated lines.
///
/// Used on the scale side of the link, where host commands arrive one per line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: BytesMut,
}

impl LineBuffer {
    /// Create a new line buffer.
    pub fn new() -> Self {
        LineBuffer {
            buffer: BytesMut::with_capacity(MAX_RECORD_LENGTH),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete line from the buffer, skipping empty lines.
    pub fn decode_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\r' || b == b'\n')?;

            let line_data = self.buffer.split_to(end);
            let line = String::from_utf8_lossy(&line_data).to_string();

            while !self.buffer.is_empty() && (self.buffer[0] == b'\r' || self.buffer[0] == b'\n') {
                self.buffer.advance(1);
            }

            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Encode a line for transmission by appending the `\n` terminator.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    buf
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = RecordFramer::new();
        chunks.iter().flat_map(|chunk| framer.feed(chunk)).collect()
    }

    #[test]
    fn test_control_token_without_terminator() {
        let mut framer = RecordFramer::new();
        assert_eq!(framer.feed(b"CONN?"), vec!["CONN?".to_string()]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_partial_token() {
        let mut framer = RecordFramer::new();
        assert!(framer.feed(b"REA").is_empty());
        assert_eq!(framer.buffered_len(), 3);
        assert_eq!(framer.feed(b"DY\r\n"), vec!["READY".to_string()]);
    }

    #[test]
    fn test_probe_reply_is_not_a_query() {
        let mut framer = RecordFramer::new();
        assert!(framer.feed(b"CONN").is_empty());
        assert_eq!(framer.feed(b"?"), vec!["CONN?".to_string()]);
    }

    #[test]
    fn test_concatenated_records_in_one_chunk() {
        let records = feed_all(&[b"SUCCESSCONN?\r\nTITLES_2_Soup_Cake_#EXIT"]);
        assert_eq!(
            records,
            vec![
                "SUCCESS".to_string(),
                "CONN?".to_string(),
                "TITLES_2_Soup_Cake_#".to_string(),
                "EXIT".to_string(),
            ]
        );
    }

    #[test]
    fn test_titles_containing_token_text() {
        let records = feed_all(&[b"TITLES_2_READY_", b"EXIT Soup_#"]);
        assert_eq!(records, vec!["TITLES_2_READY_EXIT Soup_#".to_string()]);
    }

    #[test]
    fn test_noise_before_token_is_dropped() {
        let records = feed_all(&[b"xx", b"READY"]);
        assert_eq!(records, vec!["READY".to_string()]);
    }

    #[test]
    fn test_terminated_block_without_header() {
        let records = feed_all(&[b"abc#SUCCESS"]);
        assert_eq!(records, vec!["abc#".to_string(), "SUCCESS".to_string()]);
    }

    #[test]
    fn test_chunking_invariance() {
        let stream: &[u8] = b"\r\nCONN?TITLES_3_Soup_Bread_Pie_#READYSUCCESS\nEXIT";
        let expected = feed_all(&[stream]);
        assert_eq!(expected.len(), 5);

        for split in 0..=stream.len() {
            let (a, b) = stream.split_at(split);
            assert_eq!(feed_all(&[a, b]), expected, "split at {}", split);
        }

        let bytes: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(feed_all(&bytes), expected);

        let threes: Vec<&[u8]> = stream.chunks(3).collect();
        assert_eq!(feed_all(&threes), expected);
    }

    #[test]
    fn test_overflow_discards_buffer() {
        let mut framer = RecordFramer::new();
        let junk = vec![b'a'; MAX_RECORD_LENGTH + 1];
        assert!(framer.feed(&junk).is_empty());
        assert_eq!(framer.buffered_len(), 0);
        assert_eq!(framer.feed(b"EXIT"), vec!["EXIT".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut framer = RecordFramer::new();
        framer.feed(b"TITLES_1_So");
        assert_eq!(framer.buffer_as_str(), "TITLES_1_So");
        framer.clear();
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line("ADD"), b"ADD\n");
    }

    #[test]
    fn test_decode_line() {
        let mut lines = LineBuffer::new();
        lines.push(b"CONN\r\n\nTITLE_So");

        assert_eq!(lines.decode_line(), Some("CONN".to_string()));
        assert!(lines.decode_line().is_none());

        lines.push(b"up\n");
        assert_eq!(lines.decode_line(), Some("TITLE_Soup".to_string()));
        assert_eq!(lines.buffered_len(), 0);
    }
}
