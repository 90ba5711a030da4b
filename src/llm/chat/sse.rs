//! Line framing for streamed provider responses.
//!
//! Network chunks do not line up with event boundaries: one chunk may carry
//! several events, and a JSON payload may be split across two chunks (even in
//! the middle of a UTF-8 sequence). `LineBuffer` keeps the unterminated tail
//! until the rest arrives.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes and returns every complete, non-empty line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if line.is_empty() { None } else { Some(line) }
    }
}

/// Interprets one SSE line. Comments and non-data fields yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_events_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n");
        let events: Vec<_> = lines.iter().filter_map(|l| parse_sse_line(l)).collect();
        assert_eq!(events, vec![
            SseEvent::Data("{\"a\":1}".into()),
            SseEvent::Data("{\"b\":2}".into()),
            SseEvent::Done
        ]);
    }

    #[test]
    fn keeps_partial_line_until_newline() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"data: {\"content\":\"hel").is_empty());
        let lines = buf.feed(b"lo\"}\n");
        assert_eq!(lines, vec!["data: {\"content\":\"hello\"}".to_string()]);
    }

    #[test]
    fn reassembles_split_utf8_sequence() {
        let bytes = "{\"t\":\"é\"}\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut buf = LineBuffer::new();
        assert!(buf.feed(&bytes[..split]).is_empty());
        assert_eq!(buf.feed(&bytes[split..]), vec!["{\"t\":\"é\"}".to_string()]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = LineBuffer::new();
        buf.feed(b"{\"done\":true}");
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn ignores_comments_and_event_fields() {
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
    }
}
