//! Newline-delimited JSON framing for the answer stream.
//!
//! The transport may split one frame across deliveries or pack several frames
//! into one. Every delivery is appended to a single buffer; the complete lines
//! in it form a batch that is parsed all-or-nothing. If any line of the batch
//! is not valid JSON the whole batch (newlines included) stays buffered and is
//! retried after the next delivery, so a frame is never emitted twice or in
//! pieces.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use al_base::event::ChatEvent;
use serde_json::Value;

use super::ApiError;
use crate::infra::constants::READ_CHUNK_SIZE;

#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delivery. Returns the frames completed by it, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        // Everything up to the last newline is candidate frames; the tail is held back.
        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        match parse_batch(&self.buffer[..last_newline]) {
            Some(frames) => {
                self.buffer.drain(..=last_newline);
                frames
            }
            None => {
                tracing::debug!(buffered = self.buffer.len(), "incomplete frame batch, waiting for more data");
                Vec::new()
            }
        }
    }

    /// End of stream: try whatever is left as one last batch, drop it if it still fails.
    pub fn finish(&mut self) -> Vec<Value> {
        let rest = std::mem::take(&mut self.buffer);
        match parse_batch(&rest) {
            Some(frames) => frames,
            None => {
                tracing::warn!(bytes = rest.len(), "dropping unparseable trailing data at end of stream");
                Vec::new()
            }
        }
    }

    /// Bytes currently held back.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Parse every non-blank line, or nothing at all.
fn parse_batch(bytes: &[u8]) -> Option<Vec<Value>> {
    bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice::<Value>(line).ok())
        .collect()
}

/// Lazy sequence of chat events read from one response body.
///
/// Bound to its reader; once exhausted it stays exhausted.
pub struct EventStream<R> {
    reader: R,
    parser: FrameParser,
    ready: VecDeque<Value>,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: Read> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, parser: FrameParser::new(), ready: VecDeque::new(), buf: vec![0; READ_CHUNK_SIZE], finished: false }
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<ChatEvent, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(frame) = self.ready.pop_front() {
                match ChatEvent::from_value(frame) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => tracing::warn!("skipping unrecognised stream frame: {}", e),
                }
            }
            if self.finished {
                return None;
            }
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    self.ready.extend(self.parser.finish());
                }
                Ok(n) => {
                    let frames = self.parser.feed(&self.buf[..n]);
                    self.ready.extend(frames);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ApiError::StreamRead(e.to_string())));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STREAM: &str = concat!(
        r#"{"type":"sources","messageId":"m1","data":[{"pageContent":"p","metadata":{"url":"https://a.test"}}]}"#,
        "\n",
        r#"{"type":"message","messageId":"m1","data":"Héllo "}"#,
        "\n",
        r#"{"type":"message","messageId":"m1","data":"wörld"}"#,
        "\n",
        r#"{"type":"messageEnd"}"#,
        "\n",
    );

    fn feed_in_chunks(bytes: &[u8], size: usize) -> Vec<Value> {
        let mut parser = FrameParser::new();
        let mut out = Vec::new();
        for chunk in bytes.chunks(size) {
            out.extend(parser.feed(chunk));
        }
        out.extend(parser.finish());
        out
    }

    /// Reader that hands out pre-cut chunks one read at a time.
    struct Chunked(VecDeque<Vec<u8>>);

    impl Read for Chunked {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            match self.0.pop_front() {
                Some(chunk) => {
                    out[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    #[test]
    fn emits_complete_frames_in_order() {
        let frames = feed_in_chunks(STREAM.as_bytes(), STREAM.len());
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["type"], "sources");
        assert_eq!(frames[1]["data"], "Héllo ");
        assert_eq!(frames[3], json!({"type": "messageEnd"}));
    }

    #[test]
    fn chunking_does_not_change_output() {
        let whole = feed_in_chunks(STREAM.as_bytes(), STREAM.len());
        for size in [1, 2, 3, 7, 16, 50] {
            assert_eq!(feed_in_chunks(STREAM.as_bytes(), size), whole, "chunk size {}", size);
        }
    }

    #[test]
    fn holds_back_partial_line() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(br#"{"type":"message","messageId":"m1","da"#).is_empty());
        assert!(parser.buffered() > 0);
        let frames = parser.feed(b"ta\":\"x\"}\n");
        assert_eq!(frames, vec![json!({"type": "message", "messageId": "m1", "data": "x"})]);
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn bad_line_keeps_whole_batch_buffered() {
        let mut parser = FrameParser::new();
        let batch = b"{\"a\":1}\n{\"b\":\n";
        assert!(parser.feed(batch).is_empty());
        assert_eq!(parser.buffered(), batch.len());
        // The broken line stays broken, so nothing is ever emitted from this batch.
        assert!(parser.feed(b"{\"c\":3}\n").is_empty());
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let frames = feed_in_chunks(b"\n  \n{\"a\":1}\r\n\n", 4);
        assert_eq!(frames, vec![json!({"a": 1})]);
    }

    #[test]
    fn unterminated_final_frame_is_parsed_at_end() {
        let mut parser = FrameParser::new();
        assert!(parser.feed(b"{\"type\":\"messageEnd\"}").is_empty());
        assert_eq!(parser.finish(), vec![json!({"type": "messageEnd"})]);
    }

    #[test]
    fn garbage_tail_is_dropped_at_end() {
        let mut parser = FrameParser::new();
        let frames = parser.feed(b"{\"a\":1}\n{\"trunc");
        assert_eq!(frames, vec![json!({"a": 1})]);
        assert!(parser.finish().is_empty());
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn multibyte_char_split_across_deliveries() {
        let line = "{\"type\":\"message\",\"messageId\":\"m\",\"data\":\"é\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut parser = FrameParser::new();
        assert!(parser.feed(&line[..split]).is_empty());
        let frames = parser.feed(&line[split..]);
        assert_eq!(frames[0]["data"], "é");
    }

    #[test]
    fn event_stream_decodes_and_skips_unknown_frames() {
        let chunks = vec![
            b"{\"type\":\"message\",\"messageId\":\"m1\",\"da".to_vec(),
            b"ta\":\"Hi\"}\n{\"type\":\"progress\"}\n".to_vec(),
            b"{\"type\":\"messageEnd\"}\n".to_vec(),
        ];
        let events: Vec<ChatEvent> =
            EventStream::new(Chunked(chunks.into())).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            events,
            vec![
                ChatEvent::Message { data: "Hi".to_string(), message_id: "m1".to_string() },
                ChatEvent::MessageEnd { message_id: None },
            ]
        );
    }

    #[test]
    fn event_stream_reports_read_errors_once() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset"))
            }
        }
        let mut stream = EventStream::new(Broken);
        assert!(matches!(stream.next(), Some(Err(ApiError::StreamRead(_)))));
        assert!(stream.next().is_none());
    }
}
