//! Incremental Server-Sent-Events frame parser.
//!
//! Bytes go in through [`SseParser::feed`] in whatever chunks the transport delivers;
//! complete frames come out. Line endings may be `\n`, `\r\n` or a bare `\r`. A `\r`
//! at the very end of a chunk is held back until the next byte shows whether it
//! starts a `\r\n` pair, which keeps the output independent of chunk boundaries.

use serde::{Deserialize, Serialize};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseEvent {
    /// `data` lines joined with `\n`. Never empty.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Reconnection hint in milliseconds, only kept when finite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<f64>,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            id: None,
            retry: None,
        }
    }
}

#[derive(Debug, Default)]
struct PendingFrame {
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    retry: Option<f64>,
}

impl PendingFrame {
    fn take(&mut self) -> Option<SseEvent> {
        let frame = std::mem::take(self);
        let data = frame.data.join("\n");
        if data.is_empty() {
            return None;
        }
        Some(SseEvent {
            data,
            event: frame.event,
            id: frame.id,
            retry: frame.retry,
        })
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    frame: PendingFrame,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buf.len() {
            match self.buf[i] {
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.buf[start..i]).into_owned();
                    self.process_line(&line, &mut out);
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    if i + 1 == self.buf.len() {
                        // Wait for the next chunk to tell `\r` from `\r\n`.
                        break;
                    }
                    let line = String::from_utf8_lossy(&self.buf[start..i]).into_owned();
                    self.process_line(&line, &mut out);
                    i += if self.buf[i + 1] == b'\n' { 2 } else { 1 };
                    start = i;
                }
                _ => i += 1,
            }
        }
        self.buf.drain(..start);
        out
    }

    /// Flush at end of input. An unterminated last line and an undispatched frame
    /// are both delivered rather than dropped.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let mut out = Vec::new();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let text = String::from_utf8_lossy(&rest);
            let text = text.strip_suffix('\r').unwrap_or(&text).to_string();
            if !text.is_empty() {
                self.process_line(&text, &mut out);
            }
        }
        out.extend(self.frame.take());
        out.pop()
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            out.extend(self.frame.take());
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => self.frame.data.push(value.to_string()),
            "event" => self.frame.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.frame.id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(n) = value.trim().parse::<f64>() {
                    if n.is_finite() {
                        self.frame.retry = Some(n);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Parse a complete buffer in one go.
pub fn parse_all(input: &[u8]) -> Vec<SseEvent> {
    let mut parser = SseParser::new();
    let mut events = parser.feed(input);
    events.extend(parser.finish());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "data: {\"a\":1}\n\n\
        : keepalive\n\n\
        event: message\r\nid: 7\r\ndata: line one\r\ndata: line two\r\n\r\n\
        data:\n\n\
        retry: 1500\rdata: café ☕\r\r\
        retry: NaN\ndata: tail";

    fn expected() -> Vec<SseEvent> {
        vec![
            SseEvent::data("{\"a\":1}"),
            SseEvent {
                data: "line one\nline two".to_string(),
                event: Some("message".to_string()),
                id: Some("7".to_string()),
                retry: None,
            },
            SseEvent {
                data: "café ☕".to_string(),
                event: None,
                id: None,
                retry: Some(1500.0),
            },
            SseEvent::data("tail"),
        ]
    }

    #[test]
    fn parses_whole_buffer() {
        assert_eq!(parse_all(SAMPLE.as_bytes()), expected());
    }

    #[test]
    fn output_is_independent_of_chunk_boundaries() {
        let bytes = SAMPLE.as_bytes();
        for size in 1..=bytes.len() {
            let mut parser = SseParser::new();
            let mut events = Vec::new();
            for chunk in bytes.chunks(size) {
                events.extend(parser.feed(chunk));
            }
            events.extend(parser.finish());
            assert_eq!(events, expected(), "chunk size {}", size);
        }
    }

    #[test]
    fn split_at_every_offset_matches_single_chunk() {
        let bytes = SAMPLE.as_bytes();
        for cut in 0..=bytes.len() {
            let mut parser = SseParser::new();
            let mut events = parser.feed(&bytes[..cut]);
            events.extend(parser.feed(&bytes[cut..]));
            events.extend(parser.finish());
            assert_eq!(events, expected(), "cut at {}", cut);
        }
    }

    #[test]
    fn comment_only_and_empty_data_frames_yield_nothing() {
        assert!(parse_all(b": just a comment\n\n").is_empty());
        assert!(parse_all(b"data:\n\n").is_empty());
        assert!(parse_all(b"data: \n\n").is_empty());
        assert!(parse_all(b"event: ping\n\n").is_empty());
    }

    #[test]
    fn line_without_colon_is_field_with_empty_value() {
        let events = parse_all(b"data\ndata: x\n\n");
        assert_eq!(events, vec![SseEvent::data("\nx")]);
    }

    #[test]
    fn non_finite_retry_is_ignored() {
        let events = parse_all(b"retry: inf\ndata: a\n\nretry: 20\ndata: b\n\n");
        assert_eq!(events[0].retry, None);
        assert_eq!(events[1].retry, Some(20.0));
    }
}
